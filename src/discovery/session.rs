use crate::api::{HttpResponse, HttpTransport};
use crate::error::Result;
use crate::providers::{Provider, QuerySpec};

/// A provider paired with the transport and credentials for one delivery.
pub struct ProviderSession<'a> {
    provider: &'a dyn Provider,
    transport: &'a dyn HttpTransport,
    authorization: Option<String>,
}

impl<'a> ProviderSession<'a> {
    pub fn new(
        provider: &'a dyn Provider,
        transport: &'a dyn HttpTransport,
        authorization: Option<String>,
    ) -> Self {
        Self {
            provider,
            transport,
            authorization,
        }
    }

    pub fn provider(&self) -> &'a dyn Provider {
        self.provider
    }

    pub async fn fetch(&self, query: QuerySpec) -> Result<HttpResponse> {
        let request = query.into_request(self.authorization.clone());
        self.transport.send(request).await
    }
}
