pub mod bitbucket;
pub mod github;
pub mod gitlab;
pub mod templates;

use serde_json::json;

use crate::api::{HttpRequest, HttpResponse, Method};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::models::{BranchPage, Cursor, Page, Service};

pub use bitbucket::{BitbucketCloudProvider, BitbucketServerProvider};
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;

/// A rendered provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySpec {
    Rest { url: String },
    GraphQl { url: String, query: String },
}

impl QuerySpec {
    pub fn is_graphql(&self) -> bool {
        matches!(self, QuerySpec::GraphQl { .. })
    }

    pub fn into_request(self, authorization: Option<String>) -> HttpRequest {
        match self {
            QuerySpec::Rest { url } => HttpRequest {
                method: Method::Get,
                url,
                body: None,
                authorization,
            },
            QuerySpec::GraphQl { url, query } => HttpRequest {
                method: Method::Post,
                url,
                body: Some(json!({ "query": query })),
                authorization,
            },
        }
    }
}

/// Query building and response parsing for one provider. Implementations are
/// pure: no network, no state beyond their service configuration.
pub trait Provider: Send + Sync {
    fn service(&self) -> Service;

    /// Org-level repository listing.
    fn build_query(&self, org: &str, cursor: Option<&Cursor>) -> Result<QuerySpec>;

    fn parse_page(&self, org: &str, response: &HttpResponse) -> Result<Page>;

    /// Branch listing for one repository, addressed by its `api_ref`.
    fn build_branch_query(
        &self,
        org: &str,
        repo: &str,
        cursor: Option<&Cursor>,
    ) -> Result<QuerySpec>;

    fn parse_branch_page(&self, response: &HttpResponse) -> Result<BranchPage>;

    /// Separate lookup for providers whose listings omit the default branch.
    fn default_branch_query(&self, _org: &str, _repo: &str) -> Option<QuerySpec> {
        None
    }

    fn parse_default_branch(&self, _response: &HttpResponse) -> Option<String> {
        None
    }
}

/// Picks the builder/parser pair for a service.
pub fn for_service(service: Service, config: &ServiceConfig) -> Result<Box<dyn Provider>> {
    if config.url.is_empty() {
        return Err(Error::Config(format!("no url configured for {}", service)));
    }

    let provider: Box<dyn Provider> = match service {
        Service::GitHub => Box::new(GitHubProvider::new(config.url.clone())),
        Service::GitLab => {
            let branch_url = config.branch_url.clone().ok_or_else(|| {
                Error::Config("no branch url configured for gitlab".to_string())
            })?;
            Box::new(GitLabProvider::new(config.url.clone(), branch_url))
        }
        Service::BitbucketPublic => Box::new(BitbucketCloudProvider::new(config.url.clone())),
        Service::BitbucketPrivate => Box::new(BitbucketServerProvider::new(config.url.clone())),
    };
    Ok(provider)
}

// The `"null"` sentinel means the same as no cursor.
fn page_cursor(cursor: Option<&Cursor>) -> Option<&Cursor> {
    cursor.filter(|c| !c.is_first_page())
}

/// GraphQL `after:` argument: `null` on the first page, a quoted cursor after.
pub(crate) fn graphql_cursor(cursor: Option<&Cursor>) -> String {
    match page_cursor(cursor) {
        None => "null".to_string(),
        Some(cursor) => templates::graphql_string(&cursor.to_string()),
    }
}

/// Numeric REST cursor; `None` on the first page.
pub(crate) fn rest_cursor(cursor: Option<&Cursor>) -> Result<Option<u64>> {
    match page_cursor(cursor) {
        None => Ok(None),
        Some(Cursor::Offset(n)) => Ok(Some(*n)),
        Some(Cursor::Token(token)) => token
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::ParseError(format!("invalid page cursor: {}", token))),
    }
}

/// Appends `name=cursor` to `url` unless this is the first page.
pub(crate) fn with_cursor_param(url: String, name: &str, cursor: Option<u64>) -> String {
    match cursor {
        None => url,
        Some(n) => {
            let separator = if url.contains('?') { "&" } else { "?" };
            format!("{}{}{}={}", url, separator, name, n)
        }
    }
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::ParseError(e.to_string()))
}
