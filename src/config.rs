use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::Service;

/// How the API key is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    /// Key is already `user:app-password` base64 encoded.
    Basic,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub url: String,
    /// REST base for branch listings (GitLab only).
    pub branch_url: Option<String>,
    pub api_key: Option<String>,
    pub auth: AuthScheme,
}

impl ServiceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            branch_url: None,
            api_key: None,
            auth: AuthScheme::Bearer,
        }
    }

    pub fn with_branch_url(self, branch_url: impl Into<String>) -> Self {
        Self {
            branch_url: Some(branch_url.into().trim_end_matches('/').to_string()),
            ..self
        }
    }

    pub fn with_api_key(self, api_key: Option<String>) -> Self {
        Self { api_key, ..self }
    }

    pub fn with_auth(self, auth: AuthScheme) -> Self {
        Self { auth, ..self }
    }

    pub fn authorization(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| match self.auth {
            AuthScheme::Bearer => format!("Bearer {}", key),
            AuthScheme::Basic => format!("Basic {}", key),
        })
    }
}

/// Everything the pagination driver needs to talk to providers and requeue work.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub services: HashMap<Service, ServiceConfig>,
    pub requeue_delay: Duration,
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            requeue_delay: Duration::from_secs(60),
        }
    }

    pub fn with_service(mut self, service: Service, config: ServiceConfig) -> Self {
        self.services.insert(service, config);
        self
    }

    pub fn service(&self, service: Service) -> Result<&ServiceConfig> {
        self.services
            .get(&service)
            .ok_or(Error::ServiceNotConfigured(service))
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub database_path: String,
    pub discovery_queue: String,
    pub scan_queue: String,
    pub concurrency_limit: usize,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut discovery = DiscoveryConfig::new();

        let github_url =
            optional("GITHUB_URL").unwrap_or_else(|| "https://api.github.com/graphql".to_string());
        discovery = discovery.with_service(
            Service::GitHub,
            ServiceConfig::new(github_url).with_api_key(optional("GITHUB_API_KEY")),
        );

        if let Some(gitlab_url) = optional("GITLAB_URL") {
            let branch_url = optional("GITLAB_BRANCH_URL").ok_or_else(|| {
                Error::Config("GITLAB_BRANCH_URL must be set when GITLAB_URL is set".to_string())
            })?;
            discovery = discovery.with_service(
                Service::GitLab,
                ServiceConfig::new(gitlab_url)
                    .with_branch_url(branch_url)
                    .with_api_key(optional("GITLAB_API_KEY")),
            );
        }

        let bitbucket_url = optional("BITBUCKET_URL")
            .unwrap_or_else(|| "https://api.bitbucket.org/2.0".to_string());
        discovery = discovery.with_service(
            Service::BitbucketPublic,
            ServiceConfig::new(bitbucket_url)
                .with_api_key(optional("BITBUCKET_API_KEY"))
                .with_auth(AuthScheme::Basic),
        );

        if let Some(private_url) = optional("BITBUCKET_PRIVATE_URL") {
            discovery = discovery.with_service(
                Service::BitbucketPrivate,
                ServiceConfig::new(private_url).with_api_key(optional("BITBUCKET_PRIVATE_API_KEY")),
            );
        }

        discovery.requeue_delay = Duration::from_secs(parsed("RATE_LIMIT_REQUEUE_DELAY_SECS", 60)?);

        let database_path =
            optional("QUEUE_DATABASE_PATH").unwrap_or_else(|| "repo-discovery.db".to_string());
        let discovery_queue =
            optional("DISCOVERY_QUEUE").unwrap_or_else(|| "repo-discovery".to_string());
        let scan_queue = optional("SCAN_QUEUE").unwrap_or_else(|| "repo-scan".to_string());

        let concurrency_limit = parsed("CONCURRENCY_LIMIT", 5)?;
        if concurrency_limit == 0 {
            return Err(Error::Config("CONCURRENCY_LIMIT must be at least 1".to_string()));
        }

        Ok(Self {
            discovery,
            database_path,
            discovery_queue,
            scan_queue,
            concurrency_limit,
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS", 30)?),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} is not a valid value: {}", key, value))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_header() {
        let bearer = ServiceConfig::new("https://example.com/").with_api_key(Some("k".to_string()));
        assert_eq!(bearer.url, "https://example.com");
        assert_eq!(bearer.authorization().as_deref(), Some("Bearer k"));

        let basic = bearer.clone().with_auth(AuthScheme::Basic);
        assert_eq!(basic.authorization().as_deref(), Some("Basic k"));

        let anonymous = ServiceConfig::new("https://example.com");
        assert_eq!(anonymous.authorization(), None);
    }

    #[test]
    fn test_missing_service_is_an_error() {
        let config = DiscoveryConfig::new().with_service(Service::GitHub, ServiceConfig::new("u"));
        assert!(config.service(Service::GitHub).is_ok());
        assert!(matches!(
            config.service(Service::GitLab),
            Err(Error::ServiceNotConfigured(Service::GitLab))
        ));
    }
}
