use serde::{Deserialize, Serialize};

/// Source-control provider a task targets. Bitbucket's public (cloud) and
/// private (server) namespaces have different URL shapes and envelopes, so
/// they are separate services.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Service {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    #[serde(rename = "bitbucket")]
    BitbucketPublic,
    #[serde(rename = "bitbucket-private")]
    BitbucketPrivate,
}

impl Service {
    pub const ALL: [Service; 4] = [
        Service::GitHub,
        Service::GitLab,
        Service::BitbucketPublic,
        Service::BitbucketPrivate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::GitHub => "github",
            Service::GitLab => "gitlab",
            Service::BitbucketPublic => "bitbucket",
            Service::BitbucketPrivate => "bitbucket-private",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Service::ALL
            .into_iter()
            .find(|service| service.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown service: {}", s))
    }
}

/// Pointer to the next page of a listing. GraphQL providers hand back opaque
/// `endCursor` strings, REST providers page by number or start offset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum Cursor {
    Offset(u64),
    Token(String),
}

impl Cursor {
    /// Seeded tasks may carry the literal `"null"` instead of no cursor.
    pub fn is_first_page(&self) -> bool {
        matches!(self, Cursor::Token(token) if token == "null")
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cursor::Offset(n) => write!(f, "{}", n),
            Cursor::Token(token) => write!(f, "{}", token),
        }
    }
}

/// One unit of crawl work: list a page of an org's repositories, or (when
/// `repo` is set) a page of one repository's branches.
///
/// Tasks are never mutated; continuations are built with [`DiscoveryTask::with_cursor`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryTask {
    pub service: Service,
    pub org: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// `None` is the first page.
    #[serde(default)]
    pub cursor: Option<Cursor>,
    #[serde(default)]
    pub default_branch_only: bool,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub external_orgs: Vec<String>,
    pub batch_id: String,
}

impl DiscoveryTask {
    pub fn new(service: Service, org: impl Into<String>, batch_id: impl Into<String>) -> Self {
        Self {
            service,
            org: org.into(),
            repo: None,
            cursor: None,
            default_branch_only: false,
            plugins: Vec::new(),
            external_orgs: Vec::new(),
            batch_id: batch_id.into(),
        }
    }

    pub fn with_plugins(self, plugins: Vec<String>) -> Self {
        Self { plugins, ..self }
    }

    pub fn with_external_orgs(self, external_orgs: Vec<String>) -> Self {
        Self {
            external_orgs,
            ..self
        }
    }

    pub fn with_default_branch_only(self, default_branch_only: bool) -> Self {
        Self {
            default_branch_only,
            ..self
        }
    }

    /// Successor task for the same chain, positioned at `cursor`.
    pub fn with_cursor(&self, cursor: Cursor) -> Self {
        Self {
            cursor: Some(cursor),
            ..self.clone()
        }
    }

    /// Branch-continuation task for one repository of this org.
    pub fn for_repo(&self, repo: impl Into<String>, cursor: Cursor) -> Self {
        Self {
            repo: Some(repo.into()),
            cursor: Some(cursor),
            ..self.clone()
        }
    }

    pub fn is_repo_task(&self) -> bool {
        self.repo.is_some()
    }
}

/// Terminal request to scan one branch. Field names are the contract with the
/// downstream scan engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanTask {
    pub org: String,
    pub repo: String,
    pub branch: String,
    pub service: Service,
    pub plugins: Vec<String>,
}
