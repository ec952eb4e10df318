use super::task::Cursor;

/// Provider repository, normalized just enough for the node processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryNode {
    /// Repository path as it appears in scan tasks.
    pub name: String,
    /// Identifier used to address the repository in per-repository API calls
    /// (GitLab project id, Bitbucket slug, GitHub name).
    pub api_ref: String,
    pub default_branch: Option<String>,
    pub is_private: bool,
    /// Disk usage or size as reported by the provider; `None` when unknown.
    pub size: Option<u64>,
    /// Inline branch listing. `None` means the provider needs a separate
    /// branch query for this repository.
    pub branches: Option<BranchPage>,
}

impl RepositoryNode {
    pub fn is_empty_on_disk(&self) -> bool {
        self.size == Some(0)
    }
}

/// One page of branch names with the cursor of the following page, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchPage {
    pub names: Vec<String>,
    pub next: Option<Cursor>,
}

/// One page of an org-level (or repo-level) listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub nodes: Vec<RepositoryNode>,
    pub next: Option<Cursor>,
}

impl Page {
    /// Wraps one page of a repository's branch listing. The listing's cursor
    /// becomes the page cursor, so the repository chain advances like an org chain.
    pub fn for_repository(repo: &str, branches: BranchPage) -> Self {
        let node = RepositoryNode {
            name: repo.to_string(),
            api_ref: repo.to_string(),
            default_branch: None,
            is_private: false,
            size: None,
            branches: Some(BranchPage {
                names: branches.names,
                next: None,
            }),
        };
        Self {
            nodes: vec![node],
            next: branches.next,
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.next.is_some()
    }
}
