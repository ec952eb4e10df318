use super::branch_resolver::{BranchResolver, RateLimited};
use super::session::ProviderSession;
use crate::api::{analyze_error_response, ErrorReport};
use crate::models::{DiscoveryTask, RepositoryNode, ScanTask};

/// What one page of repository nodes turns into.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessedPage {
    pub scan_tasks: Vec<ScanTask>,
    /// Per-repository branch continuations for inline listings that did not
    /// fit in the first page.
    pub continuations: Vec<DiscoveryTask>,
    /// A branch or default-branch lookup was throttled. Processing stopped at
    /// that node and the page must be retried.
    pub rate_limited: bool,
}

pub struct NodeProcessor<'a> {
    session: &'a ProviderSession<'a>,
}

impl<'a> NodeProcessor<'a> {
    pub fn new(session: &'a ProviderSession<'a>) -> Self {
        Self { session }
    }

    /// One scan task per (node, branch), in node order then branch order.
    /// Invalid nodes are skipped; they never abort the page. A throttled
    /// lookup does, see [`ProcessedPage::rate_limited`].
    pub async fn process(
        &self,
        task: &DiscoveryTask,
        nodes: Vec<RepositoryNode>,
    ) -> ProcessedPage {
        let mut processed = ProcessedPage::default();

        for node in nodes {
            if node.is_empty_on_disk() {
                tracing::debug!("Skipping {}/{}: repository is empty", task.org, node.name);
                continue;
            }

            let branches = if task.default_branch_only {
                if matches!(node.branches, Some(ref inline) if inline.names.is_empty()) {
                    tracing::debug!("Skipping {}/{}: no branches", task.org, node.name);
                    continue;
                }
                self.default_branch(task, &node)
                    .await
                    .map(|branch| branch.into_iter().collect())
            } else {
                self.all_branches(task, &node, &mut processed.continuations).await
            };

            let branches: Vec<String> = match branches {
                Ok(branches) => branches,
                Err(RateLimited) => {
                    tracing::warn!("Rate limited while listing {}/{}", task.org, node.name);
                    processed.rate_limited = true;
                    break;
                }
            };

            if branches.is_empty() {
                tracing::debug!("Skipping {}/{}: no branches", task.org, node.name);
                continue;
            }

            processed
                .scan_tasks
                .extend(branches.into_iter().map(|branch| ScanTask {
                    org: task.org.clone(),
                    repo: node.name.clone(),
                    branch,
                    service: task.service,
                    plugins: task.plugins.clone(),
                }));
        }

        processed
    }

    async fn default_branch(
        &self,
        task: &DiscoveryTask,
        node: &RepositoryNode,
    ) -> Result<Option<String>, RateLimited> {
        if let Some(ref branch) = node.default_branch {
            return Ok(Some(branch.clone()));
        }

        let provider = self.session.provider();
        let query = match provider.default_branch_query(&task.org, &node.api_ref) {
            Some(query) => query,
            None => return Ok(None),
        };
        match self.session.fetch(query).await {
            Ok(response) if response.is_success() => Ok(provider.parse_default_branch(&response)),
            Ok(response) => {
                if analyze_error_response(Some(&response)) == Some(ErrorReport::RateLimited) {
                    return Err(RateLimited);
                }
                tracing::warn!(
                    "Default branch lookup for {}/{} failed with {}",
                    task.org,
                    node.name,
                    response.status
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(
                    "Default branch lookup for {}/{} failed: {}",
                    task.org,
                    node.name,
                    e
                );
                Ok(None)
            }
        }
    }

    async fn all_branches(
        &self,
        task: &DiscoveryTask,
        node: &RepositoryNode,
        continuations: &mut Vec<DiscoveryTask>,
    ) -> Result<Vec<String>, RateLimited> {
        let mut branches = match node.branches {
            Some(ref inline) => {
                if let Some(ref next) = inline.next {
                    tracing::debug!("Queueing remaining branches of {}/{}", task.org, node.name);
                    continuations.push(task.for_repo(node.api_ref.clone(), next.clone()));
                }
                inline.names.clone()
            }
            None => {
                BranchResolver::new(self.session)
                    .resolve(&task.org, &node.api_ref)
                    .await?
            }
        };

        // Default branch first when the provider told us which one it is.
        if let Some(ref default) = node.default_branch {
            if let Some(pos) = branches.iter().position(|b| b == default) {
                let branch = branches.remove(pos);
                branches.insert(0, branch);
            }
        }

        Ok(branches)
    }
}
