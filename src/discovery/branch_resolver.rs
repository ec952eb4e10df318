use std::collections::{HashSet, VecDeque};

use super::session::ProviderSession;
use crate::api::{analyze_error_response, ErrorReport};
use crate::models::Cursor;

/// A provider throttled a lookup made on behalf of a page. The page has to be
/// retried as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited;

/// Drains a repository's branch listing page by page.
pub struct BranchResolver<'a> {
    session: &'a ProviderSession<'a>,
}

impl<'a> BranchResolver<'a> {
    pub fn new(session: &'a ProviderSession<'a>) -> Self {
        Self { session }
    }

    /// All branch names of `repo`, in provider order across pages.
    ///
    /// Any failed or unparseable page yields an empty list, which the node
    /// processor treats as an invalid repository. Throttling is the exception:
    /// it is reported as [`RateLimited`] so nothing is lost.
    pub async fn resolve(&self, org: &str, repo: &str) -> Result<Vec<String>, RateLimited> {
        let provider = self.session.provider();
        let mut names = Vec::new();
        let mut pending: VecDeque<Option<Cursor>> = VecDeque::from([None]);
        let mut seen: HashSet<Cursor> = HashSet::new();

        while let Some(cursor) = pending.pop_front() {
            let query = match provider.build_branch_query(org, repo, cursor.as_ref()) {
                Ok(query) => query,
                Err(e) => {
                    tracing::warn!("Cannot build branch query for {}/{}: {}", org, repo, e);
                    return Ok(Vec::new());
                }
            };

            let response = match self.session.fetch(query).await {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    let report = analyze_error_response(Some(&response));
                    if report == Some(ErrorReport::RateLimited) {
                        tracing::warn!("Branch listing for {}/{} was rate limited", org, repo);
                        return Err(RateLimited);
                    }
                    tracing::warn!(
                        "Branch listing for {}/{} failed with {}: {}",
                        org,
                        repo,
                        response.status,
                        report.map(|r| r.to_string()).unwrap_or_default()
                    );
                    return Ok(Vec::new());
                }
                Err(e) => {
                    tracing::warn!("Branch listing for {}/{} failed: {}", org, repo, e);
                    return Ok(Vec::new());
                }
            };

            let page = match provider.parse_branch_page(&response) {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("Unreadable branch page for {}/{}: {}", org, repo, e);
                    return Ok(Vec::new());
                }
            };

            names.extend(page.names);

            if let Some(next) = page.next {
                if seen.insert(next.clone()) {
                    pending.push_back(Some(next));
                } else {
                    tracing::warn!(
                        "Branch cursor {} repeated for {}/{}, stopping",
                        next,
                        org,
                        repo
                    );
                }
            }
        }

        tracing::debug!("Resolved {} branches for {}/{}", names.len(), org, repo);
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HttpResponse;
    use crate::discovery::testing::{gitlab_branches, ScriptedTransport};
    use crate::providers::{BitbucketServerProvider, GitLabProvider};

    fn gitlab() -> GitLabProvider {
        GitLabProvider::new(
            "https://gitlab.example.com/api/graphql".to_string(),
            "https://gitlab.example.com/api/v4".to_string(),
        )
    }

    #[tokio::test]
    async fn test_single_page_issues_one_query() {
        let provider = gitlab();
        let transport = ScriptedTransport::new()
            .respond(200, &gitlab_branches(&["rollback", "master", "production"]))
            .respond(200, &gitlab_branches(&["never-requested"]));
        let session = ProviderSession::new(&provider, &transport, None);

        let mut names = BranchResolver::new(&session).resolve("legacy", "1885").await.unwrap();
        names.sort();

        assert_eq!(names, vec!["master", "production", "rollback"]);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_follows_next_pages_in_order() {
        let provider = gitlab();
        let transport = ScriptedTransport::new()
            .respond_with(
                HttpResponse::new(200, gitlab_branches(&["main", "dev"]))
                    .with_header("X-Next-Page", "2"),
            )
            .respond_with(
                HttpResponse::new(200, gitlab_branches(&["release"]))
                    .with_header("X-Next-Page", ""),
            );
        let session = ProviderSession::new(&provider, &transport, Some("Bearer t".to_string()));

        let names = BranchResolver::new(&session).resolve("legacy", "1885").await.unwrap();

        assert_eq!(names, vec!["main", "dev", "release"]);
        let urls = transport.urls();
        assert_eq!(urls.len(), 2);
        assert!(urls[1].ends_with("&page=2"));
        assert_eq!(transport.requests()[0].authorization.as_deref(), Some("Bearer t"));
    }

    #[tokio::test]
    async fn test_empty_body_resolves_to_nothing() {
        let provider = gitlab();
        let transport = ScriptedTransport::new().respond(200, "");
        let session = ProviderSession::new(&provider, &transport, None);

        assert_eq!(BranchResolver::new(&session).resolve("legacy", "foo").await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_failure_on_later_page_discards_everything() {
        let provider = gitlab();
        let transport = ScriptedTransport::new()
            .respond_with(
                HttpResponse::new(200, gitlab_branches(&["main"])).with_header("X-Next-Page", "2"),
            )
            .respond(500, "upstream timeout");
        let session = ProviderSession::new(&provider, &transport, None);

        assert_eq!(BranchResolver::new(&session).resolve("legacy", "1885").await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_throttled_listing_is_reported() {
        let provider = gitlab();
        let abuse = r#"{"message": "You have triggered an abuse detection mechanism. Please wait a few minutes before you try again."}"#;
        let transport = ScriptedTransport::new()
            .respond_with(
                HttpResponse::new(200, gitlab_branches(&["main"])).with_header("X-Next-Page", "2"),
            )
            .respond(403, abuse);
        let session = ProviderSession::new(&provider, &transport, None);

        assert_eq!(
            BranchResolver::new(&session).resolve("legacy", "1885").await,
            Err(RateLimited)
        );
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_cursor_stops_pagination() {
        let provider =
            BitbucketServerProvider::new("https://git.example.com/rest/api/1.0".to_string());
        let looping =
            r#"{"isLastPage": false, "nextPageStart": 25, "values": [{"displayId": "main"}]}"#;
        let transport = ScriptedTransport::new()
            .respond(200, looping)
            .respond(200, looping)
            .respond(200, looping);
        let session = ProviderSession::new(&provider, &transport, None);

        let names = BranchResolver::new(&session).resolve("PRJ", "athena").await.unwrap();

        assert_eq!(names, vec!["main", "main"]);
        assert_eq!(transport.requests().len(), 2);
    }
}
