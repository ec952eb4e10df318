use serde::Deserialize;

use super::templates::{graphql_string, render, GITHUB_REPO_QUERY, GITHUB_REPO_REF_QUERY};
use super::{graphql_cursor, parse_json, Provider, QuerySpec};
use crate::api::HttpResponse;
use crate::error::{Error, Result};
use crate::models::{BranchPage, Cursor, Page, RepositoryNode, Service};

/// GitHub GraphQL. The first page of branch refs arrives inline with each
/// repository; the rest is fetched by per-repository continuation tasks.
pub struct GitHubProvider {
    url: String,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct OrgData {
    organization: Option<Organization>,
}

#[derive(Deserialize)]
struct Organization {
    repositories: Option<Connection<RepoNode>>,
    repository: Option<RefsHolder>,
}

#[derive(Deserialize)]
struct RefsHolder {
    refs: Option<Connection<NamedRef>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
struct Connection<T> {
    #[serde(default)]
    nodes: Vec<Option<T>>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    #[serde(default)]
    has_next_page: bool,
}

impl PageInfo {
    fn next(&self) -> Option<Cursor> {
        match self.end_cursor {
            Some(ref cursor) if self.has_next_page && !cursor.is_empty() => {
                Some(Cursor::Token(cursor.clone()))
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    name: String,
    default_branch_ref: Option<NamedRef>,
    #[serde(default)]
    is_private: bool,
    disk_usage: Option<u64>,
    refs: Option<Connection<NamedRef>>,
}

#[derive(Deserialize)]
struct NamedRef {
    name: String,
}

impl<T> Connection<T> {
    fn into_parts(self) -> (Vec<T>, Option<Cursor>) {
        let next = self.page_info.next();
        (self.nodes.into_iter().flatten().collect(), next)
    }
}

fn branch_page(refs: Connection<NamedRef>) -> BranchPage {
    let (refs, next) = refs.into_parts();
    BranchPage {
        names: refs.into_iter().map(|r| r.name).collect(),
        next,
    }
}

impl GitHubProvider {
    pub fn new(url: String) -> Self {
        Self { url }
    }

    fn organization(&self, response: &HttpResponse) -> Result<Organization> {
        let parsed: GraphQlResponse<OrgData> = parse_json(&response.body)?;
        parsed
            .data
            .and_then(|d| d.organization)
            .ok_or_else(|| Error::ParseError("response has no organization".to_string()))
    }
}

impl Provider for GitHubProvider {
    fn service(&self) -> Service {
        Service::GitHub
    }

    fn build_query(&self, org: &str, cursor: Option<&Cursor>) -> Result<QuerySpec> {
        let org = graphql_string(org);
        let cursor = graphql_cursor(cursor);
        let query = render(
            GITHUB_REPO_QUERY,
            &[("org", org.as_str()), ("cursor", cursor.as_str())],
        );
        Ok(QuerySpec::GraphQl {
            url: self.url.clone(),
            query,
        })
    }

    fn parse_page(&self, _org: &str, response: &HttpResponse) -> Result<Page> {
        let repositories = self
            .organization(response)?
            .repositories
            .ok_or_else(|| Error::ParseError("response has no repositories".to_string()))?;
        let (repos, next) = repositories.into_parts();

        let nodes = repos
            .into_iter()
            .map(|repo| RepositoryNode {
                api_ref: repo.name.clone(),
                name: repo.name,
                default_branch: repo.default_branch_ref.map(|r| r.name),
                is_private: repo.is_private,
                size: repo.disk_usage,
                branches: Some(repo.refs.map(branch_page).unwrap_or_default()),
            })
            .collect();

        Ok(Page { nodes, next })
    }

    fn build_branch_query(
        &self,
        org: &str,
        repo: &str,
        cursor: Option<&Cursor>,
    ) -> Result<QuerySpec> {
        let org = graphql_string(org);
        let repo = graphql_string(repo);
        let cursor = graphql_cursor(cursor);
        let query = render(
            GITHUB_REPO_REF_QUERY,
            &[("org", org.as_str()), ("repo", repo.as_str()), ("cursor", cursor.as_str())],
        );
        Ok(QuerySpec::GraphQl {
            url: self.url.clone(),
            query,
        })
    }

    fn parse_branch_page(&self, response: &HttpResponse) -> Result<BranchPage> {
        self.organization(response)?
            .repository
            .and_then(|r| r.refs)
            .map(branch_page)
            .ok_or_else(|| Error::ParseError("response has no repository refs".to_string()))
    }
}
