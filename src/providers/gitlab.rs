use serde::Deserialize;

use super::templates::{graphql_string, render, GITLAB_BRANCH_QUERY, GITLAB_PROJECT_QUERY};
use super::{graphql_cursor, parse_json, rest_cursor, with_cursor_param, Provider, QuerySpec};
use crate::api::HttpResponse;
use crate::error::{Error, Result};
use crate::models::{BranchPage, Cursor, Page, RepositoryNode, Service};

/// GitLab: projects come from GraphQL, branches from the REST API, one
/// repository at a time.
pub struct GitLabProvider {
    url: String,
    branch_url: String,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<GroupData>,
}

#[derive(Deserialize)]
struct GroupData {
    group: Option<Group>,
}

#[derive(Deserialize)]
struct Group {
    projects: Projects,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Projects {
    #[serde(default)]
    nodes: Vec<Option<ProjectNode>>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectNode {
    full_path: String,
    id: String,
    visibility: Option<String>,
    repository: Option<ProjectRepository>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRepository {
    root_ref: Option<String>,
}

#[derive(Deserialize)]
struct Branch {
    name: String,
}

impl GitLabProvider {
    pub fn new(url: String, branch_url: String) -> Self {
        Self { url, branch_url }
    }
}

/// `legacy/entertainment/mts` -> `entertainment/mts`.
pub fn strip_group(full_path: &str) -> &str {
    full_path
        .split_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or(full_path)
}

/// `gid://gitlab/Project/1885` -> `1885`.
pub fn project_id(gid: &str) -> &str {
    gid.rsplit('/').next().unwrap_or(gid)
}

impl Provider for GitLabProvider {
    fn service(&self) -> Service {
        Service::GitLab
    }

    fn build_query(&self, org: &str, cursor: Option<&Cursor>) -> Result<QuerySpec> {
        let org = graphql_string(org);
        let cursor = graphql_cursor(cursor);
        let query = render(
            GITLAB_PROJECT_QUERY,
            &[("org", org.as_str()), ("cursor", cursor.as_str())],
        );
        Ok(QuerySpec::GraphQl {
            url: self.url.clone(),
            query,
        })
    }

    fn parse_page(&self, _org: &str, response: &HttpResponse) -> Result<Page> {
        let parsed: GraphQlResponse = parse_json(&response.body)?;
        let projects = parsed
            .data
            .and_then(|d| d.group)
            .map(|g| g.projects)
            .ok_or_else(|| Error::ParseError("response has no group".to_string()))?;

        let next = match projects.page_info.end_cursor {
            Some(cursor) if projects.page_info.has_next_page && !cursor.is_empty() => {
                Some(Cursor::Token(cursor))
            }
            _ => None,
        };

        let nodes = projects
            .nodes
            .into_iter()
            .flatten()
            .map(|project| {
                let default_branch = project.repository.and_then(|r| r.root_ref);
                RepositoryNode {
                    name: strip_group(&project.full_path).to_string(),
                    api_ref: project_id(&project.id).to_string(),
                    // No root ref means an empty repository; nothing to resolve.
                    branches: if default_branch.is_none() {
                        Some(BranchPage::default())
                    } else {
                        None
                    },
                    default_branch,
                    is_private: project.visibility.as_deref() != Some("public"),
                    size: None,
                }
            })
            .collect();

        Ok(Page { nodes, next })
    }

    fn build_branch_query(
        &self,
        _org: &str,
        repo: &str,
        cursor: Option<&Cursor>,
    ) -> Result<QuerySpec> {
        let url = render(
            GITLAB_BRANCH_QUERY,
            &[("branch_url", self.branch_url.as_str()), ("repo", repo)],
        );
        Ok(QuerySpec::Rest {
            url: with_cursor_param(url, "page", rest_cursor(cursor)?),
        })
    }

    fn parse_branch_page(&self, response: &HttpResponse) -> Result<BranchPage> {
        let branches: Vec<Branch> = parse_json(&response.body)?;
        let next = response
            .header("x-next-page")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Cursor::Offset);

        Ok(BranchPage {
            names: branches.into_iter().map(|b| b.name).collect(),
            next,
        })
    }
}
