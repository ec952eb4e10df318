use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{HttpRequest, HttpResponse, HttpTransport};
use crate::config::{DiscoveryConfig, ServiceConfig};
use crate::error::{Error, Result};
use crate::models::Service;

/// Answers requests with canned responses, in order, and records what was sent.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: &str) -> Self {
        self.push(Ok(HttpResponse::new(status, body)))
    }

    pub fn respond_with(self, response: HttpResponse) -> Self {
        self.push(Ok(response))
    }

    pub fn fail(self, message: &str) -> Self {
        self.push(Err(Error::ProviderApi(message.to_string())))
    }

    fn push(self, response: Result<HttpResponse>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn queries(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|r| r.body)
            .filter_map(|b| b["query"].as_str().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::ProviderApi("no scripted response left".to_string())))
    }
}

pub fn discovery_config() -> DiscoveryConfig {
    DiscoveryConfig::new()
        .with_service(
            Service::GitHub,
            ServiceConfig::new("https://api.github.com/graphql")
                .with_api_key(Some("gh-key".to_string())),
        )
        .with_service(
            Service::GitLab,
            ServiceConfig::new("https://gitlab.example.com/api/graphql")
                .with_branch_url("https://gitlab.example.com/api/v4"),
        )
        .with_service(
            Service::BitbucketPublic,
            ServiceConfig::new("https://api.bitbucket.org/2.0"),
        )
        .with_service(
            Service::BitbucketPrivate,
            ServiceConfig::new("https://git.example.com/rest/api/1.0"),
        )
}

pub fn github_repo(
    name: &str,
    disk_usage: u64,
    branches: &[&str],
    refs_cursor: Option<&str>,
) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "defaultBranchRef": branches.first().map(|b| serde_json::json!({ "name": b })),
        "isPrivate": true,
        "diskUsage": disk_usage,
        "refs": {
            "nodes": branches.iter().map(|b| serde_json::json!({ "name": b })).collect::<Vec<_>>(),
            "pageInfo": { "endCursor": refs_cursor, "hasNextPage": refs_cursor.is_some() }
        }
    })
}

pub fn github_page(repos: Vec<serde_json::Value>, end_cursor: Option<&str>) -> String {
    serde_json::json!({
        "data": { "organization": { "repositories": {
            "nodes": repos,
            "pageInfo": { "endCursor": end_cursor, "hasNextPage": end_cursor.is_some() }
        }}}
    })
    .to_string()
}

pub fn github_refs_page(branches: &[&str], end_cursor: Option<&str>) -> String {
    serde_json::json!({
        "data": { "organization": { "repository": { "refs": {
            "nodes": branches.iter().map(|b| serde_json::json!({ "name": b })).collect::<Vec<_>>(),
            "pageInfo": { "endCursor": end_cursor, "hasNextPage": end_cursor.is_some() }
        }}}}
    })
    .to_string()
}

pub fn gitlab_page(projects: &[(&str, &str, Option<&str>)], end_cursor: Option<&str>) -> String {
    let nodes: Vec<_> = projects
        .iter()
        .map(|(full_path, id, root_ref)| {
            serde_json::json!({
                "fullPath": full_path,
                "id": format!("gid://gitlab/Project/{}", id),
                "visibility": "private",
                "repository": root_ref.map(|r| serde_json::json!({ "rootRef": r }))
            })
        })
        .collect();
    serde_json::json!({
        "data": { "group": { "projects": {
            "nodes": nodes,
            "pageInfo": { "endCursor": end_cursor, "hasNextPage": end_cursor.is_some() }
        }}}
    })
    .to_string()
}

pub fn gitlab_branches(names: &[&str]) -> String {
    serde_json::Value::Array(
        names
            .iter()
            .map(|n| serde_json::json!({ "name": n, "merged": false, "protected": false }))
            .collect(),
    )
    .to_string()
}
