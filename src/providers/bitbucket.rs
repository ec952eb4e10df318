use serde::Deserialize;

use super::templates::{
    render, BITBUCKET_PRIVATE_BRANCH_QUERY, BITBUCKET_PRIVATE_DEFAULT_BRANCH_QUERY,
    BITBUCKET_PRIVATE_ORG_QUERY, BITBUCKET_PUBLIC_BRANCH_QUERY, BITBUCKET_PUBLIC_ORG_QUERY,
};
use super::{parse_json, rest_cursor, with_cursor_param, Provider, QuerySpec};
use crate::api::HttpResponse;
use crate::error::Result;
use crate::models::{BranchPage, Cursor, Page, RepositoryNode, Service};

/// Bitbucket Cloud: `page` numbers, `next` links.
pub struct BitbucketCloudProvider {
    url: String,
}

/// Bitbucket Server / Data Center: `start` offsets, `isLastPage` flags.
pub struct BitbucketServerProvider {
    url: String,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct CloudPage<T> {
    #[serde(default)]
    values: Vec<T>,
    page: Option<u64>,
    next: Option<String>,
}

impl<T> CloudPage<T> {
    fn next_cursor(&self) -> Option<Cursor> {
        let next = self.next.as_deref()?;
        let from_link = next
            .split(|c| c == '?' || c == '&')
            .find_map(|param| param.strip_prefix("page="))
            .and_then(|n| n.parse().ok());
        let page = from_link.unwrap_or_else(|| self.page.unwrap_or(1) + 1);
        Some(Cursor::Offset(page))
    }
}

#[derive(Deserialize)]
struct CloudRepository {
    slug: String,
    #[serde(default)]
    is_private: bool,
    size: Option<u64>,
    mainbranch: Option<CloudBranch>,
}

#[derive(Deserialize)]
struct CloudBranch {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
struct ServerPage<T> {
    #[serde(default)]
    values: Vec<T>,
    #[serde(default = "default_last_page")]
    is_last_page: bool,
    next_page_start: Option<u64>,
}

fn default_last_page() -> bool {
    true
}

impl<T> ServerPage<T> {
    fn next_cursor(&self) -> Option<Cursor> {
        if self.is_last_page {
            return None;
        }
        self.next_page_start.map(Cursor::Offset)
    }
}

#[derive(Deserialize)]
struct ServerRepository {
    slug: String,
    #[serde(default)]
    public: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerBranch {
    display_id: String,
}

impl BitbucketCloudProvider {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

impl Provider for BitbucketCloudProvider {
    fn service(&self) -> Service {
        Service::BitbucketPublic
    }

    fn build_query(&self, org: &str, cursor: Option<&Cursor>) -> Result<QuerySpec> {
        let url = render(
            BITBUCKET_PUBLIC_ORG_QUERY,
            &[("service_url", self.url.as_str()), ("org", org)],
        );
        Ok(QuerySpec::Rest {
            url: with_cursor_param(url, "page", rest_cursor(cursor)?),
        })
    }

    fn parse_page(&self, _org: &str, response: &HttpResponse) -> Result<Page> {
        let page: CloudPage<CloudRepository> = parse_json(&response.body)?;
        let next = page.next_cursor();

        let nodes = page
            .values
            .into_iter()
            .map(|repo| RepositoryNode {
                name: repo.slug.clone(),
                api_ref: repo.slug,
                default_branch: repo.mainbranch.map(|b| b.name),
                is_private: repo.is_private,
                size: repo.size,
                branches: None,
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
        let url = render(
            BITBUCKET_PUBLIC_BRANCH_QUERY,
            &[("service_url", self.url.as_str()), ("org", org), ("repo", repo)],
        );
        Ok(QuerySpec::Rest {
            url: with_cursor_param(url, "page", rest_cursor(cursor)?),
        })
    }

    fn parse_branch_page(&self, response: &HttpResponse) -> Result<BranchPage> {
        let page: CloudPage<CloudBranch> = parse_json(&response.body)?;
        let next = page.next_cursor();
        Ok(BranchPage {
            names: page.values.into_iter().map(|b| b.name).collect(),
            next,
        })
    }
}

impl BitbucketServerProvider {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

impl Provider for BitbucketServerProvider {
    fn service(&self) -> Service {
        Service::BitbucketPrivate
    }

    fn build_query(&self, org: &str, cursor: Option<&Cursor>) -> Result<QuerySpec> {
        let url = render(
            BITBUCKET_PRIVATE_ORG_QUERY,
            &[("service_url", self.url.as_str()), ("org", org)],
        );
        Ok(QuerySpec::Rest {
            url: with_cursor_param(url, "start", rest_cursor(cursor)?),
        })
    }

    fn parse_page(&self, _org: &str, response: &HttpResponse) -> Result<Page> {
        let page: ServerPage<ServerRepository> = parse_json(&response.body)?;
        let next = page.next_cursor();

        let nodes = page
            .values
            .into_iter()
            .map(|repo| RepositoryNode {
                name: repo.slug.clone(),
                api_ref: repo.slug,
                default_branch: None,
                is_private: !repo.public,
                size: None,
                branches: None,
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
        let url = render(
            BITBUCKET_PRIVATE_BRANCH_QUERY,
            &[("service_url", self.url.as_str()), ("org", org), ("repo", repo)],
        );
        Ok(QuerySpec::Rest {
            url: with_cursor_param(url, "start", rest_cursor(cursor)?),
        })
    }

    fn parse_branch_page(&self, response: &HttpResponse) -> Result<BranchPage> {
        let page: ServerPage<ServerBranch> = parse_json(&response.body)?;
        let next = page.next_cursor();
        Ok(BranchPage {
            names: page.values.into_iter().map(|b| b.display_id).collect(),
            next,
        })
    }

    fn default_branch_query(&self, org: &str, repo: &str) -> Option<QuerySpec> {
        let url = render(
            BITBUCKET_PRIVATE_DEFAULT_BRANCH_QUERY,
            &[("service_url", self.url.as_str()), ("org", org), ("repo", repo)],
        );
        Some(QuerySpec::Rest { url })
    }

    fn parse_default_branch(&self, response: &HttpResponse) -> Option<String> {
        parse_json::<ServerBranch>(&response.body)
            .ok()
            .map(|b| b.display_id)
    }
}
