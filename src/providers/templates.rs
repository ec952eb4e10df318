//! Query templates. Placeholders are `$name` and are substituted verbatim by
//! [`render`]; callers quote values for GraphQL themselves.

pub const GITHUB_REPO_QUERY: &str = r#"
{
    organization(login: $org) {
        repositories(first: 100,
                     after: $cursor,
                     orderBy: {field: NAME, direction: ASC}) {
            nodes {
                name
                defaultBranchRef {
                    name
                }
                isPrivate
                diskUsage
                refs(first: 100, refPrefix: "refs/heads/", direction: ASC) {
                    nodes {
                        name
                    }
                    pageInfo {
                        endCursor
                        hasNextPage
                    }
                }
            }
            pageInfo {
                endCursor
                hasNextPage
            }
        }
    }
}
"#;

pub const GITHUB_REPO_REF_QUERY: &str = r#"
{
    organization(login: $org) {
        repository(name: $repo) {
            refs(first: 100, refPrefix: "refs/heads/", direction: ASC, after: $cursor) {
                nodes {
                    name
                }
                pageInfo {
                    endCursor
                    hasNextPage
                }
            }
        }
    }
}
"#;

pub const GITLAB_PROJECT_QUERY: &str = r#"
{
    group(fullPath: $org) {
        projects(first: 100,
                 after: $cursor,
                 includeSubgroups: true) {
            nodes {
                fullPath
                id
                visibility
                repository {
                    rootRef
                }
            }
            pageInfo {
                endCursor
                hasNextPage
            }
        }
    }
}
"#;

pub const GITLAB_BRANCH_QUERY: &str = "$branch_url/projects/$repo/repository/branches?per_page=100";

pub const BITBUCKET_PUBLIC_ORG_QUERY: &str = "$service_url/repositories/$org";
pub const BITBUCKET_PUBLIC_BRANCH_QUERY: &str = "$service_url/repositories/$org/$repo/refs/branches";

pub const BITBUCKET_PRIVATE_ORG_QUERY: &str = "$service_url/projects/$org/repos";
pub const BITBUCKET_PRIVATE_BRANCH_QUERY: &str = "$service_url/projects/$org/repos/$repo/branches";
pub const BITBUCKET_PRIVATE_DEFAULT_BRANCH_QUERY: &str =
    "$service_url/projects/$org/repos/$repo/branches/default";

/// Substitutes `$name` placeholders. Longer names are replaced first so
/// `$service_url` is never clobbered by a shorter key.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut vars = vars.to_vec();
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("${}", name), value)
    })
}

/// A GraphQL string literal.
pub fn graphql_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
