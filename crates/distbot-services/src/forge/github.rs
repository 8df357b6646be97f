//! GitHub REST API client.

use async_trait::async_trait;
use distbot_core::{
    CommentTarget, CommitState, CommitStatus, GitForge, Issue, NewPullRequest, ProjectRef,
    Result,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::http::{Auth, HttpClient};

const SERVICE: &str = "github";

pub struct GitHubForge {
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct Repository {
    private: bool,
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    head: PullRequestHead,
}

#[derive(Debug, Deserialize)]
struct PullRequestHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Permission {
    permission: String,
}

#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    html_url: String,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<GitHubIssue> for Issue {
    fn from(issue: GitHubIssue) -> Self {
        Issue {
            id: issue.number,
            title: issue.title,
            url: issue.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPullRequest {
    html_url: String,
}

impl GitHubForge {
    /// `instance_url` is the web URL; github.com maps to api.github.com,
    /// anything else is treated as GitHub Enterprise.
    pub fn new(instance_url: &str, token: Option<String>) -> Self {
        let instance_url = instance_url.trim_end_matches('/');
        let api_url = if instance_url.ends_with("://github.com") {
            "https://api.github.com".to_string()
        } else {
            format!("{instance_url}/api/v3")
        };
        let auth = token.map(Auth::Bearer).unwrap_or(Auth::None);
        Self {
            http: HttpClient::new(&api_url, auth).with_accept("application/vnd.github+json"),
        }
    }

    fn repo_path(project: &ProjectRef) -> String {
        format!("/repos/{}/{}", project.namespace, project.repo)
    }

    async fn repository(&self, project: &ProjectRef) -> Result<Repository> {
        self.http
            .get(&Self::repo_path(project))
            .await
            .map_err(|e| e.into_core(SERVICE))
    }
}

fn github_state(state: CommitState) -> &'static str {
    match state {
        CommitState::Pending | CommitState::Running => "pending",
        CommitState::Success => "success",
        CommitState::Failure => "failure",
        CommitState::Error => "error",
    }
}

#[async_trait]
impl GitForge for GitHubForge {
    async fn get_file_content(
        &self,
        project: &ProjectRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/contents/{}?ref={}",
            Self::repo_path(project),
            path,
            urlencoding::encode(git_ref)
        );
        let request = self
            .http
            .request_accepting(Method::GET, &url, "application/vnd.github.raw");
        self.http
            .text_optional(request)
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    async fn is_private(&self, project: &ProjectRef) -> Result<bool> {
        Ok(self.repository(project).await?.private)
    }

    async fn default_branch(&self, project: &ProjectRef) -> Result<String> {
        Ok(self.repository(project).await?.default_branch)
    }

    async fn pr_head_sha(&self, project: &ProjectRef, pr_id: u64) -> Result<String> {
        let pr: PullRequest = self
            .http
            .get(&format!("{}/pulls/{}", Self::repo_path(project), pr_id))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(pr.head.sha)
    }

    async fn set_commit_status(
        &self,
        project: &ProjectRef,
        commit_sha: &str,
        status: &CommitStatus,
    ) -> Result<()> {
        let body = json!({
            "state": github_state(status.state),
            "context": status.context,
            "description": status.description,
            "target_url": status.target_url,
        });
        let _: serde_json::Value = self
            .http
            .post(
                &format!("{}/statuses/{}", Self::repo_path(project), commit_sha),
                &body,
            )
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(())
    }

    async fn comment(
        &self,
        project: &ProjectRef,
        target: CommentTarget,
        body: &str,
    ) -> Result<()> {
        // Pull requests share the issue comment endpoint.
        let number = match target {
            CommentTarget::PullRequest(id) | CommentTarget::Issue(id) => id,
        };
        let _: serde_json::Value = self
            .http
            .post(
                &format!("{}/issues/{}/comments", Self::repo_path(project), number),
                &json!({ "body": body }),
            )
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(())
    }

    async fn has_write_access(&self, project: &ProjectRef, login: &str) -> Result<bool> {
        let permission: Option<Permission> = self
            .http
            .get_optional(&format!(
                "{}/collaborators/{}/permission",
                Self::repo_path(project),
                login
            ))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(permission
            .map(|p| matches!(p.permission.as_str(), "admin" | "maintain" | "write"))
            .unwrap_or(false))
    }

    async fn find_issue(&self, project: &ProjectRef, title: &str) -> Result<Option<Issue>> {
        let issues: Vec<GitHubIssue> = self
            .http
            .get(&format!(
                "{}/issues?state=open&per_page=100",
                Self::repo_path(project)
            ))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .find(|i| i.title == title)
            .map(Issue::from))
    }

    async fn create_issue(&self, project: &ProjectRef, title: &str, body: &str) -> Result<Issue> {
        let issue: GitHubIssue = self
            .http
            .post(
                &format!("{}/issues", Self::repo_path(project)),
                &json!({ "title": title, "body": body }),
            )
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        info!(project = %project, issue = issue.number, "Created issue");
        Ok(issue.into())
    }

    async fn latest_release(&self, project: &ProjectRef) -> Result<Option<String>> {
        let release: Option<Release> = self
            .http
            .get_optional(&format!("{}/releases/latest", Self::repo_path(project)))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(release.map(|r| r.tag_name))
    }

    async fn create_pull_request(
        &self,
        project: &ProjectRef,
        pr: &NewPullRequest,
    ) -> Result<String> {
        let head = match &pr.fork_namespace {
            Some(fork) => format!("{}:{}", fork, pr.source_branch),
            None => pr.source_branch.clone(),
        };
        let created: CreatedPullRequest = self
            .http
            .post(
                &format!("{}/pulls", Self::repo_path(project)),
                &json!({
                    "title": pr.title,
                    "body": pr.body,
                    "head": head,
                    "base": pr.target_branch,
                }),
            )
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(created.html_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let public = GitHubForge::new("https://github.com/", None);
        assert_eq!(public.http.base_url(), "https://api.github.com");

        let enterprise = GitHubForge::new("https://github.example.com", Some("t".into()));
        assert_eq!(enterprise.http.base_url(), "https://github.example.com/api/v3");
    }

    #[test]
    fn test_running_maps_to_pending() {
        assert_eq!(github_state(CommitState::Running), "pending");
        assert_eq!(github_state(CommitState::Error), "error");
    }
}
