//! GitLab REST API (v4) client.

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

const SERVICE: &str = "gitlab";

/// Developer access level; enough to push.
const DEVELOPER_ACCESS: u32 = 30;

pub struct GitLabForge {
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: u64,
    visibility: String,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct User {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Member {
    access_level: u32,
}

#[derive(Debug, Deserialize)]
struct GitLabIssue {
    iid: u64,
    title: String,
    web_url: String,
}

impl From<GitLabIssue> for Issue {
    fn from(issue: GitLabIssue) -> Self {
        Issue {
            id: issue.iid,
            title: issue.title,
            url: issue.web_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedMergeRequest {
    web_url: String,
}

impl GitLabForge {
    pub fn new(instance_url: &str, token: Option<String>) -> Self {
        let api_url = format!("{}/api/v4", instance_url.trim_end_matches('/'));
        let auth = token.map(Auth::PrivateToken).unwrap_or(Auth::None);
        Self {
            http: HttpClient::new(&api_url, auth),
        }
    }

    /// `/projects/<url-encoded full path>`
    fn project_path(namespace: &str, repo: &str) -> String {
        format!(
            "/projects/{}",
            urlencoding::encode(&format!("{namespace}/{repo}"))
        )
    }

    async fn project(&self, namespace: &str, repo: &str) -> Result<Project> {
        self.http
            .get(&Self::project_path(namespace, repo))
            .await
            .map_err(|e| e.into_core(SERVICE))
    }
}

fn gitlab_state(state: CommitState) -> &'static str {
    match state {
        CommitState::Pending => "pending",
        CommitState::Running => "running",
        CommitState::Success => "success",
        CommitState::Failure | CommitState::Error => "failed",
    }
}

#[async_trait]
impl GitForge for GitLabForge {
    async fn get_file_content(
        &self,
        project: &ProjectRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/repository/files/{}/raw?ref={}",
            Self::project_path(&project.namespace, &project.repo),
            urlencoding::encode(path),
            urlencoding::encode(git_ref)
        );
        self.http
            .text_optional(self.http.request_accepting(Method::GET, &url, "*/*"))
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    async fn is_private(&self, project: &ProjectRef) -> Result<bool> {
        let info = self.project(&project.namespace, &project.repo).await?;
        Ok(info.visibility != "public")
    }

    async fn default_branch(&self, project: &ProjectRef) -> Result<String> {
        let info = self.project(&project.namespace, &project.repo).await?;
        Ok(info.default_branch.unwrap_or_else(|| "main".to_string()))
    }

    async fn pr_head_sha(&self, project: &ProjectRef, pr_id: u64) -> Result<String> {
        let mr: MergeRequest = self
            .http
            .get(&format!(
                "{}/merge_requests/{}",
                Self::project_path(&project.namespace, &project.repo),
                pr_id
            ))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(mr.sha)
    }

    async fn set_commit_status(
        &self,
        project: &ProjectRef,
        commit_sha: &str,
        status: &CommitStatus,
    ) -> Result<()> {
        let body = json!({
            "state": gitlab_state(status.state),
            "name": status.context,
            "description": status.description,
            "target_url": status.target_url,
        });
        let _: serde_json::Value = self
            .http
            .post(
                &format!(
                    "{}/statuses/{}",
                    Self::project_path(&project.namespace, &project.repo),
                    commit_sha
                ),
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
        let (kind, iid) = match target {
            CommentTarget::PullRequest(id) => ("merge_requests", id),
            CommentTarget::Issue(id) => ("issues", id),
        };
        let _: serde_json::Value = self
            .http
            .post(
                &format!(
                    "{}/{}/{}/notes",
                    Self::project_path(&project.namespace, &project.repo),
                    kind,
                    iid
                ),
                &json!({ "body": body }),
            )
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(())
    }

    async fn has_write_access(&self, project: &ProjectRef, login: &str) -> Result<bool> {
        let users: Vec<User> = self
            .http
            .get(&format!("/users?username={}", urlencoding::encode(login)))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        let Some(user) = users.first() else {
            return Ok(false);
        };
        let member: Option<Member> = self
            .http
            .get_optional(&format!(
                "{}/members/all/{}",
                Self::project_path(&project.namespace, &project.repo),
                user.id
            ))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(member
            .map(|m| m.access_level >= DEVELOPER_ACCESS)
            .unwrap_or(false))
    }

    async fn find_issue(&self, project: &ProjectRef, title: &str) -> Result<Option<Issue>> {
        let issues: Vec<GitLabIssue> = self
            .http
            .get(&format!(
                "{}/issues?state=opened&in=title&search={}",
                Self::project_path(&project.namespace, &project.repo),
                urlencoding::encode(title)
            ))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(issues
            .into_iter()
            .find(|i| i.title == title)
            .map(Issue::from))
    }

    async fn create_issue(&self, project: &ProjectRef, title: &str, body: &str) -> Result<Issue> {
        let issue: GitLabIssue = self
            .http
            .post(
                &format!(
                    "{}/issues",
                    Self::project_path(&project.namespace, &project.repo)
                ),
                &json!({ "title": title, "description": body }),
            )
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        info!(project = %project, issue = issue.iid, "Created issue");
        Ok(issue.into())
    }

    async fn latest_release(&self, project: &ProjectRef) -> Result<Option<String>> {
        // Releases are sorted newest first.
        let releases: Vec<Release> = self
            .http
            .get(&format!(
                "{}/releases?per_page=1",
                Self::project_path(&project.namespace, &project.repo)
            ))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(releases.into_iter().next().map(|r| r.tag_name))
    }

    async fn create_pull_request(
        &self,
        project: &ProjectRef,
        pr: &NewPullRequest,
    ) -> Result<String> {
        // Merge requests from a fork are opened on the fork, pointing at the target.
        let target = self.project(&project.namespace, &project.repo).await?;
        let source_path = match &pr.fork_namespace {
            Some(fork) => Self::project_path(fork, &project.repo),
            None => Self::project_path(&project.namespace, &project.repo),
        };
        let created: CreatedMergeRequest = self
            .http
            .post(
                &format!("{source_path}/merge_requests"),
                &json!({
                    "title": pr.title,
                    "description": pr.body,
                    "source_branch": pr.source_branch,
                    "target_branch": pr.target_branch,
                    "target_project_id": target.id,
                }),
            )
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(created.web_url)
    }
}
