//! Pagure API client, used for Fedora dist-git.

use async_trait::async_trait;
use distbot_core::{
    CommentTarget, CommitState, CommitStatus, GitForge, Issue, NewPullRequest, ProjectRef,
    Result,
};
use reqwest::Method;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

use crate::http::{Auth, HttpClient};

const SERVICE: &str = "pagure";

/// Username flags are set under.
const FLAG_USERNAME: &str = "distbot";

pub struct PagureForge {
    instance_url: String,
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct PagureProject {
    #[serde(default)]
    private: bool,
    #[serde(default)]
    access_users: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Branches {
    branches: Vec<String>,
    #[serde(default)]
    default: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PagurePullRequest {
    id: u64,
    #[serde(default)]
    commit_stop: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PagureIssue {
    id: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct Issues {
    issues: Vec<PagureIssue>,
}

#[derive(Debug, Deserialize)]
struct Tags {
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NewIssue {
    issue: PagureIssue,
}

impl PagureForge {
    pub fn new(instance_url: &str, token: Option<String>) -> Self {
        let instance_url = instance_url.trim_end_matches('/').to_string();
        let auth = token
            .map(|t| Auth::Header(format!("token {t}")))
            .unwrap_or(Auth::None);
        Self {
            http: HttpClient::new(&format!("{instance_url}/api/0"), auth),
            instance_url,
        }
    }

    fn api_path(project: &ProjectRef) -> String {
        format!("/{}/{}", project.namespace, project.repo)
    }

    fn issue_url(&self, project: &ProjectRef, id: u64) -> String {
        format!(
            "{}/{}/{}/issue/{}",
            self.instance_url, project.namespace, project.repo, id
        )
    }

    async fn project_info(&self, project: &ProjectRef) -> Result<PagureProject> {
        self.http
            .get(&Self::api_path(project))
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T> {
        self.http
            .send(self.http.request(Method::POST, path).form(form))
            .await
            .map_err(|e| e.into_core(SERVICE))
    }
}

fn pagure_state(state: CommitState) -> &'static str {
    match state {
        CommitState::Pending | CommitState::Running => "pending",
        CommitState::Success => "success",
        CommitState::Failure => "failure",
        CommitState::Error => "error",
    }
}

/// Flag uid; Pagure limits it to 32 characters, so the context is hashed.
fn flag_uid(context: &str) -> String {
    format!("{:x}", md5::compute(context.as_bytes()))
}

/// Dist-git repositories default to `rawhide`.
fn pick_default_branch(branches: Branches) -> String {
    if let Some(default) = branches.default {
        return default;
    }
    ["rawhide", "main", "master"]
        .into_iter()
        .find(|b| branches.branches.iter().any(|x| x == b))
        .unwrap_or("rawhide")
        .to_string()
}

#[async_trait]
impl GitForge for PagureForge {
    async fn get_file_content(
        &self,
        project: &ProjectRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/{}/{}/raw/{}/f/{}",
            self.instance_url, project.namespace, project.repo, git_ref, path
        );
        self.http
            .text_optional(self.http.request_accepting(Method::GET, &url, "*/*"))
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    async fn is_private(&self, project: &ProjectRef) -> Result<bool> {
        Ok(self.project_info(project).await?.private)
    }

    async fn default_branch(&self, project: &ProjectRef) -> Result<String> {
        let branches: Branches = self
            .http
            .get(&format!("{}/git/branches", Self::api_path(project)))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(pick_default_branch(branches))
    }

    async fn pr_head_sha(&self, project: &ProjectRef, pr_id: u64) -> Result<String> {
        let pr: PagurePullRequest = self
            .http
            .get(&format!("{}/pull-request/{}", Self::api_path(project), pr_id))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        pr.commit_stop.ok_or_else(|| {
            distbot_core::Error::service(SERVICE, format!("pull request {pr_id} has no commits"))
        })
    }

    async fn set_commit_status(
        &self,
        project: &ProjectRef,
        commit_sha: &str,
        status: &CommitStatus,
    ) -> Result<()> {
        let uid = flag_uid(&status.context);
        // Pagure requires a URL on every flag.
        let url = status
            .target_url
            .clone()
            .unwrap_or_else(|| project.project_url());
        let _: serde_json::Value = self
            .post_form(
                &format!("{}/c/{}/flag", Self::api_path(project), commit_sha),
                &[
                    ("username", FLAG_USERNAME),
                    ("status", pagure_state(status.state)),
                    ("comment", status.description.as_str()),
                    ("url", url.as_str()),
                    ("uid", uid.as_str()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn comment(
        &self,
        project: &ProjectRef,
        target: CommentTarget,
        body: &str,
    ) -> Result<()> {
        let path = match target {
            CommentTarget::PullRequest(id) => {
                format!("{}/pull-request/{}/comment", Self::api_path(project), id)
            }
            CommentTarget::Issue(id) => {
                format!("{}/issue/{}/comment", Self::api_path(project), id)
            }
        };
        let _: serde_json::Value = self.post_form(&path, &[("comment", body)]).await?;
        Ok(())
    }

    async fn has_write_access(&self, project: &ProjectRef, login: &str) -> Result<bool> {
        let info = self.project_info(project).await?;
        Ok(["owner", "admin", "commit", "collaborator"]
            .iter()
            .filter_map(|level| info.access_users.get(*level))
            .any(|users| users.iter().any(|u| u == login)))
    }

    async fn find_issue(&self, project: &ProjectRef, title: &str) -> Result<Option<Issue>> {
        let issues: Issues = self
            .http
            .get(&format!("{}/issues?status=Open", Self::api_path(project)))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(issues
            .issues
            .into_iter()
            .find(|i| i.title == title)
            .map(|i| Issue {
                url: self.issue_url(project, i.id),
                id: i.id,
                title: i.title,
            }))
    }

    async fn create_issue(&self, project: &ProjectRef, title: &str, body: &str) -> Result<Issue> {
        let created: NewIssue = self
            .post_form(
                &format!("{}/new_issue", Self::api_path(project)),
                &[("title", title), ("issue_content", body)],
            )
            .await?;
        info!(project = %project, issue = created.issue.id, "Created issue");
        Ok(Issue {
            url: self.issue_url(project, created.issue.id),
            id: created.issue.id,
            title: created.issue.title,
        })
    }

    async fn latest_release(&self, project: &ProjectRef) -> Result<Option<String>> {
        // Pagure has no releases; the last listed tag stands in.
        let tags: Tags = self
            .http
            .get(&format!("{}/git/tags", Self::api_path(project)))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(tags.tags.into_iter().last())
    }

    async fn create_pull_request(
        &self,
        project: &ProjectRef,
        pr: &NewPullRequest,
    ) -> Result<String> {
        let mut form = vec![
            ("title", pr.title.as_str()),
            ("initial_comment", pr.body.as_str()),
            ("branch_to", pr.target_branch.as_str()),
            ("branch_from", pr.source_branch.as_str()),
        ];
        if let Some(fork) = &pr.fork_namespace {
            form.push(("repo_from", project.repo.as_str()));
            form.push(("repo_from_namespace", project.namespace.as_str()));
            form.push(("repo_from_username", fork.as_str()));
        }
        let created: PagurePullRequest = self
            .post_form(
                &format!("{}/pull-request/new", Self::api_path(project)),
                &form,
            )
            .await?;
        Ok(format!(
            "{}/{}/{}/pull-request/{}",
            self.instance_url, project.namespace, project.repo, created.id
        ))
    }
}
