//! Classification of inbound payloads into typed events.
//!
//! Every `parse_*` method returns `None` for payloads distbot does not
//! act on; that is not an error.

use distbot_config::ServiceConfig;
use distbot_config::aliases::branch_for_koji_target;
use distbot_core::event::{
    CommentEvent, CoprBuildEvent, CoprBuildTopic, DistGitPushEvent, InstallationEvent,
    KojiBuildEvent, KojiTaskEvent, PullRequestAction, PullRequestEvent, PushEvent, ReleaseEvent,
    TestingFarmResultsEvent, UpstreamReleaseEvent,
};
use distbot_core::status::{KojiBuildState, KojiTaskState};
use distbot_core::{Event, ProjectRef};
use serde_json::Value;
use tracing::debug;

const DEFAULT_DIST_GIT_URL: &str = "https://src.fedoraproject.org";
const GITLAB_NULL_SHA: &str = "0000000000000000000000000000000000000000";

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer)?.as_str()
}

fn u64_at(value: &Value, pointer: &str) -> Option<u64> {
    value.pointer(pointer)?.as_u64()
}

fn project_at(value: &Value, pointer: &str) -> Option<ProjectRef> {
    let url = str_at(value, pointer)?;
    match ProjectRef::from_url(url) {
        Ok(project) => Some(project),
        Err(e) => {
            debug!(url, error = %e, "Ignoring payload with unparsable project url");
            None
        }
    }
}

/// Turns webhook and message-bus payloads into `Event`s.
#[derive(Debug, Clone)]
pub struct Parser {
    dist_git_url: String,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            dist_git_url: DEFAULT_DIST_GIT_URL.to_string(),
        }
    }
}

impl Parser {
    pub fn new(config: &ServiceConfig) -> Self {
        let dist_git_url = config
            .forge_of_kind(distbot_core::ForgeKind::Pagure)
            .map(|f| f.instance_url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_DIST_GIT_URL.to_string());
        Self { dist_git_url }
    }

    /// Parse a GitHub webhook given its `X-GitHub-Event` header.
    pub fn parse_github(&self, event_type: &str, payload: &Value) -> Option<Event> {
        let action = str_at(payload, "/action");
        match (event_type, action) {
            ("pull_request", Some(action)) => {
                let action = match action {
                    "opened" => PullRequestAction::Opened,
                    "reopened" => PullRequestAction::Reopened,
                    "synchronize" => PullRequestAction::Synchronize,
                    _ => return None,
                };
                let pr = payload.get("pull_request")?;
                Some(Event::PullRequest(PullRequestEvent {
                    action,
                    project: project_at(pr, "/base/repo/html_url")?,
                    source_project: project_at(pr, "/head/repo/html_url"),
                    pr_id: u64_at(pr, "/number")?,
                    target_branch: str_at(pr, "/base/ref")?.to_string(),
                    commit_sha: str_at(pr, "/head/sha")?.to_string(),
                    actor: str_at(payload, "/sender/login")?.to_string(),
                }))
            }
            ("issue_comment", Some("created")) => {
                let comment = CommentEvent {
                    project: project_at(payload, "/repository/html_url")?,
                    number: u64_at(payload, "/issue/number")?,
                    comment_id: u64_at(payload, "/comment/id")?,
                    comment: str_at(payload, "/comment/body")?.to_string(),
                    actor: str_at(payload, "/comment/user/login")
                        .or_else(|| str_at(payload, "/sender/login"))?
                        .to_string(),
                    commit_sha: None,
                    target_branch: None,
                };
                if payload.pointer("/issue/pull_request").is_some() {
                    Some(Event::PullRequestComment(comment))
                } else {
                    Some(Event::IssueComment(comment))
                }
            }
            ("push", _) => {
                if payload.get("deleted").and_then(Value::as_bool) == Some(true) {
                    return None;
                }
                let branch = str_at(payload, "/ref")?.strip_prefix("refs/heads/")?;
                Some(Event::Push(PushEvent {
                    project: project_at(payload, "/repository/html_url")?,
                    branch: branch.to_string(),
                    commit_sha: str_at(payload, "/after")?.to_string(),
                    actor: str_at(payload, "/pusher/name")
                        .or_else(|| str_at(payload, "/sender/login"))?
                        .to_string(),
                    default_branch: str_at(payload, "/repository/default_branch")
                        .map(String::from),
                }))
            }
            ("release", Some("published")) => Some(Event::Release(ReleaseEvent {
                project: project_at(payload, "/repository/html_url")?,
                tag_name: str_at(payload, "/release/tag_name")?.to_string(),
                commit_sha: None,
                actor: str_at(payload, "/sender/login")?.to_string(),
            })),
            ("installation", Some("created")) => Some(Event::Installation(InstallationEvent {
                installation_id: u64_at(payload, "/installation/id")?,
                host: "github.com".to_string(),
                account_login: str_at(payload, "/installation/account/login")?.to_string(),
                account_type: str_at(payload, "/installation/account/type")
                    .unwrap_or("User")
                    .to_string(),
                sender_login: str_at(payload, "/sender/login")?.to_string(),
            })),
            _ => {
                debug!(event = event_type, action, "Ignoring GitHub event");
                None
            }
        }
    }

    /// Parse a GitLab webhook given its `X-Gitlab-Event` header.
    pub fn parse_gitlab(&self, event_type: &str, payload: &Value) -> Option<Event> {
        match event_type {
            "Merge Request Hook" => {
                let attrs = payload.get("object_attributes")?;
                let action = match str_at(attrs, "/action")? {
                    "open" => PullRequestAction::Opened,
                    "reopen" => PullRequestAction::Reopened,
                    // Updates without `oldrev` change the description or labels only.
                    "update" if attrs.get("oldrev").is_some() => PullRequestAction::Synchronize,
                    _ => return None,
                };
                Some(Event::PullRequest(PullRequestEvent {
                    action,
                    project: project_at(attrs, "/target/web_url")
                        .or_else(|| project_at(payload, "/project/web_url"))?,
                    source_project: project_at(attrs, "/source/web_url"),
                    pr_id: u64_at(attrs, "/iid")?,
                    target_branch: str_at(attrs, "/target_branch")?.to_string(),
                    commit_sha: str_at(attrs, "/last_commit/id")?.to_string(),
                    actor: str_at(payload, "/user/username")?.to_string(),
                }))
            }
            "Push Hook" => {
                let sha = str_at(payload, "/checkout_sha")
                    .or_else(|| str_at(payload, "/after"))?;
                if sha == GITLAB_NULL_SHA {
                    return None;
                }
                let branch = str_at(payload, "/ref")?.strip_prefix("refs/heads/")?;
                Some(Event::Push(PushEvent {
                    project: project_at(payload, "/project/web_url")?,
                    branch: branch.to_string(),
                    commit_sha: sha.to_string(),
                    actor: str_at(payload, "/user_username")?.to_string(),
                    default_branch: str_at(payload, "/project/default_branch").map(String::from),
                }))
            }
            "Note Hook" => {
                let attrs = payload.get("object_attributes")?;
                let project = project_at(payload, "/project/web_url")?;
                let comment_id = u64_at(attrs, "/id")?;
                let comment = str_at(attrs, "/note")?.to_string();
                let actor = str_at(payload, "/user/username")?.to_string();
                match str_at(attrs, "/noteable_type")? {
                    "MergeRequest" => Some(Event::PullRequestComment(CommentEvent {
                        project,
                        number: u64_at(payload, "/merge_request/iid")?,
                        comment_id,
                        comment,
                        actor,
                        commit_sha: str_at(payload, "/merge_request/last_commit/id")
                            .map(String::from),
                        target_branch: str_at(payload, "/merge_request/target_branch")
                            .map(String::from),
                    })),
                    "Issue" => Some(Event::IssueComment(CommentEvent {
                        project,
                        number: u64_at(payload, "/issue/iid")?,
                        comment_id,
                        comment,
                        actor,
                        commit_sha: None,
                        target_branch: None,
                    })),
                    _ => None,
                }
            }
            "Tag Push Hook" => {
                // A deleted tag carries no checkout sha.
                let sha = str_at(payload, "/checkout_sha")?;
                let tag = str_at(payload, "/ref")?.strip_prefix("refs/tags/")?;
                Some(Event::Release(ReleaseEvent {
                    project: project_at(payload, "/project/web_url")?,
                    tag_name: tag.to_string(),
                    commit_sha: Some(sha.to_string()),
                    actor: str_at(payload, "/user_username")?.to_string(),
                }))
            }
            _ => {
                debug!(event = event_type, "Ignoring GitLab event");
                None
            }
        }
    }

    /// Parse a Fedora messaging message. Topics are matched by suffix so
    /// both `org.fedoraproject.prod.*` and `stg` deployments work.
    pub fn parse_fedora_messaging(&self, topic: &str, body: &Value) -> Option<Event> {
        if topic.ends_with("copr.build.start") {
            self.parse_copr(CoprBuildTopic::Started, body)
        } else if topic.ends_with("copr.build.end") {
            self.parse_copr(CoprBuildTopic::Finished, body)
        } else if topic.ends_with("buildsys.build.state.change") {
            self.parse_koji_build(body)
        } else if topic.ends_with("buildsys.task.state.change") {
            self.parse_koji_task(body)
        } else if topic.ends_with("git.receive") {
            self.parse_dist_git_push(body)
        } else if topic.ends_with("anitya.project.version.update") {
            self.parse_upstream_release(body)
        } else {
            debug!(topic, "Ignoring message");
            None
        }
    }

    /// Parse a Testing Farm notification.
    pub fn parse_testing_farm(&self, payload: &Value) -> Option<Event> {
        let request_id = str_at(payload, "/request_id")?;
        Some(Event::TestingFarmResults(TestingFarmResultsEvent {
            pipeline_id: request_id.to_string(),
        }))
    }

    fn parse_copr(&self, topic: CoprBuildTopic, body: &Value) -> Option<Event> {
        Some(Event::CoprBuild(CoprBuildEvent {
            topic,
            build_id: u64_at(body, "/build")?,
            chroot: str_at(body, "/chroot")?.to_string(),
            status: body.get("status").and_then(Value::as_i64).unwrap_or(-1),
            owner: str_at(body, "/owner")?.to_string(),
            project_name: str_at(body, "/copr")?.to_string(),
            pkg: str_at(body, "/pkg").map(String::from),
            version: str_at(body, "/version").map(String::from),
            timestamp: body.get("timestamp").and_then(Value::as_f64),
        }))
    }

    fn parse_koji_build(&self, body: &Value) -> Option<Event> {
        let state = KojiBuildState::from_code(body.get("new")?.as_i64()?)?;
        let old_state = body
            .get("old")
            .and_then(Value::as_i64)
            .and_then(KojiBuildState::from_code);

        // `git+https://src.fedoraproject.org/rpms/python-ogr.git#ad0c308a...`
        let source = str_at(body, "/request/0")?;
        let (url, commit_sha) = source.trim_start_matches("git+").split_once('#')?;
        let target = str_at(body, "/request/1")?;
        let project = ProjectRef::from_url(url).ok()?;

        Some(Event::KojiBuild(KojiBuildEvent {
            build_id: u64_at(body, "/build_id")?,
            task_id: u64_at(body, "/task_id"),
            state,
            old_state,
            package_name: str_at(body, "/name")?.to_string(),
            version: str_at(body, "/version")?.to_string(),
            release: str_at(body, "/release")?.to_string(),
            epoch: body.get("epoch").and_then(|e| match e {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            branch_name: branch_for_koji_target(target).to_string(),
            commit_sha: commit_sha.to_string(),
            project,
            owner: str_at(body, "/owner").unwrap_or_default().to_string(),
        }))
    }

    fn parse_koji_task(&self, body: &Value) -> Option<Event> {
        let state: KojiTaskState = str_at(body, "/new")?.parse().ok()?;
        let old_state = str_at(body, "/old").and_then(|s| s.parse().ok());
        // The RPM itself is built by the `buildArch` child task.
        let rpm_build_task_id = body
            .pointer("/info/children")
            .and_then(Value::as_array)
            .and_then(|children| {
                children
                    .iter()
                    .find(|c| str_at(c, "/method") == Some("buildArch"))
            })
            .and_then(|c| u64_at(c, "/id"));

        Some(Event::KojiTask(KojiTaskEvent {
            task_id: u64_at(body, "/id")?,
            state,
            old_state,
            rpm_build_task_id,
            start_time: body.pointer("/info/start_ts").and_then(Value::as_f64),
            completion_time: body.pointer("/info/completion_ts").and_then(Value::as_f64),
        }))
    }

    fn parse_dist_git_push(&self, body: &Value) -> Option<Event> {
        let commit = body.get("commit")?;
        let namespace = str_at(commit, "/namespace").unwrap_or("rpms");
        let repo = str_at(commit, "/repo")?;
        let project =
            ProjectRef::from_url(&format!("{}/{}/{}", self.dist_git_url, namespace, repo)).ok()?;
        Some(Event::DistGitPush(DistGitPushEvent {
            project,
            branch: str_at(commit, "/branch")?.to_string(),
            commit_sha: str_at(commit, "/rev")?.to_string(),
            actor: str_at(commit, "/agent")
                .or_else(|| str_at(commit, "/username"))?
                .to_string(),
        }))
    }

    fn parse_upstream_release(&self, body: &Value) -> Option<Event> {
        let package_name = body
            .pointer("/message/packages")
            .and_then(Value::as_array)
            .and_then(|packages| {
                packages
                    .iter()
                    .find(|p| str_at(p, "/distro") == Some("Fedora"))
            })
            .and_then(|p| str_at(p, "/package_name"))?;
        let version = str_at(body, "/message/upstream_version")
            .or_else(|| str_at(body, "/project/version"))?;
        Some(Event::UpstreamRelease(UpstreamReleaseEvent {
            package_name: package_name.to_string(),
            version: version.to_string(),
            distgit_project_url: format!("{}/rpms/{}", self.dist_git_url, package_name),
            anitya_project_id: u64_at(body, "/project/id"),
            upstream_project_url: str_at(body, "/project/homepage").map(String::from),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distbot_core::{EventKind, ForgeKind, JobTrigger};
    use serde_json::json;

    fn parser() -> Parser {
        Parser::default()
    }

    #[test]
    fn test_github_pull_request() {
        let payload = json!({
            "action": "synchronize",
            "number": 342,
            "pull_request": {
                "number": 342,
                "head": {
                    "sha": "528b803be6f93e19ca4130bf4976f2800a3004c4",
                    "repo": {"html_url": "https://github.com/lbarcziova/ogr"}
                },
                "base": {
                    "ref": "main",
                    "repo": {"html_url": "https://github.com/packit/ogr"}
                }
            },
            "sender": {"login": "lbarcziova"}
        });
        let Some(Event::PullRequest(pr)) = parser().parse_github("pull_request", &payload) else {
            panic!("expected a pull request event");
        };
        assert_eq!(pr.action, PullRequestAction::Synchronize);
        assert_eq!(pr.project.full_name(), "packit/ogr");
        assert_eq!(pr.source_project.unwrap().namespace, "lbarcziova");
        assert_eq!(pr.pr_id, 342);
        assert_eq!(pr.target_branch, "main");
        assert_eq!(pr.actor, "lbarcziova");
    }

    #[test]
    fn test_github_closed_pull_request_is_ignored() {
        let payload = json!({"action": "closed", "pull_request": {}});
        assert_eq!(parser().parse_github("pull_request", &payload), None);
    }

    #[test]
    fn test_github_comment_on_pr_and_issue() {
        let mut payload = json!({
            "action": "created",
            "issue": {"number": 342, "pull_request": {"url": "https://api.github.com/..."}},
            "comment": {"id": 1, "body": "/distbot build", "user": {"login": "phracek"}},
            "repository": {"html_url": "https://github.com/packit/ogr"},
            "sender": {"login": "phracek"}
        });
        let event = parser().parse_github("issue_comment", &payload).unwrap();
        assert_eq!(event.kind(), EventKind::PullRequestComment);
        assert_eq!(event.comment().unwrap().comment, "/distbot build");
        assert_eq!(event.pr_id(), Some(342));

        payload["issue"].as_object_mut().unwrap().remove("pull_request");
        let event = parser().parse_github("issue_comment", &payload).unwrap();
        assert_eq!(event.kind(), EventKind::IssueComment);
        assert_eq!(event.trigger(), Some(JobTrigger::Release));
    }

    #[test]
    fn test_github_push() {
        let payload = json!({
            "ref": "refs/heads/main",
            "after": "ad0c308af91da45cf40b253cd82f07f63ea9cbbf",
            "deleted": false,
            "repository": {"html_url": "https://github.com/packit/ogr", "default_branch": "main"},
            "pusher": {"name": "lachmanfrantisek"}
        });
        let Some(Event::Push(push)) = parser().parse_github("push", &payload) else {
            panic!("expected a push event");
        };
        assert_eq!(push.branch, "main");
        assert_eq!(push.default_branch.as_deref(), Some("main"));
        assert_eq!(push.actor, "lachmanfrantisek");
    }

    #[test]
    fn test_github_tag_push_and_branch_deletion_are_ignored() {
        let tag = json!({
            "ref": "refs/tags/0.40.0",
            "after": "ad0c308a",
            "repository": {"html_url": "https://github.com/packit/ogr"},
            "pusher": {"name": "x"}
        });
        assert_eq!(parser().parse_github("push", &tag), None);

        let deleted = json!({
            "ref": "refs/heads/feature",
            "after": "0000000000000000000000000000000000000000",
            "deleted": true,
            "repository": {"html_url": "https://github.com/packit/ogr"},
            "pusher": {"name": "x"}
        });
        assert_eq!(parser().parse_github("push", &deleted), None);
    }

    #[test]
    fn test_github_release_and_installation() {
        let release = json!({
            "action": "published",
            "release": {"tag_name": "0.40.0"},
            "repository": {"html_url": "https://github.com/packit/ogr"},
            "sender": {"login": "lbarcziova"}
        });
        let Some(Event::Release(release)) = parser().parse_github("release", &release) else {
            panic!("expected a release event");
        };
        assert_eq!(release.tag_name, "0.40.0");

        let installation = json!({
            "action": "created",
            "installation": {"id": 1173510, "account": {"login": "packit", "type": "Organization"}},
            "sender": {"login": "lbarcziova"}
        });
        let Some(Event::Installation(inst)) =
            parser().parse_github("installation", &installation)
        else {
            panic!("expected an installation event");
        };
        assert_eq!(inst.namespace_path(), "github.com/packit");
        assert_eq!(inst.sender_login, "lbarcziova");
    }

    #[test]
    fn test_gitlab_merge_request_update_needs_new_commits() {
        let mut payload = json!({
            "user": {"username": "shreyaspapi"},
            "project": {"web_url": "https://gitlab.com/packit-service/hello-world"},
            "object_attributes": {
                "action": "update",
                "iid": 2,
                "target_branch": "master",
                "oldrev": "94ccba9f986629e24b432c11d9c7fd20bb2ea51d",
                "last_commit": {"id": "1f6a716aa7a618a9ffe56970d77177d99d100022"},
                "source": {"web_url": "https://gitlab.com/shreyaspapi/hello-world"},
                "target": {"web_url": "https://gitlab.com/packit-service/hello-world"}
            }
        });
        let Some(Event::PullRequest(mr)) = parser().parse_gitlab("Merge Request Hook", &payload)
        else {
            panic!("expected a merge request event");
        };
        assert_eq!(mr.action, PullRequestAction::Synchronize);
        assert_eq!(mr.project.forge, ForgeKind::Gitlab);
        assert_eq!(mr.project.full_name(), "packit-service/hello-world");
        assert_eq!(mr.pr_id, 2);

        payload["object_attributes"]
            .as_object_mut()
            .unwrap()
            .remove("oldrev");
        assert_eq!(parser().parse_gitlab("Merge Request Hook", &payload), None);
    }

    #[test]
    fn test_gitlab_note_and_tag_push() {
        let note = json!({
            "user": {"username": "shreyaspapi"},
            "project": {"web_url": "https://gitlab.com/packit-service/hello-world"},
            "object_attributes": {"id": 452, "note": "/distbot test", "noteable_type": "MergeRequest"},
            "merge_request": {
                "iid": 2,
                "target_branch": "master",
                "last_commit": {"id": "45e272a57335e4e308f3176df6e9226a9e7805a9"}
            }
        });
        let event = parser().parse_gitlab("Note Hook", &note).unwrap();
        assert_eq!(event.kind(), EventKind::PullRequestComment);
        assert_eq!(event.commit_sha(), Some("45e272a57335e4e308f3176df6e9226a9e7805a9"));

        let tag = json!({
            "ref": "refs/tags/v1.0.0",
            "checkout_sha": "fa64d5e66e3ea9be5a94cd3bac4a1d1e2f5d1ff0",
            "user_username": "shreyaspapi",
            "project": {"web_url": "https://gitlab.com/packit-service/hello-world"}
        });
        let Some(Event::Release(release)) = parser().parse_gitlab("Tag Push Hook", &tag) else {
            panic!("expected a release event");
        };
        assert_eq!(release.tag_name, "v1.0.0");
        assert!(release.commit_sha.is_some());
    }

    #[test]
    fn test_copr_build_end() {
        let body = json!({
            "build": 1234, "chroot": "fedora-37-x86_64", "status": 1,
            "owner": "packit", "copr": "packit-ogr-342", "pkg": "python-ogr",
            "version": "0.40.0-1.fc37", "timestamp": 1664892000.5
        });
        let Some(Event::CoprBuild(build)) =
            parser().parse_fedora_messaging("org.fedoraproject.prod.copr.build.end", &body)
        else {
            panic!("expected a copr build event");
        };
        assert_eq!(build.topic, CoprBuildTopic::Finished);
        assert_eq!(build.project_name, "packit-ogr-342");
        assert_eq!(build.build_status(), distbot_core::BuildStatus::Success);
    }

    #[test]
    fn test_koji_build_state_change() {
        let body = json!({
            "build_id": 2058711,
            "task_id": 94225123,
            "name": "python-ogr",
            "version": "0.40.0",
            "release": "1.fc37",
            "epoch": null,
            "new": 1,
            "old": 0,
            "owner": "packit",
            "request": [
                "git+https://src.fedoraproject.org/rpms/python-ogr.git#ad0c308af91da45cf40b253cd82f07f63ea9cbbf",
                "f37-candidate",
                {}
            ]
        });
        let Some(Event::KojiBuild(build)) = parser()
            .parse_fedora_messaging("org.fedoraproject.prod.buildsys.build.state.change", &body)
        else {
            panic!("expected a koji build event");
        };
        assert_eq!(build.state, KojiBuildState::Complete);
        assert_eq!(build.old_state, Some(KojiBuildState::Building));
        assert_eq!(build.branch_name, "f37");
        assert_eq!(build.commit_sha, "ad0c308af91da45cf40b253cd82f07f63ea9cbbf");
        assert_eq!(build.project.full_name(), "rpms/python-ogr");
        assert_eq!(build.nvr(), "python-ogr-0.40.0-1.fc37");
    }

    #[test]
    fn test_koji_task_state_change() {
        let body = json!({
            "id": 94225123,
            "new": "CLOSED",
            "old": "OPEN",
            "info": {
                "start_ts": 1664892000.0,
                "completion_ts": 1664893000.0,
                "children": [
                    {"id": 94225130, "method": "createrepo"},
                    {"id": 94225124, "method": "buildArch"}
                ]
            }
        });
        let Some(Event::KojiTask(task)) = parser()
            .parse_fedora_messaging("org.fedoraproject.prod.buildsys.task.state.change", &body)
        else {
            panic!("expected a koji task event");
        };
        assert_eq!(task.state, KojiTaskState::Closed);
        assert_eq!(task.old_state, Some(KojiTaskState::Open));
        assert_eq!(task.rpm_build_task_id, Some(94225124));
        assert_eq!(task.completion_time, Some(1664893000.0));
    }

    #[test]
    fn test_dist_git_push_and_upstream_release() {
        let push = json!({
            "commit": {
                "branch": "f37", "rev": "ad0c308af91da45cf40b253cd82f07f63ea9cbbf",
                "repo": "python-ogr", "namespace": "rpms", "agent": "lbarcziova"
            }
        });
        let Some(Event::DistGitPush(push)) =
            parser().parse_fedora_messaging("org.fedoraproject.prod.git.receive", &push)
        else {
            panic!("expected a dist-git push event");
        };
        assert_eq!(push.project.project_url(), "https://src.fedoraproject.org/rpms/python-ogr");
        assert_eq!(push.project.forge, ForgeKind::Pagure);
        assert_eq!(push.branch, "f37");

        let release = json!({
            "project": {"id": 4142, "name": "ogr", "homepage": "https://github.com/packit/ogr"},
            "message": {
                "upstream_version": "0.41.0",
                "packages": [{"distro": "Fedora", "package_name": "python-ogr"}]
            }
        });
        let Some(Event::UpstreamRelease(release)) = parser()
            .parse_fedora_messaging("org.release-monitoring.prod.anitya.project.version.update", &release)
        else {
            panic!("expected an upstream release event");
        };
        assert_eq!(release.version, "0.41.0");
        assert_eq!(
            release.distgit_project_url,
            "https://src.fedoraproject.org/rpms/python-ogr"
        );
        assert_eq!(release.anitya_project_id, Some(4142));
    }

    #[test]
    fn test_testing_farm_and_unknown_topic() {
        let event = parser()
            .parse_testing_farm(&json!({"request_id": "7ae1eaeb-4d3c-4b52-a1ad-9e4d6cf6d9e6"}))
            .unwrap();
        assert_eq!(event.kind(), EventKind::TestingFarmResults);
        assert_eq!(parser().parse_testing_farm(&json!({})), None);
        assert_eq!(
            parser().parse_fedora_messaging("org.fedoraproject.prod.bodhi.update.comment", &json!({})),
            None
        );
    }
}
