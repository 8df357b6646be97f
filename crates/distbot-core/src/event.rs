//! Typed events produced by the parser.
//!
//! An `Event` is what the dispatcher routes. It is also the payload of
//! queued tasks, so every variant round-trips through JSON.

use serde::{Deserialize, Serialize};

use crate::job::JobTrigger;
use crate::project::ProjectRef;
use crate::status::{BuildStatus, KojiBuildState, KojiTaskState, ProjectEventType, VmImageBuildStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Reopened,
    Synchronize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    /// Project the pull request targets.
    pub project: ProjectRef,
    /// Project the changes come from (a fork, or the same project).
    pub source_project: Option<ProjectRef>,
    pub pr_id: u64,
    pub target_branch: String,
    pub commit_sha: String,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentEvent {
    pub project: ProjectRef,
    /// Pull request or issue number.
    pub number: u64,
    pub comment_id: u64,
    pub comment: String,
    pub actor: String,
    /// Head commit of the pull request when the payload carries it.
    pub commit_sha: Option<String>,
    pub target_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub project: ProjectRef,
    pub branch: String,
    pub commit_sha: String,
    pub actor: String,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseEvent {
    pub project: ProjectRef,
    pub tag_name: String,
    pub commit_sha: Option<String>,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationEvent {
    pub installation_id: u64,
    /// Forge host the app was installed on, e.g. `github.com`.
    pub host: String,
    pub account_login: String,
    pub account_type: String,
    pub sender_login: String,
}

impl InstallationEvent {
    pub fn namespace_path(&self) -> String {
        format!("{}/{}", self.host, self.account_login)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoprBuildTopic {
    Started,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoprBuildEvent {
    pub topic: CoprBuildTopic,
    pub build_id: u64,
    pub chroot: String,
    /// Raw Copr status code.
    pub status: i64,
    pub owner: String,
    pub project_name: String,
    pub pkg: Option<String>,
    pub version: Option<String>,
    pub timestamp: Option<f64>,
}

impl CoprBuildEvent {
    /// Chroot Copr uses for the SRPM build of a build.
    pub const SRPM_CHROOT: &'static str = "srpm-builds";

    pub fn is_srpm(&self) -> bool {
        self.chroot == Self::SRPM_CHROOT
    }

    /// Copr codes: 0 failed, 1 succeeded, 2 canceled, 5 skipped; the rest are in flight.
    pub fn build_status(&self) -> BuildStatus {
        match self.topic {
            CoprBuildTopic::Started => BuildStatus::Running,
            CoprBuildTopic::Finished => match self.status {
                1 | 5 => BuildStatus::Success,
                0 => BuildStatus::Failure,
                _ => BuildStatus::Error,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KojiBuildEvent {
    pub build_id: u64,
    pub task_id: Option<u64>,
    pub state: KojiBuildState,
    pub old_state: Option<KojiBuildState>,
    pub package_name: String,
    pub version: String,
    pub release: String,
    pub epoch: Option<String>,
    /// Dist-git branch the build was made from.
    pub branch_name: String,
    pub commit_sha: String,
    /// Dist-git project the build was made from.
    pub project: ProjectRef,
    pub owner: String,
}

impl KojiBuildEvent {
    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.package_name, self.version, self.release)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KojiTaskEvent {
    pub task_id: u64,
    pub state: KojiTaskState,
    pub old_state: Option<KojiTaskState>,
    pub rpm_build_task_id: Option<u64>,
    pub start_time: Option<f64>,
    pub completion_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistGitPushEvent {
    pub project: ProjectRef,
    pub branch: String,
    pub commit_sha: String,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamReleaseEvent {
    pub package_name: String,
    pub version: String,
    pub distgit_project_url: String,
    pub anitya_project_id: Option<u64>,
    pub upstream_project_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestingFarmResultsEvent {
    /// Testing Farm request id.
    pub pipeline_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmImageBuildResultEvent {
    pub build_id: String,
    pub status: VmImageBuildStatus,
    pub message: String,
}

/// A classified inbound payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PullRequest(PullRequestEvent),
    PullRequestComment(CommentEvent),
    IssueComment(CommentEvent),
    Push(PushEvent),
    Release(ReleaseEvent),
    Installation(InstallationEvent),
    CoprBuild(CoprBuildEvent),
    KojiBuild(KojiBuildEvent),
    KojiTask(KojiTaskEvent),
    DistGitPush(DistGitPushEvent),
    UpstreamRelease(UpstreamReleaseEvent),
    TestingFarmResults(TestingFarmResultsEvent),
    VmImageBuildResult(VmImageBuildResultEvent),
}

/// Variant tag of an `Event`, used to register which events a handler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PullRequest,
    PullRequestComment,
    IssueComment,
    Push,
    Release,
    Installation,
    CoprBuild,
    KojiBuild,
    KojiTask,
    DistGitPush,
    UpstreamRelease,
    TestingFarmResults,
    VmImageBuildResult,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::PullRequest(_) => EventKind::PullRequest,
            Event::PullRequestComment(_) => EventKind::PullRequestComment,
            Event::IssueComment(_) => EventKind::IssueComment,
            Event::Push(_) => EventKind::Push,
            Event::Release(_) => EventKind::Release,
            Event::Installation(_) => EventKind::Installation,
            Event::CoprBuild(_) => EventKind::CoprBuild,
            Event::KojiBuild(_) => EventKind::KojiBuild,
            Event::KojiTask(_) => EventKind::KojiTask,
            Event::DistGitPush(_) => EventKind::DistGitPush,
            Event::UpstreamRelease(_) => EventKind::UpstreamRelease,
            Event::TestingFarmResults(_) => EventKind::TestingFarmResults,
            Event::VmImageBuildResult(_) => EventKind::VmImageBuildResult,
        }
    }

    /// Job trigger this event fires, if any. Result events have none: they
    /// are routed to report handlers through the DB record they refer to.
    pub fn trigger(&self) -> Option<JobTrigger> {
        match self {
            Event::PullRequest(_) | Event::PullRequestComment(_) => Some(JobTrigger::PullRequest),
            Event::Push(_) | Event::DistGitPush(_) | Event::KojiBuild(_) => {
                Some(JobTrigger::Commit)
            }
            Event::Release(_) | Event::IssueComment(_) | Event::UpstreamRelease(_) => {
                Some(JobTrigger::Release)
            }
            _ => None,
        }
    }

    pub fn project(&self) -> Option<&ProjectRef> {
        match self {
            Event::PullRequest(e) => Some(&e.project),
            Event::PullRequestComment(e) | Event::IssueComment(e) => Some(&e.project),
            Event::Push(e) => Some(&e.project),
            Event::Release(e) => Some(&e.project),
            Event::KojiBuild(e) => Some(&e.project),
            Event::DistGitPush(e) => Some(&e.project),
            _ => None,
        }
    }

    pub fn commit_sha(&self) -> Option<&str> {
        match self {
            Event::PullRequest(e) => Some(&e.commit_sha),
            Event::PullRequestComment(e) | Event::IssueComment(e) => e.commit_sha.as_deref(),
            Event::Push(e) => Some(&e.commit_sha),
            Event::Release(e) => e.commit_sha.as_deref(),
            Event::KojiBuild(e) => Some(&e.commit_sha),
            Event::DistGitPush(e) => Some(&e.commit_sha),
            _ => None,
        }
    }

    /// Ref to read the package configuration from.
    pub fn git_ref(&self) -> Option<String> {
        match self {
            Event::PullRequest(e) => Some(e.commit_sha.clone()),
            Event::PullRequestComment(e) => e.commit_sha.clone(),
            Event::Push(e) => Some(e.commit_sha.clone()),
            Event::Release(e) => Some(e.tag_name.clone()),
            Event::KojiBuild(e) => Some(e.commit_sha.clone()),
            Event::DistGitPush(e) => Some(e.commit_sha.clone()),
            _ => None,
        }
    }

    /// Login of the account that caused the event.
    pub fn actor(&self) -> Option<&str> {
        match self {
            Event::PullRequest(e) => Some(&e.actor),
            Event::PullRequestComment(e) | Event::IssueComment(e) => Some(&e.actor),
            Event::Push(e) => Some(&e.actor),
            Event::Release(e) => Some(&e.actor),
            Event::Installation(e) => Some(&e.sender_login),
            Event::DistGitPush(e) => Some(&e.actor),
            Event::KojiBuild(e) => Some(&e.owner),
            _ => None,
        }
    }

    /// Project event (job trigger row) this event belongs to.
    pub fn project_event(&self) -> Option<(ProjectEventType, String)> {
        match self {
            Event::PullRequest(e) => Some((ProjectEventType::PullRequest, e.pr_id.to_string())),
            Event::PullRequestComment(e) => {
                Some((ProjectEventType::PullRequest, e.number.to_string()))
            }
            Event::IssueComment(e) => Some((ProjectEventType::Issue, e.number.to_string())),
            Event::Push(e) => Some((ProjectEventType::BranchPush, e.branch.clone())),
            Event::Release(e) => Some((ProjectEventType::Release, e.tag_name.clone())),
            Event::DistGitPush(e) => Some((ProjectEventType::BranchPush, e.branch.clone())),
            Event::KojiBuild(e) => Some((ProjectEventType::BranchPush, e.branch_name.clone())),
            Event::UpstreamRelease(e) => Some((ProjectEventType::Release, e.version.clone())),
            _ => None,
        }
    }

    /// Comment body for comment events.
    pub fn comment(&self) -> Option<&CommentEvent> {
        match self {
            Event::PullRequestComment(e) | Event::IssueComment(e) => Some(e),
            _ => None,
        }
    }

    /// Pull request number for PR-scoped events.
    pub fn pr_id(&self) -> Option<u64> {
        match self {
            Event::PullRequest(e) => Some(e.pr_id),
            Event::PullRequestComment(e) => Some(e.number),
            _ => None,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ForgeKind;

    fn project() -> ProjectRef {
        ProjectRef::new(ForgeKind::Github, "https://github.com", "packit", "ogr")
    }

    #[test]
    fn test_triggers() {
        let push = Event::Push(PushEvent {
            project: project(),
            branch: "main".into(),
            commit_sha: "abc".into(),
            actor: "lbarcziova".into(),
            default_branch: Some("main".into()),
        });
        assert_eq!(push.trigger(), Some(JobTrigger::Commit));
        assert_eq!(
            push.project_event(),
            Some((ProjectEventType::BranchPush, "main".to_string()))
        );

        let results = Event::TestingFarmResults(TestingFarmResultsEvent {
            pipeline_id: "5e8079d8".into(),
        });
        assert_eq!(results.trigger(), None);
        assert!(results.project().is_none());
    }

    #[test]
    fn test_json_round_trip_keeps_variant() {
        let event = Event::IssueComment(CommentEvent {
            project: project(),
            number: 12,
            comment_id: 99,
            comment: "/distbot propose-downstream".into(),
            actor: "phracek".into(),
            commit_sha: None,
            target_branch: None,
        });
        let value = event.to_value();
        assert_eq!(value["type"], "issue_comment");
        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.trigger(), Some(JobTrigger::Release));
    }

    #[test]
    fn test_copr_status_and_kind_name() {
        let copr = CoprBuildEvent {
            topic: CoprBuildTopic::Finished,
            build_id: 1,
            chroot: "srpm-builds".into(),
            status: 1,
            owner: "packit".into(),
            project_name: "packit-ogr-12".into(),
            pkg: None,
            version: None,
            timestamp: None,
        };
        assert!(copr.is_srpm());
        assert_eq!(copr.build_status(), BuildStatus::Success);
        assert_eq!(EventKind::CoprBuild.to_string(), "copr_build");
    }
}
