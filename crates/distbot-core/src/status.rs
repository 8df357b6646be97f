//! Status enums persisted in the schema and reported to forges.
//!
//! Every enum is stored as its snake_case (or, for Koji, upper-case)
//! string form in TEXT columns.

use serde::{Deserialize, Serialize};

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("unknown {}: {}", stringify!($name), s)),
                }
            }
        }
    };
}

string_enum! {
    /// Status of an SRPM, Copr or Koji build target.
    pub enum BuildStatus {
        Success => "success",
        Pending => "pending",
        Running => "running",
        Failure => "failure",
        Error => "error",
        WaitingForSrpm => "waiting_for_srpm",
    }
}

impl BuildStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            BuildStatus::Success | BuildStatus::Failure | BuildStatus::Error
        )
    }
}

string_enum! {
    /// Result of a Testing Farm run.
    pub enum TestingFarmResult {
        New => "new",
        Queued => "queued",
        Running => "running",
        Passed => "passed",
        Failed => "failed",
        Skipped => "skipped",
        Error => "error",
        Unknown => "unknown",
        NeedsInspection => "needs_inspection",
    }
}

impl TestingFarmResult {
    /// Map a Testing Farm request `state` and `result.overall` pair.
    pub fn from_api(state: &str, overall: Option<&str>) -> Self {
        match state {
            "new" => TestingFarmResult::New,
            "queued" => TestingFarmResult::Queued,
            "running" => TestingFarmResult::Running,
            "error" | "canceled" | "cancel-requested" => TestingFarmResult::Error,
            "complete" => match overall {
                Some("passed") => TestingFarmResult::Passed,
                Some("failed") => TestingFarmResult::Failed,
                Some("skipped") => TestingFarmResult::Skipped,
                Some("error") => TestingFarmResult::Error,
                Some("needs_inspection") => TestingFarmResult::NeedsInspection,
                _ => TestingFarmResult::Unknown,
            },
            _ => TestingFarmResult::Unknown,
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(
            self,
            TestingFarmResult::New | TestingFarmResult::Queued | TestingFarmResult::Running
        )
    }
}

string_enum! {
    pub enum SyncReleaseStatus {
        Running => "running",
        Finished => "finished",
        Error => "error",
    }
}

string_enum! {
    pub enum SyncReleaseTargetStatus {
        Queued => "queued",
        Running => "running",
        Error => "error",
        Retry => "retry",
        Submitted => "submitted",
    }
}

string_enum! {
    pub enum SyncReleaseJobType {
        PullFromUpstream => "pull_from_upstream",
        ProposeDownstream => "propose_downstream",
    }
}

string_enum! {
    pub enum VmImageBuildStatus {
        Pending => "pending",
        Building => "building",
        Success => "success",
        Failure => "failure",
        Error => "error",
    }
}

impl VmImageBuildStatus {
    /// Map an image-builder compose status.
    pub fn from_compose_status(status: &str) -> Self {
        match status {
            "pending" => VmImageBuildStatus::Pending,
            "building" | "uploading" | "registering" => VmImageBuildStatus::Building,
            "success" => VmImageBuildStatus::Success,
            "failure" => VmImageBuildStatus::Failure,
            _ => VmImageBuildStatus::Error,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            VmImageBuildStatus::Success | VmImageBuildStatus::Failure | VmImageBuildStatus::Error
        )
    }
}

string_enum! {
    /// State of a (non-scratch) Koji build, as sent on the message bus.
    pub enum KojiBuildState {
        Building => "BUILDING",
        Complete => "COMPLETE",
        Deleted => "DELETED",
        Failed => "FAILED",
        Canceled => "CANCELED",
    }
}

impl KojiBuildState {
    /// Koji encodes build states as integers in `buildsys.build.state.change`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(KojiBuildState::Building),
            1 => Some(KojiBuildState::Complete),
            2 => Some(KojiBuildState::Deleted),
            3 => Some(KojiBuildState::Failed),
            4 => Some(KojiBuildState::Canceled),
            _ => None,
        }
    }

    pub fn build_status(&self) -> BuildStatus {
        match self {
            KojiBuildState::Building => BuildStatus::Running,
            KojiBuildState::Complete => BuildStatus::Success,
            KojiBuildState::Failed => BuildStatus::Failure,
            KojiBuildState::Deleted | KojiBuildState::Canceled => BuildStatus::Error,
        }
    }
}

string_enum! {
    /// State of a Koji task (scratch builds).
    pub enum KojiTaskState {
        Free => "FREE",
        Open => "OPEN",
        Closed => "CLOSED",
        Canceled => "CANCELED",
        Assigned => "ASSIGNED",
        Failed => "FAILED",
    }
}

impl KojiTaskState {
    pub fn build_status(&self) -> BuildStatus {
        match self {
            KojiTaskState::Free | KojiTaskState::Assigned => BuildStatus::Pending,
            KojiTaskState::Open => BuildStatus::Running,
            KojiTaskState::Closed => BuildStatus::Success,
            KojiTaskState::Failed => BuildStatus::Failure,
            KojiTaskState::Canceled => BuildStatus::Error,
        }
    }
}

string_enum! {
    /// Kind of project event a pipeline was triggered by.
    pub enum ProjectEventType {
        PullRequest => "pull_request",
        BranchPush => "branch_push",
        Release => "release",
        Issue => "issue",
    }
}

string_enum! {
    pub enum AllowlistStatus {
        Waiting => "waiting",
        ApprovedAutomatically => "approved_automatically",
        ApprovedManually => "approved_manually",
        Denied => "denied",
    }
}

impl AllowlistStatus {
    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            AllowlistStatus::ApprovedAutomatically | AllowlistStatus::ApprovedManually
        )
    }
}

string_enum! {
    /// Commit status state reported back to a forge.
    pub enum CommitState {
        Pending => "pending",
        Running => "running",
        Success => "success",
        Failure => "failure",
        Error => "error",
    }
}

impl From<BuildStatus> for CommitState {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Success => CommitState::Success,
            BuildStatus::Pending | BuildStatus::WaitingForSrpm => CommitState::Pending,
            BuildStatus::Running => CommitState::Running,
            BuildStatus::Failure => CommitState::Failure,
            BuildStatus::Error => CommitState::Error,
        }
    }
}

impl From<TestingFarmResult> for CommitState {
    fn from(result: TestingFarmResult) -> Self {
        match result {
            TestingFarmResult::New | TestingFarmResult::Queued => CommitState::Pending,
            TestingFarmResult::Running => CommitState::Running,
            TestingFarmResult::Passed | TestingFarmResult::Skipped => CommitState::Success,
            TestingFarmResult::Failed | TestingFarmResult::NeedsInspection => {
                CommitState::Failure
            }
            TestingFarmResult::Error | TestingFarmResult::Unknown => CommitState::Error,
        }
    }
}

impl From<VmImageBuildStatus> for CommitState {
    fn from(status: VmImageBuildStatus) -> Self {
        match status {
            VmImageBuildStatus::Pending => CommitState::Pending,
            VmImageBuildStatus::Building => CommitState::Running,
            VmImageBuildStatus::Success => CommitState::Success,
            VmImageBuildStatus::Failure => CommitState::Failure,
            VmImageBuildStatus::Error => CommitState::Error,
        }
    }
}
