//! Package and job configuration types.
//!
//! These are the parsed form of a project's `.distbot.kdl`; parsing and
//! validation live in `distbot-config`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of work a configured job asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CoprBuild,
    Tests,
    UpstreamKojiBuild,
    KojiBuild,
    BodhiUpdate,
    ProposeDownstream,
    PullFromUpstream,
    VmImageBuild,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CoprBuild => "copr_build",
            JobType::Tests => "tests",
            JobType::UpstreamKojiBuild => "upstream_koji_build",
            JobType::KojiBuild => "koji_build",
            JobType::BodhiUpdate => "bodhi_update",
            JobType::ProposeDownstream => "propose_downstream",
            JobType::PullFromUpstream => "pull_from_upstream",
            JobType::VmImageBuild => "vm_image_build",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "copr_build" | "build" => Ok(JobType::CoprBuild),
            "tests" => Ok(JobType::Tests),
            "upstream_koji_build" => Ok(JobType::UpstreamKojiBuild),
            "koji_build" => Ok(JobType::KojiBuild),
            "bodhi_update" => Ok(JobType::BodhiUpdate),
            "propose_downstream" => Ok(JobType::ProposeDownstream),
            "pull_from_upstream" => Ok(JobType::PullFromUpstream),
            "vm_image_build" => Ok(JobType::VmImageBuild),
            _ => Err(format!("unknown job type: {}", s)),
        }
    }
}

/// Which project events a job reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTrigger {
    PullRequest,
    Commit,
    Release,
}

impl JobTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobTrigger::PullRequest => "pull_request",
            JobTrigger::Commit => "commit",
            JobTrigger::Release => "release",
        }
    }
}

impl std::fmt::Display for JobTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull_request" => Ok(JobTrigger::PullRequest),
            "commit" => Ok(JobTrigger::Commit),
            "release" => Ok(JobTrigger::Release),
            _ => Err(format!("unknown trigger: {}", s)),
        }
    }
}

/// VM image request sent to the image builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub architecture: String,
    pub image_type: String,
    pub upload_type: String,
    /// Upload options passed through verbatim (e.g. `share_with_accounts`).
    pub upload_options: BTreeMap<String, String>,
}

/// One job from the package configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub job: JobType,
    pub trigger: JobTrigger,
    /// Build chroots / test targets, e.g. `fedora-rawhide-x86_64`.
    pub targets: Vec<String>,
    /// Dist-git branches or aliases such as `fedora-stable`.
    pub dist_git_branches: Vec<String>,
    /// Upstream branch for commit-triggered jobs; `None` means the default branch.
    pub branch: Option<String>,
    /// Copr owner; the service account is used when unset.
    pub owner: Option<String>,
    /// Copr project; derived from the project and trigger when unset.
    pub project: Option<String>,
    pub skip_build: bool,
    pub fmf_url: Option<String>,
    pub fmf_ref: Option<String>,
    pub tmt_plan: Option<String>,
    pub update_type: Option<String>,
    pub copr_chroot: Option<String>,
    pub image_distribution: Option<String>,
    pub image_name: Option<String>,
    pub image_request: Option<ImageRequest>,
    /// Extra packages installed into the VM image.
    pub image_packages: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl JobConfig {
    pub fn new(job: JobType, trigger: JobTrigger) -> Self {
        Self {
            job,
            trigger,
            targets: Vec::new(),
            dist_git_branches: Vec::new(),
            branch: None,
            owner: None,
            project: None,
            skip_build: false,
            fmf_url: None,
            fmf_ref: None,
            tmt_plan: None,
            update_type: None,
            copr_chroot: None,
            image_distribution: None,
            image_name: None,
            image_request: None,
            image_packages: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Targets with the implicit default applied.
    pub fn effective_targets(&self) -> Vec<String> {
        if self.targets.is_empty() {
            vec!["fedora-rawhide-x86_64".to_string()]
        } else {
            self.targets.clone()
        }
    }
}

/// Parsed `.distbot.kdl` of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub specfile_path: Option<String>,
    pub downstream_package_name: Option<String>,
    pub upstream_package_name: Option<String>,
    /// Template used to turn a version into an upstream tag.
    pub upstream_tag_template: String,
    /// Where to open issues when a job fails without a pull request to comment on.
    pub issue_repository: Option<String>,
    pub jobs: Vec<JobConfig>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            specfile_path: None,
            downstream_package_name: None,
            upstream_package_name: None,
            upstream_tag_template: "{version}".to_string(),
            issue_repository: None,
            jobs: Vec::new(),
        }
    }
}

impl PackageConfig {
    pub fn jobs_for(&self, trigger: JobTrigger) -> impl Iterator<Item = &JobConfig> {
        self.jobs.iter().filter(move |j| j.trigger == trigger)
    }

    pub fn find_job(&self, job: JobType) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.job == job)
    }

    pub fn find_job_for(&self, job: JobType, trigger: JobTrigger) -> Option<&JobConfig> {
        self.jobs
            .iter()
            .find(|j| j.job == job && j.trigger == trigger)
    }

    /// Upstream tag for `version` according to `upstream_tag_template`.
    pub fn upstream_tag(&self, version: &str) -> String {
        self.upstream_tag_template.replace("{version}", version)
    }

    /// Version in `tag`, the inverse of `upstream_tag`; `None` when the tag
    /// does not match the template.
    pub fn version_from_tag(&self, tag: &str) -> Option<String> {
        let (prefix, suffix) = self.upstream_tag_template.split_once("{version}")?;
        let version = tag.strip_prefix(prefix)?.strip_suffix(suffix)?;
        (!version.is_empty()).then(|| version.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_aliases() {
        assert_eq!("build".parse::<JobType>().unwrap(), JobType::CoprBuild);
        assert_eq!("copr_build".parse::<JobType>().unwrap(), JobType::CoprBuild);
        assert!("sync_from_downstream".parse::<JobType>().is_err());
    }

    #[test]
    fn test_jobs_for_trigger() {
        let config = PackageConfig {
            jobs: vec![
                JobConfig::new(JobType::CoprBuild, JobTrigger::PullRequest),
                JobConfig::new(JobType::Tests, JobTrigger::PullRequest),
                JobConfig::new(JobType::ProposeDownstream, JobTrigger::Release),
            ],
            ..Default::default()
        };
        let jobs: Vec<_> = config.jobs_for(JobTrigger::PullRequest).map(|j| j.job).collect();
        assert_eq!(jobs, vec![JobType::CoprBuild, JobType::Tests]);
        assert!(config.find_job_for(JobType::Tests, JobTrigger::Release).is_none());
    }

    #[test]
    fn test_upstream_tag() {
        let config = PackageConfig {
            upstream_tag_template: "v{version}".to_string(),
            ..Default::default()
        };
        assert_eq!(config.upstream_tag("1.2.0"), "v1.2.0");
        assert_eq!(config.version_from_tag("v1.2.0").as_deref(), Some("1.2.0"));
        assert_eq!(config.version_from_tag("1.2.0"), None);
        assert_eq!(config.version_from_tag("v"), None);
    }
}
