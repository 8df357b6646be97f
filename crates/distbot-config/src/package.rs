//! Package configuration parsing (`.distbot.kdl`).

use crate::kdl_ext::{
    all_string_args, bool_prop, children, first_bool_arg, first_string_arg, string_map,
    string_prop,
};
use crate::{ConfigError, ConfigResult};
use distbot_core::job::{ImageRequest, JobConfig, JobTrigger, JobType, PackageConfig};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;

/// File the package configuration is read from, at the root of the repository.
pub const PACKAGE_CONFIG_FILE: &str = ".distbot.kdl";

/// Parse and validate a package configuration from KDL text.
pub fn parse_package_config(kdl: &str) -> ConfigResult<PackageConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = PackageConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "specfile-path" => config.specfile_path = first_string_arg(node),
            "downstream-package-name" => config.downstream_package_name = first_string_arg(node),
            "upstream-package-name" => config.upstream_package_name = first_string_arg(node),
            "upstream-tag-template" => {
                if let Some(template) = first_string_arg(node) {
                    config.upstream_tag_template = template;
                }
            }
            "issue-repository" => config.issue_repository = first_string_arg(node),
            "job" => config.jobs.push(parse_job(node)?),
            _ => {} // Ignore unknown nodes
        }
    }

    validate(&config)?;
    Ok(config)
}

fn parse_job(node: &KdlNode) -> ConfigResult<JobConfig> {
    let job_name =
        first_string_arg(node).ok_or_else(|| ConfigError::MissingField("job type".to_string()))?;
    let job: JobType = job_name
        .parse()
        .map_err(|e: String| ConfigError::invalid("job", e))?;

    let trigger_name = string_prop(node, "trigger")
        .ok_or_else(|| ConfigError::MissingField(format!("trigger for job '{}'", job_name)))?;
    let trigger: JobTrigger = trigger_name
        .parse()
        .map_err(|e: String| ConfigError::invalid("trigger", e))?;

    let mut config = JobConfig::new(job, trigger);
    config.skip_build = bool_prop(node, "skip-build").unwrap_or(false);

    for child in children(node) {
        match child.name().value() {
            "targets" => config.targets = all_string_args(child),
            "dist-git-branches" => config.dist_git_branches = all_string_args(child),
            "branch" => config.branch = first_string_arg(child),
            "owner" => config.owner = first_string_arg(child),
            "project" => config.project = first_string_arg(child),
            "skip-build" => config.skip_build = first_bool_arg(child).unwrap_or(true),
            "fmf-url" => config.fmf_url = first_string_arg(child),
            "fmf-ref" => config.fmf_ref = first_string_arg(child),
            "tmt-plan" => config.tmt_plan = first_string_arg(child),
            "update-type" => config.update_type = first_string_arg(child),
            "copr-chroot" => config.copr_chroot = first_string_arg(child),
            "image-distribution" => config.image_distribution = first_string_arg(child),
            "image-name" => config.image_name = first_string_arg(child),
            "image-request" => config.image_request = Some(parse_image_request(child)?),
            "packages" => config.image_packages = all_string_args(child),
            "env" => config.env = string_map(child),
            _ => {}
        }
    }

    Ok(config)
}

fn parse_image_request(node: &KdlNode) -> ConfigResult<ImageRequest> {
    let mut request = ImageRequest {
        architecture: string_prop(node, "architecture").unwrap_or_else(|| "x86_64".to_string()),
        image_type: string_prop(node, "image-type")
            .ok_or_else(|| ConfigError::MissingField("image-request image-type".to_string()))?,
        upload_type: string_prop(node, "upload-type")
            .ok_or_else(|| ConfigError::MissingField("image-request upload-type".to_string()))?,
        ..Default::default()
    };
    for child in children(node) {
        if child.name().value() == "upload-options" {
            request.upload_options = string_map(child);
        }
    }
    Ok(request)
}

fn validate(config: &PackageConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for job in &config.jobs {
        if !seen.insert((job.job, job.trigger)) {
            return Err(ConfigError::Duplicate(format!(
                "job '{}' with trigger '{}'",
                job.job, job.trigger
            )));
        }

        match job.job {
            JobType::VmImageBuild => {
                for (value, field) in [
                    (&job.copr_chroot, "copr-chroot"),
                    (&job.image_distribution, "image-distribution"),
                    (&job.image_name, "image-name"),
                ] {
                    if value.is_none() {
                        return Err(ConfigError::MissingField(format!("{} for vm_image_build", field)));
                    }
                }
                if job.image_request.is_none() {
                    return Err(ConfigError::MissingField(
                        "image-request for vm_image_build".to_string(),
                    ));
                }
            }
            JobType::ProposeDownstream | JobType::PullFromUpstream
                if config.specfile_path.is_none() =>
            {
                return Err(ConfigError::MissingField(format!(
                    "specfile-path (needed by {})",
                    job.job
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
