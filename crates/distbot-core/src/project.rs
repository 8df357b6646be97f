//! Git forge projects.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Git forge flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeKind {
    Github,
    Gitlab,
    Pagure,
}

impl std::fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForgeKind::Github => write!(f, "github"),
            ForgeKind::Gitlab => write!(f, "gitlab"),
            ForgeKind::Pagure => write!(f, "pagure"),
        }
    }
}

impl std::str::FromStr for ForgeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(ForgeKind::Github),
            "gitlab" => Ok(ForgeKind::Gitlab),
            "pagure" => Ok(ForgeKind::Pagure),
            _ => Err(format!("Unknown forge: {}", s)),
        }
    }
}

impl ForgeKind {
    /// Guess the forge flavour from a host name.
    pub fn from_host(host: &str) -> Self {
        if host.contains("github") {
            ForgeKind::Github
        } else if host.contains("pagure") || host == "src.fedoraproject.org" {
            ForgeKind::Pagure
        } else {
            ForgeKind::Gitlab
        }
    }
}

/// A repository on some forge instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRef {
    pub forge: ForgeKind,
    /// Instance base URL without trailing slash, e.g. `https://github.com`.
    pub instance_url: String,
    /// Owner or group path; GitLab subgroups keep their slashes.
    pub namespace: String,
    pub repo: String,
}

impl ProjectRef {
    pub fn new(
        forge: ForgeKind,
        instance_url: impl Into<String>,
        namespace: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            forge,
            instance_url: instance_url.into().trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            repo: repo.into(),
        }
    }

    /// Parse `https://host/namespace/.../repo(.git)`.
    pub fn from_url(project_url: &str) -> Result<Self> {
        let url = Url::parse(project_url)
            .map_err(|e| Error::InvalidInput(format!("invalid project url {project_url}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidInput(format!("project url without host: {project_url}")))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        let Some((repo, namespace)) = segments.split_last() else {
            return Err(Error::InvalidInput(format!(
                "project url without repository: {project_url}"
            )));
        };
        if namespace.is_empty() {
            return Err(Error::InvalidInput(format!(
                "project url without namespace: {project_url}"
            )));
        }
        let instance_url = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        Ok(Self::new(
            ForgeKind::from_host(host),
            instance_url,
            namespace.join("/"),
            repo.trim_end_matches(".git"),
        ))
    }

    pub fn host(&self) -> &str {
        self.instance_url
            .split_once("://")
            .map(|(_, host)| host)
            .unwrap_or(&self.instance_url)
    }

    /// `namespace/repo`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.repo)
    }

    pub fn project_url(&self) -> String {
        format!("{}/{}/{}", self.instance_url, self.namespace, self.repo)
    }

    pub fn clone_url(&self) -> String {
        format!("{}.git", self.project_url())
    }

    /// Allowlist path of the namespace, e.g. `github.com/packit`.
    pub fn namespace_path(&self) -> String {
        format!("{}/{}", self.host(), self.namespace)
    }

    /// Allowlist path of the repository, e.g. `github.com/packit/ogr.git`.
    pub fn repo_path(&self) -> String {
        format!("{}/{}/{}.git", self.host(), self.namespace, self.repo)
    }
}

impl std::fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.project_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_github_url() {
        let project = ProjectRef::from_url("https://github.com/packit/ogr.git").unwrap();
        assert_eq!(project.forge, ForgeKind::Github);
        assert_eq!(project.namespace, "packit");
        assert_eq!(project.repo, "ogr");
        assert_eq!(project.project_url(), "https://github.com/packit/ogr");
        assert_eq!(project.namespace_path(), "github.com/packit");
        assert_eq!(project.repo_path(), "github.com/packit/ogr.git");
    }

    #[test]
    fn test_from_gitlab_subgroup_url() {
        let project = ProjectRef::from_url("https://gitlab.com/redhat/centos-stream/rpms/bash")
            .unwrap();
        assert_eq!(project.forge, ForgeKind::Gitlab);
        assert_eq!(project.namespace, "redhat/centos-stream/rpms");
        assert_eq!(project.full_name(), "redhat/centos-stream/rpms/bash");
    }

    #[test]
    fn test_from_dist_git_url() {
        let project = ProjectRef::from_url("https://src.fedoraproject.org/rpms/python-ogr").unwrap();
        assert_eq!(project.forge, ForgeKind::Pagure);
        assert_eq!(project.host(), "src.fedoraproject.org");
    }

    #[test]
    fn test_rejects_urls_without_namespace() {
        assert!(ProjectRef::from_url("https://github.com/packit").is_err());
        assert!(ProjectRef::from_url("not a url").is_err());
    }
}
