//! Service configuration.
//!
//! Read from the KDL file named by `DISTBOT_CONFIG`; secrets and the
//! database URL can be overridden from the environment.

use crate::kdl_ext::{
    all_string_args, children, first_bool_arg, first_int_arg, first_string_arg,
    string_prop,
};
use crate::{ConfigError, ConfigResult};
use distbot_core::ForgeKind;
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/distbot/config.kdl";

/// Credentials for one forge instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeInstance {
    pub kind: ForgeKind,
    /// Web URL, e.g. `https://gitlab.com`.
    pub instance_url: String,
    pub token: Option<String>,
    /// GitHub webhook secret or GitLab webhook token.
    pub webhook_secret: Option<String>,
}

impl ForgeInstance {
    pub fn host(&self) -> &str {
        self.instance_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoprConfig {
    pub url: String,
    /// Owner of projects created without an explicit `owner`.
    pub owner: String,
    pub login: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KojiConfig {
    pub web_url: String,
    pub logs_url: String,
    /// CLI used to submit builds.
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub deployment: String,
    /// Public base URL of this service, used in notification callbacks.
    pub server_name: String,
    pub bind: String,
    pub database_url: Option<String>,
    pub comment_prefix: String,
    pub allow_private_repositories: bool,
    pub retry_limit: u32,
    /// Accounts allowed to run jobs in any project.
    pub admins: Vec<String>,
    /// Installers whose namespaces are approved automatically.
    pub trusted_accounts: Vec<String>,
    pub workers: usize,
    pub forges: Vec<ForgeInstance>,
    pub copr: CoprConfig,
    pub koji: KojiConfig,
    pub bodhi: EndpointConfig,
    pub testing_farm: EndpointConfig,
    /// Shared secret Testing Farm notifications are checked against.
    pub testing_farm_secret: Option<String>,
    pub image_builder: EndpointConfig,
    /// Namespace on the dist-git forge holding forks used for sync pull requests.
    pub dist_git_fork_namespace: Option<String>,
    pub work_dir: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            deployment: "dev".to_string(),
            server_name: "localhost:8080".to_string(),
            bind: "0.0.0.0:8080".to_string(),
            database_url: None,
            comment_prefix: "/distbot".to_string(),
            allow_private_repositories: false,
            retry_limit: 2,
            admins: Vec::new(),
            trusted_accounts: Vec::new(),
            workers: 4,
            forges: vec![
                ForgeInstance {
                    kind: ForgeKind::Github,
                    instance_url: "https://github.com".to_string(),
                    token: None,
                    webhook_secret: None,
                },
                ForgeInstance {
                    kind: ForgeKind::Pagure,
                    instance_url: "https://src.fedoraproject.org".to_string(),
                    token: None,
                    webhook_secret: None,
                },
            ],
            copr: CoprConfig {
                url: "https://copr.fedorainfracloud.org".to_string(),
                owner: "distbot".to_string(),
                login: None,
                token: None,
            },
            koji: KojiConfig {
                web_url: "https://koji.fedoraproject.org".to_string(),
                logs_url: "https://kojipkgs.fedoraproject.org".to_string(),
                command: "koji".to_string(),
            },
            bodhi: EndpointConfig {
                url: "https://bodhi.fedoraproject.org".to_string(),
                token: None,
            },
            testing_farm: EndpointConfig {
                url: "https://api.testing-farm.io/v0.1".to_string(),
                token: None,
            },
            testing_farm_secret: None,
            image_builder: EndpointConfig {
                url: "https://console.redhat.com/api/image-builder/v1".to_string(),
                token: None,
            },
            dist_git_fork_namespace: None,
            work_dir: "/tmp/distbot".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load from `DISTBOT_CONFIG` (or the default path) and apply
    /// environment overrides. A missing file yields the defaults.
    pub fn load() -> ConfigResult<Self> {
        let path =
            std::env::var("DISTBOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::parse(&std::fs::read_to_string(&path)?)?
        } else {
            tracing::warn!(path = %path, "Service config not found, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(kdl: &str) -> ConfigResult<Self> {
        let doc: KdlDocument = kdl.parse()?;
        let mut config = Self::default();

        for node in doc.nodes() {
            match node.name().value() {
                "service" => config.parse_service(node)?,
                "database" => config.database_url = string_prop(node, "url"),
                "github" | "gitlab" | "pagure" => config.set_forge(parse_forge(node)?),
                "copr" => {
                    if let Some(url) = string_prop(node, "url") {
                        config.copr.url = url;
                    }
                    if let Some(owner) = string_prop(node, "owner") {
                        config.copr.owner = owner;
                    }
                    config.copr.login = string_prop(node, "login");
                    config.copr.token = string_prop(node, "token");
                }
                "koji" => {
                    if let Some(url) = string_prop(node, "web-url") {
                        config.koji.web_url = url;
                    }
                    if let Some(url) = string_prop(node, "logs-url") {
                        config.koji.logs_url = url;
                    }
                    if let Some(command) = string_prop(node, "command") {
                        config.koji.command = command;
                    }
                }
                "bodhi" => parse_endpoint(node, &mut config.bodhi),
                "testing-farm" => {
                    parse_endpoint(node, &mut config.testing_farm);
                    config.testing_farm_secret = string_prop(node, "secret");
                }
                "image-builder" => parse_endpoint(node, &mut config.image_builder),
                _ => {}
            }
        }

        if config.comment_prefix.is_empty() {
            return Err(ConfigError::invalid("comment-prefix", "must not be empty"));
        }
        Ok(config)
    }

    fn parse_service(&mut self, node: &KdlNode) -> ConfigResult<()> {
        for child in children(node) {
            match child.name().value() {
                "deployment" => set_string(child, &mut self.deployment),
                "server-name" => set_string(child, &mut self.server_name),
                "bind" => set_string(child, &mut self.bind),
                "comment-prefix" => set_string(child, &mut self.comment_prefix),
                "work-dir" => set_string(child, &mut self.work_dir),
                "dist-git-fork-namespace" => self.dist_git_fork_namespace = first_string_arg(child),
                "allow-private-repositories" => {
                    self.allow_private_repositories = first_bool_arg(child).unwrap_or(true)
                }
                "retry-limit" => self.retry_limit = int_arg(child, "retry-limit")?,
                "workers" => self.workers = int_arg(child, "workers")?,
                "admins" => self.admins = all_string_args(child),
                "trusted-accounts" => self.trusted_accounts = all_string_args(child),
                _ => {}
            }
        }
        Ok(())
    }

    fn set_forge(&mut self, forge: ForgeInstance) {
        match self
            .forges
            .iter_mut()
            .find(|f| f.instance_url == forge.instance_url)
        {
            Some(existing) => *existing = forge,
            None => self.forges.push(forge),
        }
    }

    /// Override secrets from the environment. `lookup` is `std::env::var`
    /// outside of tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(bind) = lookup("DISTBOT_BIND") {
            self.bind = bind;
        }
        for forge in &mut self.forges {
            let prefix = match forge.kind {
                ForgeKind::Github => "DISTBOT_GITHUB",
                ForgeKind::Gitlab => "DISTBOT_GITLAB",
                ForgeKind::Pagure => "DISTBOT_PAGURE",
            };
            if let Some(token) = lookup(&format!("{}_TOKEN", prefix)) {
                forge.token = Some(token);
            }
            if let Some(secret) = lookup(&format!("{}_WEBHOOK_SECRET", prefix)) {
                forge.webhook_secret = Some(secret);
            }
        }
        if let Some(token) = lookup("DISTBOT_COPR_TOKEN") {
            self.copr.token = Some(token);
        }
        if let Some(token) = lookup("DISTBOT_BODHI_TOKEN") {
            self.bodhi.token = Some(token);
        }
        if let Some(token) = lookup("DISTBOT_TESTING_FARM_TOKEN") {
            self.testing_farm.token = Some(token);
        }
        if let Some(secret) = lookup("DISTBOT_TESTING_FARM_SECRET") {
            self.testing_farm_secret = Some(secret);
        }
        if let Some(token) = lookup("DISTBOT_IMAGE_BUILDER_TOKEN") {
            self.image_builder.token = Some(token);
        }
    }

    /// Forge instance serving `host`.
    pub fn forge(&self, host: &str) -> Option<&ForgeInstance> {
        self.forges.iter().find(|f| f.host() == host)
    }

    pub fn forge_of_kind(&self, kind: ForgeKind) -> Option<&ForgeInstance> {
        self.forges.iter().find(|f| f.kind == kind)
    }

    pub fn is_admin(&self, login: &str) -> bool {
        self.admins.iter().any(|a| a == login)
    }
}

fn parse_forge(node: &KdlNode) -> ConfigResult<ForgeInstance> {
    let kind: ForgeKind = node
        .name()
        .value()
        .parse()
        .map_err(|e: String| ConfigError::invalid("forge", e))?;
    let default_url = match kind {
        ForgeKind::Github => "https://github.com",
        ForgeKind::Gitlab => "https://gitlab.com",
        ForgeKind::Pagure => "https://src.fedoraproject.org",
    };
    Ok(ForgeInstance {
        kind,
        instance_url: string_prop(node, "instance")
            .unwrap_or_else(|| default_url.to_string())
            .trim_end_matches('/')
            .to_string(),
        token: string_prop(node, "token"),
        webhook_secret: string_prop(node, "webhook-secret")
            .or_else(|| string_prop(node, "webhook-token")),
    })
}

fn parse_endpoint(node: &KdlNode, endpoint: &mut EndpointConfig) {
    if let Some(url) = string_prop(node, "url") {
        endpoint.url = url;
    }
    endpoint.token = string_prop(node, "token");
}

fn set_string(node: &KdlNode, target: &mut String) {
    if let Some(value) = first_string_arg(node) {
        *target = value;
    }
}

fn int_arg<T: TryFrom<i128>>(node: &KdlNode, field: &str) -> ConfigResult<T> {
    first_int_arg(node)
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| ConfigError::invalid(field, "expected a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_service_config() {
        let kdl = r#"
            service {
                deployment "prod"
                comment-prefix "/packit"
                retry-limit 3
                allow-private-repositories #true
                admins "lbarcziova" "mfocko"
            }
            database url="postgres://localhost/distbot"
            gitlab instance="https://gitlab.com/" token="glpat" webhook-token="x"
            koji web-url="https://koji.stg.fedoraproject.org"
        "#;

        let config = ServiceConfig::parse(kdl).unwrap();
        assert_eq!(config.deployment, "prod");
        assert_eq!(config.comment_prefix, "/packit");
        assert_eq!(config.retry_limit, 3);
        assert!(config.allow_private_repositories);
        assert!(config.is_admin("mfocko"));
        assert!(!config.is_admin("someone"));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/distbot"));
        assert_eq!(config.koji.web_url, "https://koji.stg.fedoraproject.org");
        assert_eq!(config.koji.logs_url, "https://kojipkgs.fedoraproject.org");

        let gitlab = config.forge("gitlab.com").unwrap();
        assert_eq!(gitlab.kind, ForgeKind::Gitlab);
        assert_eq!(gitlab.token.as_deref(), Some("glpat"));
        assert_eq!(gitlab.webhook_secret.as_deref(), Some("x"));
        assert!(config.forge("github.com").is_some());
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::parse("").unwrap();
        assert_eq!(config.comment_prefix, "/distbot");
        assert_eq!(config.retry_limit, 2);
        assert!(!config.allow_private_repositories);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://db/distbot"),
            ("DISTBOT_GITHUB_WEBHOOK_SECRET", "s3cret"),
            ("DISTBOT_COPR_TOKEN", "copr-token"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database_url.as_deref(), Some("postgres://db/distbot"));
        assert_eq!(config.copr.token.as_deref(), Some("copr-token"));
        assert_eq!(
            config
                .forge_of_kind(ForgeKind::Github)
                .and_then(|f| f.webhook_secret.as_deref()),
            Some("s3cret")
        );
    }

    #[test]
    fn test_invalid_retry_limit() {
        let result = ServiceConfig::parse(r#"service { retry-limit "two" }"#);
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidValue { .. }));
    }
}
