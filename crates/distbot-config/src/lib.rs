//! KDL configuration parsing for distbot.
//!
//! This crate handles parsing of:
//! - Package configuration (`.distbot.kdl` in a project repository)
//! - Service configuration (`DISTBOT_CONFIG`)
//! - Dist-git branch and build target aliases

pub mod aliases;
pub mod error;
mod kdl_ext;
pub mod package;
pub mod service;

pub use error::{ConfigError, ConfigResult};
pub use package::{PACKAGE_CONFIG_FILE, parse_package_config};
pub use service::ServiceConfig;
