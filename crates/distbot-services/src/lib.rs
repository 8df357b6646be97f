//! Clients for the external services distbot talks to.
//!
//! Each client implements one of the traits declared in
//! `distbot_core::backends` or `distbot_core::forge`:
//! - Forges: GitHub, GitLab, Pagure (dist-git)
//! - Builds: Copr (REST), Koji (CLI)
//! - Releases: Bodhi, dist-git release sync (git CLI)
//! - Tests and images: Testing Farm, image builder

pub mod bodhi;
pub mod copr;
pub mod error;
pub mod forge;
mod http;
pub mod image_builder;
pub mod koji;
pub mod sync;
pub mod testing_farm;

pub use bodhi::BodhiClient;
pub use copr::CoprClient;
pub use error::{ServiceError, ServiceResult};
pub use forge::Forges;
pub use image_builder::ImageBuilderClient;
pub use koji::KojiCli;
pub use sync::DistGitSyncer;
pub use testing_farm::TestingFarmClient;
