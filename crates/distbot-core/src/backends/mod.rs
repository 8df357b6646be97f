//! Traits for the external build, test and release services.

pub mod bodhi;
pub mod copr;
pub mod image_builder;
pub mod koji;
pub mod sync;
pub mod testing_farm;

pub use bodhi::{BodhiApi, BodhiRelease, BodhiUpdate};
pub use copr::{CoprApi, CoprScmBuild, CoprSubmittedBuild};
pub use image_builder::{ComposeStatus, ImageBuilderApi, ImageCompose};
pub use koji::KojiApi;
pub use sync::{ReleaseSyncer, SyncReleaseRequest};
pub use testing_farm::{
    CoprArtifact, TestingFarmApi, TestingFarmDetails, TestingFarmRequest,
};
