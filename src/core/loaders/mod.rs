pub mod context;
pub mod fabric;
pub mod forge;
pub mod installer;
pub mod paper;
pub mod purpur;
pub mod vanilla;

pub use context::{FinalizeContext, ResolveContext};
pub use fabric::DEFAULT_FABRIC_INSTALLER_VERSION;
pub use installer::{Finalized, FlavorHandler, FlavorInstaller, ResolvedArtifact};
