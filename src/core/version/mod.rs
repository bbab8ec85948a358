pub mod catalog;
pub mod game_version;
pub mod manifest;
pub mod vendors;

pub use catalog::{Lookup, VersionCatalog, VersionDescriptor, VersionDetail, FALLBACK_VERSIONS};
pub use game_version::GameVersion;
pub use manifest::{VersionDetails, VersionEntry, VersionManifest};
