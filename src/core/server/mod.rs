pub mod files;
pub mod installer;
pub mod model;

pub use installer::ServerInstaller;
pub use model::{
    InstallConfig, InstallOptions, InstallReport, InstallResult, ServerFlavor, ServerProperties,
};
