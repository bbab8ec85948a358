use std::path::Path;

use crate::core::launch::JarRunner;
use crate::core::progress::ProgressReporter;
use crate::core::server::InstallOptions;
use crate::core::version::VersionCatalog;

/// Inputs for turning `{flavor, version}` into a download URL.
pub struct ResolveContext<'a> {
    pub version: &'a str,
    pub catalog: &'a VersionCatalog,
}

/// Inputs for turning the downloaded artifact into a runnable server.
pub struct FinalizeContext<'a> {
    pub version: &'a str,
    pub install_dir: &'a Path,
    /// Downloaded artifact, already at its fixed name inside `install_dir`.
    pub artifact: &'a Path,
    /// Provisioned java, `None` to rely on `java` from `PATH`.
    pub java: Option<&'a Path>,
    pub options: &'a InstallOptions,
    pub runner: &'a dyn JarRunner,
    pub progress: &'a ProgressReporter,
}
