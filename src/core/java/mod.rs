pub mod runtime;

pub use runtime::detect_system_java;
pub use runtime::inspect_java_binary;
pub use runtime::required_java_for_minecraft_version;
pub use runtime::JavaInstallation;
pub use runtime::RuntimeProvisioner;
pub use runtime::RuntimeRecord;
pub use runtime::DEFAULT_RUNTIME_URL_TEMPLATE;
