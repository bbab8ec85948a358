use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::error::LauncherError;

/// Supported server distributions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServerFlavor {
    Vanilla,
    Paper,
    Purpur,
    Fabric,
    Forge,
    NeoForge,
}

impl ServerFlavor {
    pub const ALL: [ServerFlavor; 6] = [
        ServerFlavor::Vanilla,
        ServerFlavor::Paper,
        ServerFlavor::Purpur,
        ServerFlavor::Fabric,
        ServerFlavor::Forge,
        ServerFlavor::NeoForge,
    ];

    /// Flavors whose download is an installer that has to be run locally.
    pub fn needs_local_installer(self) -> bool {
        matches!(self, ServerFlavor::Forge | ServerFlavor::NeoForge)
    }

    /// Fixed name the downloaded artifact gets inside the install directory.
    pub fn artifact_file_name(self) -> &'static str {
        if self.needs_local_installer() {
            "forge-installer.jar"
        } else {
            "server.jar"
        }
    }
}

impl fmt::Display for ServerFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerFlavor::Vanilla => write!(f, "vanilla"),
            ServerFlavor::Paper => write!(f, "paper"),
            ServerFlavor::Purpur => write!(f, "purpur"),
            ServerFlavor::Fabric => write!(f, "fabric"),
            ServerFlavor::Forge => write!(f, "forge"),
            ServerFlavor::NeoForge => write!(f, "neoforge"),
        }
    }
}

impl FromStr for ServerFlavor {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vanilla" => Ok(ServerFlavor::Vanilla),
            "paper" => Ok(ServerFlavor::Paper),
            "purpur" => Ok(ServerFlavor::Purpur),
            "fabric" => Ok(ServerFlavor::Fabric),
            "forge" => Ok(ServerFlavor::Forge),
            "neoforge" => Ok(ServerFlavor::NeoForge),
            other => Err(LauncherError::Unsupported(format!(
                "unknown server flavor: {other}"
            ))),
        }
    }
}

/// `server.properties` entries, kept in the order the caller supplied them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerProperties(Vec<(String, String)>);

impl ServerProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `key=value` lines, newline terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter() {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ServerProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Serialize for ServerProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for ServerProperties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = ServerProperties;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of server.properties keys to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    entries.push((key, value));
                }
                Ok(ServerProperties(entries))
            }
        }

        deserializer.deserialize_map(PropertiesVisitor)
    }
}

fn default_memory_mb() -> u32 {
    4096
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOptions {
    #[serde(default)]
    pub accept_eula: bool,
    #[serde(default)]
    pub create_start_script: bool,
    #[serde(default = "default_memory_mb", alias = "memory")]
    pub memory_mb: u32,
    #[serde(default)]
    pub gui: bool,
    #[serde(default)]
    pub auto_provision_java: bool,
    #[serde(default)]
    pub server_properties: ServerProperties,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            accept_eula: false,
            create_start_script: false,
            memory_mb: default_memory_mb(),
            gui: false,
            auto_provision_java: false,
            server_properties: ServerProperties::default(),
        }
    }
}

/// Everything one installation run needs. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallConfig {
    #[serde(alias = "serverType")]
    pub flavor: ServerFlavor,
    pub version: String,
    pub install_path: PathBuf,
    #[serde(default)]
    pub options: InstallOptions,
}

/// Successful installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub install_path: PathBuf,
    /// Server jar, or for args-file launches (modern Forge) the args file.
    pub jar: PathBuf,
    pub java: Option<PathBuf>,
    pub start_script: Option<PathBuf>,
}

/// Caller-facing summary, `{success, path, jar}` or `{success:false, error}`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum InstallReport {
    Installed {
        success: bool,
        path: PathBuf,
        jar: PathBuf,
    },
    Failed {
        success: bool,
        error: String,
    },
}

impl From<Result<InstallResult, LauncherError>> for InstallReport {
    fn from(result: Result<InstallResult, LauncherError>) -> Self {
        match result {
            Ok(installed) => InstallReport::Installed {
                success: true,
                path: installed.install_path,
                jar: installed.jar,
            },
            Err(err) => InstallReport::Failed {
                success: false,
                error: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_round_trips_through_strings() {
        for flavor in ServerFlavor::ALL {
            assert_eq!(flavor.to_string().parse::<ServerFlavor>().unwrap(), flavor);
        }
        assert_eq!("Paper".parse::<ServerFlavor>().unwrap(), ServerFlavor::Paper);
        assert!("quilt".parse::<ServerFlavor>().is_err());
    }

    #[test]
    fn artifact_names_depend_on_flavor() {
        assert_eq!(ServerFlavor::Paper.artifact_file_name(), "server.jar");
        assert_eq!(ServerFlavor::Forge.artifact_file_name(), "forge-installer.jar");
        assert_eq!(
            ServerFlavor::NeoForge.artifact_file_name(),
            "forge-installer.jar"
        );
    }

    #[test]
    fn properties_keep_json_order_and_values() {
        let json = r#"{
            "flavor": "paper",
            "version": "1.20.4",
            "installPath": "/srv/mc",
            "options": {
                "acceptEula": true,
                "serverProperties": {
                    "motd": "hello = world",
                    "max-players": 20,
                    "difficulty": "hard",
                    "custom.unknown-key": "x"
                }
            }
        }"#;
        let config: InstallConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.options.memory_mb, 4096);
        assert!(config.options.accept_eula);
        assert_eq!(
            config.options.server_properties.render(),
            "motd=hello = world\nmax-players=20\ndifficulty=hard\ncustom.unknown-key=x\n"
        );
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let json = r#"{
            "serverType": "vanilla",
            "version": "1.20.4",
            "installPath": "/srv/mc",
            "options": { "memory": 2048, "gui": true }
        }"#;
        let config: InstallConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.flavor, ServerFlavor::Vanilla);
        assert_eq!(config.options.memory_mb, 2048);
        assert!(config.options.gui);
    }

    #[test]
    fn report_shapes() {
        let ok = InstallReport::from(Ok(InstallResult {
            install_path: PathBuf::from("/srv"),
            jar: PathBuf::from("/srv/server.jar"),
            java: None,
            start_script: None,
        }));
        let value = serde_json::to_value(ok).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["jar"], "/srv/server.jar");

        let failed = InstallReport::from(Err(LauncherError::Unsupported("x".into())));
        let value = serde_json::to_value(failed).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Unsupported: x");
    }
}
