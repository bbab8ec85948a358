// ─── Version Manifest ───
// Mojang version manifest v2 and the per-version details it points to.

use serde::Deserialize;

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Top-level Mojang version manifest.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionEntry>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    /// Per-version details JSON.
    pub url: String,
}

impl VersionManifest {
    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Release entries only, in manifest order (newest first).
    pub fn releases(&self) -> impl Iterator<Item = &VersionEntry> {
        self.versions.iter().filter(|v| v.version_type == "release")
    }
}

/// The part of a version's details JSON the installer cares about.
#[derive(Debug, Deserialize)]
pub struct VersionDetails {
    #[serde(default)]
    pub downloads: VersionDownloads,
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionDownloads {
    pub server: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_skip_snapshots() {
        let json = r#"{
            "latest": {"release": "1.20.4", "snapshot": "24w01a"},
            "versions": [
                {"id": "24w01a", "type": "snapshot", "url": "https://x/24w01a.json", "releaseTime": "t"},
                {"id": "1.20.4", "type": "release", "url": "https://x/1.20.4.json", "releaseTime": "t"}
            ]
        }"#;
        let manifest: VersionManifest = serde_json::from_str(json).unwrap();
        let ids: Vec<_> = manifest.releases().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["1.20.4"]);
        assert_eq!(
            manifest.find_version("24w01a").map(|v| v.url.as_str()),
            Some("https://x/24w01a.json")
        );
    }

    #[test]
    fn details_without_server_download() {
        let details: VersionDetails =
            serde_json::from_str(r#"{"downloads": {"client": {"url": "c"}}}"#).unwrap();
        assert!(details.downloads.server.is_none());
    }
}
