// ─── Vendor APIs ───
// Endpoints and response shapes of the non-Mojang distributions.

use std::collections::HashMap;

use serde::Deserialize;

use super::game_version::GameVersion;

pub const PAPER_API_BASE: &str = "https://api.papermc.io/v2/projects/paper";
pub const PURPUR_API_BASE: &str = "https://api.purpurmc.org/v2/purpur";
pub const FABRIC_META_BASE: &str = "https://meta.fabricmc.net/v2";
pub const FORGE_MAVEN: &str = "https://maven.minecraftforge.net";
pub const FORGE_PROMOTIONS_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";
pub const NEOFORGE_MAVEN: &str = "https://maven.neoforged.net/releases";
pub const NEOFORGE_VERSIONS_URL: &str =
    "https://maven.neoforged.net/api/maven/versions/releases/net/neoforged/neoforge";

// ── Paper ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PaperProject {
    #[serde(default)]
    pub versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaperVersion {
    #[serde(default)]
    pub builds: Vec<u64>,
}

// ── Purpur ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PurpurProject {
    #[serde(default)]
    pub versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PurpurVersion {
    pub builds: PurpurBuilds,
}

#[derive(Debug, Deserialize)]
pub struct PurpurBuilds {
    pub latest: Option<String>,
    #[serde(default)]
    pub all: Vec<String>,
}

// ── Fabric ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FabricGameVersion {
    pub version: String,
    pub stable: bool,
}

#[derive(Debug, Deserialize)]
pub struct FabricLoaderVersion {
    pub version: String,
    #[serde(default)]
    pub stable: bool,
}

// ── Forge ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ForgePromotions {
    #[serde(default)]
    pub promos: HashMap<String, String>,
}

/// Promoted Forge builds for one game version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForgePromotion {
    pub recommended: Option<String>,
    pub latest: Option<String>,
}

impl ForgePromotion {
    /// Recommended wins over latest.
    pub fn preferred(&self) -> Option<&str> {
        self.recommended.as_deref().or(self.latest.as_deref())
    }

    /// Distinct builds, newest first.
    pub fn builds(&self) -> Vec<String> {
        let mut out = Vec::new();
        for build in [&self.latest, &self.recommended].into_iter().flatten() {
            if !out.contains(build) {
                out.push(build.clone());
            }
        }
        out
    }
}

impl ForgePromotions {
    /// Groups `"<mc>-recommended"` / `"<mc>-latest"` keys by game version.
    pub fn by_game_version(&self) -> HashMap<String, ForgePromotion> {
        let mut grouped: HashMap<String, ForgePromotion> = HashMap::new();
        for (key, build) in &self.promos {
            if let Some(mc) = key.strip_suffix("-recommended") {
                grouped.entry(mc.to_string()).or_default().recommended = Some(build.clone());
            } else if let Some(mc) = key.strip_suffix("-latest") {
                grouped.entry(mc.to_string()).or_default().latest = Some(build.clone());
            }
        }
        grouped
    }
}

pub fn forge_installer_url(game_version: &str, forge_version: &str) -> String {
    let forge_id = format!("{}-{}", game_version, forge_version);
    format!(
        "{}/net/minecraftforge/forge/{}/forge-{}-installer.jar",
        FORGE_MAVEN, forge_id, forge_id
    )
}

// ── NeoForge ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NeoForgeVersions {
    #[serde(default)]
    pub versions: Vec<String>,
}

/// Game version a NeoForge release targets: `20.4.80-beta` -> `1.20.4`,
/// `21.0.167` -> `1.21`.
pub fn neoforge_game_version(neoforge_version: &str) -> Option<String> {
    let mut parts = neoforge_version.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    if major < 20 {
        return None;
    }
    Some(GameVersion::new(1, major, minor).to_string())
}

pub fn neoforge_installer_url(neoforge_version: &str) -> String {
    format!(
        "{}/net/neoforged/neoforge/{}/neoforge-{}-installer.jar",
        NEOFORGE_MAVEN, neoforge_version, neoforge_version
    )
}
