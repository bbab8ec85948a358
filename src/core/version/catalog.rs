// ─── Version Catalog ───
// Lists versions and builds per flavor. Metadata fetches retry with linear
// backoff and degrade to `Lookup::Unavailable` instead of failing.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::http::{fetch_json_with_retry, FetchExhausted, HttpTransport, RetryPolicy};
use crate::core::server::ServerFlavor;

use super::game_version::sort_newest_first;
use super::manifest::{VersionDetails, VersionManifest, VERSION_MANIFEST_URL};
use super::vendors::{
    neoforge_game_version, FabricGameVersion, FabricLoaderVersion, ForgePromotion,
    ForgePromotions, NeoForgeVersions, PaperProject, PaperVersion, PurpurProject, PurpurVersion,
    FABRIC_META_BASE, FORGE_PROMOTIONS_URL, NEOFORGE_VERSIONS_URL, PAPER_API_BASE,
    PURPUR_API_BASE,
};

/// Shown when the catalog cannot be reached or has nothing to offer.
pub const FALLBACK_VERSIONS: [&str; 4] = ["1.20.4", "1.20.2", "1.20.1", "1.19.4"];

/// Result of a catalog query. `Unavailable` is a normal outcome: the vendor
/// could not be reached and the caller decides on a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Available(Vec<T>),
    Unavailable { reason: String },
}

impl<T> Lookup<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Lookup::Available(_))
    }

    /// Items, or empty when unavailable.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Lookup::Available(items) => items,
            Lookup::Unavailable { .. } => Vec::new(),
        }
    }

    /// Items, or the reason the vendor could not be reached.
    pub fn into_result(self) -> Result<Vec<T>, String> {
        match self {
            Lookup::Available(items) => Ok(items),
            Lookup::Unavailable { reason } => Err(reason),
        }
    }
}

impl<T> From<Result<Vec<T>, FetchExhausted>> for Lookup<T> {
    fn from(result: Result<Vec<T>, FetchExhausted>) -> Self {
        match result {
            Ok(items) => Lookup::Available(items),
            Err(err) => Lookup::Unavailable {
                reason: err.to_string(),
            },
        }
    }
}

/// Flavor-specific data attached to a listed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionDetail {
    /// Vanilla: URL of the per-version details JSON.
    Manifest { url: String },
    /// Paper / Purpur: builds are listed separately.
    Project,
    /// Fabric: stable game versions only. Loaders are listed as builds.
    Fabric,
    Forge { promotion_recommended: Option<String>, promotion_latest: Option<String> },
    NeoForge { newest_build: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDescriptor {
    pub id: String,
    pub detail: VersionDetail,
}

pub struct VersionCatalog {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl VersionCatalog {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchExhausted> {
        fetch_json_with_retry(self.transport.as_ref(), url, &self.retry).await
    }

    // ── Versions ────────────────────────────────────────

    /// Available versions, newest first.
    pub async fn list_versions(&self, flavor: ServerFlavor) -> Lookup<VersionDescriptor> {
        info!("Listing {} versions", flavor);
        let lookup = match flavor {
            ServerFlavor::Vanilla => self.vanilla_versions().await,
            ServerFlavor::Paper => self
                .fetch::<PaperProject>(PAPER_API_BASE)
                .await
                .map(|p| project_versions(p.versions))
                .into(),
            ServerFlavor::Purpur => self
                .fetch::<PurpurProject>(PURPUR_API_BASE)
                .await
                .map(|p| project_versions(p.versions))
                .into(),
            ServerFlavor::Fabric => self.fabric_versions().await,
            ServerFlavor::Forge => self.forge_versions().await,
            ServerFlavor::NeoForge => self.neoforge_versions().await,
        };

        match &lookup {
            Lookup::Available(items) => debug!("{} {} versions listed", items.len(), flavor),
            Lookup::Unavailable { reason } => info!("{} catalog unavailable: {}", flavor, reason),
        }
        lookup
    }

    /// Version ids, or [`FALLBACK_VERSIONS`] when nothing could be listed.
    pub async fn versions_or_fallback(&self, flavor: ServerFlavor) -> Vec<String> {
        let ids: Vec<String> = self
            .list_versions(flavor)
            .await
            .into_vec()
            .into_iter()
            .map(|v| v.id)
            .collect();

        if ids.is_empty() {
            FALLBACK_VERSIONS.iter().map(|v| v.to_string()).collect()
        } else {
            ids
        }
    }

    async fn vanilla_versions(&self) -> Lookup<VersionDescriptor> {
        self.vanilla_manifest()
            .await
            .map(|manifest| {
                manifest
                    .releases()
                    .map(|entry| VersionDescriptor {
                        id: entry.id.clone(),
                        detail: VersionDetail::Manifest {
                            url: entry.url.clone(),
                        },
                    })
                    .collect()
            })
            .into()
    }

    async fn fabric_versions(&self) -> Lookup<VersionDescriptor> {
        let url = format!("{}/versions/game", FABRIC_META_BASE);
        self.fetch::<Vec<FabricGameVersion>>(&url)
            .await
            .map(|versions| {
                versions
                    .into_iter()
                    .filter(|v| v.stable)
                    .map(|v| VersionDescriptor {
                        id: v.version,
                        detail: VersionDetail::Fabric,
                    })
                    .collect()
            })
            .into()
    }

    async fn forge_versions(&self) -> Lookup<VersionDescriptor> {
        self.forge_promotions()
            .await
            .map(|promotions| {
                let grouped = promotions.by_game_version();
                let mut ids: Vec<String> = grouped.keys().cloned().collect();
                sort_newest_first(&mut ids);
                ids.into_iter()
                    .map(|id| {
                        let promotion = grouped.get(&id).cloned().unwrap_or_default();
                        VersionDescriptor {
                            id,
                            detail: VersionDetail::Forge {
                                promotion_recommended: promotion.recommended,
                                promotion_latest: promotion.latest,
                            },
                        }
                    })
                    .collect()
            })
            .into()
    }

    async fn neoforge_versions(&self) -> Lookup<VersionDescriptor> {
        self.neoforge_builds_all()
            .await
            .map(|builds| {
                let mut out: Vec<VersionDescriptor> = Vec::new();
                for build in builds {
                    let Some(game) = neoforge_game_version(&build) else {
                        continue;
                    };
                    if out.iter().any(|v| v.id == game) {
                        continue;
                    }
                    out.push(VersionDescriptor {
                        id: game,
                        detail: VersionDetail::NeoForge {
                            newest_build: build,
                        },
                    });
                }
                out.sort_by(|a, b| {
                    let a = super::GameVersion::parse(&a.id);
                    let b = super::GameVersion::parse(&b.id);
                    b.cmp(&a)
                });
                out
            })
            .into()
    }

    // ── Builds ──────────────────────────────────────────

    /// Build identifiers for `version`, newest first.
    pub async fn list_builds(&self, flavor: ServerFlavor, version: &str) -> Lookup<String> {
        match flavor {
            ServerFlavor::Vanilla => Lookup::Available(Vec::new()),
            ServerFlavor::Paper => self.paper_builds(version).await,
            ServerFlavor::Purpur => self
                .purpur_version(version)
                .await
                .map(|v| v.builds.all.into_iter().rev().collect())
                .into(),
            ServerFlavor::Fabric => self.fabric_stable_loaders().await,
            ServerFlavor::Forge => match self.forge_promotion(version).await {
                Ok(promotion) => Lookup::Available(promotion.builds()),
                Err(err) => Lookup::Unavailable {
                    reason: err.to_string(),
                },
            },
            ServerFlavor::NeoForge => self
                .neoforge_builds_all()
                .await
                .map(|builds| {
                    builds
                        .into_iter()
                        .filter(|b| neoforge_game_version(b).as_deref() == Some(version))
                        .collect()
                })
                .into(),
        }
    }

    pub async fn paper_builds(&self, version: &str) -> Lookup<String> {
        self.paper_version(version)
            .await
            .map(|v| v.builds.iter().rev().map(u64::to_string).collect())
            .into()
    }

    // ── Raw vendor lookups used by the resolvers ────────

    pub async fn vanilla_manifest(&self) -> Result<VersionManifest, FetchExhausted> {
        self.fetch(VERSION_MANIFEST_URL).await
    }

    pub async fn vanilla_details(&self, url: &str) -> Result<VersionDetails, FetchExhausted> {
        self.fetch(url).await
    }

    pub async fn paper_version(&self, version: &str) -> Result<PaperVersion, FetchExhausted> {
        self.fetch(&format!("{}/versions/{}", PAPER_API_BASE, version))
            .await
    }

    pub async fn purpur_version(&self, version: &str) -> Result<PurpurVersion, FetchExhausted> {
        self.fetch(&format!("{}/{}", PURPUR_API_BASE, version)).await
    }

    /// Stable loader versions, newest first.
    pub async fn fabric_stable_loaders(&self) -> Lookup<String> {
        let url = format!("{}/versions/loader", FABRIC_META_BASE);
        self.fetch::<Vec<FabricLoaderVersion>>(&url)
            .await
            .map(|loaders| {
                loaders
                    .into_iter()
                    .filter(|l| l.stable)
                    .map(|l| l.version)
                    .collect()
            })
            .into()
    }

    pub async fn forge_promotions(&self) -> Result<ForgePromotions, FetchExhausted> {
        self.fetch(FORGE_PROMOTIONS_URL).await
    }

    pub async fn forge_promotion(&self, version: &str) -> Result<ForgePromotion, FetchExhausted> {
        let promotions = self.forge_promotions().await?;
        Ok(promotions
            .by_game_version()
            .remove(version)
            .unwrap_or_default())
    }

    /// Every NeoForge release, newest first.
    pub async fn neoforge_builds_all(&self) -> Result<Vec<String>, FetchExhausted> {
        let listing: NeoForgeVersions = self.fetch(NEOFORGE_VERSIONS_URL).await?;
        Ok(listing.versions.into_iter().rev().collect())
    }
}

/// Paper and Purpur list versions oldest first.
fn project_versions(mut versions: Vec<String>) -> Vec<VersionDescriptor> {
    versions.reverse();
    versions
        .into_iter()
        .map(|id| VersionDescriptor {
            id,
            detail: VersionDetail::Project,
        })
        .collect()
}
