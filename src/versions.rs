// ─── Version Catalog ───
// Fetches the Mojang release list and reconciles it with the locally
// persisted cache without disturbing the user's current selection.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LauncherError, LauncherResult};
use crate::job::{JobHandle, JobRunner};

const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(Debug, Deserialize)]
struct VersionManifest {
    versions: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestEntry {
    id: String,
    #[serde(rename = "type")]
    version_type: String,
}

/// Fetch the ordered release-version list from Mojang.
///
/// No explicit timeout is applied; the transport's defaults stand. Fetch
/// failures are wrapped in the user-facing `VersionList` framing.
pub async fn fetch_release_versions(client: &reqwest::Client) -> LauncherResult<Vec<String>> {
    info!("Fetching Minecraft version manifest...");
    let response = client
        .get(VERSION_MANIFEST_URL)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|err| LauncherError::VersionList(err.to_string()))?;
    let manifest: VersionManifest = response
        .json()
        .await
        .map_err(|err| LauncherError::VersionList(err.to_string()))?;

    let releases: Vec<String> = manifest
        .versions
        .into_iter()
        .filter(|v| v.version_type == "release")
        .map(|v| v.id)
        .collect();
    info!("Loaded {} release versions from manifest", releases.len());
    Ok(releases)
}

/// The sole record persisted in the versions cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionCacheEntry {
    pub release_versions: Vec<String>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl VersionCacheEntry {
    /// Load the cache. Absent or malformed files are treated as no cache at
    /// all; this never raises to the caller.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Self>(&raw) {
            Ok(entry) if !entry.release_versions.is_empty() => Some(entry),
            Ok(_) => None,
            Err(err) => {
                warn!("Ignoring corrupt version cache {:?}: {}", path, err);
                None
            }
        }
    }

    /// Overwrite the cache atomically: write a sibling temp file, then
    /// rename it over the old entry.
    pub fn store(path: &Path, versions: &[String]) -> LauncherResult<()> {
        let entry = Self {
            release_versions: versions.to_vec(),
            fetched_at: Some(Utc::now()),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&entry)?;
        std::fs::write(&tmp, json).map_err(|e| LauncherError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| LauncherError::io(path, e))?;
        Ok(())
    }
}

/// Outcome of merging a fetch result into the displayed list.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The fetched list matches what is displayed; nothing to change.
    UpToDate,
    /// The displayed list was replaced; selection already re-applied.
    Updated {
        versions: Vec<String>,
        selected: Option<String>,
    },
    /// Fetch failed but cached data stands; non-fatal.
    StaleCacheKept { error: String },
    /// Fetch failed and there is nothing to show; terminal for this flow.
    Unavailable { error: String },
}

/// Controller-side view of the release list: what is displayed, what is
/// selected, and the persisted cache backing both.
pub struct VersionCatalog {
    cache_path: PathBuf,
    displayed: Vec<String>,
    selected: Option<String>,
    last_used: Option<String>,
}

impl VersionCatalog {
    pub fn new(cache_path: PathBuf, last_used: Option<String>) -> Self {
        Self {
            cache_path,
            displayed: Vec::new(),
            selected: None,
            last_used,
        }
    }

    /// Surface persisted data immediately, before any network round trip.
    /// Applies the last-used version as the initial selection when present.
    pub fn load_cached(&mut self) -> Option<&[String]> {
        let entry = VersionCacheEntry::load(&self.cache_path)?;
        info!(
            "Loaded {} versions from cache",
            entry.release_versions.len()
        );
        self.displayed = entry.release_versions;
        self.selected = self
            .last_used
            .clone()
            .filter(|v| self.displayed.iter().any(|d| d == v));
        Some(&self.displayed)
    }

    pub fn versions(&self) -> &[String] {
        &self.displayed
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Select a version; ignored if it is not in the displayed list.
    pub fn select(&mut self, version: &str) -> bool {
        if self.displayed.iter().any(|d| d == version) {
            self.selected = Some(version.to_string());
            true
        } else {
            false
        }
    }

    /// Kick off a background fetch of the release list.
    pub fn spawn_fetch(client: reqwest::Client) -> JobHandle<Vec<String>> {
        JobRunner::run(move |token| async move {
            token.checkpoint()?;
            let versions = fetch_release_versions(&client).await?;
            token.checkpoint()?;
            Ok(versions)
        })
    }

    /// Merge a completed fetch into the displayed state.
    ///
    /// An identical list only confirms freshness. A different list replaces
    /// the displayed one, preserving the current selection when it survives,
    /// else falling back to the last-used version, else clearing it. Every
    /// successful fetch refreshes the persisted cache; persistence failures
    /// are logged and swallowed.
    pub fn reconcile(&mut self, fetched: LauncherResult<Vec<String>>) -> ReconcileOutcome {
        let versions = match fetched {
            Ok(versions) => versions,
            Err(err) => {
                let error = err.to_string();
                return if self.displayed.is_empty() {
                    warn!("Version fetch failed with no cache available: {error}");
                    ReconcileOutcome::Unavailable { error }
                } else {
                    warn!("Version fetch failed; keeping cached list: {error}");
                    ReconcileOutcome::StaleCacheKept { error }
                };
            }
        };

        let outcome = if versions == self.displayed {
            info!("Cached versions are up-to-date");
            ReconcileOutcome::UpToDate
        } else {
            info!("Updating version list from network");
            self.selected = self
                .selected
                .take()
                .filter(|s| versions.iter().any(|v| v == s))
                .or_else(|| {
                    self.last_used
                        .clone()
                        .filter(|l| versions.iter().any(|v| v == l))
                });
            self.displayed = versions.clone();
            ReconcileOutcome::Updated {
                versions,
                selected: self.selected.clone(),
            }
        };

        if let Err(err) = VersionCacheEntry::store(&self.cache_path, &self.displayed) {
            warn!("Failed to save version cache: {err}");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("versions_cache.json")
    }

    fn seeded(dir: &tempfile::TempDir, versions: &[&str]) -> VersionCatalog {
        let versions: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        VersionCacheEntry::store(&cache_path(dir), &versions).unwrap();
        VersionCatalog::new(cache_path(dir), None)
    }

    #[test]
    fn absent_and_corrupt_caches_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VersionCacheEntry::load(&cache_path(&dir)).is_none());

        std::fs::write(cache_path(&dir), "{oops").unwrap();
        assert!(VersionCacheEntry::load(&cache_path(&dir)).is_none());
    }

    #[test]
    fn cache_tolerates_the_minimal_wire_shape() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(cache_path(&dir), r#"{"release_versions":["1.20.1"]}"#).unwrap();
        let entry = VersionCacheEntry::load(&cache_path(&dir)).unwrap();
        assert_eq!(entry.release_versions, vec!["1.20.1"]);
        assert!(entry.fetched_at.is_none());
    }

    #[test]
    fn identical_fetch_is_up_to_date_not_updated() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = seeded(&dir, &["1.20.1", "1.20"]);
        catalog.load_cached().unwrap();

        let outcome = catalog.reconcile(Ok(vec!["1.20.1".into(), "1.20".into()]));
        assert_eq!(outcome, ReconcileOutcome::UpToDate);
    }

    #[test]
    fn different_fetch_updates_persists_and_preserves_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = seeded(&dir, &["1.20", "1.19"]);
        catalog.load_cached().unwrap();
        assert!(catalog.select("1.19"));

        let fetched = vec!["1.21".to_string(), "1.20".to_string(), "1.19".to_string()];
        match catalog.reconcile(Ok(fetched.clone())) {
            ReconcileOutcome::Updated { versions, selected } => {
                assert_eq!(versions, fetched);
                assert_eq!(selected.as_deref(), Some("1.19"));
            }
            other => panic!("expected Updated, got {other:?}"),
        }

        // A fresh catalog instance observes the persisted update.
        let mut next = VersionCatalog::new(cache_path(&dir), None);
        assert_eq!(next.load_cached().unwrap(), fetched.as_slice());
    }

    #[test]
    fn selection_falls_back_to_last_used_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = VersionCatalog::new(cache_path(&dir), Some("1.19.4".into()));

        match catalog.reconcile(Ok(vec!["1.21".into(), "1.19.4".into()])) {
            ReconcileOutcome::Updated { selected, .. } => {
                assert_eq!(selected.as_deref(), Some("1.19.4"));
            }
            other => panic!("expected Updated, got {other:?}"),
        }
    }

    #[test]
    fn vanished_selection_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = seeded(&dir, &["1.20"]);
        catalog.load_cached().unwrap();
        assert!(catalog.select("1.20"));

        match catalog.reconcile(Ok(vec!["1.21".into()])) {
            ReconcileOutcome::Updated { selected, .. } => assert_eq!(selected, None),
            other => panic!("expected Updated, got {other:?}"),
        }
    }

    #[test]
    fn fetch_failure_keeps_stale_cache_when_populated() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = seeded(&dir, &["1.20.1"]);
        catalog.load_cached().unwrap();

        let outcome = catalog.reconcile(Err(LauncherError::VersionList("offline".into())));
        assert!(matches!(outcome, ReconcileOutcome::StaleCacheKept { .. }));
        assert_eq!(catalog.versions(), &["1.20.1".to_string()]);
    }

    #[test]
    fn fetch_failure_without_cache_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = VersionCatalog::new(cache_path(&dir), None);
        assert!(catalog.load_cached().is_none());

        let outcome = catalog.reconcile(Err(LauncherError::VersionList("offline".into())));
        assert!(matches!(outcome, ReconcileOutcome::Unavailable { .. }));
    }

    #[test]
    fn last_used_selection_applies_on_cache_load() {
        let dir = tempfile::tempdir().unwrap();
        let versions: Vec<String> = vec!["1.21".into(), "1.20.1".into()];
        VersionCacheEntry::store(&cache_path(&dir), &versions).unwrap();

        let mut catalog = VersionCatalog::new(cache_path(&dir), Some("1.20.1".into()));
        catalog.load_cached().unwrap();
        assert_eq!(catalog.selected(), Some("1.20.1"));
    }

    #[test]
    fn fetch_failures_carry_the_version_list_framing() {
        let err = LauncherError::VersionList("connection refused".into());
        assert_eq!(
            err.to_string(),
            "Error fetching versions: connection refused"
        );
    }

    #[test]
    fn manifest_releases_filter() {
        let json = r#"{"versions":[
            {"id":"1.21","type":"release"},
            {"id":"24w14a","type":"snapshot"},
            {"id":"1.20.6","type":"release"}
        ]}"#;
        let manifest: VersionManifest = serde_json::from_str(json).unwrap();
        let releases: Vec<String> = manifest
            .versions
            .into_iter()
            .filter(|v| v.version_type == "release")
            .map(|v| v.id)
            .collect();
        assert_eq!(releases, vec!["1.21", "1.20.6"]);
    }
}
