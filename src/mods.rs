// ─── Mod Update Checker ───
// Content-hashes the local mods directory and batch-resolves the hashes
// against a remote catalog, mapping results back to file paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::{LauncherError, LauncherResult};
use crate::job::{JobHandle, JobRunner};

const MODRINTH_UPDATE_URL: &str = "https://api.modrinth.com/v2/version_files/update";
const HASH_CHUNK_SIZE: usize = 64 * 1024;
const HASH_CONCURRENCY: usize = 4;

/// Newer version available for one local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVersion {
    pub id: String,
    pub version_number: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Mapping from local file path to the newer remote version. Only files
/// with an actual update are present.
pub type UpdateResult = HashMap<PathBuf, RemoteVersion>;

/// Remote "resolve updates for these hashes" capability.
#[async_trait]
pub trait UpdateCatalog: Send + Sync {
    /// Returns a mapping for the subset of `hashes` that have an update.
    async fn resolve_updates(
        &self,
        hashes: &[String],
    ) -> LauncherResult<HashMap<String, RemoteVersion>>;
}

/// Modrinth-backed catalog using the bulk version-file update endpoint.
pub struct ModrinthCatalog {
    client: reqwest::Client,
    loaders: Vec<String>,
    game_versions: Vec<String>,
}

impl ModrinthCatalog {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            loaders: Vec::new(),
            game_versions: Vec::new(),
        }
    }

    /// Restrict resolution to specific loaders / game versions.
    pub fn with_filters(mut self, loaders: Vec<String>, game_versions: Vec<String>) -> Self {
        self.loaders = loaders;
        self.game_versions = game_versions;
        self
    }
}

#[async_trait]
impl UpdateCatalog for ModrinthCatalog {
    async fn resolve_updates(
        &self,
        hashes: &[String],
    ) -> LauncherResult<HashMap<String, RemoteVersion>> {
        #[derive(Serialize)]
        struct UpdateRequest<'a> {
            hashes: &'a [String],
            algorithm: &'static str,
            loaders: &'a [String],
            game_versions: &'a [String],
        }

        let response = self
            .client
            .post(MODRINTH_UPDATE_URL)
            .json(&UpdateRequest {
                hashes,
                algorithm: "sha1",
                loaders: &self.loaders,
                game_versions: &self.game_versions,
            })
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

/// SHA-1 of a file's content, streamed in fixed-size chunks so large jars
/// are never loaded whole into memory.
pub async fn sha1_of_file(path: &Path) -> LauncherResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash every `.jar` in `dir`, building the reverse hash → path mapping.
/// Colliding hashes resolve last-one-wins; per-file errors are skipped.
pub async fn hash_mod_files(dir: &Path) -> LauncherResult<HashMap<String, PathBuf>> {
    let mut jar_files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(HashMap::new()),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LauncherError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "jar") {
            jar_files.push(path);
        }
    }
    debug!("Found {} jar files in {:?}", jar_files.len(), dir);

    let hashed: Vec<(PathBuf, LauncherResult<String>)> = stream::iter(jar_files)
        .map(|path| async move {
            let hash = sha1_of_file(&path).await;
            (path, hash)
        })
        .buffer_unordered(HASH_CONCURRENCY)
        .collect()
        .await;

    let mut hashes = HashMap::new();
    for (path, hash) in hashed {
        match hash {
            Ok(hash) => {
                hashes.insert(hash, path);
            }
            Err(err) => warn!("Error hashing {:?}: {}", path, err),
        }
    }
    Ok(hashes)
}

/// Check every mod in `dir` for updates with one batched catalog request.
///
/// An empty local file set short-circuits to an empty result and skips the
/// remote call entirely. Hashes the catalog returns that no local file
/// produced are dropped.
pub async fn check_for_updates(
    dir: &Path,
    catalog: &dyn UpdateCatalog,
) -> LauncherResult<UpdateResult> {
    let hashes = hash_mod_files(dir).await?;
    if hashes.is_empty() {
        info!("No mods to check for updates");
        return Ok(UpdateResult::new());
    }

    info!("Checking {} mod hashes for updates", hashes.len());
    let keys: Vec<String> = hashes.keys().cloned().collect();
    let updates = catalog.resolve_updates(&keys).await?;

    let mut result = UpdateResult::new();
    for (hash, version) in updates {
        if let Some(path) = hashes.get(&hash) {
            debug!("Update available for {:?}", path);
            result.insert(path.clone(), version);
        }
    }
    info!("Update check finished: {} updates found", result.len());
    Ok(result)
}

/// Run the whole check as a background job.
pub fn spawn_update_check(
    dir: PathBuf,
    catalog: std::sync::Arc<dyn UpdateCatalog>,
) -> JobHandle<UpdateResult> {
    JobRunner::run(move |token| async move {
        token.checkpoint()?;
        check_for_updates(&dir, catalog.as_ref()).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // SHA-1 of the ASCII bytes "hello world".
    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    struct FakeCatalog {
        updates: HashMap<String, RemoteVersion>,
        calls: AtomicUsize,
    }

    impl FakeCatalog {
        fn with(updates: HashMap<String, RemoteVersion>) -> Self {
            Self {
                updates,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpdateCatalog for FakeCatalog {
        async fn resolve_updates(
            &self,
            _hashes: &[String],
        ) -> LauncherResult<HashMap<String, RemoteVersion>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.updates.clone())
        }
    }

    fn remote(version_number: &str) -> RemoteVersion {
        RemoteVersion {
            id: "abc123".into(),
            version_number: version_number.into(),
            name: None,
        }
    }

    #[tokio::test]
    async fn sha1_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jar");
        std::fs::write(&path, b"hello world").unwrap();

        assert_eq!(sha1_of_file(&path).await.unwrap(), HELLO_SHA1);
    }

    #[tokio::test]
    async fn large_file_is_hashed_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.jar");
        // Larger than one chunk so the streaming path is exercised.
        let content = vec![0xABu8; HASH_CHUNK_SIZE * 2 + 17];
        std::fs::write(&path, &content).unwrap();

        let mut hasher = Sha1::new();
        hasher.update(&content);
        let expected = hex::encode(hasher.finalize());
        assert_eq!(sha1_of_file(&path).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn empty_directory_short_circuits_without_a_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::with(HashMap::new());

        let result = check_for_updates(dir.path(), &catalog).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(catalog.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_directory_is_treated_as_empty() {
        let catalog = FakeCatalog::with(HashMap::new());
        let result = check_for_updates(Path::new("/nonexistent/mcl-mods"), &catalog)
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(catalog.call_count(), 0);
    }

    #[tokio::test]
    async fn non_jar_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello world").unwrap();
        std::fs::write(dir.path().join("mod.jar.disabled"), b"hello world").unwrap();

        let hashes = hash_mod_files(dir.path()).await.unwrap();
        assert!(hashes.is_empty());
    }

    #[tokio::test]
    async fn resolver_response_maps_back_to_file_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("sodium.jar");
        let path_b = dir.path().join("lithium.jar");
        std::fs::write(&path_a, b"hello world").unwrap();
        std::fs::write(&path_b, b"something else").unwrap();

        // Only file A has an update; an unknown hash must be dropped.
        let mut updates = HashMap::new();
        updates.insert(HELLO_SHA1.to_string(), remote("2.0"));
        let catalog = FakeCatalog::with(updates);

        let result = check_for_updates(dir.path(), &catalog).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.get(&path_a).unwrap().version_number, "2.0");
        assert!(!result.contains_key(&path_b));
        assert_eq!(catalog.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_hashes_from_the_catalog_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"hello world").unwrap();

        // A catalog that answers with a hash no local file produced.
        let mut updates = HashMap::new();
        updates.insert("f".repeat(40), remote("9.9"));
        let catalog = FakeCatalog::with(updates);

        let result = check_for_updates(dir.path(), &catalog).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn update_check_runs_as_a_background_job() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"hello world").unwrap();

        let mut updates = HashMap::new();
        updates.insert(HELLO_SHA1.to_string(), remote("2.0"));
        let catalog: std::sync::Arc<dyn UpdateCatalog> =
            std::sync::Arc::new(FakeCatalog::with(updates));

        let handle = spawn_update_check(dir.path().to_path_buf(), catalog);
        let result = handle.join().await.unwrap();
        assert_eq!(result.len(), 1);
    }
}
