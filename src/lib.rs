// ─── mcl-core ───
// Launch orchestration backend for a Minecraft launcher front end.
//
// Architecture:
//   error     — central error type + result alias
//   settings  — injected configuration store + data directory layout
//   job       — cancellation token, progress sink, background job runner
//   install   — seam to the external install/command-build capability
//   pipeline  — launch stage machine + controller event channel
//   process   — spawned game process supervision (merged output, terminate)
//   versions  — release-list fetch + persisted cache reconciliation
//   mods      — local jar hashing + batched remote update resolution

pub mod error;
pub mod install;
pub mod job;
pub mod mods;
pub mod pipeline;
pub mod process;
pub mod settings;
pub mod versions;

pub use error::{LauncherError, LauncherResult};
pub use install::{Installer, LaunchOptions, LoaderKind};
pub use job::{CancellationToken, JobHandle, JobRunner, ProgressSink};
pub use mods::{check_for_updates, ModrinthCatalog, RemoteVersion, UpdateCatalog, UpdateResult};
pub use pipeline::{LaunchEvent, LaunchPipeline, LaunchRequest, PipelineHandle, PipelineState};
pub use process::{ProcessKiller, ProcessSupervisor};
pub use settings::{Settings, SettingsStore};
pub use versions::{ReconcileOutcome, VersionCacheEntry, VersionCatalog};

use tracing_subscriber::EnvFilter;

const APP_USER_AGENT: &str = "mcl-core/0.1.0";

/// Shared HTTP client for manifest fetches and catalog lookups. No explicit
/// timeout is configured; the transport defaults stand.
pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(APP_USER_AGENT).build()
}

/// Initialize structured logging for embedders that do not bring their own
/// subscriber.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mcl_core=debug")),
        )
        .init();
}
