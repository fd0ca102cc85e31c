// ─── Install Capability ───
// Seam to the external installer: game files, mod loaders, and the final
// launch command. The pipeline only sequences these calls; it never knows
// what an install step does internally.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LauncherResult;
use crate::job::{CancellationToken, ProgressSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    Vanilla,
    Fabric,
    Forge,
    NeoForge,
    Quilt,
}

impl LoaderKind {
    pub fn name(&self) -> &'static str {
        match self {
            LoaderKind::Vanilla => "Vanilla",
            LoaderKind::Fabric => "Fabric",
            LoaderKind::Forge => "Forge",
            LoaderKind::NeoForge => "NeoForge",
            LoaderKind::Quilt => "Quilt",
        }
    }

    /// Only Fabric installs are wired up; Forge, NeoForge and Quilt fail
    /// fast with a descriptive reason instead of attempting an install.
    pub fn install_supported(&self) -> bool {
        matches!(self, LoaderKind::Vanilla | LoaderKind::Fabric)
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options forwarded to the command builder. Empty entries are dropped by
/// `sanitized` so the builder can apply its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub username: Option<String>,
    pub uuid: Option<String>,
    pub access_token: Option<String>,
    pub java_executable: Option<PathBuf>,
    pub jvm_arguments: Vec<String>,
    pub resolution_width: Option<u32>,
    pub resolution_height: Option<u32>,
    pub memory_mb: Option<u32>,
    pub game_directory: Option<PathBuf>,
}

impl LaunchOptions {
    /// Options for an offline session: a fresh random UUID and no auth token.
    pub fn offline(username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            uuid: Some(uuid::Uuid::new_v4().to_string()),
            ..Self::default()
        }
    }

    pub fn sanitized(&self) -> Self {
        Self {
            username: non_empty(&self.username),
            uuid: non_empty(&self.uuid),
            access_token: non_empty(&self.access_token),
            java_executable: self
                .java_executable
                .clone()
                .filter(|p| !p.as_os_str().is_empty()),
            jvm_arguments: self
                .jvm_arguments
                .iter()
                .filter(|arg| !arg.trim().is_empty())
                .cloned()
                .collect(),
            resolution_width: self.resolution_width.filter(|v| *v > 0),
            resolution_height: self.resolution_height.filter(|v| *v > 0),
            memory_mb: self.memory_mb.filter(|v| *v > 0),
            game_directory: self.game_directory.clone(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// External install capability, invoked synchronously from a worker thread.
///
/// Implementations must poll the token at their own safe points and report
/// progress through the sink; both axes are forwarded verbatim upstream.
pub trait Installer: Send + Sync {
    fn install_game(
        &self,
        version: &str,
        sink: &dyn ProgressSink,
        token: &CancellationToken,
    ) -> LauncherResult<()>;

    /// Install a mod loader for `game_version` and return the version id the
    /// launch command must target (e.g. `fabric-loader-0.16.9-1.20.1`).
    fn install_loader(
        &self,
        kind: LoaderKind,
        game_version: &str,
        sink: &dyn ProgressSink,
        token: &CancellationToken,
    ) -> LauncherResult<String>;

    fn build_command(
        &self,
        version_id: &str,
        options: &LaunchOptions,
    ) -> LauncherResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_drops_empty_entries_and_keeps_argument_order() {
        let options = LaunchOptions {
            username: Some("  ".into()),
            uuid: Some("d55e0ed6-0b1e-4f0e-a4c8-2c6a57e9cbb3".into()),
            access_token: Some(String::new()),
            java_executable: Some(PathBuf::new()),
            jvm_arguments: vec!["-Xmx4G".into(), "".into(), "-Xms4G".into(), " ".into()],
            resolution_width: Some(0),
            resolution_height: Some(1080),
            memory_mb: None,
            game_directory: None,
        };

        let clean = options.sanitized();
        assert_eq!(clean.username, None);
        assert_eq!(
            clean.uuid.as_deref(),
            Some("d55e0ed6-0b1e-4f0e-a4c8-2c6a57e9cbb3")
        );
        assert_eq!(clean.access_token, None);
        assert_eq!(clean.java_executable, None);
        assert_eq!(clean.jvm_arguments, vec!["-Xmx4G", "-Xms4G"]);
        assert_eq!(clean.resolution_width, None);
        assert_eq!(clean.resolution_height, Some(1080));
    }

    #[test]
    fn offline_options_carry_a_valid_session_uuid() {
        let options = LaunchOptions::offline("Alex");
        assert_eq!(options.username.as_deref(), Some("Alex"));
        let uuid = options.uuid.expect("offline options always get a uuid");
        assert!(uuid::Uuid::parse_str(&uuid).is_ok());
        assert_eq!(options.access_token, None);
    }

    #[test]
    fn unsupported_loaders_are_exactly_forge_neoforge_quilt() {
        assert!(LoaderKind::Vanilla.install_supported());
        assert!(LoaderKind::Fabric.install_supported());
        assert!(!LoaderKind::Forge.install_supported());
        assert!(!LoaderKind::NeoForge.install_supported());
        assert!(!LoaderKind::Quilt.install_supported());
    }
}
