//! CLI executable resolution and search path augmentation

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the CLI install path
pub const CLI_PATH_ENV: &str = "AGCHAT_CLI_PATH";

/// System install locations tried after the user-local one
const SYSTEM_BIN_DIRS: [&str; 3] = ["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin"];

/// Ordered list of candidate paths for the CLI executable.
///
/// Explicit override first (config, then environment), then the user-local
/// install, then the standard system locations. The bare name is not part of
/// the list; it is the fallback of [`resolve_cli_path`].
pub fn candidate_paths(
    binary: &str,
    config_override: Option<&str>,
    env_override: Option<&str>,
    home: Option<&Path>,
) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    for explicit in [config_override, env_override].into_iter().flatten() {
        let explicit = explicit.trim();
        if !explicit.is_empty() {
            candidates.push(PathBuf::from(shellexpand::tilde(explicit).as_ref()));
        }
    }

    if let Some(home) = home {
        candidates.push(home.join(".local").join("bin").join(binary));
    }
    for dir in SYSTEM_BIN_DIRS {
        candidates.push(Path::new(dir).join(binary));
    }

    candidates
}

/// Pick the first candidate for which `exists` holds.
///
/// Symlinks are resolved when possible. Falls back to the bare binary name so
/// the spawn goes through `PATH` lookup.
pub fn resolve_cli_path<F>(candidates: &[PathBuf], binary: &str, exists: F) -> String
where
    F: Fn(&Path) -> bool,
{
    for candidate in candidates {
        if exists(candidate) {
            let resolved = std::fs::canonicalize(candidate).unwrap_or_else(|_| candidate.clone());
            tracing::debug!(path = %resolved.display(), "Resolved CLI path");
            return resolved.to_string_lossy().into_owned();
        }
    }
    tracing::debug!(binary, "No CLI install found, relying on PATH lookup");
    binary.to_string()
}

/// Directories appended to `PATH` for the CLI process
pub fn extra_search_dirs(home: Option<&Path>, configured: &[String]) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = home {
        dirs.push(home.join(".local").join("bin"));
    }
    dirs.extend(SYSTEM_BIN_DIRS.iter().map(PathBuf::from));
    dirs.extend(
        configured
            .iter()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref())),
    );
    dirs
}

/// Append `extra` to an existing `PATH` value, skipping entries already there
pub fn augmented_path(current: Option<&OsStr>, extra: &[PathBuf]) -> OsString {
    let mut entries: Vec<PathBuf> = current
        .map(|path| std::env::split_paths(path).collect())
        .unwrap_or_default();

    for dir in extra {
        if !entries.iter().any(|entry| entry == dir) {
            entries.push(dir.clone());
        }
    }

    std::env::join_paths(&entries).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not build augmented PATH, keeping the original");
        current.map(OsStr::to_os_string).unwrap_or_default()
    })
}
