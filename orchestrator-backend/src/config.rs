use std::env;
use std::path::{Path, PathBuf};

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const DB_PATH: &str = "ORCHESTRATOR_DB_PATH";
    pub const CONFIG_DIR: &str = "ORCHESTRATOR_CONFIG_DIR";
    pub const TICK_SECS: &str = "ORCHESTRATOR_TICK_SECS";
}

/// Default values
pub mod defaults {
    pub const DB_FILE: &str = "brln_orchestrator.sqlite3";
    pub const CONFIG_DIR: &str = "config";
    pub const TICK_SECS: u64 = 1;
    pub const LND_REST_HOST: &str = "localhost:8080";
    pub const LNCLI_PATH: &str = "lncli";
    pub const BOS_PATH: &str = "bos";
}

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_VERSION_DESC: &str = "Orchestrated AutoFee, AR trigger and parameter tuner";

/// Returns the absolute path to the orchestrator-backend directory.
pub fn backend_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Resolve the SQLite path: explicit flag, then env var, then `./brln_orchestrator.sqlite3`.
pub fn resolve_db_path(explicit: Option<&str>) -> PathBuf {
    let raw = explicit
        .map(|s| s.to_string())
        .or_else(|| env::var(env_vars::DB_PATH).ok())
        .filter(|s| !s.trim().is_empty());

    match raw {
        Some(path) => {
            let path = expand_home(&path);
            if path.is_absolute() {
                path
            } else {
                env::current_dir().map(|cwd| cwd.join(&path)).unwrap_or(path)
            }
        }
        None => env::current_dir()
            .map(|cwd| cwd.join(defaults::DB_FILE))
            .unwrap_or_else(|_| PathBuf::from(defaults::DB_FILE)),
    }
}

/// Directory holding `presets.ron`.
/// Checks the env var, then ./config, then the crate's own config directory.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = env::var(env_vars::CONFIG_DIR) {
        return PathBuf::from(dir);
    }
    let local = Path::new("./").join(defaults::CONFIG_DIR);
    if local.join("presets.ron").exists() {
        return local;
    }
    backend_dir().join(defaults::CONFIG_DIR)
}

/// Scheduler tick in seconds (never below one second)
pub fn tick_secs() -> u64 {
    env::var(env_vars::TICK_SECS)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::TICK_SECS)
        .max(1)
}

/// Expand a leading `~/` using $HOME.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Default LND directory (`~/.lnd`)
pub fn default_lnd_dir() -> PathBuf {
    expand_home("~/.lnd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_db_path_keeps_absolute() {
        let path = resolve_db_path(Some("/tmp/orch.sqlite3"));
        assert_eq!(path, PathBuf::from("/tmp/orch.sqlite3"));
    }

    #[test]
    fn test_resolve_db_path_relative_is_anchored() {
        let path = resolve_db_path(Some("data/orch.sqlite3"));
        assert!(path.is_absolute());
        assert!(path.ends_with("data/orch.sqlite3"));
    }
}
