use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::types::AppConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "EV_BOARD_CONFIG";

/// Discover and load the app config.
///
/// Priority:
/// 1. `--config` flag (explicit path)
/// 2. `$EV_BOARD_CONFIG` environment variable
/// 3. `$XDG_CONFIG_HOME/ev-board/config.toml`
/// 4. `~/.config/ev-board/config.toml`
///
/// Without any config file the defaults are used, which define no screens.
pub fn load_config(explicit_path: Option<&Path>) -> Result<AppConfig> {
    let config = match explicit_path.map(Path::to_path_buf).or_else(find_config) {
        Some(path) => read_config(&path)?,
        None => AppConfig::default(),
    };
    validate(&config)?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML from {}", path.display()))?;
    tracing::debug!("config: loaded {}", path.display());
    Ok(config)
}

/// Reject configs the engine could not mount.
fn validate(config: &AppConfig) -> Result<()> {
    let mut titles = HashSet::new();
    for screen in &config.screens {
        if !titles.insert(screen.title.to_ascii_lowercase()) {
            bail!("duplicate screen title {:?}", screen.title);
        }
        if screen.endpoint.trim().is_empty() {
            bail!("screen {:?}: endpoint must not be empty", screen.title);
        }
        if screen.page_size == Some(0) {
            bail!("screen {:?}: page_size must be at least 1", screen.title);
        }
        if let Err(e) = screen.sorting() {
            bail!("screen {:?}: invalid sort: {e}", screen.title);
        }
        let mut verbs = HashSet::new();
        for verb in &screen.verbs {
            let reserved = matches!(verb.as_str(), "delete" | "delete-selected");
            if verb.trim().is_empty() || reserved || !verbs.insert(verb.as_str()) {
                bail!("screen {:?}: invalid or duplicate verb {verb:?}", screen.title);
            }
        }
    }
    if config.defaults.page_size == 0 {
        bail!("defaults.page_size must be at least 1");
    }
    Ok(())
}

fn find_config() -> Option<PathBuf> {
    // $EV_BOARD_CONFIG
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        let p = PathBuf::from(&path);
        if p.is_file() {
            return Some(p);
        }
    }

    // $XDG_CONFIG_HOME/ev-board/config.toml
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let p = PathBuf::from(xdg).join("ev-board/config.toml");
        if p.is_file() {
            return Some(p);
        }
    }

    // ~/.config/ev-board/config.toml
    if let Ok(home) = std::env::var("HOME") {
        let p = PathBuf::from(home).join(".config/ev-board/config.toml");
        if p.is_file() {
            return Some(p);
        }
    }

    None
}
