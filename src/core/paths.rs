use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Overrides the config directory, mainly for scripted use and tests.
pub const CONFIG_DIR_ENV: &str = "DECKHAND_CONFIG_DIR";

/// Root of deckhand's local state: `$DECKHAND_CONFIG_DIR`, else
/// `~/.config/deckhand` (`%APPDATA%\deckhand` on Windows).
pub fn deckhand() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    let (var, base): (&str, fn(PathBuf) -> PathBuf) = if cfg!(windows) {
        ("APPDATA", |p: PathBuf| p)
    } else {
        ("HOME", |p: PathBuf| p.join(".config"))
    };

    env::var_os(var)
        .map(|home| base(PathBuf::from(home)).join("deckhand"))
        .ok_or_else(|| Error::internal_unexpected(format!("{} is not set", var)))
}

pub fn deckhand_json() -> Result<PathBuf> {
    Ok(deckhand()?.join("deckhand.json"))
}

pub fn projects() -> Result<PathBuf> {
    Ok(deckhand()?.join("projects"))
}

pub fn servers() -> Result<PathBuf> {
    Ok(deckhand()?.join("servers"))
}
