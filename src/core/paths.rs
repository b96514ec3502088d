use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base stagehand config directory (universal ~/.config/stagehand/ on all platforms)
pub fn stagehand() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected("APPDATA environment variable not set on Windows".to_string())
        })?;
        Ok(PathBuf::from(appdata).join("stagehand"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("stagehand"))
    }
}

/// Stages directory
pub fn stages() -> Result<PathBuf> {
    Ok(stagehand()?.join("stages"))
}

/// Stage config file path
pub fn stage(id: &str) -> Result<PathBuf> {
    Ok(stages()?.join(format!("{}.json", id)))
}
