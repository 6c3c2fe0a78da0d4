use std::path::{Path, PathBuf};

use tracing::debug;

use crate::fs::error::Error;

pub mod error;
pub mod json;

pub const PROVISION_HOME_ENV_VAR: &str = "PROVISION_HOME";
const DEFAULT_HOME_DIR_BASE: &str = ".provision";

/// Make sure that a directory according to given path exist.
pub async fn ensure_dir<P: AsRef<Path>>(p: P) -> Result<(), std::io::Error> {
    let path = p.as_ref();
    debug!("ensuring dir exists: {}", path.display());
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
    }
    Ok(())
}

/// Returns App's home directory, which is typically at `~/.provision`
pub async fn app_home_dir() -> Result<PathBuf, Error> {
    let base = match std::env::var(PROVISION_HOME_ENV_VAR) {
        Ok(path) => path.into(),
        Err(_) => {
            home::home_dir()
                .ok_or(Error::InvalidHomeDir)?
                .join(DEFAULT_HOME_DIR_BASE)
        }
    };
    debug!("config files directory: {}", base.display());
    ensure_dir(&base).await?;
    Ok(base)
}
