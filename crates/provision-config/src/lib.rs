pub mod error;
pub mod secrets;
pub mod settings;

use std::path::{Path, PathBuf};

use provision_common::fs::{app_home_dir, json::Json};
use serde::de::DeserializeOwned;
use tracing::info;

pub use crate::{
    error::Error,
    secrets::{Secret, Secrets},
    settings::Settings,
};

/// Settings file name inside the application home directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// A wrapper around a JSON file that can be deserialized into a type `T`.
pub struct ConfigFile<T>(pub T, std::marker::PhantomData<()>);

impl<T: DeserializeOwned> ConfigFile<T> {
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<T, Error> {
        let file_contents = tokio::fs::read(path.as_ref()).await?;
        let config: T = serde_json::from_slice(&file_contents)?;
        Ok(config)
    }
}

impl Settings {
    /// Loads settings from an explicit path, or from `~/.provision/settings.json`
    /// when it exists, or falls back to the built-in defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self, Error> {
        let settings = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::SettingsNotFound(path.to_path_buf()));
                }
                ConfigFile::<Settings>::from_path(path).await?
            }
            None => {
                let default_path = Self::default_path().await?;
                if default_path.exists() {
                    ConfigFile::<Settings>::from_path(&default_path).await?
                } else {
                    info!("no settings file found, using built-in defaults");
                    Settings::default()
                }
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    pub async fn default_path() -> Result<PathBuf, Error> {
        Ok(app_home_dir().await?.join(SETTINGS_FILE))
    }

    /// Writes the settings as pretty JSON, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        self.to_json_path(path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_round_trips_saved_settings() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.timeouts.probe_secs = 3;
        settings.save(&path).await?;

        let loaded = Settings::load(Some(&path)).await?;
        assert_eq!(loaded.timeouts.probe_secs, 3);
        assert_eq!(loaded.chains.len(), settings.chains.len());
        Ok(())
    }

    #[tokio::test]
    async fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.json")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SettingsNotFound(_)));
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        if let Some(chain) = settings.chains.values_mut().next() {
            chain.min_balance = "lots".to_string();
        }
        settings.save(&path).await.unwrap();

        let err = Settings::load(Some(&path)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { .. }));
    }
}
