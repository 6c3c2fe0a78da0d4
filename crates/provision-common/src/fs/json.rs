use std::{future::Future, path::Path};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::fs::{ensure_dir, error::Error};

/// Read and write any serde type as a pretty-printed JSON file.
pub trait Json: Sized {
    fn from_json_path<P: AsRef<Path> + Send>(
        path: P,
    ) -> impl Future<Output = Result<Self, Error>> + Send
    where
        Self: DeserializeOwned,
    {
        async move {
            info!("reading {}", path.as_ref().display());

            let file_contents = fs::read(path.as_ref()).await?;
            debug!(bytes = file_contents.len(), "read json file");

            Ok(serde_json::from_slice(&file_contents)?)
        }
    }

    fn to_json_path<P: AsRef<Path> + Send>(
        &self,
        path: P,
    ) -> impl Future<Output = Result<(), Error>>
    where
        Self: Serialize,
    {
        async move {
            let json = serde_json::to_string_pretty(self)?;
            let parent = path
                .as_ref()
                .parent()
                .ok_or_else(|| Error::NoParent(path.as_ref().to_path_buf()))?;
            ensure_dir(parent).await?;
            fs::write(path, json).await?;
            Ok(())
        }
    }
}

impl<T> Json for T where T: Serialize + DeserializeOwned {}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        chain_name: String,
        retries: u32,
    }

    #[tokio::test]
    async fn writes_into_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.json");

        let sample = Sample {
            chain_name: "sepolia".to_string(),
            retries: 3,
        };
        sample.to_json_path(&path).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"chainName\": \"sepolia\""));

        let back = Sample::from_json_path(&path).await.unwrap();
        assert_eq!(back, sample);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Sample::from_json_path(dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
