use std::path::PathBuf;

pub mod fs;
pub mod serialization;
pub mod types;

/// Root directory to write sled databases to.
const PROVISION_DB_ROOT_PATH_ENV_VAR: &str = "PROVISION_DB_ROOT_PATH";

pub fn database_path(db_name: &str) -> PathBuf {
    let db_root_path = std::env::var(PROVISION_DB_ROOT_PATH_ENV_VAR).unwrap_or_default();
    let db_path = PathBuf::from(db_root_path).join(db_name);
    tracing::debug!("opening DB: {}", db_path.display());
    db_path
}
