use crate::errors::AppError;
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::error;

/// Reads a JSON document, falling back to the default value when the file is
/// missing, unreadable or malformed.
pub async fn load_json<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse {}: {err}", path.display());
                T::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(err) => {
            error!("failed to read {}: {err}", path.display());
            T::default()
        }
    }
}

/// Replaces the file wholesale: the payload lands in a sibling temp file
/// first and is renamed over the target.
pub async fn persist_json<T: Serialize>(path: &Path, data: &T) -> Result<(), AppError> {
    let payload = serde_json::to_vec_pretty(data).map_err(AppError::internal)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, payload).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
