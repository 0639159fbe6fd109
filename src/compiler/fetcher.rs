use super::version::Version;
use async_trait::async_trait;
use bytes::Bytes;
use primitive_types::H256;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("version {0} not found in the release index")]
    NotFound(String),
    #[error("couldn't fetch the file: {0:#}")]
    Fetch(anyhow::Error),
    #[error("hashsum mismatch for downloaded file: expected {expected:x}, found {found:x}")]
    HashMismatch { expected: H256, found: H256 },
    #[error("couldn't save the file: {0}")]
    File(#[from] std::io::Error),
    #[error("tokio scheduling error: {0}")]
    Schedule(#[from] tokio::task::JoinError),
}

/// Obtains a runnable compiler binary for a given version.
#[async_trait]
pub trait Fetcher: Send + Sync {
    type Version: Version;

    async fn fetch(&self, ver: &Self::Version) -> Result<PathBuf, FetchError>;

    fn all_versions(&self) -> Vec<Self::Version>;
}

/// Verifies the checksum of the downloaded binary and writes it into
/// `<folder>/<version>/solc`, marked executable.
pub(crate) async fn write_executable<Ver: Version>(
    data: Bytes,
    expected_sha256: H256,
    folder: &Path,
    ver: &Ver,
) -> Result<PathBuf, FetchError> {
    let found = H256::from_slice(&Sha256::digest(&data));
    if expected_sha256 != found {
        return Err(FetchError::HashMismatch {
            expected: expected_sha256,
            found,
        });
    }

    let folder = folder.join(ver.to_string());
    let file = folder.join("solc");

    let save_result = {
        let file = file.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&folder)?;
            std::fs::write(&file, data)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755))?;
            }
            Ok(())
        })
        .await?
    };
    save_result?;

    Ok(file)
}
