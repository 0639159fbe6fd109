mod download_cache;
mod evm_version;
mod fetcher;
mod list_fetcher;
mod version;

pub use download_cache::DownloadCache;
pub use evm_version::EvmVersion;
pub use fetcher::{FetchError, Fetcher};
pub use list_fetcher::ListFetcher;
pub use version::{DetailedVersion, Version};

use std::{path::PathBuf, sync::Arc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("compiler version not found: {0}")]
    VersionNotFound(String),
    #[error("EVM version `{requested}` is not supported by compiler {compiler}")]
    UnsupportedEvmVersion {
        requested: EvmVersion,
        compiler: semver::Version,
    },
    #[error("error while fetching compiler: {0:#}")]
    Fetch(#[from] FetchError),
}

/// An owned reference to a resolved, locally available compiler.
/// Never mutated after creation; the path stays valid for the process
/// lifetime as the underlying cache does not evict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolchainHandle {
    pub version: DetailedVersion,
    pub solc_path: PathBuf,
}

/// Resolves version strings to runnable compilers, downloading and caching
/// binaries on first use.
pub struct ToolchainCache {
    cache: DownloadCache<DetailedVersion>,
    fetcher: Arc<dyn Fetcher<Version = DetailedVersion>>,
}

impl ToolchainCache {
    pub fn new(fetcher: Arc<dyn Fetcher<Version = DetailedVersion>>) -> Self {
        Self {
            cache: Default::default(),
            fetcher,
        }
    }

    /// Resolves `requested` against the release index and returns a handle to
    /// a locally available binary. A bare semantic version picks the newest
    /// matching build; a fully qualified one picks that exact build.
    pub async fn get(&self, requested: &DetailedVersion) -> Result<ToolchainHandle, Error> {
        let version = self.normalize(requested)?;
        let solc_path = match self.cache.get(self.fetcher.as_ref(), &version).await {
            Err(FetchError::NotFound(version)) => return Err(Error::VersionNotFound(version)),
            res => res?,
        };
        Ok(ToolchainHandle { version, solc_path })
    }

    fn normalize(&self, requested: &DetailedVersion) -> Result<DetailedVersion, Error> {
        self.fetcher
            .all_versions()
            .into_iter()
            .filter(|indexed| indexed.matches(requested))
            .max()
            .ok_or_else(|| Error::VersionNotFound(requested.to_string()))
    }

    /// The EVM target this compiler release falls back to when the caller
    /// does not request one explicitly. Old releases silently get an old fork.
    pub fn default_evm_version(version: &DetailedVersion) -> Option<EvmVersion> {
        EvmVersion::latest_supported(version.version())
    }

    /// Validates an explicitly requested EVM target against the compiler
    /// release. `None` requests keep the compiler's own default.
    pub fn resolve_evm_version(
        version: &DetailedVersion,
        requested: Option<EvmVersion>,
    ) -> Result<Option<EvmVersion>, Error> {
        match requested {
            Some(target) if !target.is_supported_by(version.version()) => {
                Err(Error::UnsupportedEvmVersion {
                    requested: target,
                    compiler: version.version().clone(),
                })
            }
            other => Ok(other),
        }
    }

    pub fn all_versions(&self) -> Vec<DetailedVersion> {
        self.fetcher.all_versions()
    }

    /// All known versions, newest first, for display purposes.
    pub fn all_versions_sorted_str(&self) -> Vec<String> {
        let mut versions = self.all_versions();
        versions.sort_by(|x, y| x.cmp(y).reverse());
        versions.into_iter().map(|v| v.to_string()).collect()
    }

    pub async fn load_from_dir(&self, dir: &PathBuf) {
        match self.cache.load_from_dir(dir).await {
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    "cannot load local compilers from `{}` dir: {}",
                    dir.to_string_lossy(),
                    e
                )
            }
        }
    }
}
