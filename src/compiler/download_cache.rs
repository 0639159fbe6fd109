use super::{
    fetcher::{FetchError, Fetcher},
    version::Version,
};
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tracing::Instrument;

/// Caches fetched compiler binaries by version.
///
/// Fetches of the same uncached version are single-flighted: the per-version
/// write lock is held for the duration of the download, so concurrent callers
/// wait for it and then read the path the first caller stored. Requests for
/// already cached versions are never blocked by in-flight downloads.
pub struct DownloadCache<Ver> {
    cache: parking_lot::Mutex<HashMap<Ver, Arc<tokio::sync::RwLock<Option<PathBuf>>>>>,
}

impl<Ver> Default for DownloadCache<Ver> {
    fn default() -> Self {
        Self {
            cache: parking_lot::Mutex::new(HashMap::new()),
        }
    }
}

impl<Ver: Version> DownloadCache<Ver> {
    pub async fn get<F: Fetcher<Version = Ver> + ?Sized>(
        &self,
        fetcher: &F,
        ver: &Ver,
    ) -> Result<PathBuf, FetchError> {
        match self.try_get(ver).await {
            Some(file) => Ok(file),
            None => {
                let span = tracing::debug_span!("fetch compiler", ver = %ver);
                self.fetch(fetcher, ver).instrument(span).await
            }
        }
    }

    async fn try_get(&self, ver: &Ver) -> Option<PathBuf> {
        let entry = {
            let cache = self.cache.lock();
            cache.get(ver).cloned()
        };
        match entry {
            Some(lock) => lock.read().await.clone(),
            None => None,
        }
    }

    async fn fetch<F: Fetcher<Version = Ver> + ?Sized>(
        &self,
        fetcher: &F,
        ver: &Ver,
    ) -> Result<PathBuf, FetchError> {
        let lock = {
            let mut cache = self.cache.lock();
            Arc::clone(cache.entry(ver.clone()).or_default())
        };
        let mut entry = lock.write().await;
        match entry.as_ref() {
            Some(file) => Ok(file.clone()),
            None => {
                tracing::info!(target: "compiler_cache", "installing compiler version {}", ver);
                let file = fetcher.fetch(ver).await?;
                *entry = Some(file.clone());
                Ok(file)
            }
        }
    }

    /// Pre-seeds the cache with compilers already present on disk.
    /// Expects the `<dir>/<version>/solc` layout produced by the fetchers.
    pub async fn load_from_dir(&self, dir: &PathBuf) -> std::io::Result<()> {
        let paths = std::fs::read_dir(dir)?.filter_map(|e| e.ok().map(|e| e.path()));
        let versions = filter_versions(paths);
        for (version, path) in versions {
            let solc_path = path.join("solc");
            if solc_path.exists() {
                tracing::info!("found local compiler version {}", version);
                let lock = {
                    let mut cache = self.cache.lock();
                    Arc::clone(cache.entry(version).or_default())
                };
                *lock.write().await = Some(solc_path);
            } else {
                tracing::warn!(
                    "found version {} but file {:?} doesn't exist",
                    version,
                    solc_path
                );
            }
        }
        Ok(())
    }
}

fn filter_versions<Ver: Version>(dirs: impl Iterator<Item = PathBuf>) -> HashMap<Ver, PathBuf> {
    dirs.filter_map(|path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| Ver::from_str(n).ok())
            .map(|v| (v, path))
    })
    .collect()
}
