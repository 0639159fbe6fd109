use super::{
    fetcher::{write_executable, FetchError, Fetcher},
    version::DetailedVersion,
};
use anyhow::Context;
use async_trait::async_trait;
use cron::Schedule;
use primitive_types::H256;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tracing::instrument;
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq)]
struct FileInfo {
    url: Url,
    sha256: H256,
}

type VersionsMap = HashMap<DetailedVersion, FileInfo>;

/// Fetches compiler binaries listed in a `list.json` release index
/// (the format used by binaries.soliditylang.org and its mirrors).
///
/// The index is read once at construction and optionally re-read on a cron
/// schedule, so newly published releases become available without a restart.
pub struct ListFetcher {
    versions: Arc<parking_lot::RwLock<VersionsMap>>,
    folder: PathBuf,
}

impl ListFetcher {
    pub async fn new(
        list_url: Url,
        folder: PathBuf,
        refresh_schedule: Option<Schedule>,
    ) -> anyhow::Result<Self> {
        let versions = fetch_versions(&list_url)
            .await
            .context("fetching initial compiler release index")?;
        tracing::info!("release index contains {} versions", versions.len());
        let versions = Arc::new(parking_lot::RwLock::new(versions));
        if let Some(schedule) = refresh_schedule {
            spawn_refresh_job(list_url, Arc::clone(&versions), schedule);
        }
        Ok(Self { versions, folder })
    }
}

#[async_trait]
impl Fetcher for ListFetcher {
    type Version = DetailedVersion;

    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, ver: &Self::Version) -> Result<PathBuf, FetchError> {
        let file_info = {
            let versions = self.versions.read();
            versions
                .get(ver)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(ver.to_string()))?
        };

        let response = reqwest::get(file_info.url)
            .await
            .map_err(anyhow::Error::msg)
            .map_err(FetchError::Fetch)?;
        let data = response
            .bytes()
            .await
            .map_err(anyhow::Error::msg)
            .map_err(FetchError::Fetch)?;

        write_executable(data, file_info.sha256, &self.folder, ver).await
    }

    fn all_versions(&self) -> Vec<Self::Version> {
        let versions = self.versions.read();
        versions.keys().cloned().collect()
    }
}

async fn fetch_versions(list_url: &Url) -> anyhow::Result<VersionsMap> {
    let list: json::List = reqwest::get(list_url.as_str())
        .await
        .context("requesting list json")?
        .json()
        .await
        .context("parsing list json")?;

    let mut versions = HashMap::with_capacity(list.builds.len());
    for build in list.builds {
        let url = match build.path {
            json::DownloadPath::Url(url) => url,
            // list_url ends with `.../list.json`; join() replaces the last
            // segment with the filename
            json::DownloadPath::Filename(filename) => list_url
                .join(&filename)
                .context("parsing build 'path' field")?,
        };
        versions.insert(
            build.long_version,
            FileInfo {
                url,
                sha256: build.sha256,
            },
        );
    }
    Ok(versions)
}

fn spawn_refresh_job(
    list_url: Url,
    versions: Arc<parking_lot::RwLock<VersionsMap>>,
    schedule: Schedule,
) {
    tracing::info!("spawning release index refresh job with schedule {schedule}");
    tokio::spawn(async move {
        loop {
            let sleep_for = match schedule.upcoming(chrono::Utc).next() {
                Some(next) => (next - chrono::Utc::now()).to_std().unwrap_or_default(),
                None => break,
            };
            tokio::time::sleep(sleep_for).await;
            match fetch_versions(&list_url).await {
                Ok(fetched) => {
                    let mut versions = versions.write();
                    if fetched.len() != versions.len() {
                        tracing::info!(
                            "release index refreshed: {} versions (was {})",
                            fetched.len(),
                            versions.len()
                        );
                    }
                    *versions = fetched;
                }
                Err(err) => {
                    tracing::warn!("couldn't refresh release index: {err:#}");
                }
            }
        }
    });
}

mod json {
    use super::{DetailedVersion, H256};
    use serde::Deserialize;
    use serde_with::{serde_as, DisplayFromStr};
    use url::Url;

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    pub(super) struct List {
        pub builds: Vec<FileInfo>,
    }

    #[serde_as]
    #[derive(Debug, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct FileInfo {
        pub path: DownloadPath,
        #[serde_as(as = "DisplayFromStr")]
        pub long_version: DetailedVersion,
        #[serde_as(as = "DisplayFromStr")]
        pub sha256: H256,
    }

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    #[serde(untagged)]
    pub(super) enum DownloadPath {
        Url(Url),
        Filename(String),
    }
}
