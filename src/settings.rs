use crate::consts::DEFAULT_SOLIDITY_COMPILER_LIST;
use config::{Config, File};
use cron::Schedule;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use std::{num::NonZeroUsize, path::PathBuf, str::FromStr};
use url::Url;

/// Service configuration, read from an optional config file pointed to by
/// `VERIFICATION__CONFIG` and overridable through `VERIFICATION__`-prefixed
/// environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub solidity: SoliditySettings,
    pub compilation: CompilationSettings,
    pub blockchain: BlockchainSettings,

    // the config file path itself, present in the environment source
    #[serde(rename = "config")]
    config_path: Option<String>,
}

impl Settings {
    pub fn new() -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var("VERIFICATION__CONFIG") {
            builder = builder.add_source(File::with_name(&path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("VERIFICATION")
                .separator("__")
                .try_parsing(true),
        );
        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SoliditySettings {
    pub compilers_dir: PathBuf,
    pub compilers_list_url: Url,
    #[serde_as(as = "DisplayFromStr")]
    pub refresh_versions_schedule: Schedule,
}

impl Default for SoliditySettings {
    fn default() -> Self {
        Self {
            compilers_dir: default_compilers_dir("solidity-compilers"),
            compilers_list_url: Url::try_from(DEFAULT_SOLIDITY_COMPILER_LIST)
                .expect("valid default list.json url"),
            refresh_versions_schedule: schedule_every_hour(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilationSettings {
    pub concurrent_compilations: NonZeroUsize,
    /// Seconds a request may wait for a free compiler slot.
    pub queue_timeout: u64,
    /// Seconds a single compiler invocation may run.
    pub execution_timeout: u64,
    /// Seconds for the whole verification call.
    pub total_timeout: u64,
}

impl Default for CompilationSettings {
    fn default() -> Self {
        let concurrent_compilations = std::thread::available_parallelism().unwrap_or_else(|e| {
            tracing::warn!("cannot get number of CPU cores: {}", e);
            NonZeroUsize::new(4).expect("is not zero")
        });
        Self {
            concurrent_compilations,
            queue_timeout: 10,
            execution_timeout: 120,
            total_timeout: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockchainSettings {
    pub rpc_url: Url,
}

impl Default for BlockchainSettings {
    fn default() -> Self {
        Self {
            rpc_url: Url::try_from("http://localhost:8545").expect("valid default rpc url"),
        }
    }
}

fn default_compilers_dir<P: AsRef<std::path::Path>>(path: P) -> PathBuf {
    let mut compilers_dir = std::env::temp_dir();
    compilers_dir.push(path);
    compilers_dir
}

fn schedule_every_hour() -> Schedule {
    Schedule::from_str("0 0 * * * * *").expect("valid default schedule")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(
            settings.solidity.compilers_list_url.as_str(),
            DEFAULT_SOLIDITY_COMPILER_LIST
        );
        assert!(settings.compilation.total_timeout > settings.compilation.execution_timeout);
    }

    #[test]
    fn schedule_is_parsed_from_string() {
        let settings: SoliditySettings = serde_json::from_value(serde_json::json!({
            "refresh_versions_schedule": "0 0 0 * * * *",
        }))
        .unwrap();
        assert_eq!(
            settings.refresh_versions_schedule.to_string(),
            "0 0 0 * * * *"
        );
    }
}
