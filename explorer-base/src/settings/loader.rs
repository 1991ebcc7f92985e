use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::path::PathBuf;

use config::{Config, Environment, File};
use convert_case::Case;
use eyre::{Context, Result};
use serde::de::DeserializeOwned;

use self::case_adapter::CaseAdapter;

mod case_adapter;

/// Separator between the components of an env var path
const ENV_SEPARATOR: &str = "__";

/// Load a settings object from the config locations.
/// Further documentation can be found in the `settings` module.
pub fn load_settings_object<T>(agent_prefix: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    load_settings_from(agent_prefix, PathBuf::from("./config"), env::vars().collect())
}

pub(crate) fn load_settings_from<T>(
    agent_prefix: &str,
    config_dir: PathBuf,
    env_vars: HashMap<String, String>,
) -> Result<T>
where
    T: DeserializeOwned,
{
    // Derive additional prefix from agent name
    let prefix = format!("EXPLORER_{}", agent_prefix).to_ascii_uppercase();

    let mut base_config_sources = vec![];
    let mut builder = Config::builder();

    // Always load the default config files (`config/*.json`)
    if config_dir.is_dir() {
        let mut entries = config_dir
            .read_dir()
            .wrap_err_with(|| format!("Failed to open config directory {config_dir:?}"))?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());
        for entry in entries {
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                base_config_sources.push(format!("{:?}", path));
                builder = builder.add_source(File::from(path));
            }
        }
    }

    // Load a set of additional user specified config files
    let config_file_paths: Vec<String> = env_vars
        .get("CONFIG_FILES")
        .map(|s| s.split(',').map(|s| s.to_string()).collect())
        .unwrap_or_default();

    let builder = config_file_paths.iter().fold(builder, |builder, path| {
        builder.add_source(File::with_name(path))
    });

    let config_deserializer = builder
        // Use a base configuration env variable prefix
        .add_source(CaseAdapter::new(
            Environment::with_prefix("EXPLORER_BASE")
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(Some(env_vars.clone().into_iter().collect())),
            Case::Camel,
        ))
        .add_source(CaseAdapter::new(
            Environment::with_prefix(&prefix)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(Some(env_vars.into_iter().collect())),
            Case::Camel,
        ))
        .build()?;

    match Config::try_deserialize::<T>(config_deserializer) {
        Ok(cfg) => Ok(cfg),
        Err(err) => {
            let mut err = if let Some(source_err) = err.source() {
                let source = format!("Config error source: {source_err}");
                Err(err).context(source)
            } else {
                Err(err.into())
            };

            for cfg_path in base_config_sources.iter().chain(config_file_paths.iter()) {
                err = err.with_context(|| format!("Config loaded: {cfg_path}"));
            }

            err.context("Config deserialization error, please check the agent configuration")
        }
    }
}
