use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::ErrorCode;

/// File name looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "straightedge.toml";

/// Keys understood by [`DetectorConfig::with_parameters`].
pub const PARAMETER_KEYS: [&str; 3] = [
    "min_line_node_count",
    "modif_rate_min_level",
    "min_alignment_modification_rate",
];

/// Thresholds of the alignment heuristic.
///
/// Built once before any changeset is evaluated and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Lines with this many points or fewer are never evaluated.
    #[serde(default = "default_min_line_node_count")]
    pub min_line_node_count: u32,
    /// Share of a line's points that must have been modified.
    #[serde(default = "default_modif_rate_min_level")]
    pub modif_rate_min_level: f64,
    /// Factor by which the residuals must shrink for an edit to count as alignment.
    #[serde(default = "default_min_alignment_modification_rate")]
    pub min_alignment_modification_rate: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_line_node_count: default_min_line_node_count(),
            modif_rate_min_level: default_modif_rate_min_level(),
            min_alignment_modification_rate: default_min_alignment_modification_rate(),
        }
    }
}

impl DetectorConfig {
    /// Build from a flat key-value parameter map.
    ///
    /// Missing keys and values that do not parse keep their defaults; both
    /// cases are logged so operators can see which values are in effect.
    #[must_use]
    pub fn from_parameters(params: &BTreeMap<String, String>) -> Self {
        Self::default().with_parameters(params)
    }

    /// Overlay a key-value parameter map on these thresholds.
    ///
    /// Each key is handled on its own: a key that is absent, does not parse
    /// or holds a non-finite or negative rate keeps its current value.
    #[must_use]
    pub fn with_parameters(self, params: &BTreeMap<String, String>) -> Self {
        for key in params.keys().filter(|k| !PARAMETER_KEYS.contains(&k.as_str())) {
            warn!("unknown parameter \"{key}\" ignored");
        }
        Self {
            min_line_node_count: parameter(
                params,
                "min_line_node_count",
                self.min_line_node_count,
                |_| true,
            ),
            modif_rate_min_level: parameter(
                params,
                "modif_rate_min_level",
                self.modif_rate_min_level,
                valid_rate,
            ),
            min_alignment_modification_rate: parameter(
                params,
                "min_alignment_modification_rate",
                self.min_alignment_modification_rate,
                valid_rate,
            ),
        }
    }

    /// Reject thresholds no edit could meaningfully be compared against.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first non-finite or negative threshold.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("modif_rate_min_level", self.modif_rate_min_level),
            (
                "min_alignment_modification_rate",
                self.min_alignment_modification_rate,
            ),
        ] {
            if !valid_rate(value) {
                bail!(
                    "{}: {name} must be finite and non-negative, got {value}",
                    ErrorCode::InvalidThreshold.code()
                );
            }
        }
        Ok(())
    }
}

fn valid_rate(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn parameter<T>(
    params: &BTreeMap<String, String>,
    key: &str,
    current: T,
    accept: impl Fn(T) -> bool,
) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    let Some(raw) = params.get(key) else {
        debug!("no value for parameter \"{key}\"; keeping {current}");
        return current;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if accept(value) => {
            info!("using value {value} for parameter \"{key}\"");
            value
        }
        Ok(value) => {
            warn!(
                "{}: out-of-range value {value} for parameter \"{key}\"; keeping {current}",
                ErrorCode::InvalidThreshold.code()
            );
            current
        }
        Err(_) => {
            warn!("invalid value {raw:?} for parameter \"{key}\"; keeping {current}");
            current
        }
    }
}

/// Root of `straightedge.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    Explicit(PathBuf),
    Project(PathBuf),
    User(PathBuf),
    Defaults,
}

/// Read and validate a configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, or holds
/// invalid thresholds.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<Config>(&content).with_context(|| {
        format!(
            "{}: Failed to parse {}",
            ErrorCode::ConfigParseError.code(),
            path.display()
        )
    })?;
    config
        .detector
        .validate()
        .with_context(|| format!("Invalid thresholds in {}", path.display()))?;
    Ok(config)
}

/// Resolve the configuration: explicit path, then `./straightedge.toml`,
/// then the user config directory, then defaults.
///
/// # Errors
///
/// Returns an error if an explicit path is missing, or if the first file
/// found cannot be loaded.
pub fn resolve_config(
    explicit: Option<&Path>,
    working_dir: &Path,
) -> Result<(Config, ConfigSource)> {
    if let Some(path) = explicit {
        return Ok((load_config(path)?, ConfigSource::Explicit(path.to_path_buf())));
    }

    let project = working_dir.join(PROJECT_CONFIG_FILE);
    if project.exists() {
        return Ok((load_config(&project)?, ConfigSource::Project(project)));
    }

    if let Some(user) = user_config_path().filter(|p| p.exists()) {
        return Ok((load_config(&user)?, ConfigSource::User(user)));
    }

    Ok((Config::default(), ConfigSource::Defaults))
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("straightedge/config.toml"))
}

const fn default_min_line_node_count() -> u32 {
    2
}

const fn default_modif_rate_min_level() -> f64 {
    0.9
}

const fn default_min_alignment_modification_rate() -> f64 {
    100.0
}
