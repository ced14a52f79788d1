use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use straightedge_core::DetectorConfig;
use straightedge_core::config::{ConfigSource, resolve_config};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `straightedge config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Override a threshold (`KEY=VALUE`); may be repeated.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    source: ConfigSource,
    detector: DetectorConfig,
}

/// Resolve the thresholds for a run: the config file, then `--param` overrides.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded or a parameter is
/// malformed.
pub fn effective_detector(
    explicit: Option<&Path>,
    working_dir: &Path,
    raw_params: &[String],
) -> Result<(DetectorConfig, ConfigSource)> {
    let (config, source) = resolve_config(explicit, working_dir)?;
    tracing::debug!(?source, "configuration resolved");
    let params = super::parse_params(raw_params)?;
    let detector = if params.is_empty() {
        config.detector
    } else {
        config.detector.with_parameters(&params)
    };
    Ok((detector, source))
}

/// Show the effective detector configuration and where it came from.
///
/// # Errors
///
/// Returns an error if the configuration cannot be resolved or written.
pub fn run_config(
    args: &ConfigArgs,
    explicit: Option<&Path>,
    working_dir: &Path,
    output: OutputMode,
) -> Result<()> {
    let (detector, source) = effective_detector(explicit, working_dir, &args.params)?;
    let effective = EffectiveConfig { source, detector };

    render_mode(
        output,
        &effective,
        |cfg, w| {
            writeln!(w, "source {}", source_label(&cfg.source))?;
            writeln!(w, "min_line_node_count {}", cfg.detector.min_line_node_count)?;
            writeln!(w, "modif_rate_min_level {}", cfg.detector.modif_rate_min_level)?;
            writeln!(
                w,
                "min_alignment_modification_rate {}",
                cfg.detector.min_alignment_modification_rate
            )
        },
        |cfg, w| {
            pretty_section(w, "Detector configuration")?;
            pretty_kv(w, "Source", source_label(&cfg.source))?;
            pretty_kv(
                w,
                "min_line_node_count",
                cfg.detector.min_line_node_count.to_string(),
            )?;
            pretty_kv(
                w,
                "modif_rate_min_level",
                cfg.detector.modif_rate_min_level.to_string(),
            )?;
            pretty_kv(
                w,
                "min_alignment_modification_rate",
                cfg.detector.min_alignment_modification_rate.to_string(),
            )
        },
    )
}

fn source_label(source: &ConfigSource) -> String {
    match source {
        ConfigSource::Explicit(path) => format!("explicit ({})", path.display()),
        ConfigSource::Project(path) => format!("project ({})", path.display()),
        ConfigSource::User(path) => format!("user ({})", path.display()),
        ConfigSource::Defaults => "defaults".to_string(),
    }
}
