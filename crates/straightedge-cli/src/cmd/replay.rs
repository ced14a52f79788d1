//! `straightedge replay`: run the detector over a recorded diff stream.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use straightedge_core::config::ConfigSource;
use straightedge_core::detection::JsonLinesSink;
use straightedge_core::engine::BatchReport;
use straightedge_core::event::BatchReader;
use straightedge_core::model::ChangesetId;
use straightedge_core::{CloseStats, Detection, DetectorConfig, Engine, ErrorCode, MemoryHistory};
use tracing::{info, warn};

use crate::output::{OutputMode, format_rate, pretty_kv, pretty_rule, pretty_section, render_mode};

/// Arguments for `straightedge replay`.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Diff stream to replay (one JSON batch per line).
    #[arg(long, value_name = "FILE")]
    pub events: PathBuf,

    /// JSON fixture holding prior point versions and current lines.
    #[arg(long, value_name = "FILE")]
    pub history: PathBuf,

    /// Also append every detection as one JSON line to this file.
    #[arg(long, value_name = "FILE")]
    pub detections: Option<PathBuf>,

    /// Override a threshold (`KEY=VALUE`); may be repeated.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Leave changesets still open at the end of the stream unevaluated.
    #[arg(long)]
    pub keep_open: bool,

    /// Include closing-pass counters in the report.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Debug, Serialize)]
struct FailureView {
    changeset_id: ChangesetId,
    user: String,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    config_source: ConfigSource,
    detector: DetectorConfig,
    batches: u64,
    changesets_closed: usize,
    detections: Vec<Detection>,
    failures: Vec<FailureView>,
    open_changesets: Vec<ChangesetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<CloseStats>,
}

/// Replay a diff stream against a history fixture and report detections.
///
/// Changesets whose evaluation fails are listed in the report; they do not
/// fail the command.
///
/// # Errors
///
/// Returns an error if the config, fixture or stream cannot be read, or the
/// detections file cannot be written.
pub fn run_replay(
    args: &ReplayArgs,
    explicit_config: Option<&Path>,
    working_dir: &Path,
    output: OutputMode,
) -> Result<()> {
    let (detector, config_source) =
        super::config::effective_detector(explicit_config, working_dir, &args.params)?;

    let history = MemoryHistory::load(&args.history).with_context(|| {
        format!(
            "{}: Failed to load history fixture {}",
            ErrorCode::FixtureLoadFailed.code(),
            args.history.display()
        )
    })?;
    info!(
        points = history.point_count(),
        lines = history.line_count(),
        "history fixture loaded"
    );

    let events = File::open(&args.events)
        .with_context(|| format!("Failed to open {}", args.events.display()))?;

    let mut engine = Engine::new(detector);
    let mut report = BatchReport::default();
    let mut batches = 0_u64;
    for batch in BatchReader::new(BufReader::new(events)) {
        let batch = batch.with_context(|| format!("Failed to read {}", args.events.display()))?;
        batches += 1;
        report.merge(engine.ingest_batch(&batch, &history));
    }

    if args.keep_open {
        info!(
            open = engine.open_changesets().count(),
            "leaving open changesets unevaluated"
        );
    } else {
        report.merge(engine.finish(&history));
    }

    if let Some(path) = &args.detections {
        write_detections(path, &report)?;
    }

    let summary = ReplaySummary {
        config_source,
        detector,
        batches,
        changesets_closed: report.closed.len(),
        detections: report.detections().cloned().collect(),
        failures: report
            .failures
            .iter()
            .map(|failure| FailureView {
                changeset_id: failure.changeset_id,
                user: failure.owner.user.clone(),
                code: failure.error.code().code(),
                message: failure.error.to_string(),
                hint: failure.error.hint(),
            })
            .collect(),
        open_changesets: engine.open_changesets().collect(),
        stats: args.stats.then(|| report.stats()),
    };

    if !summary.failures.is_empty() {
        warn!(
            failed = summary.failures.len(),
            "some changesets could not be evaluated"
        );
    }

    render_mode(output, &summary, render_text, render_pretty)
}

fn write_detections(path: &Path, report: &BatchReport) -> Result<()> {
    let file = File::create(path).with_context(|| {
        format!(
            "{}: Failed to create {}",
            ErrorCode::SinkWriteFailed.code(),
            path.display()
        )
    })?;
    let mut sink = JsonLinesSink::new(BufWriter::new(file));
    let written = report
        .emit_to(&mut sink)
        .with_context(|| format!("Failed to write detections to {}", path.display()))?;
    sink.into_inner()
        .flush()
        .with_context(|| format!("Failed to write detections to {}", path.display()))?;
    info!(written, path = %path.display(), "detections written");
    Ok(())
}

fn render_text(summary: &ReplaySummary, w: &mut dyn Write) -> std::io::Result<()> {
    if !summary.detections.is_empty() {
        writeln!(w, "line  changeset  user  alignment_rate  max_rate")?;
    }
    for d in &summary.detections {
        writeln!(
            w,
            "{}  {}  {}  {}  {}",
            d.line_id,
            d.changeset_id,
            d.owner_user,
            format_rate(d.alignment_rate),
            format_rate(d.max_rate)
        )?;
    }
    for f in &summary.failures {
        writeln!(w, "failed  {}  {}  {}", f.changeset_id, f.code, f.message)?;
    }
    if !summary.open_changesets.is_empty() {
        let open: Vec<String> = summary.open_changesets.iter().map(ToString::to_string).collect();
        writeln!(w, "open  {}", open.join(","))?;
    }
    if let Some(stats) = &summary.stats {
        writeln!(
            w,
            "stats  evaluated={} skipped={} cleared={} resolved={} provider_calls={}",
            stats.lines_evaluated,
            stats.lines_skipped,
            stats.points_cleared,
            stats.points_resolved,
            stats.provider_calls.total()
        )?;
    }
    Ok(())
}

fn render_pretty(summary: &ReplaySummary, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Replay")?;
    pretty_kv(w, "Batches", summary.batches.to_string())?;
    pretty_kv(w, "Changesets closed", summary.changesets_closed.to_string())?;
    pretty_kv(w, "Detections", summary.detections.len().to_string())?;
    if !summary.open_changesets.is_empty() {
        pretty_kv(w, "Still open", summary.open_changesets.len().to_string())?;
    }
    writeln!(w)?;

    for d in &summary.detections {
        writeln!(
            w,
            "✗ line {} aligned in changeset {} by {} (#{})",
            d.line_id, d.changeset_id, d.owner_user, d.owner_id
        )?;
        pretty_kv(w, "  Residual ratio", format_rate(d.alignment_rate))?;
        pretty_kv(w, "  Worst residual ratio", format_rate(d.max_rate))?;
        pretty_kv(
            w,
            "  Center",
            format!("{:.6}, {:.6}", d.center.lat, d.center.lon),
        )?;
        pretty_kv(w, "  Points", d.new_points.len().to_string())?;
    }

    if !summary.failures.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Failed changesets")?;
        for f in &summary.failures {
            writeln!(w, "changeset {} [{}]: {}", f.changeset_id, f.code, f.message)?;
            if let Some(hint) = f.hint {
                writeln!(w, "  suggestion: {hint}")?;
            }
        }
    }

    if let Some(stats) = &summary.stats {
        writeln!(w)?;
        pretty_section(w, "Closing passes")?;
        pretty_kv(w, "Lines evaluated", stats.lines_evaluated.to_string())?;
        pretty_kv(w, "Lines skipped", stats.lines_skipped.to_string())?;
        pretty_kv(w, "Points cleared", stats.points_cleared.to_string())?;
        pretty_kv(w, "Points resolved", stats.points_resolved.to_string())?;
        pretty_kv(
            w,
            "Provider calls",
            format!(
                "{} (versions {}, latest {}, lines {})",
                stats.provider_calls.total(),
                stats.provider_calls.point_version,
                stats.provider_calls.latest_point,
                stats.provider_calls.lines_referencing
            ),
        )?;
    }
    pretty_rule(w)
}
