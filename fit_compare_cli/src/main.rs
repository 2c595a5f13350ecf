use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use fit_compare::{
    decode_activity, normalize_activity, CombinedPoint, CombinedSeries, ComparisonState,
    LoadedFile, PercentRange, Slot,
};
use plotters::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "FIT activity heart-rate comparison CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare the heart-rate series of two FIT files on one timeline
    Compare(CompareArgs),
    /// Inspect FIT files for record counts, time spans, and heart-rate coverage
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct CompareArgs {
    /// First FIT file (series A)
    #[arg(value_hint = ValueHint::FilePath)]
    file_a: PathBuf,

    /// Second FIT file (series B)
    #[arg(value_hint = ValueHint::FilePath)]
    file_b: PathBuf,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "comparison.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output PNG chart path (defaults next to CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG chart path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Disable chart generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Zoom window start as percent of the combined series (0-100)
    #[arg(long, default_value_t = 0.0)]
    zoom_start: f64,

    /// Zoom window end as percent of the combined series (0-100)
    #[arg(long, default_value_t = 100.0)]
    zoom_end: f64,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// FIT files to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Report output path (stdout when omitted)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Emit the report as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match &cli.command {
        Command::Compare(args) => {
            if args.verbose {
                "debug"
            } else {
                "info"
            }
        }
        Command::Inspect(args) => {
            if args.verbose {
                "debug"
            } else {
                "info"
            }
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Compare(args) => handle_compare(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn handle_compare(args: CompareArgs) -> Result<()> {
    let mut state = ComparisonState::new();

    for (slot, path) in [(Slot::A, &args.file_a), (Slot::B, &args.file_b)] {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("activity");
        match state.load_slot(slot, file_name, &data) {
            Ok(true) => {
                let loaded = state
                    .slot(slot)
                    .ok_or_else(|| anyhow!("slot missing after load"))?;
                info!(
                    "Loaded {}: {} samples, sport {}",
                    path.display(),
                    loaded.samples.len(),
                    loaded.summary.sport
                );
            }
            Ok(false) => {
                warn!(
                    "{} decoded cleanly but contained no activity; slot left empty",
                    path.display()
                );
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to load {}", path.display()));
            }
        }
    }

    let combined = state
        .combined()
        .ok_or_else(|| anyhow!("need two decoded activities to compare"))?;
    info!(
        "Combined series: {} points ({} vs {})",
        combined.len(),
        combined.name_a,
        combined.name_b
    );

    if args.zoom_start != 0.0 || args.zoom_end != 100.0 {
        state.set_visual_range(PercentRange {
            start: args.zoom_start,
            end: args.zoom_end,
        });
    }
    let window = state.zoom();
    let points: &[CombinedPoint] = match window {
        Some(zoom) => {
            info!(
                "Zoom window: indices {}..={} of {}",
                zoom.start_index,
                zoom.end_index,
                combined.len()
            );
            &combined.points[zoom.start_index..=zoom.end_index]
        }
        None => &combined.points,
    };

    print_summary_table(&state, &combined)?;

    if args.output.as_os_str() == "-" {
        write_combined_stdout(&combined, points)?;
    } else {
        write_combined_csv(&combined, points, &args.output)?;
        info!("Wrote comparison CSV: {}", args.output.display());
    }

    if !args.no_plot {
        let png = args.png.clone().or_else(|| {
            if args.output.as_os_str() == "-" {
                None
            } else {
                Some(args.output.with_extension("png"))
            }
        });
        if let Some(path) = png {
            match render_chart(&combined, points, &path, ChartKind::Png) {
                Ok(()) => info!("Wrote chart: {}", path.display()),
                Err(err) => warn!("Skipping PNG render ({}): {}", path.display(), err),
            }
        }
        if let Some(path) = args.svg.as_ref() {
            match render_chart(&combined, points, path, ChartKind::Svg) {
                Ok(()) => info!("Wrote chart: {}", path.display()),
                Err(err) => warn!("Skipping SVG render ({}): {}", path.display(), err),
            }
        }
    }

    Ok(())
}

fn print_summary_table(state: &ComparisonState, combined: &CombinedSeries) -> Result<()> {
    let a = state
        .slot(Slot::A)
        .ok_or_else(|| anyhow!("series A missing"))?;
    let b = state
        .slot(Slot::B)
        .ok_or_else(|| anyhow!("series B missing"))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(
        handle,
        "{:<28} {:<24} {:<24}",
        "Metric", combined.name_a, combined.name_b
    )?;
    for (label, left, right) in summary_rows(a, b) {
        writeln!(handle, "{:<28} {:<24} {:<24}", label, left, right)?;
    }
    writeln!(handle)?;
    Ok(())
}

fn summary_rows(a: &LoadedFile, b: &LoadedFile) -> Vec<(&'static str, String, String)> {
    let time_or_dash = |t: Option<DateTime<Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
    };
    vec![
        ("Sport", a.summary.sport.clone(), b.summary.sport.clone()),
        (
            "Sub sport",
            a.summary.sub_sport.clone(),
            b.summary.sub_sport.clone(),
        ),
        (
            "Start time",
            time_or_dash(a.summary.start_time),
            time_or_dash(b.summary.start_time),
        ),
        (
            "End time",
            time_or_dash(a.summary.end_time),
            time_or_dash(b.summary.end_time),
        ),
        (
            "Avg heart rate (bpm)",
            a.summary.avg_heart_rate.to_string(),
            b.summary.avg_heart_rate.to_string(),
        ),
        (
            "Max heart rate (bpm)",
            a.summary.max_heart_rate.to_string(),
            b.summary.max_heart_rate.to_string(),
        ),
        (
            "Samples",
            a.samples.len().to_string(),
            b.samples.len().to_string(),
        ),
    ]
}

fn write_combined_stdout(series: &CombinedSeries, points: &[CombinedPoint]) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_combined_rows(series, points, &mut writer)
}

fn write_combined_csv(
    series: &CombinedSeries,
    points: &[CombinedPoint],
    path: &Path,
) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_combined_rows(series, points, &mut writer)
}

fn write_combined_rows<W: Write>(
    series: &CombinedSeries,
    points: &[CombinedPoint],
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    writer.write_record(["timestamp", series.name_a.as_str(), series.name_b.as_str()])?;
    for point in points {
        writer.write_record([
            point.timestamp.to_rfc3339(),
            point.a.map(|v| v.to_string()).unwrap_or_default(),
            point.b.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum ChartKind {
    Png,
    Svg,
}

fn render_chart(
    series: &CombinedSeries,
    points: &[CombinedPoint],
    path: &Path,
    kind: ChartKind,
) -> Result<()> {
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, (1280, 720)).into_drawing_area();
            draw_chart(root, series, points)
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, (1280, 720)).into_drawing_area();
            draw_chart(root, series, points)
        }
    }
}

fn draw_chart<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    series: &CombinedSeries,
    points: &[CombinedPoint],
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if points.is_empty() {
        return Err(anyhow!("no points in the selected window"));
    }
    let base = points[0].timestamp;
    let span_s = (points[points.len() - 1].timestamp - base)
        .num_milliseconds()
        .max(1) as f64
        / 1000.0;
    let max_hr = points
        .iter()
        .flat_map(|p| [p.a, p.b])
        .flatten()
        .fold(0.0_f64, f64::max);
    if max_hr <= 0.0 {
        return Err(anyhow!("no heart-rate values in the selected window"));
    }

    root.fill(&WHITE).map_err(|e| anyhow!("{e}"))?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{} vs {}", series.name_a, series.name_b),
            ("sans-serif", 28),
        )
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..span_s, 0.0..max_hr * 1.1)
        .map_err(|e| anyhow!("{e}"))?;
    chart
        .configure_mesh()
        .x_desc("elapsed (s)")
        .y_desc("heart rate (bpm)")
        .draw()
        .map_err(|e| anyhow!("{e}"))?;

    let palette = [RED, BLUE];
    let names = [series.name_a.as_str(), series.name_b.as_str()];
    let picks: [fn(&CombinedPoint) -> Option<f64>; 2] = [|p| p.a, |p| p.b];
    for ((name, pick), color) in names.iter().zip(picks).zip(palette) {
        let mut labeled = false;
        for segment in series_segments(points, base, pick) {
            let line = chart
                .draw_series(LineSeries::new(segment, color.stroke_width(2)))
                .map_err(|e| anyhow!("{e}"))?;
            if !labeled {
                line.label(*name)
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                labeled = true;
            }
        }
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()
        .map_err(|e| anyhow!("{e}"))?;
    root.present().map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

/// Split one side of the combined series into contiguous polyline runs so
/// gaps where that file contributed nothing break the line instead of being
/// bridged.
fn series_segments<F>(
    points: &[CombinedPoint],
    base: DateTime<Utc>,
    pick: F,
) -> Vec<Vec<(f64, f64)>>
where
    F: Fn(&CombinedPoint) -> Option<f64>,
{
    let mut segments = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    for point in points {
        match pick(point) {
            Some(value) => {
                let x = (point.timestamp - base).num_milliseconds() as f64 / 1000.0;
                current.push((x, value));
            }
            None => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

#[derive(Debug, Serialize)]
struct SessionReport {
    sport: String,
    sub_sport: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    avg_heart_rate: f64,
    max_heart_rate: f64,
    samples: usize,
}

#[derive(Debug, Serialize)]
struct InspectReport {
    file: String,
    records: usize,
    timespan_s: Option<f64>,
    hr_min: Option<f64>,
    hr_avg: Option<f64>,
    hr_max: Option<f64>,
    sessions: Vec<SessionReport>,
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let mut reports = Vec::new();

    for path in &args.inputs {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let activity = match decode_activity(&data) {
            Ok(activity) => activity,
            Err(err) => {
                warn!("Skipping {}: {}", path.display(), err);
                continue;
            }
        };
        let normalized = normalize_activity(&activity);
        reports.push(build_report(path, &normalized));
    }

    if reports.is_empty() {
        return Err(anyhow!("no inspectable files"));
    }

    let rendered = if args.json {
        serde_json::to_string_pretty(&reports)?
    } else {
        reports.iter().map(render_report).collect::<Vec<_>>().join("\n")
    };

    match args.output.as_ref() {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Inspection report written: {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn build_report(path: &Path, normalized: &[fit_compare::NormalizedActivity]) -> InspectReport {
    let samples: Vec<_> = normalized
        .iter()
        .flat_map(|activity| activity.samples.iter())
        .collect();
    let records = samples.len();
    let timespan_s = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => Some(
            (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0,
        ),
        _ => None,
    };
    let rates: Vec<f64> = samples
        .iter()
        .map(|s| s.heart_rate)
        .filter(|&hr| hr > 0.0)
        .collect();
    let (hr_min, hr_avg, hr_max) = if rates.is_empty() {
        (None, None, None)
    } else {
        let min = rates.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = rates.iter().cloned().fold(0.0_f64, f64::max);
        let avg = rates.iter().sum::<f64>() / rates.len() as f64;
        (Some(min), Some(avg), Some(max))
    };

    InspectReport {
        file: path.display().to_string(),
        records,
        timespan_s,
        hr_min,
        hr_avg,
        hr_max,
        sessions: normalized
            .iter()
            .map(|activity| SessionReport {
                sport: activity.summary.sport.clone(),
                sub_sport: activity.summary.sub_sport.clone(),
                start_time: activity.summary.start_time,
                end_time: activity.summary.end_time,
                avg_heart_rate: activity.summary.avg_heart_rate,
                max_heart_rate: activity.summary.max_heart_rate,
                samples: activity.samples.len(),
            })
            .collect(),
    }
}

fn render_report(report: &InspectReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("FILE: {}\n", report.file));
    out.push_str(&format!("  records: {}\n", report.records));
    if let Some(span) = report.timespan_s {
        out.push_str(&format!("  timespan_s: {span:.1}\n"));
    }
    if let (Some(min), Some(avg), Some(max)) = (report.hr_min, report.hr_avg, report.hr_max) {
        out.push_str(&format!(
            "  heart_rate: min={min:.0} avg={avg:.1} max={max:.0}\n"
        ));
    }
    for session in &report.sessions {
        out.push_str(&format!(
            "  session: sport={} sub_sport={} samples={} avg_hr={:.0} max_hr={:.0}\n",
            session.sport,
            session.sub_sport,
            session.samples,
            session.avg_heart_rate,
            session.max_heart_rate
        ));
    }
    out
}
