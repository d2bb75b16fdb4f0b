mod constants;
mod report;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use geodelta_core::{
    build_histogram, decode_rows, displayed_records, group_by_message_uuid, inspection_viewport,
    overview_viewport, relocate, relocate_bin, search_uuids, top_bins, AnalysisConfig,
    BinSummary, CentroidEstimate, GeoDeltaResult, Histogram, ObservationRecord, RawRecord,
    RecordFilter, SkippedRecord, Status, TechCounts, Viewport,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use constants::*;

#[derive(Parser, Debug)]
#[command(about = "Bucket message geo vs heterogeneous lookup deltas and relocate selections")]
struct Args {
    /// JSONL export of heterogeneous lookup rows
    #[arg(long)]
    records: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    bin_width: Option<f64>,

    #[arg(long)]
    het_only: bool,

    #[arg(long)]
    imei: Option<String>,

    #[arg(long)]
    start_date: Option<i64>,

    #[arg(long)]
    end_date: Option<i64>,

    #[arg(long)]
    top: Option<usize>,

    /// Relocate the records of one bin, by label (e.g. "1 - 2 km")
    #[arg(long)]
    relocate_bin: Option<String>,

    /// Relocate the records of one message
    #[arg(long)]
    relocate_uuid: Option<String>,

    /// Frame the map on one message instead of the whole set
    #[arg(long)]
    inspect: Option<String>,

    /// Suggest message UUIDs containing this text
    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    report_dir: Option<PathBuf>,

    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BinOutput {
    range_label: String,
    count: usize,
    signals: usize,
    used: TechCounts,
    contributed: TechCounts,
    marginal: usize,
    bad: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Relocation {
    selection: String,
    records: usize,
    estimate: Option<CentroidEstimate>,
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    bin_width_km: f64,
    heterogeneous_only: bool,
    marginal_threshold_m: f64,
    bad_threshold_m: f64,
    max_selection_items: usize,
    filter: RecordFilter,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisOutput {
    params: Params,
    loaded: usize,
    unreadable_lines: usize,
    skipped: Vec<SkippedRecord>,
    total_count: usize,
    bins: Vec<BinOutput>,
    top_bins: Vec<BinSummary>,
    marginal: usize,
    bad: usize,
    relocations: Vec<Relocation>,
    viewport: Viewport,
    uuid_suggestions: Option<Vec<String>>,
    reports_written: Vec<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    apply_overrides(&mut cfg, &args);
    cfg.validate()?;

    let filter = RecordFilter {
        imei: args.imei.clone(),
        start_date: args.start_date,
        end_date: args.end_date,
        heterogeneous_only: false,
    };
    filter.validate()?;

    let (rows, unreadable_lines) = load_jsonl(&args.records)?;
    let batch = decode_rows(&rows);
    tracing::info!(
        rows = rows.len(),
        decoded = batch.records.len(),
        skipped = batch.skipped.len(),
        unreadable_lines,
        "loaded records"
    );

    let selected = filter.apply(&batch.records)?;
    let histogram = build_histogram(selected.iter().copied(), &cfg.binning_options())?;
    let displayed = displayed_records(selected.iter().copied(), cfg.heterogeneous_only);
    let top = top_bins(&histogram, cfg.top_bins);

    let mut relocations = Vec::new();
    if let Some(label) = &args.relocate_bin {
        relocations.push(relocate_by_bin(&histogram, label, &cfg));
    }
    if let Some(uuid) = &args.relocate_uuid {
        relocations.push(relocate_by_uuid(&displayed, uuid, &cfg));
    }

    let viewport = match &args.inspect {
        Some(uuid) => match displayed.iter().find(|r| &r.message_uuid == uuid) {
            Some(rec) => inspection_viewport(rec, &cfg.default_view),
            None => {
                tracing::warn!(uuid = %uuid, "inspected message not in the displayed set");
                overview_viewport(displayed.iter().copied(), &cfg.default_view)
            }
        },
        None => overview_viewport(displayed.iter().copied(), &cfg.default_view),
    };

    let uuid_suggestions = args.search.as_deref().map(|query| {
        let groups = group_by_message_uuid(displayed.iter().copied());
        let options: Vec<&str> = groups.keys().copied().collect();
        search_uuids(&options, query, &[])
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    let reports = match &args.report_dir {
        Some(dir) => report::write_anomaly_reports(dir, &histogram.anomalies, &cfg.thresholds())?,
        None => report::ReportFiles::default(),
    };

    let mut skipped = batch.skipped.clone();
    skipped.extend(histogram.skipped.iter().cloned());
    skipped.extend(reports.skipped);

    let output = AnalysisOutput {
        params: Params {
            bin_width_km: cfg.bin_width_km,
            heterogeneous_only: cfg.heterogeneous_only,
            marginal_threshold_m: cfg.marginal_threshold_m,
            bad_threshold_m: cfg.bad_threshold_m,
            max_selection_items: cfg.max_selection_items,
            filter,
        },
        loaded: rows.len(),
        unreadable_lines,
        skipped,
        total_count: histogram.total_count,
        bins: bin_outputs(&histogram),
        top_bins: top,
        marginal: histogram.anomalies.marginal.len(),
        bad: histogram.anomalies.bad.len(),
        relocations,
        viewport,
        uuid_suggestions,
        reports_written: reports.written,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_summary(&output);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn apply_overrides(cfg: &mut AnalysisConfig, args: &Args) {
    if let Some(width) = args.bin_width {
        cfg.bin_width_km = width;
    }
    if args.het_only {
        cfg.heterogeneous_only = true;
    }
    if let Some(top) = args.top {
        cfg.top_bins = top;
    }
}

/// Returns the parsed rows and the number of lines that were not valid rows.
fn load_jsonl(path: &Path) -> Result<(Vec<RawRecord>, usize)> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    let mut unreadable = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(&line) {
            Ok(rec) => out.push(rec),
            Err(err) => {
                tracing::warn!(line = n + 1, error = %err, "skipping unreadable line");
                unreadable += 1;
            }
        }
    }
    Ok((out, unreadable))
}

fn bin_outputs(histogram: &Histogram<'_>) -> Vec<BinOutput> {
    histogram
        .bins
        .iter()
        .map(|bin| {
            let (mut marginal, mut bad) = (0, 0);
            for item in &bin.items {
                match item.status {
                    Status::Marginal => marginal += 1,
                    Status::Bad => bad += 1,
                    Status::Good => {}
                }
            }
            BinOutput {
                range_label: bin.range_label.clone(),
                count: bin.count,
                signals: bin.used.total(),
                used: bin.used,
                contributed: bin.contributed,
                marginal,
                bad,
            }
        })
        .collect()
}

fn relocate_by_bin(histogram: &Histogram<'_>, label: &str, cfg: &AnalysisConfig) -> Relocation {
    let selection = format!("bin {}", label);
    let Some(bin) = histogram.bin(label) else {
        return relocation_failed(selection, 0, format!("no bin labelled {:?}", label));
    };
    relocation(selection, bin.count, relocate_bin(bin, &cfg.relocate_options()))
}

fn relocate_by_uuid(
    displayed: &[&ObservationRecord],
    uuid: &str,
    cfg: &AnalysisConfig,
) -> Relocation {
    let selection = format!("message {}", uuid);
    let matching: Vec<&ObservationRecord> = displayed
        .iter()
        .copied()
        .filter(|r| r.message_uuid == uuid)
        .collect();
    if matching.is_empty() {
        return relocation_failed(selection, 0, "no displayed records for message".to_string());
    }
    let result = relocate(matching.iter().copied(), &cfg.relocate_options());
    relocation(selection, matching.len(), result)
}

fn relocation(
    selection: String,
    records: usize,
    result: GeoDeltaResult<CentroidEstimate>,
) -> Relocation {
    match result {
        Ok(estimate) => Relocation {
            selection,
            records,
            estimate: Some(estimate),
            error: None,
        },
        Err(err) => relocation_failed(selection, records, err.to_string()),
    }
}

fn relocation_failed(selection: String, records: usize, error: String) -> Relocation {
    tracing::warn!(selection = %selection, error = %error, "relocation failed");
    Relocation {
        selection,
        records,
        estimate: None,
        error: Some(error),
    }
}

fn print_summary(out: &AnalysisOutput) {
    println!(
        "Loaded {} rows ({} unreadable lines, {} skipped records)",
        out.loaded,
        out.unreadable_lines,
        out.skipped.len()
    );
    for s in &out.skipped {
        println!("  skipped id={} reason={}", s.id, s.reason);
    }

    println!(
        "\nDelta distance histogram (bin width {} km{}):",
        out.params.bin_width_km,
        if out.params.heterogeneous_only { ", heterogeneous lookups only" } else { "" }
    );
    for b in &out.bins {
        println!(
            "- {:>14} count={} signals={} used gsm={} wifi={} gps={} contributed gsm={} wifi={} gps={} marginal={} bad={}",
            b.range_label,
            b.count,
            b.signals,
            b.used.gsm,
            b.used.wifi,
            b.used.gps,
            b.contributed.gsm,
            b.contributed.wifi,
            b.contributed.gps,
            b.marginal,
            b.bad
        );
    }

    println!("\nTop buckets: {} points", out.total_count);
    print_top_bins(&out.top_bins);

    println!(
        "\nAnomalies: marginal={} (> {} m) bad={} (> {} m)",
        out.marginal, out.params.marginal_threshold_m, out.bad, out.params.bad_threshold_m
    );

    for r in &out.relocations {
        print_relocation(r);
    }

    match &out.viewport {
        Viewport::Fit(b) => {
            let center = b.center();
            println!(
                "\nViewport: sw=({:.5}, {:.5}) ne=({:.5}, {:.5}) center=({:.5}, {:.5})",
                b.south_west.lat,
                b.south_west.lng,
                b.north_east.lat,
                b.north_east.lng,
                center.lat,
                center.lng
            );
        }
        Viewport::Default(v) => println!(
            "\nViewport: default view center=({}, {}) zoom={}",
            v.lat, v.lng, v.zoom
        ),
    }

    if let Some(suggestions) = &out.uuid_suggestions {
        println!("\nMatching message UUIDs:");
        for s in suggestions {
            println!("- {}", s);
        }
    }

    for path in &out.reports_written {
        println!("Wrote {}", path.display());
    }
}

fn print_top_bins(top: &[BinSummary]) {
    for b in top {
        println!(
            "- {} count={} ({:.*}%) avg gsm={:.*} wifi={:.*} gps={:.*}",
            b.range_label,
            b.count,
            PERCENT_DECIMALS,
            b.percentage,
            MEAN_DECIMALS,
            b.mean_used.gsm,
            MEAN_DECIMALS,
            b.mean_used.wifi,
            MEAN_DECIMALS,
            b.mean_used.gps
        );
    }
}

fn print_relocation(r: &Relocation) {
    println!("\nRelocate {} ({} records):", r.selection, r.records);
    match (&r.estimate, &r.error) {
        (Some(est), _) => println!(
            "- lat={:.6}, lng={:.6}, uncertainty={:.1}m",
            est.lat, est.lng, est.accuracy
        ),
        (None, Some(err)) => println!("- failed: {}", err),
        (None, None) => println!("- no estimate"),
    }
}
