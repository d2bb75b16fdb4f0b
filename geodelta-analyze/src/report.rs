use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use geodelta_core::{
    AnomalyEntry, AnomalyReport, AnomalyThresholds, ObservationRecord, SkippedRecord,
};

use crate::constants::{REPORT_FILE_EXT, REPORT_FILE_STEM};

#[derive(Debug, Default)]
pub struct ReportFiles {
    pub written: Vec<PathBuf>,
    /// Records whose device id cannot name a directory under the report dir.
    pub skipped: Vec<SkippedRecord>,
}

/// Writes `<dir>/<imei>/<imei>-het-over-<threshold>.json` for each device
/// that has marginal or bad messages. Empty lists produce no file.
pub fn write_anomaly_reports(
    dir: &Path,
    report: &AnomalyReport<'_>,
    thresholds: &AnomalyThresholds,
) -> Result<ReportFiles> {
    let mut files = ReportFiles::default();
    for (imei, device_report) in by_device(report) {
        if !is_plain_file_name(imei) {
            tracing::warn!(imei = %imei, "device id is not a plain file name, report not written");
            let records = device_report.marginal.iter().chain(&device_report.bad);
            files.skipped.extend(records.map(|rec| SkippedRecord {
                id: rec.id,
                reason: format!("device id {:?} cannot name a report file", imei),
            }));
            continue;
        }
        let device_dir = dir.join(imei);
        let marginal = device_report.marginal_entries();
        let bad = device_report.bad_entries();
        if marginal.is_empty() && bad.is_empty() {
            continue;
        }
        fs::create_dir_all(&device_dir)
            .with_context(|| format!("creating report dir {}", device_dir.display()))?;
        if !marginal.is_empty() {
            let path = device_dir.join(report_file_name(imei, thresholds.marginal_m));
            write_entries(&path, &marginal)?;
            files.written.push(path);
        }
        if !bad.is_empty() {
            let path = device_dir.join(report_file_name(imei, thresholds.bad_m));
            write_entries(&path, &bad)?;
            files.written.push(path);
        }
    }
    Ok(files)
}

pub fn report_file_name(imei: &str, threshold_m: f64) -> String {
    format!("{}-{}-{}.{}", imei, REPORT_FILE_STEM, threshold_m, REPORT_FILE_EXT)
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn by_device<'a>(report: &AnomalyReport<'a>) -> BTreeMap<&'a str, AnomalyReport<'a>> {
    let mut out: BTreeMap<&'a str, AnomalyReport<'a>> = BTreeMap::new();
    let key = |rec: &'a ObservationRecord| rec.device_id.as_str();
    for &rec in &report.marginal {
        out.entry(key(rec)).or_default().marginal.push(rec);
    }
    for &rec in &report.bad {
        out.entry(key(rec)).or_default().bad.push(rec);
    }
    out
}

fn write_entries(path: &Path, entries: &[AnomalyEntry<'_>]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, entries)
        .with_context(|| format!("writing {}", path.display()))?;
    writer.flush()?;
    tracing::info!(path = %path.display(), entries = entries.len(), "wrote anomaly report");
    Ok(())
}
