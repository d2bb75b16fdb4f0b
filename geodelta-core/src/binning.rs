use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BAD_THRESHOLD_M, DEFAULT_BIN_WIDTH_KM, DEFAULT_MARGINAL_THRESHOLD_M,
};
use crate::decode::SkippedRecord;
use crate::error::{GeoDeltaError, GeoDeltaResult};
use crate::record::{MessageGeo, ObservationRecord, SignalPoint, TechCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Good,
    Marginal,
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyThresholds {
    pub marginal_m: f64,
    pub bad_m: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            marginal_m: DEFAULT_MARGINAL_THRESHOLD_M,
            bad_m: DEFAULT_BAD_THRESHOLD_M,
        }
    }
}

impl AnomalyThresholds {
    /// Only heterogeneous lookups carry an anomaly signal; everything else is good.
    pub fn classify(&self, record: &ObservationRecord) -> Status {
        if !record.is_heterogeneous_lookup() {
            return Status::Good;
        }
        let d = record.delta_distance;
        if d > self.bad_m {
            Status::Bad
        } else if d > self.marginal_m {
            Status::Marginal
        } else {
            Status::Good
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinningOptions {
    pub bin_width_km: f64,
    pub heterogeneous_only: bool,
    pub thresholds: AnomalyThresholds,
}

impl Default for BinningOptions {
    fn default() -> Self {
        Self {
            bin_width_km: DEFAULT_BIN_WIDTH_KM,
            heterogeneous_only: false,
            thresholds: AnomalyThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinnedRecord<'a> {
    pub status: Status,
    pub record: &'a ObservationRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bin<'a> {
    pub index: u64,
    pub range_label: String,
    pub low_km: f64,
    pub high_km: f64,
    pub count: usize,
    /// Every signal point of every record, by type.
    pub used: TechCounts,
    /// One per record, for the tech that produced its message geo.
    pub contributed: TechCounts,
    pub items: Vec<BinnedRecord<'a>>,
}

impl<'a> Bin<'a> {
    fn new(index: u64, width_km: f64) -> Self {
        let low_km = index as f64 * width_km;
        let high_km = index.saturating_add(1) as f64 * width_km;
        Self {
            index,
            range_label: format!("{} - {} km", low_km, high_km),
            low_km,
            high_km,
            count: 0,
            used: TechCounts::default(),
            contributed: TechCounts::default(),
            items: Vec::new(),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &'a ObservationRecord> + '_ {
        self.items.iter().map(|item| item.record)
    }

    /// Refuses bins too large to hand to a single centroid or inspection pass.
    pub fn check_selectable(&self, limit: usize) -> GeoDeltaResult<()> {
        if self.items.len() > limit {
            return Err(GeoDeltaError::SelectionTooLarge {
                len: self.items.len(),
                limit,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport<'a> {
    pub marginal: Vec<&'a ObservationRecord>,
    pub bad: Vec<&'a ObservationRecord>,
}

/// Export shape for one anomalous message: its message geo plus the raw points.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyEntry<'a> {
    #[serde(flatten)]
    pub message_geo: &'a MessageGeo,
    #[serde(rename = "hetData")]
    pub het_data: &'a [SignalPoint],
}

impl<'a> AnomalyReport<'a> {
    pub fn is_empty(&self) -> bool {
        self.marginal.is_empty() && self.bad.is_empty()
    }

    pub fn marginal_entries(&self) -> Vec<AnomalyEntry<'a>> {
        entries(&self.marginal)
    }

    pub fn bad_entries(&self) -> Vec<AnomalyEntry<'a>> {
        entries(&self.bad)
    }
}

fn entries<'a>(records: &[&'a ObservationRecord]) -> Vec<AnomalyEntry<'a>> {
    records
        .iter()
        .filter_map(|rec| {
            rec.message_geo.as_ref().map(|geo| AnomalyEntry {
                message_geo: geo,
                het_data: &rec.signal_points,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram<'a> {
    pub bin_width_km: f64,
    pub bins: Vec<Bin<'a>>,
    pub total_count: usize,
    pub skipped: Vec<SkippedRecord>,
    pub anomalies: AnomalyReport<'a>,
}

impl<'a> Histogram<'a> {
    pub fn bin(&self, label: &str) -> Option<&Bin<'a>> {
        self.bins.iter().find(|b| b.range_label == label)
    }
}

/// The record set currently on display: everything, or only heterogeneous lookups.
pub fn displayed_records<'a, I>(records: I, heterogeneous_only: bool) -> Vec<&'a ObservationRecord>
where
    I: IntoIterator<Item = &'a ObservationRecord>,
{
    records
        .into_iter()
        .filter(|rec| !heterogeneous_only || rec.is_heterogeneous_lookup())
        .collect()
}

pub fn build_histogram<'a, I>(records: I, options: &BinningOptions) -> GeoDeltaResult<Histogram<'a>>
where
    I: IntoIterator<Item = &'a ObservationRecord>,
{
    let width = options.bin_width_km;
    if !width.is_finite() || width <= 0.0 {
        return Err(GeoDeltaError::InvalidBinWidth(width));
    }

    let mut bins: BTreeMap<u64, Bin<'a>> = BTreeMap::new();
    let mut total_count = 0usize;
    let mut skipped = Vec::new();
    let mut anomalies = AnomalyReport::default();

    for rec in displayed_records(records, options.heterogeneous_only) {
        if !rec.delta_distance.is_finite() || rec.delta_distance < 0.0 {
            tracing::warn!(id = rec.id, delta = rec.delta_distance, "skipping record with invalid delta distance");
            skipped.push(SkippedRecord {
                id: rec.id,
                reason: format!("invalid delta distance {}", rec.delta_distance),
            });
            continue;
        }

        let quotient = (rec.delta_distance_km() / width).floor();
        if !(quotient < u64::MAX as f64) {
            tracing::warn!(id = rec.id, delta = rec.delta_distance, width_km = width, "delta distance out of range for bin width");
            skipped.push(SkippedRecord {
                id: rec.id,
                reason: format!(
                    "delta distance {} m has no bin at width {} km",
                    rec.delta_distance, width
                ),
            });
            continue;
        }
        let index = quotient as u64;
        let bin = bins.entry(index).or_insert_with(|| Bin::new(index, width));

        let status = options.thresholds.classify(rec);
        match status {
            Status::Marginal => anomalies.marginal.push(rec),
            Status::Bad => anomalies.bad.push(rec),
            Status::Good => {}
        }

        bin.count += 1;
        bin.items.push(BinnedRecord { status, record: rec });
        bin.used.add(&rec.signal_counts());
        if let Some(tech) = rec.contributing_tech() {
            bin.contributed.record(tech);
        }
        total_count += 1;
    }

    tracing::debug!(
        bins = bins.len(),
        total_count,
        skipped = skipped.len(),
        width_km = width,
        "histogram built"
    );

    Ok(Histogram {
        bin_width_km: width,
        bins: bins.into_values().collect(),
        total_count,
        skipped,
        anomalies,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MeanCounts {
    pub gsm: f64,
    pub wifi: f64,
    pub gps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinSummary {
    pub range_label: String,
    pub count: usize,
    pub percentage: f64,
    pub mean_used: MeanCounts,
    pub contributed: TechCounts,
}

/// The `n` fullest bins; ties keep histogram order.
pub fn top_bins(histogram: &Histogram<'_>, n: usize) -> Vec<BinSummary> {
    let mut sorted: Vec<&Bin<'_>> = histogram.bins.iter().collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count));
    sorted
        .into_iter()
        .take(n)
        .map(|bin| summarize_bin(bin, histogram.total_count))
        .collect()
}

pub fn summarize_bin(bin: &Bin<'_>, total_count: usize) -> BinSummary {
    let percentage = if total_count == 0 {
        0.0
    } else {
        bin.count as f64 / total_count as f64 * 100.0
    };
    let mean = |n: usize| {
        if bin.count == 0 {
            0.0
        } else {
            n as f64 / bin.count as f64
        }
    };
    BinSummary {
        range_label: bin.range_label.clone(),
        count: bin.count,
        percentage,
        mean_used: MeanCounts {
            gsm: mean(bin.used.gsm),
            wifi: mean(bin.used.wifi),
            gps: mean(bin.used.gps),
        },
        contributed: bin.contributed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GpsPoint, GsmPoint, HeterogeneousGeo, Tech, WifiPoint};

    const TEST_EPSILON: f64 = 1e-9;

    fn gsm() -> SignalPoint {
        SignalPoint::Gsm(GsmPoint {
            cid: 1,
            lac: 1,
            mcc: 404,
            mnc: 45,
            lat: 12.0,
            lng: 77.0,
            accuracy: 900.0,
            used: None,
        })
    }

    fn wifi(used: Option<bool>) -> SignalPoint {
        SignalPoint::Wifi(WifiPoint {
            mac_address: "00:11:22:33:44:55".to_string(),
            lat: 12.001,
            lng: 77.001,
            accuracy: 25.0,
            used,
        })
    }

    fn gps() -> SignalPoint {
        SignalPoint::Gps(GpsPoint {
            lat: 12.0005,
            lng: 77.0005,
            accuracy: 8.0,
            used: None,
        })
    }

    fn record(id: u64, delta_m: f64, tech: Tech, het: bool, points: Vec<SignalPoint>) -> ObservationRecord {
        ObservationRecord {
            id,
            created_date: 1_700_000_000 + id as i64,
            device_id: "imei-1".to_string(),
            message_uuid: format!("uuid-{}", id),
            account_id: None,
            message_geo: Some(MessageGeo {
                status: None,
                tech,
                lat: 12.0,
                lng: 77.0,
                reported_accuracy: Some(30.0),
                accuracy: Some(30.0),
                source_id: Some(format!("uuid-{}", id)),
                is_heterogeneous_lookup: het,
                source: None,
            }),
            heterogeneous_geo: HeterogeneousGeo {
                lat: 12.01,
                lng: 77.01,
                accuracy: Some(100.0),
            },
            signal_points: points,
            message_geo_distance: 0.0,
            heterogeneous_geo_distance: 0.0,
            delta_distance: delta_m,
        }
    }

    fn scenario() -> Vec<ObservationRecord> {
        vec![
            record(1, 300.0, Tech::Wifi, true, vec![wifi(None), gsm()]),
            record(2, 600.0, Tech::Gsm, true, vec![gsm(), gsm(), wifi(Some(false))]),
            record(3, 1600.0, Tech::Gps, true, vec![gps()]),
        ]
    }

    #[test]
    fn three_records_fill_two_bins() {
        let records = scenario();
        let hist = build_histogram(&records, &BinningOptions::default()).unwrap();

        assert_eq!(hist.total_count, 3);
        assert_eq!(hist.bins.len(), 2);
        assert_eq!(hist.bins[0].range_label, "0 - 1 km");
        assert_eq!(hist.bins[0].count, 2);
        assert_eq!(hist.bins[1].range_label, "1 - 2 km");
        assert_eq!(hist.bins[1].count, 1);

        let ids: Vec<u64> = hist.bins[0].records().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert_eq!(hist.bins[0].items[0].status, Status::Good);
        assert_eq!(hist.bins[0].items[1].status, Status::Marginal);
        assert_eq!(hist.bins[1].items[0].status, Status::Bad);
        assert_eq!(hist.anomalies.marginal.len(), 1);
        assert_eq!(hist.anomalies.marginal[0].id, 2);
        assert_eq!(hist.anomalies.bad[0].id, 3);
    }

    #[test]
    fn used_counts_include_unused_points() {
        let records = scenario();
        let hist = build_histogram(&records, &BinningOptions::default()).unwrap();
        let first = &hist.bins[0];
        assert_eq!(first.used, TechCounts { gsm: 3, wifi: 2, gps: 0 });
        assert_eq!(first.contributed, TechCounts { gsm: 1, wifi: 1, gps: 0 });
        assert_eq!(hist.bins[1].contributed, TechCounts { gsm: 0, wifi: 0, gps: 1 });
    }

    #[test]
    fn bin_counts_sum_to_total() {
        let deltas = [0.0, 10.0, 999.9, 1000.0, 2500.0, 7200.0, 7999.0, 15000.0];
        let records: Vec<ObservationRecord> = deltas
            .iter()
            .enumerate()
            .map(|(i, d)| record(i as u64, *d, Tech::Wifi, i % 2 == 0, vec![wifi(None)]))
            .collect();
        for width in [0.5, 1.0, 2.0, 5.0] {
            let options = BinningOptions {
                bin_width_km: width,
                ..BinningOptions::default()
            };
            let hist = build_histogram(&records, &options).unwrap();
            let sum: usize = hist.bins.iter().map(|b| b.count).sum();
            assert_eq!(sum, hist.total_count);
            assert_eq!(hist.total_count, records.len());
            for bin in &hist.bins {
                for rec in bin.records() {
                    let expected = (rec.delta_distance / 1000.0 / width).floor() as u64;
                    assert_eq!(bin.index, expected);
                }
            }
            let indices: Vec<u64> = hist.bins.iter().map(|b| b.index).collect();
            let mut sorted = indices.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(indices, sorted);
        }
    }

    #[test]
    fn zero_delta_lands_in_first_bin() {
        let records = vec![record(1, 0.0, Tech::Gps, true, vec![])];
        let hist = build_histogram(&records, &BinningOptions::default()).unwrap();
        assert_eq!(hist.bins[0].index, 0);
        assert_eq!(hist.bins[0].range_label, "0 - 1 km");
    }

    #[test]
    fn fractional_width_labels() {
        let records = vec![record(1, 700.0, Tech::Gps, false, vec![])];
        let options = BinningOptions {
            bin_width_km: 0.5,
            ..BinningOptions::default()
        };
        let hist = build_histogram(&records, &options).unwrap();
        assert_eq!(hist.bins[0].range_label, "0.5 - 1 km");
    }

    #[test]
    fn heterogeneous_filter_drops_other_records() {
        let mut records = scenario();
        records.push(record(4, 5000.0, Tech::Wifi, false, vec![wifi(None)]));
        let mut no_geo = record(5, 200.0, Tech::Wifi, true, vec![]);
        no_geo.message_geo = None;
        records.push(no_geo);

        let all = build_histogram(&records, &BinningOptions::default()).unwrap();
        assert_eq!(all.total_count, 5);
        // Non-heterogeneous records are never classified.
        assert_eq!(all.anomalies.bad.len(), 1);

        let options = BinningOptions {
            heterogeneous_only: true,
            ..BinningOptions::default()
        };
        let het = build_histogram(&records, &options).unwrap();
        assert_eq!(het.total_count, 3);
        assert_eq!(displayed_records(&records, true).len(), 3);
    }

    #[test]
    fn empty_input_gives_empty_histogram() {
        let records: Vec<ObservationRecord> = Vec::new();
        let hist = build_histogram(&records, &BinningOptions::default()).unwrap();
        assert!(hist.bins.is_empty());
        assert_eq!(hist.total_count, 0);
        assert!(top_bins(&hist, 5).is_empty());
        assert!(hist.anomalies.is_empty());
    }

    #[test]
    fn invalid_width_is_rejected() {
        let records = scenario();
        for width in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let options = BinningOptions {
                bin_width_km: width,
                ..BinningOptions::default()
            };
            assert!(matches!(
                build_histogram(&records, &options),
                Err(GeoDeltaError::InvalidBinWidth(_))
            ));
        }
    }

    #[test]
    fn bad_delta_is_skipped_not_fatal() {
        let mut records = scenario();
        records.push(record(9, f64::NAN, Tech::Wifi, true, vec![]));
        records.push(record(10, -5.0, Tech::Wifi, true, vec![]));
        let hist = build_histogram(&records, &BinningOptions::default()).unwrap();
        assert_eq!(hist.total_count, 3);
        let skipped: Vec<u64> = hist.skipped.iter().map(|s| s.id).collect();
        assert_eq!(skipped, vec![9, 10]);
    }

    #[test]
    fn top_bins_rank_by_count() {
        let deltas = [100.0, 200.0, 300.0, 1100.0, 2100.0, 2200.0, 3100.0, 4100.0, 5100.0, 6100.0];
        let records: Vec<ObservationRecord> = deltas
            .iter()
            .enumerate()
            .map(|(i, d)| record(i as u64, *d, Tech::Wifi, true, vec![wifi(None), gsm()]))
            .collect();
        let hist = build_histogram(&records, &BinningOptions::default()).unwrap();
        let top = top_bins(&hist, 5);

        assert_eq!(top.len(), 5);
        assert_eq!(top[0].range_label, "0 - 1 km");
        assert_eq!(top[0].count, 3);
        assert!((top[0].percentage - 30.0).abs() < TEST_EPSILON);
        assert!((top[0].mean_used.wifi - 1.0).abs() < TEST_EPSILON);
        assert!((top[0].mean_used.gsm - 1.0).abs() < TEST_EPSILON);
        assert_eq!(top[1].range_label, "2 - 3 km");
        // Ties keep ascending bin order.
        assert_eq!(top[2].range_label, "1 - 2 km");
        assert_eq!(top[3].range_label, "3 - 4 km");
    }

    #[test]
    fn summary_guards_zero_total() {
        let bin = Bin::new(0, 1.0);
        let summary = summarize_bin(&bin, 0);
        assert_eq!(summary.percentage, 0.0);
        assert_eq!(summary.mean_used, MeanCounts::default());
    }

    #[test]
    fn oversized_bin_is_not_selectable() {
        let records = scenario();
        let hist = build_histogram(&records, &BinningOptions::default()).unwrap();
        let bin = hist.bin("0 - 1 km").unwrap();
        assert!(bin.check_selectable(2).is_ok());
        assert!(matches!(
            bin.check_selectable(1),
            Err(GeoDeltaError::SelectionTooLarge { len: 2, limit: 1 })
        ));
    }

    #[test]
    fn anomaly_entries_flatten_message_geo() {
        let records = scenario();
        let hist = build_histogram(&records, &BinningOptions::default()).unwrap();
        let entries = hist.anomalies.bad_entries();
        assert_eq!(entries.len(), 1);
        let value = serde_json::to_value(&entries).unwrap();
        assert_eq!(value[0]["tech"], "gps");
        assert_eq!(value[0]["heterogenousLookup"], true);
        assert_eq!(value[0]["hetData"][0]["type"], "gps");
    }

    #[test]
    fn rebuilding_is_identical() {
        let records = scenario();
        let a = build_histogram(&records, &BinningOptions::default()).unwrap();
        let b = build_histogram(&records, &BinningOptions::default()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn deltas_beyond_bin_index_range_are_skipped() {
        let records = vec![
            record(1, 1e30, Tech::Gsm, true, vec![]),
            record(2, 5e30, Tech::Gsm, true, vec![]),
            record(3, 0.0, Tech::Gsm, true, vec![]),
        ];
        let options = BinningOptions {
            bin_width_km: 1e-3,
            ..BinningOptions::default()
        };
        let h = build_histogram(&records, &options).unwrap();
        assert_eq!(h.total_count, 1);
        assert_eq!(h.bins.len(), 1);
        assert_eq!(h.bins[0].index, 0);
        let ids: Vec<u64> = h.skipped.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn large_in_range_delta_keeps_its_own_bin() {
        let records = vec![record(1, 1e19, Tech::Gsm, false, vec![])];
        let h = build_histogram(&records, &BinningOptions::default()).unwrap();
        assert_eq!(h.bins.len(), 1);
        assert_eq!(h.bins[0].index, 10_000_000_000_000_000);
        assert!(h.skipped.is_empty());
    }
}
