//! Inverse-variance weighted centre of a set of signal points.
//!
//! Each point is weighted by `1 / accuracy²`. The reported `accuracy` of the
//! estimate is the mean haversine distance, in meters, over every unordered
//! pair of points, so a single point reports 0.

use serde::{Deserialize, Serialize};

use crate::binning::Bin;
use crate::constants::{DEFAULT_MAX_SELECTION_ITEMS, DEFAULT_MAX_SELECTION_POINTS};
use crate::error::{GeoDeltaError, GeoDeltaResult};
use crate::geo::{haversine_m, LatLng};
use crate::record::{ObservationRecord, SignalPoint};

/// Which signal points of a record take part in the estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointPolicy {
    /// Every observed point, whatever its `used` flag says.
    #[default]
    AllObserved,
    /// Only points not explicitly flagged `used: false`.
    UsedOnly,
}

impl PointPolicy {
    pub fn admits(&self, point: &SignalPoint) -> bool {
        match self {
            PointPolicy::AllObserved => true,
            PointPolicy::UsedOnly => point.used(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedPoint {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
}

impl From<&SignalPoint> for WeightedPoint {
    fn from(point: &SignalPoint) -> Self {
        let pos = point.position();
        Self {
            lat: pos.lat,
            lng: pos.lng,
            accuracy: point.accuracy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CentroidEstimate {
    pub lat: f64,
    pub lng: f64,
    /// Mean pairwise distance between contributing points, in meters.
    pub accuracy: f64,
}

impl CentroidEstimate {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelocateOptions {
    pub policy: PointPolicy,
    pub max_items: usize,
    pub max_points: usize,
}

impl Default for RelocateOptions {
    fn default() -> Self {
        Self {
            policy: PointPolicy::default(),
            max_items: DEFAULT_MAX_SELECTION_ITEMS,
            max_points: DEFAULT_MAX_SELECTION_POINTS,
        }
    }
}

pub fn collect_points<'a, I>(records: I, policy: PointPolicy) -> Vec<WeightedPoint>
where
    I: IntoIterator<Item = &'a ObservationRecord>,
{
    let mut out = Vec::new();
    for rec in records {
        out.extend(
            rec.signal_points
                .iter()
                .filter(|p| policy.admits(p))
                .map(WeightedPoint::from),
        );
    }
    out
}

pub fn weighted_center(points: &[WeightedPoint]) -> GeoDeltaResult<CentroidEstimate> {
    if points.is_empty() {
        return Err(GeoDeltaError::NoValidPoints);
    }

    let mut lat_sum = 0.0;
    let mut lng_sum = 0.0;
    let mut weight_sum = 0.0;
    for (index, p) in points.iter().enumerate() {
        if !LatLng::new(p.lat, p.lng).is_valid() {
            return Err(GeoDeltaError::InvalidCoordinate {
                index,
                lat: p.lat,
                lng: p.lng,
            });
        }
        if !p.accuracy.is_finite() || p.accuracy <= 0.0 {
            return Err(GeoDeltaError::DegenerateAccuracy {
                index,
                accuracy: p.accuracy,
            });
        }
        let w = 1.0 / p.accuracy.powi(2);
        lat_sum += p.lat * w;
        lng_sum += p.lng * w;
        weight_sum += w;
    }

    Ok(CentroidEstimate {
        lat: lat_sum / weight_sum,
        lng: lng_sum / weight_sum,
        accuracy: mean_pairwise_distance_m(points),
    })
}

/// 0 when there are fewer than two points.
pub fn mean_pairwise_distance_m(points: &[WeightedPoint]) -> f64 {
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            sum += haversine_m(a.lat, a.lng, b.lat, b.lng);
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        sum / pairs as f64
    }
}

/// Relocate a message (or any selection of records) from its signal points.
pub fn relocate<'a, I>(records: I, options: &RelocateOptions) -> GeoDeltaResult<CentroidEstimate>
where
    I: IntoIterator<Item = &'a ObservationRecord>,
{
    let mut acc = CentroidAccumulator::new(options.policy);
    for rec in records {
        if acc.records() >= options.max_items {
            return Err(GeoDeltaError::SelectionTooLarge {
                len: acc.records() + 1,
                limit: options.max_items,
            });
        }
        acc.add_record(rec);
        if acc.len() > options.max_points {
            return Err(GeoDeltaError::TooManyPoints {
                len: acc.len(),
                limit: options.max_points,
            });
        }
    }
    let estimate = acc.finalize()?;
    tracing::debug!(
        records = acc.records(),
        points = acc.len(),
        lat = estimate.lat,
        lng = estimate.lng,
        accuracy_m = estimate.accuracy,
        "relocated selection"
    );
    Ok(estimate)
}

pub fn relocate_bin(bin: &Bin<'_>, options: &RelocateOptions) -> GeoDeltaResult<CentroidEstimate> {
    bin.check_selectable(options.max_items)?;
    relocate(bin.records(), options)
}

/// Point set that grows one record at a time.
///
/// `finalize` always recomputes over the full point set, so the result is the
/// same as calling [`weighted_center`] on every point added so far.
#[derive(Debug, Clone, Default)]
pub struct CentroidAccumulator {
    policy: PointPolicy,
    points: Vec<WeightedPoint>,
    records: usize,
}

impl CentroidAccumulator {
    pub fn new(policy: PointPolicy) -> Self {
        Self {
            policy,
            points: Vec::new(),
            records: 0,
        }
    }

    pub fn add_record(&mut self, record: &ObservationRecord) {
        let policy = self.policy;
        self.points.extend(
            record
                .signal_points
                .iter()
                .filter(|p| policy.admits(p))
                .map(WeightedPoint::from),
        );
        self.records += 1;
    }

    pub fn add_point(&mut self, point: WeightedPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[WeightedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn finalize(&self) -> GeoDeltaResult<CentroidEstimate> {
        weighted_center(&self.points)
    }
}
