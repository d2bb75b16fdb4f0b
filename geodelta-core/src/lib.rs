//! Review of message geo estimates against heterogeneous lookups.
//!
//! Records come in already decoded ([`decode_rows`]), get bucketed by delta
//! distance ([`build_histogram`]), and a selection can be relocated from its
//! raw signal points ([`relocate`]) or framed on a map ([`overview_viewport`]).
//! Every pass is a pure function of its input.

pub mod binning;
pub mod bounds;
pub mod centroid;
pub mod config;
pub mod constants;
pub mod decode;
pub mod error;
pub mod filter;
pub mod geo;
pub mod inspect;
pub mod record;

pub use binning::{
    build_histogram, displayed_records, summarize_bin, top_bins, AnomalyEntry, AnomalyReport,
    AnomalyThresholds, Bin, BinSummary, BinnedRecord, BinningOptions, Histogram, MeanCounts,
    Status,
};
pub use bounds::{
    inspection_bounds, inspection_viewport, overview_bounds, overview_viewport, BoundsBuilder,
    DefaultView, GeoBounds, Viewport,
};
pub use centroid::{
    collect_points, mean_pairwise_distance_m, relocate, relocate_bin, weighted_center,
    CentroidAccumulator, CentroidEstimate, PointPolicy, RelocateOptions, WeightedPoint,
};
pub use config::AnalysisConfig;
pub use decode::{decode_rows, DecodedBatch, RawRecord, SkippedRecord};
pub use error::{GeoDeltaError, GeoDeltaResult};
pub use filter::RecordFilter;
pub use geo::{haversine_km, haversine_m, LatLng};
pub use inspect::{flatten_map_points, group_by_message_uuid, search_uuids, select_points, MapPoint};
pub use record::{
    GpsPoint, GsmPoint, HeterogeneousGeo, MessageGeo, ObservationRecord, SignalPoint, Tech,
    TechCounts, WifiPoint,
};
