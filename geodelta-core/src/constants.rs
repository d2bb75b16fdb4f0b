pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const METERS_PER_KM: f64 = 1000.0;

pub const DEFAULT_BIN_WIDTH_KM: f64 = 1.0;
pub const DEFAULT_MARGINAL_THRESHOLD_M: f64 = 500.0;
pub const DEFAULT_BAD_THRESHOLD_M: f64 = 1000.0;
pub const DEFAULT_TOP_BINS: usize = 5;
pub const DEFAULT_MAX_SELECTION_ITEMS: usize = 5000;
/// Bounds the pairwise uncertainty pass, which is quadratic in points.
pub const DEFAULT_MAX_SELECTION_POINTS: usize = 20_000;

pub const DEFAULT_VIEW_LAT: f64 = 0.0;
pub const DEFAULT_VIEW_LNG: f64 = 0.0;
pub const DEFAULT_VIEW_ZOOM: u8 = 2;

pub const UUID_SUGGESTION_LIMIT: usize = 5;

pub const WORLD_LAT_MAX: f64 = 90.0;
pub const WORLD_LON_MAX: f64 = 180.0;
