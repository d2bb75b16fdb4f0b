pub const DEFAULT_LOG_FILTER: &str = "geodelta_analyze=info,geodelta_core=info";

pub const REPORT_FILE_STEM: &str = "het-over";
pub const REPORT_FILE_EXT: &str = "json";

pub const PERCENT_DECIMALS: usize = 2;
pub const MEAN_DECIMALS: usize = 4;
