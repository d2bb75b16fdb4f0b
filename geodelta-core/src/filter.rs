use serde::{Deserialize, Serialize};

use crate::error::{GeoDeltaError, GeoDeltaResult};
use crate::record::ObservationRecord;

/// Narrows a loaded record set by device and creation date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    #[serde(default)]
    pub imei: Option<String>,
    #[serde(default)]
    pub start_date: Option<i64>,
    #[serde(default)]
    pub end_date: Option<i64>,
    #[serde(default)]
    pub heterogeneous_only: bool,
}

impl RecordFilter {
    pub fn validate(&self) -> GeoDeltaResult<()> {
        match (self.start_date, self.end_date) {
            (None, Some(_)) => Err(GeoDeltaError::InvalidDateRange(
                "end date provided without start date".to_string(),
            )),
            (Some(start), Some(end)) if end < start => Err(GeoDeltaError::InvalidDateRange(
                format!("end date {} is before start date {}", end, start),
            )),
            _ => Ok(()),
        }
    }

    /// Dates are inclusive on both ends.
    pub fn matches(&self, record: &ObservationRecord) -> bool {
        if let Some(imei) = &self.imei {
            if &record.device_id != imei {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if record.created_date < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if record.created_date > end {
                return false;
            }
        }
        !self.heterogeneous_only || record.is_heterogeneous_lookup()
    }

    pub fn apply<'a>(
        &self,
        records: &'a [ObservationRecord],
    ) -> GeoDeltaResult<Vec<&'a ObservationRecord>> {
        self.validate()?;
        Ok(records.iter().filter(|rec| self.matches(rec)).collect())
    }
}
