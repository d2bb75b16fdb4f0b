//! Storage rows to [`ObservationRecord`]s.
//!
//! The `data`, `msg_geo` and `heterogenous_geo` columns hold JSON text, or
//! already-decoded JSON when the driver parses JSON columns itself. Decoding
//! happens once here; a row that fails is reported and left out.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GeoDeltaError, GeoDeltaResult};
use crate::record::{HeterogeneousGeo, MessageGeo, ObservationRecord, SignalPoint, Tech};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: u64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub msg_geo: Value,
    #[serde(default)]
    pub heterogenous_geo: Value,
    pub created_date: i64,
    pub bee_imei: String,
    pub msg_uuid: String,
    #[serde(default)]
    pub account_id: Option<u64>,
    #[serde(default)]
    pub msg_geo_distance: Value,
    #[serde(default)]
    pub heterogenous_geo_distance: Value,
    #[serde(default)]
    pub delta_distance: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    pub id: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct DecodedBatch {
    pub records: Vec<ObservationRecord>,
    pub skipped: Vec<SkippedRecord>,
}

impl RawRecord {
    pub fn decode(&self) -> GeoDeltaResult<ObservationRecord> {
        let malformed = |reason: String| GeoDeltaError::MalformedRecord {
            id: self.id,
            reason,
        };

        let message_geo: Option<MessageGeo> =
            embedded(&self.msg_geo).map_err(|e| malformed(format!("msg_geo: {}", e)))?;
        let heterogeneous_geo: HeterogeneousGeo = embedded(&self.heterogenous_geo)
            .map_err(|e| malformed(format!("heterogenous_geo: {}", e)))?
            .ok_or_else(|| malformed("heterogenous_geo is missing".to_string()))?;
        let (signal_points, unknown) =
            signal_points(&self.data).map_err(|e| malformed(format!("data: {}", e)))?;
        if unknown > 0 {
            tracing::debug!(id = self.id, unknown, "dropped signal points of unknown type");
        }

        let delta_distance = distance(&self.delta_distance, "delta_distance").map_err(malformed)?;
        let message_geo_distance =
            distance(&self.msg_geo_distance, "msg_geo_distance").map_err(malformed)?;
        let heterogeneous_geo_distance =
            distance(&self.heterogenous_geo_distance, "heterogenous_geo_distance")
                .map_err(malformed)?;

        Ok(ObservationRecord {
            id: self.id,
            created_date: self.created_date,
            device_id: self.bee_imei.clone(),
            message_uuid: self.msg_uuid.clone(),
            account_id: self.account_id,
            message_geo,
            heterogeneous_geo,
            signal_points,
            message_geo_distance,
            heterogeneous_geo_distance,
            delta_distance,
        })
    }
}

/// Decode every row, isolating failures to the row that caused them.
pub fn decode_rows(rows: &[RawRecord]) -> DecodedBatch {
    let mut batch = DecodedBatch::default();
    for row in rows {
        match row.decode() {
            Ok(record) => batch.records.push(record),
            Err(err) => {
                tracing::warn!(id = row.id, error = %err, "skipping malformed record");
                batch.skipped.push(SkippedRecord {
                    id: row.id,
                    reason: err.to_string(),
                });
            }
        }
    }
    tracing::debug!(
        decoded = batch.records.len(),
        skipped = batch.skipped.len(),
        "decoded storage rows"
    );
    batch
}

fn embedded<T: DeserializeOwned>(value: &Value) -> Result<Option<T>, serde_json::Error> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => serde_json::from_str::<Option<T>>(text),
        other => T::deserialize(other).map(Some),
    }
}

/// Points whose `type` is not gsm, wifi or gps are dropped, not fatal.
fn signal_points(value: &Value) -> Result<(Vec<SignalPoint>, usize), serde_json::Error> {
    let raw: Vec<Value> = embedded(value)?.unwrap_or_default();
    let mut points = Vec::with_capacity(raw.len());
    let mut unknown = 0usize;
    for point in &raw {
        if let Some(Ok(Tech::Other)) = point.get("type").map(Tech::deserialize) {
            unknown += 1;
            continue;
        }
        points.push(SignalPoint::deserialize(point)?);
    }
    Ok((points, unknown))
}

fn distance(value: &Value, field: &str) -> Result<f64, String> {
    let v = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match v {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(v) => Err(format!("{} must be a non-negative distance, got {}", field, v)),
        None => Err(format!("{} is not a number: {}", field, value)),
    }
}
