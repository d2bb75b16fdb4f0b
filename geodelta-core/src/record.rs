use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::METERS_PER_KM;
use crate::geo::LatLng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tech {
    Gsm,
    Wifi,
    Gps,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsmPoint {
    pub cid: u64,
    pub lac: u64,
    pub mcc: u32,
    pub mnc: u32,
    #[serde(deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lng: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiPoint {
    pub mac_address: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lng: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    #[serde(deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lng: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<bool>,
}

/// One raw measurement that fed a message geo estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPoint {
    Gsm(GsmPoint),
    Wifi(WifiPoint),
    Gps(GpsPoint),
}

impl SignalPoint {
    pub fn tech(&self) -> Tech {
        match self {
            SignalPoint::Gsm(_) => Tech::Gsm,
            SignalPoint::Wifi(_) => Tech::Wifi,
            SignalPoint::Gps(_) => Tech::Gps,
        }
    }

    pub fn position(&self) -> LatLng {
        match self {
            SignalPoint::Gsm(p) => LatLng::new(p.lat, p.lng),
            SignalPoint::Wifi(p) => LatLng::new(p.lat, p.lng),
            SignalPoint::Gps(p) => LatLng::new(p.lat, p.lng),
        }
    }

    pub fn accuracy(&self) -> f64 {
        match self {
            SignalPoint::Gsm(p) => p.accuracy,
            SignalPoint::Wifi(p) => p.accuracy,
            SignalPoint::Gps(p) => p.accuracy,
        }
    }

    /// An absent flag counts as used.
    pub fn used(&self) -> bool {
        let flag = match self {
            SignalPoint::Gsm(p) => p.used,
            SignalPoint::Wifi(p) => p.used,
            SignalPoint::Gps(p) => p.used,
        };
        flag != Some(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageGeo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub tech: Tech,
    #[serde(deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lng: f64,
    #[serde(default)]
    pub reported_accuracy: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(rename = "msg_source", default)]
    pub source_id: Option<String>,
    #[serde(rename = "heterogenousLookup", default)]
    pub is_heterogeneous_lookup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl MessageGeo {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeterogeneousGeo {
    #[serde(deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lng: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl HeterogeneousGeo {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// One device message pairing the message geo with the heterogeneous lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    pub id: u64,
    pub created_date: i64,
    pub device_id: String,
    pub message_uuid: String,
    #[serde(default)]
    pub account_id: Option<u64>,
    pub message_geo: Option<MessageGeo>,
    pub heterogeneous_geo: HeterogeneousGeo,
    #[serde(default)]
    pub signal_points: Vec<SignalPoint>,
    pub message_geo_distance: f64,
    pub heterogeneous_geo_distance: f64,
    pub delta_distance: f64,
}

impl ObservationRecord {
    pub fn is_heterogeneous_lookup(&self) -> bool {
        self.message_geo
            .as_ref()
            .map(|geo| geo.is_heterogeneous_lookup)
            .unwrap_or(false)
    }

    pub fn delta_distance_km(&self) -> f64 {
        self.delta_distance / METERS_PER_KM
    }

    /// Technology that produced the message geo.
    pub fn contributing_tech(&self) -> Option<Tech> {
        self.message_geo.as_ref().map(|geo| geo.tech)
    }

    pub fn signal_counts(&self) -> TechCounts {
        let mut counts = TechCounts::default();
        for point in &self.signal_points {
            counts.record(point.tech());
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TechCounts {
    pub gsm: usize,
    pub wifi: usize,
    pub gps: usize,
}

impl TechCounts {
    pub fn record(&mut self, tech: Tech) {
        match tech {
            Tech::Gsm => self.gsm += 1,
            Tech::Wifi => self.wifi += 1,
            Tech::Gps => self.gps += 1,
            Tech::Other => {}
        }
    }

    pub fn add(&mut self, other: &TechCounts) {
        self.gsm += other.gsm;
        self.wifi += other.wifi;
        self.gps += other.gps;
    }

    pub fn total(&self) -> usize {
        self.gsm + self.wifi + self.gps
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Storage sometimes writes coordinates as JSON strings.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(v) => Ok(v),
        NumberOrText::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid number {:?}", s))),
    }
}
