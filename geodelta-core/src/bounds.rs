use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_VIEW_LAT, DEFAULT_VIEW_LNG, DEFAULT_VIEW_ZOOM};
use crate::geo::LatLng;
use crate::record::ObservationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl GeoBounds {
    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.south_west.lat
            && p.lat <= self.north_east.lat
            && p.lng >= self.south_west.lng
            && p.lng <= self.north_east.lng
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefaultView {
    pub lat: f64,
    pub lng: f64,
    pub zoom: u8,
}

impl Default for DefaultView {
    fn default() -> Self {
        Self {
            lat: DEFAULT_VIEW_LAT,
            lng: DEFAULT_VIEW_LNG,
            zoom: DEFAULT_VIEW_ZOOM,
        }
    }
}

/// Either a region to fit, or the fixed view used when there is nothing to frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Viewport {
    Fit(GeoBounds),
    Default(DefaultView),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoundsBuilder {
    bounds: Option<GeoBounds>,
}

impl BoundsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points that are not finite or fall off the globe are ignored.
    pub fn extend(&mut self, p: LatLng) -> &mut Self {
        if !p.is_valid() {
            return self;
        }
        self.bounds = Some(match self.bounds {
            None => GeoBounds {
                south_west: p,
                north_east: p,
            },
            Some(b) => GeoBounds {
                south_west: LatLng::new(b.south_west.lat.min(p.lat), b.south_west.lng.min(p.lng)),
                north_east: LatLng::new(b.north_east.lat.max(p.lat), b.north_east.lng.max(p.lng)),
            },
        });
        self
    }

    pub fn finish(&self) -> Option<GeoBounds> {
        self.bounds
    }

    pub fn viewport(&self, fallback: &DefaultView) -> Viewport {
        match self.bounds {
            Some(b) => Viewport::Fit(b),
            None => Viewport::Default(*fallback),
        }
    }
}

/// Bounds over every record's message geo and heterogeneous geo.
/// Records without a message geo contribute nothing.
pub fn overview_bounds<'a, I>(records: I) -> BoundsBuilder
where
    I: IntoIterator<Item = &'a ObservationRecord>,
{
    let mut builder = BoundsBuilder::new();
    for rec in records {
        let Some(geo) = &rec.message_geo else { continue };
        builder
            .extend(rec.heterogeneous_geo.position())
            .extend(geo.position());
    }
    builder
}

/// Bounds for one inspected record: its signal points plus both estimates.
pub fn inspection_bounds(record: &ObservationRecord) -> BoundsBuilder {
    let mut builder = BoundsBuilder::new();
    for point in &record.signal_points {
        builder.extend(point.position());
    }
    builder.extend(record.heterogeneous_geo.position());
    if let Some(geo) = &record.message_geo {
        builder.extend(geo.position());
    }
    builder
}

pub fn overview_viewport<'a, I>(records: I, fallback: &DefaultView) -> Viewport
where
    I: IntoIterator<Item = &'a ObservationRecord>,
{
    overview_bounds(records).viewport(fallback)
}

pub fn inspection_viewport(record: &ObservationRecord, fallback: &DefaultView) -> Viewport {
    inspection_bounds(record).viewport(fallback)
}
