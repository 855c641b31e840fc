// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

/// Errors which may occur when loading map data into a [Network](crate::Network).
///
/// Features are numbered by their (zero-based) position in the input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read map data: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed map data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("map data must be a GeoJSON FeatureCollection or Feature")]
    NotAFeatureCollection,

    #[error("feature {feature}: road has no maxspeed property")]
    MissingMaxSpeed { feature: usize },

    #[error("feature {feature}: invalid maxspeed {value}")]
    InvalidMaxSpeed { feature: usize, value: String },

    #[error("feature {feature}: position must be [lon, lat] within [-180, 180] and [-90, 90]")]
    InvalidPosition { feature: usize },
}
