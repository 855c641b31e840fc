// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Loading of [GeoJSON](https://geojson.org/) map data into a [Network](crate::Network).

mod error;
mod graph_builder;
mod reader;

pub use error::Error;
pub use reader::{
    add_features_from_buffer, add_features_from_file, add_features_from_io, load_network,
    FileFormat, Options,
};
