// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use geojson::GeoJson;

use super::graph_builder::GraphBuilder;
use super::Error;
use crate::Network;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Format of the input map data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// Unknown format - guess the compression based on the leading bytes
    #[default]
    Unknown,

    /// Force uncompressed [GeoJSON](https://geojson.org/)
    Json,

    /// Force [GeoJSON](https://geojson.org/)
    /// with [gzip](https://en.wikipedia.org/wiki/Gzip) compression
    JsonGz,

    /// Force [GeoJSON](https://geojson.org/)
    /// with [bzip2](https://en.wikipedia.org/wiki/Bzip2) compression
    JsonBz2,
}

impl FileFormat {
    /// Guesses the format from the first bytes of a file.
    pub fn detect(head: &[u8]) -> Self {
        if head.starts_with(GZIP_MAGIC) {
            Self::JsonGz
        } else if head.starts_with(BZIP2_MAGIC) {
            Self::JsonBz2
        } else {
            Self::Json
        }
    }
}

/// Additional controls for interpreting map data as a routing [Network].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Options {
    /// Format of the input data.
    pub file_format: FileFormat,

    /// Speed limit (km/h) for roads without a `maxspeed` property.
    /// If `None`, such roads make the whole load fail.
    pub default_max_speed: Option<f64>,
}

/// Parse GeoJSON features from a reader into a [Network] as per the provided [Options].
///
/// Roads (LineStrings) become chains of edges, MultiPoints become unconnected nodes,
/// other features are ignored. The provided stream will be automatically wrapped in
/// a buffered reader. On error, the network is left unchanged.
pub fn add_features_from_io<R: io::Read>(
    g: &mut Network,
    options: &Options,
    reader: R,
) -> Result<(), Error> {
    let mut b = io::BufReader::new(reader);

    let format = match options.file_format {
        FileFormat::Unknown => FileFormat::detect(b.fill_buf()?),
        known => known,
    };

    let data: GeoJson = match format {
        FileFormat::Unknown | FileFormat::Json => serde_json::from_reader(b)?,

        FileFormat::JsonGz => {
            let d = flate2::read::MultiGzDecoder::new(b);
            serde_json::from_reader(io::BufReader::new(d))?
        }

        FileFormat::JsonBz2 => {
            let d = bzip2::read::MultiBzDecoder::new(b);
            serde_json::from_reader(io::BufReader::new(d))?
        }
    };

    add_geojson(g, options, data)
}

/// Parse GeoJSON features from a file at the provided path into a [Network]
/// as per the provided [Options].
pub fn add_features_from_file<P: AsRef<Path>>(
    g: &mut Network,
    options: &Options,
    path: P,
) -> Result<(), Error> {
    let f = File::open(path)?;
    add_features_from_io(g, options, f)
}

/// Parse GeoJSON features from a static buffer into a [Network] as per the provided [Options].
pub fn add_features_from_buffer(
    g: &mut Network,
    options: &Options,
    data: &[u8],
) -> Result<(), Error> {
    let format = match options.file_format {
        FileFormat::Unknown => FileFormat::detect(data),
        known => known,
    };

    if format == FileFormat::Json {
        // Fast path is available for in-memory JSON data
        add_geojson(g, options, serde_json::from_slice(data)?)
    } else {
        // Wrap the buffer in a cursor and use the IO path
        add_features_from_io(g, options, io::Cursor::new(data))
    }
}

/// Loads a map data file into a brand-new [Network].
pub fn load_network<P: AsRef<Path>>(path: P, options: &Options) -> Result<Network, Error> {
    let mut g = Network::new();
    add_features_from_file(&mut g, options, path)?;
    Ok(g)
}

fn add_geojson(g: &mut Network, options: &Options, data: GeoJson) -> Result<(), Error> {
    let features = match data {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => return Err(Error::NotAFeatureCollection),
    };
    GraphBuilder::new(g, options).add_features(features)
}
