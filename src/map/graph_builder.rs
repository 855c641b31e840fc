// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use geojson::{Feature, JsonValue, Value};

use crate::{Coordinate, Network};

use super::{Error, Options};

/// A map feature relevant for routing, validated and ready to be added to a [Network].
#[derive(Debug, Clone, PartialEq)]
enum Element {
    /// Chain of road segments sharing one speed limit.
    Road {
        positions: Vec<Coordinate>,
        max_speed: f64,
    },

    /// Unconnected nodes.
    Points(Vec<Coordinate>),
}

/// Helper object used for converting [GeoJSON features](Feature) into a [Network].
pub(super) struct GraphBuilder<'a> {
    g: &'a mut Network,
    options: &'a Options,
}

impl<'a> GraphBuilder<'a> {
    pub(super) fn new(g: &'a mut Network, options: &'a Options) -> Self {
        Self { g, options }
    }

    /// Add all provided features to the network.
    ///
    /// All features are validated before the network is touched,
    /// so on error the network is left unchanged.
    pub(super) fn add_features<I: IntoIterator<Item = Feature>>(
        &mut self,
        features: I,
    ) -> Result<(), Error> {
        let mut elements = Vec::default();
        for (idx, f) in features.into_iter().enumerate() {
            if let Some(element) = self.parse_feature(idx, &f)? {
                elements.push(element);
            }
        }

        elements.into_iter().for_each(|e| self.add_element(e));
        Ok(())
    }

    fn parse_feature(&self, idx: usize, f: &Feature) -> Result<Option<Element>, Error> {
        let Some(ref geometry) = f.geometry else {
            log::debug!("feature {idx}: no geometry - ignoring");
            return Ok(None);
        };

        match geometry.value {
            Value::LineString(ref line) => {
                let positions = parse_positions(idx, line)?;
                if positions.len() < 2 {
                    log::warn!("feature {idx}: road with less than 2 positions - ignoring");
                    return Ok(None);
                }

                let max_speed = self.get_max_speed(idx, f)?;
                Ok(Some(Element::Road {
                    positions,
                    max_speed,
                }))
            }

            Value::MultiPoint(ref points) => Ok(Some(Element::Points(parse_positions(idx, points)?))),

            _ => {
                log::debug!("feature {idx}: unsupported geometry type - ignoring");
                Ok(None)
            }
        }
    }

    /// Returns the validated `maxspeed` of a road, falling back
    /// to [Options::default_max_speed] if the property is absent.
    fn get_max_speed(&self, idx: usize, f: &Feature) -> Result<f64, Error> {
        let raw = f.property("maxspeed");
        let speed = match raw {
            None | Some(JsonValue::Null) => self
                .options
                .default_max_speed
                .ok_or(Error::MissingMaxSpeed { feature: idx })?,
            Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Some(JsonValue::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
            Some(_) => f64::NAN,
        };

        if speed.is_finite() && speed > 0.0 {
            Ok(speed)
        } else {
            Err(Error::InvalidMaxSpeed {
                feature: idx,
                value: raw.map_or_else(|| speed.to_string(), |v| v.to_string()),
            })
        }
    }

    fn add_element(&mut self, e: Element) {
        match e {
            Element::Road {
                positions,
                max_speed,
            } => {
                positions.windows(2).for_each(|pair| {
                    if pair[0] == pair[1] {
                        log::debug!("skipping zero-length road segment at {}", pair[0]);
                        self.g.add_node(pair[0]);
                    } else {
                        self.g.add_edge(pair[0], pair[1], max_speed);
                    }
                });
            }

            Element::Points(positions) => {
                positions.into_iter().for_each(|p| {
                    self.g.add_node(p);
                });
            }
        }
    }
}

/// Converts GeoJSON `[lon, lat, ...]` positions into [Coordinates](Coordinate),
/// rejecting positions outside of the valid latitude and longitude ranges.
fn parse_positions(idx: usize, positions: &[Vec<f64>]) -> Result<Vec<Coordinate>, Error> {
    positions
        .iter()
        .map(|p| match p.as_slice() {
            [lon, lat, ..] if Coordinate::new(*lat, *lon).is_valid() => {
                Ok(Coordinate::new(*lat, *lon))
            }
            _ => Err(Error::InvalidPosition { feature: idx }),
        })
        .collect()
}
