// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Point-to-point road routing over [GeoJSON](https://geojson.org/) map data.
//!
//! Roads (LineStrings with a `maxspeed` property) are converted into an undirected
//! weighted [Network]; arbitrary positions are snapped onto it with a point [QuadTree],
//! and A* finds the shortest route between two nodes. The [server] module exposes
//! this over a length-prefixed TCP protocol, one request per connection.
//!
//! # Example
//!
//! ```no_run
//! use quadroute::{map, Coordinate, RoutingIndex, DEFAULT_STEP_LIMIT};
//!
//! let network = map::load_network("path/to/mapData.json", &map::Options::default())
//!     .expect("failed to load map data");
//! let index = RoutingIndex::new(network);
//!
//! let route = index
//!     .route(
//!         Coordinate::new(48.1374, 11.5755),
//!         Coordinate::new(48.1497, 11.5679),
//!         DEFAULT_STEP_LIMIT,
//!     )
//!     .expect("failed to search for a route");
//!
//! println!("Route: {:?}", route);
//! ```

mod astar;
mod distance;
mod engine;
mod graph;
pub mod map;
pub mod protocol;
mod quadtree;
pub mod server;

pub use astar::{find_route, AStarError, Route, DEFAULT_STEP_LIMIT};
pub use distance::earth_distance;
pub use engine::{GraphSource, RouteError, RoutingIndex};
pub use graph::Network;
pub use quadtree::QuadTree;

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A geographic position, in degrees.
///
/// Coordinates are used as keys of the [Network]: two coordinates are equal
/// if and only if both components are bit-for-bit equal. Thus `0.0` and `-0.0`
/// are different coordinates, and `NaN` equals itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns true if latitude lies within [-90, 90] and longitude within [-180, 180].
    /// Non-finite components are never valid.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lon.to_bits() == other.lon.to_bits()
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lat.to_bits().hash(state);
        self.lon.to_bits().hash(state);
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Identifies a node of a [Network].
///
/// Ids are dense indices handed out in insertion order, and are only meaningful
/// for the [Network] which created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Represents an undirected road segment between two nodes.
///
/// Both endpoints keep their own copy of the edge in their adjacency lists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// Speed limit, in km/h.
    pub max_speed: f64,

    /// Great-circle length of the segment, in meters.
    pub length: f64,

    /// Time needed to traverse the segment at `max_speed`, in seconds.
    pub travel_time: f64,
}

impl Edge {
    /// Creates an edge of a given `length` (meters), deriving
    /// its travel time from `max_speed` (km/h).
    pub fn new(max_speed: f64, length: f64) -> Self {
        Self {
            max_speed,
            length,
            travel_time: length / (max_speed / 3.6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn coordinate_bit_equality() {
        assert_eq!(Coordinate::new(1.5, 2.5), Coordinate::new(1.5, 2.5));
        assert_ne!(Coordinate::new(0.0, 1.0), Coordinate::new(-0.0, 1.0));
        assert_eq!(Coordinate::new(f64::NAN, 1.0), Coordinate::new(f64::NAN, 1.0));

        let set: HashSet<Coordinate> = [Coordinate::new(1.0, 2.0), Coordinate::new(1.0, 2.0)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn coordinate_validity() {
        assert!(Coordinate::new(48.1, 11.5).is_valid());
        assert!(Coordinate::new(-90.0, 180.0).is_valid());
        assert!(Coordinate::new(90.0, -180.0).is_valid());

        assert!(!Coordinate::new(90.5, 0.0).is_valid());
        assert!(!Coordinate::new(-91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 180.1).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn edge_travel_time() {
        let e = Edge::new(36.0, 1000.0);
        assert_eq!(e.travel_time, 100.0);
    }
}
