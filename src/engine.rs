// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{find_route, map, AStarError, Coordinate, Network, NodeId, QuadTree, Route};

/// Errors which may prevent answering a routing query.
///
/// A missing route is not an error - see [RoutingIndex::route].
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("failed to load map data: {0}")]
    Map(#[from] map::Error),

    #[error("network has no nodes")]
    EmptyNetwork,

    #[error("route search failed: {0}")]
    Search(#[from] AStarError),
}

/// A [Network] together with a [QuadTree] over its nodes,
/// ready to answer queries between arbitrary positions.
///
/// The index is immutable; all search state is kept per query,
/// so a single index may be shared between threads.
#[derive(Debug, Clone)]
pub struct RoutingIndex {
    network: Network,
    tree: QuadTree,
}

impl RoutingIndex {
    pub fn new(network: Network) -> Self {
        let tree = QuadTree::from_network(&network);
        Self { network, tree }
    }

    /// Loads a map data file into a brand-new index.
    pub fn load<P: AsRef<Path>>(path: P, options: &map::Options) -> Result<Self, map::Error> {
        map::load_network(path, options).map(Self::new)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn quad_tree(&self) -> &QuadTree {
        &self.tree
    }

    /// Snaps a position onto the network: a node at exactly this position
    /// is preferred, otherwise the [QuadTree] is asked for the nearest one.
    ///
    /// Returns `None` if the quadrants visited by the tree hold no nodes.
    pub fn resolve(&self, position: Coordinate) -> Option<NodeId> {
        if let Some(id) = self.network.find_node(position) {
            return Some(id);
        }

        let (id, snapped) = self.tree.find_nearest_node(position)?;
        log::debug!("snapped {} to {}", position, snapped);
        Some(id)
    }

    /// Finds the shortest route between the nodes closest to `origin` and `destination`.
    ///
    /// Returns `Ok(None)` if no route connects them. A position which
    /// can't be [resolved](RoutingIndex::resolve) is treated as unconnected.
    pub fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        step_limit: usize,
    ) -> Result<Option<Route>, RouteError> {
        if self.network.is_empty() {
            return Err(RouteError::EmptyNetwork);
        }

        let (Some(from), Some(to)) = (self.resolve(origin), self.resolve(destination)) else {
            log::debug!("no node found near {} or {}", origin, destination);
            return Ok(None);
        };
        Ok(find_route(&self.network, from, to, step_limit)?)
    }

    /// Returns positions of the provided nodes.
    pub fn positions<'a>(&'a self, nodes: &'a [NodeId]) -> impl Iterator<Item = Coordinate> + 'a {
        nodes.iter().filter_map(|&id| self.network.get_node(id))
    }
}

/// Where a server obtains the [RoutingIndex] for a request from.
#[derive(Debug, Clone)]
pub enum GraphSource {
    /// Load the map and build a fresh index for every request.
    ///
    /// Changes to the map file are picked up immediately, and a broken
    /// map file only fails the requests which read it.
    PerRequest { path: PathBuf, options: map::Options },

    /// Share one index, loaded up-front, between all requests.
    Shared(Arc<RoutingIndex>),
}

impl GraphSource {
    /// Loads the map once and returns a [GraphSource::Shared] source.
    pub fn preload<P: AsRef<Path>>(path: P, options: &map::Options) -> Result<Self, map::Error> {
        let index = RoutingIndex::load(path, options)?;
        log::info!(
            "loaded map with {} nodes and {} edges",
            index.network().len(),
            index.network().edge_count(),
        );
        Ok(Self::Shared(Arc::new(index)))
    }

    /// Returns the index to be used for a single request.
    pub fn index(&self) -> Result<Arc<RoutingIndex>, map::Error> {
        match self {
            Self::PerRequest { path, options } => {
                let index = RoutingIndex::load(path, options)?;
                log::debug!(
                    "built network with {} nodes, quadtree depth {}",
                    index.network().len(),
                    index.quad_tree().depth(),
                );
                Ok(Arc::new(index))
            }
            Self::Shared(index) => Ok(Arc::clone(index)),
        }
    }
}
