// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::hash_map::{Entry, HashMap};

use crate::{earth_distance, Coordinate, Edge, NodeId};

#[derive(Debug, Clone, PartialEq)]
struct NodeRecord {
    position: Coordinate,
    neighbors: Vec<(NodeId, Edge)>,
}

/// Represents a road network as a set of nodes, keyed by their [Coordinate],
/// and undirected [Edges](Edge) between them.
///
/// Nodes live in an arena and are addressed by [NodeId]s handed out in insertion order.
/// The network itself carries no route search state and can be shared between
/// concurrent searches.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Network {
    nodes: Vec<NodeRecord>,
    by_position: HashMap<Coordinate, NodeId>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of nodes in the network.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of undirected edges in the network.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.neighbors.len()).sum::<usize>() / 2
    }

    /// Returns an iterator over all nodes, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Coordinate)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, n)| (NodeId(idx as u32), n.position))
    }

    /// Finds the node placed exactly at the provided position.
    pub fn find_node(&self, position: Coordinate) -> Option<NodeId> {
        self.by_position.get(&position).copied()
    }

    /// Retrieves the position of a node.
    pub fn get_node(&self, id: NodeId) -> Option<Coordinate> {
        self.nodes.get(id.index()).map(|n| n.position)
    }

    /// Ensures a node exists at the provided position and returns its id.
    ///
    /// Adding a position which is already present is a no-op returning the existing id.
    pub fn add_node(&mut self, position: Coordinate) -> NodeId {
        match self.by_position.entry(position) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let id = NodeId(self.nodes.len() as u32);
                self.nodes.push(NodeRecord {
                    position,
                    neighbors: Vec::default(),
                });
                e.insert(id);
                id
            }
        }
    }

    /// Links two positions with an undirected [Edge] with the given speed limit (km/h),
    /// creating missing nodes. The edge length is the [earth_distance] between the positions.
    ///
    /// Both endpoints receive an adjacency entry with identical costs.
    /// Linking an already linked pair replaces the previous edge.
    pub fn add_edge(&mut self, a: Coordinate, b: Coordinate, max_speed: f64) -> (NodeId, NodeId) {
        let a_id = self.add_node(a);
        let b_id = self.add_node(b);
        let edge = Edge::new(max_speed, earth_distance(a, b));

        self.set_neighbor(a_id, b_id, edge);
        self.set_neighbor(b_id, a_id, edge);
        (a_id, b_id)
    }

    fn set_neighbor(&mut self, from: NodeId, to: NodeId, edge: Edge) {
        let neighbors = &mut self.nodes[from.index()].neighbors;
        if let Some(candidate) = neighbors.iter_mut().find(|(id, _)| *id == to) {
            candidate.1 = edge;
        } else {
            neighbors.push((to, edge));
        }
    }

    /// Gets all neighbors of a node together with the connecting [Edges](Edge).
    pub fn get_edges(&self, from: NodeId) -> &[(NodeId, Edge)] {
        self.nodes
            .get(from.index())
            .map(|n| n.neighbors.as_slice())
            .unwrap_or_default()
    }

    /// Gets the [Edge] between two nodes, if they are neighbors.
    pub fn get_edge(&self, from: NodeId, to: NodeId) -> Option<Edge> {
        self.get_edges(from)
            .iter()
            .find_map(|&(id, edge)| if id == to { Some(edge) } else { None })
    }
}
