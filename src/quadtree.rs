// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::{earth_distance, Coordinate, Network, NodeId};

/// How far (in degrees) a query may lie beyond a quadrant boundary
/// and still have that quadrant searched.
const BOUNDARY_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quadrant {
    NorthWest = 0,
    NorthEast = 1,
    SouthWest = 2,
    SouthEast = 3,
}

impl Quadrant {
    /// Quadrant of `at` into which `p` is inserted.
    /// Latitude picks the west (`<=`) or east half, longitude the north (`>=`) or south half.
    fn of(at: Coordinate, p: Coordinate) -> Self {
        match (p.lat <= at.lat, p.lon >= at.lon) {
            (true, true) => Self::NorthWest,
            (true, false) => Self::SouthWest,
            (false, true) => Self::NorthEast,
            (false, false) => Self::SouthEast,
        }
    }
}

#[derive(Debug, Clone)]
struct QuadNode {
    position: Coordinate,

    /// Network node placed at `position`; `None` for a synthetic root
    /// which only partitions space.
    node: Option<NodeId>,

    children: [Option<u32>; 4],
}

impl QuadNode {
    fn new(position: Coordinate, node: Option<NodeId>) -> Self {
        Self {
            position,
            node,
            children: [None; 4],
        }
    }
}

/// QuadTree implements a [point quadtree](https://en.wikipedia.org/wiki/Quadtree#Point_quadtree)
/// over the nodes of a [Network], used to snap arbitrary positions onto the network.
///
/// The tree is never rebalanced - its shape is fully determined by the insertion order.
/// Nodes are kept in an arena, so even degenerate (list-shaped) trees don't
/// exhaust the stack.
///
/// [QuadTree::find_nearest_node] is a heuristic: it only descends into quadrants
/// which contain the query position (or lie within 1e-7° of it), without any
/// distance-based pruning of the other quadrants. The returned node is the
/// closest one among the visited nodes, which is not necessarily the globally closest one.
#[derive(Debug, Clone, Default)]
pub struct QuadTree {
    nodes: Vec<QuadNode>,
    len: usize,
}

impl QuadTree {
    /// Creates an empty tree. The first inserted node becomes the root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree over all nodes of a [Network].
    ///
    /// The root is a synthetic point in the middle of the bounding box of all nodes,
    /// after which every node is inserted in the network's iteration order.
    pub fn from_network(g: &Network) -> Self {
        let mut tree = Self::default();

        let Some((min_lat, max_lat, min_lon, max_lon)) = g.iter().fold(None, |bbox, (_, c)| {
            Some(match bbox {
                None => (c.lat, c.lat, c.lon, c.lon),
                Some((min_lat, max_lat, min_lon, max_lon)) => (
                    c.lat.min(min_lat),
                    c.lat.max(max_lat),
                    c.lon.min(min_lon),
                    c.lon.max(max_lon),
                ),
            })
        }) else {
            return tree;
        };

        let center = Coordinate::new((max_lat + min_lat) / 2.0, (max_lon + min_lon) / 2.0);
        tree.nodes.push(QuadNode::new(center, None));

        for (id, position) in g.iter() {
            tree.insert(position, id);
        }
        tree
    }

    /// Returns the number of network nodes stored in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of levels of the tree (0 for an empty tree).
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut deepest = 0;
        let mut stack = vec![(0_u32, 1_usize)];
        while let Some((idx, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            for child in self.nodes[idx as usize].children.iter().flatten() {
                stack.push((*child, depth + 1));
            }
        }
        deepest
    }

    /// Inserts a network node, descending from the root through the quadrants
    /// chosen by [Quadrant::of] until a free slot is found.
    pub fn insert(&mut self, position: Coordinate, node: NodeId) {
        self.len += 1;
        let new_idx = self.nodes.len() as u32;

        if self.nodes.is_empty() {
            self.nodes.push(QuadNode::new(position, Some(node)));
            return;
        }

        let mut current = 0_usize;
        loop {
            let quadrant = Quadrant::of(self.nodes[current].position, position) as usize;
            match self.nodes[current].children[quadrant] {
                Some(child) => current = child as usize,
                None => {
                    self.nodes[current].children[quadrant] = Some(new_idx);
                    self.nodes.push(QuadNode::new(position, Some(node)));
                    return;
                }
            }
        }
    }

    /// Finds the network node closest to the given position among the quadrants
    /// visited from the root (see the [type-level docs](QuadTree)).
    ///
    /// Ties are broken in favor of the first node found, in pre-order
    /// NW, NE, SW, SE traversal. Returns `None` for an empty tree.
    pub fn find_nearest_node(&self, query: Coordinate) -> Option<(NodeId, Coordinate)> {
        let mut best: Option<(NodeId, Coordinate, f64)> = None;
        if self.nodes.is_empty() {
            return None;
        }

        let mut stack = vec![0_u32];
        while let Some(idx) = stack.pop() {
            let current = &self.nodes[idx as usize];
            let at = current.position;

            if let Some(node) = current.node {
                let dist = earth_distance(query, at);
                if best.map_or(true, |(_, _, best_dist)| dist < best_dist) {
                    best = Some((node, at, dist));
                }
            }

            let west = query.lat <= at.lat || query.lat - at.lat <= BOUNDARY_TOLERANCE;
            let east = query.lat >= at.lat || at.lat - query.lat <= BOUNDARY_TOLERANCE;
            let north = query.lon >= at.lon || at.lon - query.lon <= BOUNDARY_TOLERANCE;
            let south = query.lon <= at.lon || query.lon - at.lon <= BOUNDARY_TOLERANCE;

            // Pushed in reverse, so that NW is popped first
            let candidates = [
                (east && south, Quadrant::SouthEast),
                (west && south, Quadrant::SouthWest),
                (east && north, Quadrant::NorthEast),
                (west && north, Quadrant::NorthWest),
            ];
            for (visit, quadrant) in candidates {
                if visit {
                    if let Some(child) = current.children[quadrant as usize] {
                        stack.push(child);
                    }
                }
            }
        }

        best.map(|(node, position, _)| (node, position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_of(positions: &[(f64, f64)]) -> Network {
        let mut g = Network::new();
        for &(lat, lon) in positions {
            g.add_node(Coordinate::new(lat, lon));
        }
        g
    }

    #[test]
    fn insertion_quadrants() {
        let at = Coordinate::new(0.0, 0.0);
        assert_eq!(Quadrant::of(at, Coordinate::new(0.0, 0.0)), Quadrant::NorthWest);
        assert_eq!(Quadrant::of(at, Coordinate::new(-1.0, 1.0)), Quadrant::NorthWest);
        assert_eq!(Quadrant::of(at, Coordinate::new(-1.0, -1.0)), Quadrant::SouthWest);
        assert_eq!(Quadrant::of(at, Coordinate::new(1.0, 1.0)), Quadrant::NorthEast);
        assert_eq!(Quadrant::of(at, Coordinate::new(1.0, -1.0)), Quadrant::SouthEast);
    }

    #[test]
    fn nearest_only_searches_matching_quadrants() {
        let g = network_of(&[
            (0.0, 0.0),
            (10.0, 10.0),
            (-10.0, -10.0),
            (10.0, -10.0),
            (-10.0, 10.0),
        ]);
        let tree = QuadTree::from_network(&g);
        assert_eq!(tree.len(), 5);

        // (0, 0) is closer, but it lives in the north-west quadrant of the
        // synthetic (0, 0) root, which the query doesn't fall into.
        let (id, position) = tree.find_nearest_node(Coordinate::new(1.0, 1.0)).unwrap();
        assert_eq!(position, Coordinate::new(10.0, 10.0));
        assert_eq!(Some(id), g.find_node(position));
    }

    #[test]
    fn nearest_exact_hit() {
        let g = network_of(&[
            (0.0, 0.0),
            (10.0, 10.0),
            (-10.0, -10.0),
            (10.0, -10.0),
            (-10.0, 10.0),
        ]);
        let tree = QuadTree::from_network(&g);

        for (id, position) in g.iter() {
            assert_eq!(tree.find_nearest_node(position), Some((id, position)));
        }
    }

    #[test]
    fn nearest_within_tolerance_searches_both_halves() {
        let g = network_of(&[(-1.0, 1.0), (1.0, 1.0), (0.000001, 1.0)]);
        let tree = QuadTree::from_network(&g);

        // Root is the synthetic (0, 1) midpoint. (-1, 1) lives in its west half,
        // (1, 1) and (0.000001, 1) in its east half.
        let q = Coordinate::new(-0.00000005, 1.0);
        let (_, position) = tree.find_nearest_node(q).unwrap();
        assert_eq!(position, Coordinate::new(0.000001, 1.0));

        let q = Coordinate::new(0.00000005, 1.0);
        let (_, position) = tree.find_nearest_node(q).unwrap();
        assert_eq!(position, Coordinate::new(0.000001, 1.0));

        // Beyond the tolerance only the west half is searched
        let q = Coordinate::new(-0.001, 1.0);
        let (_, position) = tree.find_nearest_node(q).unwrap();
        assert_eq!(position, Coordinate::new(-1.0, 1.0));
    }

    #[test]
    fn first_insert_becomes_root() {
        let mut tree = QuadTree::new();
        tree.insert(Coordinate::new(5.0, 5.0), NodeId(0));
        tree.insert(Coordinate::new(6.0, 6.0), NodeId(1));
        tree.insert(Coordinate::new(7.0, 7.0), NodeId(2));
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.depth(), 3);

        assert_eq!(
            tree.find_nearest_node(Coordinate::new(5.1, 5.1)),
            Some((NodeId(0), Coordinate::new(5.0, 5.0))),
        );
        assert_eq!(
            tree.find_nearest_node(Coordinate::new(8.0, 8.0)),
            Some((NodeId(2), Coordinate::new(7.0, 7.0))),
        );
    }

    #[test]
    fn degenerate_tree() {
        let mut tree = QuadTree::new();
        for i in 0..10_000_u32 {
            let v = i as f64 * 1e-4;
            tree.insert(Coordinate::new(v, v), NodeId(i));
        }
        assert_eq!(tree.depth(), 10_000);
        assert_eq!(
            tree.find_nearest_node(Coordinate::new(100.0, 100.0)).map(|(id, _)| id),
            Some(NodeId(9_999)),
        );
    }

    #[test]
    fn empty() {
        let tree = QuadTree::from_network(&Network::new());
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.find_nearest_node(Coordinate::new(0.0, 0.0)), None);
    }
}
