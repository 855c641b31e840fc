// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::BinaryHeap;

use crate::{earth_distance, AStarError, Network, NodeId};

/// A route found by [find_route].
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Nodes of the route, from the start to the end node (inclusive).
    pub nodes: Vec<NodeId>,

    /// Total length of the route, in meters.
    pub distance: f64,

    /// Total travel time along the route, in seconds.
    pub travel_time: f64,
}

impl Route {
    pub fn distance_km(&self) -> f64 {
        self.distance / 1000.0
    }

    pub fn travel_time_min(&self) -> f64 {
        self.travel_time / 60.0
    }
}

#[derive(Debug, Clone, Copy)]
struct QueueItem {
    at: NodeId,
    cost: f64,
    score: f64,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.score.eq(&other.score)
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for QueueItem {}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // NOTE: We revert the order of comparison,
        // as lower scores are considered better ("higher"),
        // and Rust's BinaryHeap is a max-heap.
        other.score.total_cmp(&self.score)
    }
}

/// Mutable per-node bookkeeping of a single search, indexed by [NodeId].
///
/// Kept apart from the [Network], so that any number of searches
/// may run concurrently over a shared network.
struct SearchState {
    distance_from_source: Vec<f64>,
    travel_time_from_source: Vec<f64>,
    estimated_path_length: Vec<f64>,
    visited: Vec<bool>,
    parent: Vec<Option<NodeId>>,
}

impl SearchState {
    fn new(len: usize) -> Self {
        Self {
            distance_from_source: vec![f64::INFINITY; len],
            travel_time_from_source: vec![f64::INFINITY; len],
            estimated_path_length: vec![f64::INFINITY; len],
            visited: vec![false; len],
            parent: vec![None; len],
        }
    }

    fn reconstruct_path(&self, from: NodeId, to: NodeId) -> Result<Vec<NodeId>, AStarError> {
        let mut path = vec![to];
        let mut last = to;

        while last != from {
            // A parent chain longer than the network must contain a cycle
            if path.len() > self.parent.len() {
                return Err(AStarError::BrokenPath);
            }

            last = self.parent[last.index()].ok_or(AStarError::BrokenPath)?;
            path.push(last);
        }

        path.reverse();
        Ok(path)
    }
}

/// Uses the [A* algorithm](https://en.wikipedia.org/wiki/A*_search_algorithm)
/// to find the shortest route between two nodes in the provided network.
///
/// Routes are ranked by their length; the great-circle distance to the end node
/// is used as the heuristic. Travel time is accumulated along the chosen route,
/// but does not influence the choice.
///
/// Returns `Ok(None)` if there is no route between the two nodes.
///
/// `step_limit` limits how many nodes may be expanded during the search
/// before returning [AStarError::StepLimitExceeded]. Concluding that no route exists requires
/// expanding all nodes accessible from the start, which can be time-consuming
/// on large networks. The recommended value is [DEFAULT_STEP_LIMIT](crate::DEFAULT_STEP_LIMIT).
pub fn find_route(
    g: &Network,
    from: NodeId,
    to: NodeId,
    step_limit: usize,
) -> Result<Option<Route>, AStarError> {
    let from_position = g.get_node(from).ok_or(AStarError::InvalidReference(from))?;
    let to_position = g.get_node(to).ok_or(AStarError::InvalidReference(to))?;

    let mut queue: BinaryHeap<QueueItem> = BinaryHeap::default();
    let mut state = SearchState::new(g.len());
    let mut steps: usize = 0;

    {
        let initial_score = earth_distance(from_position, to_position);
        state.distance_from_source[from.index()] = 0.0;
        state.travel_time_from_source[from.index()] = 0.0;
        state.estimated_path_length[from.index()] = initial_score;
        queue.push(QueueItem {
            at: from,
            cost: 0.0,
            score: initial_score,
        });
    }

    while let Some(item) = queue.pop() {
        let at = item.at.index();

        // Instead of removing outdated entries from the queue, they are skipped here
        if state.visited[at] || item.cost > state.distance_from_source[at] {
            continue;
        }

        if item.at == to {
            let nodes = state.reconstruct_path(from, to)?;
            return Ok(Some(Route {
                nodes,
                distance: state.distance_from_source[at],
                travel_time: state.travel_time_from_source[at],
            }));
        }

        steps += 1;
        if steps > step_limit {
            return Err(AStarError::StepLimitExceeded);
        }

        state.visited[at] = true;

        for &(neighbor, edge) in g.get_edges(item.at) {
            let n = neighbor.index();
            if state.visited[n] {
                continue;
            }

            // Check if this is the cheapest way to the neighbor
            let neighbor_cost = state.distance_from_source[at] + edge.length;
            if neighbor_cost >= state.distance_from_source[n] {
                continue;
            }

            let Some(neighbor_position) = g.get_node(neighbor) else {
                continue;
            };

            let score = neighbor_cost + earth_distance(neighbor_position, to_position);
            state.parent[n] = Some(item.at);
            state.distance_from_source[n] = neighbor_cost;
            state.travel_time_from_source[n] =
                state.travel_time_from_source[at] + edge.travel_time;
            state.estimated_path_length[n] = score;

            queue.push(QueueItem {
                at: neighbor,
                cost: neighbor_cost,
                score,
            });
        }
    }

    Ok(None)
}
