use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::debug;

use crate::models::{ActivityRecord, NetworkMetrics};

/// Undirected weighted peer graph. Edge weight counts shared activities or
/// explicit collaborator links; weights are kept symmetric and self-loops
/// are never stored.
#[derive(Debug, Clone, Default)]
pub struct CollaborationGraph {
    adjacency: HashMap<String, BTreeMap<String, u32>>,
}

impl CollaborationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: &str) {
        self.adjacency.entry(id.to_string()).or_default();
    }

    pub fn add_edge(&mut self, a: &str, b: &str) {
        if a == b {
            return;
        }
        *self
            .adjacency
            .entry(a.to_string())
            .or_default()
            .entry(b.to_string())
            .or_insert(0) += 1;
        *self
            .adjacency
            .entry(b.to_string())
            .or_default()
            .entry(a.to_string())
            .or_insert(0) += 1;
    }

    pub fn weight(&self, a: &str, b: &str) -> u32 {
        self.adjacency
            .get(a)
            .and_then(|n| n.get(b))
            .copied()
            .unwrap_or(0)
    }

    pub fn degree(&self, id: &str) -> usize {
        self.adjacency.get(id).map_or(0, |n| n.len())
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Distinct undirected edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|n| n.len()).sum::<usize>() / 2
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adjacency.contains_key(id)
    }

    pub fn neighbors(&self, id: &str) -> impl Iterator<Item = (&str, u32)> {
        self.adjacency
            .get(id)
            .into_iter()
            .flat_map(|n| n.iter().map(|(peer, weight)| (peer.as_str(), *weight)))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.adjacency.keys().map(String::as_str)
    }
}

/// Build the peer graph for one snapshot. Every activity owner becomes a
/// node even with no links; blank or self-referential collaborator entries
/// are skipped, not fatal.
pub fn build_graph(activities: &[ActivityRecord]) -> CollaborationGraph {
    let mut graph = CollaborationGraph::new();

    for activity in activities {
        graph.add_node(&activity.student_id);
        for collaborator in &activity.collaborators {
            let collaborator = collaborator.trim();
            if collaborator.is_empty() {
                debug!(activity = %activity.id, "skipping blank collaborator entry");
                continue;
            }
            if collaborator == activity.student_id {
                debug!(
                    activity = %activity.id,
                    student = %activity.student_id,
                    "skipping self-referential collaborator entry"
                );
                continue;
            }
            graph.add_edge(&activity.student_id, collaborator);
        }
    }

    graph
}

/// Degree, density, and connected components for a built graph. Component
/// ids are assigned in sorted node order so membership is deterministic.
pub fn network_metrics(graph: &CollaborationGraph) -> NetworkMetrics {
    let v = graph.node_count();
    let e = graph.edge_count();

    let average_degree = if v > 0 { 2.0 * e as f64 / v as f64 } else { 0.0 };
    let density = if v > 1 {
        2.0 * e as f64 / (v as f64 * (v as f64 - 1.0))
    } else {
        0.0
    };

    let sorted_nodes: BTreeSet<&str> = graph.nodes().collect();
    let mut membership: BTreeMap<String, usize> = BTreeMap::new();
    let mut component_count = 0;

    for &start in &sorted_nodes {
        if membership.contains_key(start) {
            continue;
        }
        let component = component_count;
        component_count += 1;

        let mut queue = VecDeque::from([start]);
        membership.insert(start.to_string(), component);
        while let Some(node) = queue.pop_front() {
            for (peer, _) in graph.neighbors(node) {
                if !membership.contains_key(peer) {
                    membership.insert(peer.to_string(), component);
                    queue.push_back(peer);
                }
            }
        }
    }

    NetworkMetrics {
        node_count: v,
        edge_count: e,
        average_degree,
        density,
        component_count,
        component_membership: membership,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::{TimeZone, Utc};

    fn collaborative(id: &str, student_id: &str, collaborators: &[&str]) -> ActivityRecord {
        ActivityRecord {
            id: id.to_string(),
            student_id: student_id.to_string(),
            category: Category::PeerCollaboration,
            timestamp: Utc.with_ymd_and_hms(2026, 2, 10, 10, 0, 0).unwrap(),
            score: 7.0,
            max_score: 10.0,
            quality_percent: 70.0,
            engagement_level: Some(7.0),
            duration_minutes: 60.0,
            collaborators: collaborators.iter().map(|c| c.to_string()).collect(),
            deadline: None,
            submitted_at: None,
            topic: None,
        }
    }

    #[test]
    fn edges_are_symmetric_and_weighted() {
        let activities = vec![
            collaborative("a1", "s1", &["s2"]),
            collaborative("a2", "s1", &["s2", "s3"]),
        ];
        let graph = build_graph(&activities);
        assert_eq!(graph.weight("s1", "s2"), 2);
        assert_eq!(graph.weight("s2", "s1"), 2);
        assert_eq!(graph.weight("s1", "s3"), 1);
        assert_eq!(graph.weight("s3", "s1"), 1);
        assert!(graph.weight("s1", "s2") >= 1);
    }

    #[test]
    fn self_loops_and_blank_entries_are_skipped() {
        let activities = vec![collaborative("a1", "s1", &["s1", " ", "s2"])];
        let graph = build_graph(&activities);
        assert_eq!(graph.weight("s1", "s1"), 0);
        assert_eq!(graph.weight("s1", "s2"), 1);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn solo_activity_owner_is_still_a_node() {
        let activities = vec![collaborative("a1", "s1", &[])];
        let graph = build_graph(&activities);
        assert!(graph.contains("s1"));
        assert_eq!(graph.degree("s1"), 0);
    }

    #[test]
    fn density_stays_in_unit_interval() {
        let sparse = build_graph(&[
            collaborative("a1", "s1", &["s2"]),
            collaborative("a2", "s3", &[]),
            collaborative("a3", "s4", &[]),
        ]);
        let dense = build_graph(&[
            collaborative("a1", "s1", &["s2", "s3"]),
            collaborative("a2", "s2", &["s3"]),
        ]);
        let sparse_metrics = network_metrics(&sparse);
        let dense_metrics = network_metrics(&dense);
        assert!((0.0..=1.0).contains(&sparse_metrics.density));
        assert!((dense_metrics.density - 1.0).abs() < 1e-9);
        assert!(sparse_metrics.density < dense_metrics.density);
    }

    #[test]
    fn components_split_and_count_correctly() {
        let graph = build_graph(&[
            collaborative("a1", "s1", &["s2"]),
            collaborative("a2", "s3", &["s4"]),
            collaborative("a3", "s5", &[]),
        ]);
        let metrics = network_metrics(&graph);
        assert_eq!(metrics.component_count, 3);
        assert_eq!(
            metrics.component_membership["s1"],
            metrics.component_membership["s2"]
        );
        assert_ne!(
            metrics.component_membership["s1"],
            metrics.component_membership["s3"]
        );
        assert_eq!(metrics.node_count, 5);
        assert_eq!(metrics.edge_count, 2);
    }

    #[test]
    fn empty_graph_has_zero_metrics() {
        let metrics = network_metrics(&CollaborationGraph::new());
        assert_eq!(metrics.node_count, 0);
        assert_eq!(metrics.density, 0.0);
        assert_eq!(metrics.average_degree, 0.0);
        assert_eq!(metrics.component_count, 0);
    }
}
