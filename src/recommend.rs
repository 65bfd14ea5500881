use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::graph::CollaborationGraph;
use crate::models::{
    ActivityRecord, Category, Recommendation, RecommendationPayload, StudentEngagementProfile,
};

/// Cap on study group size, subject included.
const MAX_GROUP_SIZE: usize = 5;

/// Completion evidence threshold for learning-path topics.
const TOPIC_COMPLETION_QUALITY: f64 = 70.0;

/// Caller-supplied curriculum for learning-path generation: the topics to
/// cover and which topics each depends on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Curriculum {
    pub target_topics: Vec<String>,
    #[serde(default)]
    pub prerequisites: BTreeMap<String, Vec<String>>,
}

/// Rank not-yet-attempted activity categories by how well the student's
/// graph neighbors engage with them, weighted by edge strength. A student
/// with no edges gets no recommendations, never an error.
pub fn recommend_activities(
    student_id: &str,
    graph: &CollaborationGraph,
    profiles: &BTreeMap<String, StudentEngagementProfile>,
    k: usize,
) -> Vec<Recommendation> {
    let attempted: BTreeSet<Category> = profiles
        .get(student_id)
        .map(|p| p.activity_counts.keys().copied().collect())
        .unwrap_or_default();

    let mut scored: Vec<(Category, f64)> = Vec::new();
    for category in Category::ALL {
        if attempted.contains(&category) {
            continue;
        }
        let mut score = 0.0;
        for (peer, weight) in graph.neighbors(student_id) {
            if let Some(average) = profiles.get(peer).and_then(|p| p.category_averages.get(&category))
            {
                score += weight as f64 * average;
            }
        }
        if score > 0.0 {
            scored.push((category, score));
        }
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let top = scored.first().map(|(_, s)| *s).unwrap_or(0.0);

    scored
        .into_iter()
        .take(k)
        .map(|(category, score)| Recommendation {
            student_id: student_id.to_string(),
            payload: RecommendationPayload::Activity { category },
            confidence: if top > 0.0 { (score / top).clamp(0.0, 1.0) } else { 0.0 },
        })
        .collect()
}

/// Greedily cluster the student's 1-hop and 2-hop neighborhood into study
/// groups, preferring peers whose active categories overlap the student's.
pub fn recommend_study_groups(
    student_id: &str,
    graph: &CollaborationGraph,
    profiles: &BTreeMap<String, StudentEngagementProfile>,
) -> Vec<Recommendation> {
    let own_categories = active_categories(profiles.get(student_id));

    let mut candidates: BTreeSet<String> = BTreeSet::new();
    for (peer, _) in graph.neighbors(student_id) {
        candidates.insert(peer.to_string());
        for (second_hop, _) in graph.neighbors(peer) {
            if second_hop != student_id {
                candidates.insert(second_hop.to_string());
            }
        }
    }
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<(String, usize)> = candidates
        .into_iter()
        .map(|peer| {
            let overlap = active_categories(profiles.get(&peer))
                .intersection(&own_categories)
                .count();
            (peer, overlap)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut groups = Vec::new();
    for chunk in ranked.chunks(MAX_GROUP_SIZE - 1) {
        let mut members = vec![student_id.to_string()];
        members.extend(chunk.iter().map(|(peer, _)| peer.clone()));

        let possible = chunk.len() * Category::ALL.len();
        let overlap_total: usize = chunk.iter().map(|(_, overlap)| overlap).sum();
        let confidence = if possible > 0 {
            (overlap_total as f64 / possible as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        groups.push(Recommendation {
            student_id: student_id.to_string(),
            payload: RecommendationPayload::StudyGroup { members },
            confidence,
        });
    }
    groups
}

fn active_categories(profile: Option<&StudentEngagementProfile>) -> BTreeSet<Category> {
    profile
        .map(|p| {
            p.activity_counts
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(category, _)| *category)
                .collect()
        })
        .unwrap_or_default()
}

/// Topologically order the curriculum's topics for one student, skipping
/// topics already evidenced complete in their history. Prerequisites
/// outside the target set (or already complete) count as satisfied; cycle
/// leftovers are appended in sorted order rather than dropped.
pub fn generate_learning_path(
    student_id: &str,
    curriculum: &Curriculum,
    history: &[ActivityRecord],
) -> Vec<String> {
    let completed: BTreeSet<&str> = history
        .iter()
        .filter(|a| a.student_id == student_id && a.quality_percent >= TOPIC_COMPLETION_QUALITY)
        .filter_map(|a| a.topic.as_deref())
        .collect();

    let pending: BTreeSet<&str> = curriculum
        .target_topics
        .iter()
        .map(String::as_str)
        .filter(|topic| !completed.contains(topic))
        .collect();

    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for &topic in &pending {
        let blocking = curriculum
            .prerequisites
            .get(topic)
            .map(|prereqs| {
                prereqs
                    .iter()
                    .map(String::as_str)
                    .filter(|p| pending.contains(p))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        in_degree.insert(topic, blocking.len());
        for prereq in blocking {
            dependents.entry(prereq).or_default().push(topic);
        }
    }

    // Kahn's algorithm with a sorted ready set for deterministic output.
    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(topic, _)| *topic)
        .collect();
    let mut ordered = Vec::new();

    while let Some(topic) = ready.pop_first() {
        ordered.push(topic.to_string());
        if let Some(blocked) = dependents.get(topic) {
            for &dependent in blocked {
                let degree = in_degree.get_mut(dependent).expect("dependent is pending");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if ordered.len() < pending.len() {
        warn!(
            student_id,
            stuck = pending.len() - ordered.len(),
            "prerequisite cycle in curriculum; appending remaining topics in sorted order"
        );
        for &topic in &pending {
            if !ordered.iter().any(|t| t == topic) {
                ordered.push(topic.to_string());
            }
        }
    }

    ordered
}
