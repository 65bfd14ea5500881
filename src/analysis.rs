use chrono::{DateTime, Utc};

use crate::graph::{build_graph, network_metrics};
use crate::models::{AnalysisBundle, Recommendation, RecommendationPayload};
use crate::ranking::{rank, LEADERBOARD_KEYS};
use crate::recommend::{
    generate_learning_path, recommend_activities, recommend_study_groups, Curriculum,
};
use crate::risk::identify_at_risk;
use crate::scoring::build_profiles;
use crate::store::ActivitySnapshot;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Activity suggestions per student.
    pub top_recommendations: usize,
    /// Learning paths are only generated when a curriculum is supplied.
    pub curriculum: Option<Curriculum>,
    /// Reference instant for recency math; pinned by tests, Utc::now()
    /// otherwise.
    pub as_of: Option<DateTime<Utc>>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            top_recommendations: 3,
            curriculum: None,
            as_of: None,
        }
    }
}

/// One analysis pass: scoring, ranking, risk, graph, recommendations, in
/// that order, over a fixed snapshot. The pass is pure and atomic; the
/// returned bundle is a complete immutable value, never a partial result.
pub fn run_pass(snapshot: &ActivitySnapshot, options: &AnalysisOptions) -> AnalysisBundle {
    let as_of = options.as_of.unwrap_or_else(Utc::now);

    let profiles = build_profiles(&snapshot.students, &snapshot.activities);
    let profile_list: Vec<_> = profiles.values().cloned().collect();

    let rankings = rank(&profile_list, &LEADERBOARD_KEYS);
    let risk_assessments = identify_at_risk(&profiles, &snapshot.activities, as_of);

    let graph = build_graph(&snapshot.activities);
    let graph_metrics = network_metrics(&graph);

    let mut recommendations: Vec<Recommendation> = Vec::new();
    for student_id in profiles.keys() {
        recommendations.extend(recommend_activities(
            student_id,
            &graph,
            &profiles,
            options.top_recommendations,
        ));
        recommendations.extend(recommend_study_groups(student_id, &graph, &profiles));
        if let Some(curriculum) = &options.curriculum {
            let topics = generate_learning_path(student_id, curriculum, &snapshot.activities);
            if !topics.is_empty() {
                recommendations.push(Recommendation {
                    student_id: student_id.clone(),
                    payload: RecommendationPayload::LearningPath { topics },
                    confidence: 1.0,
                });
            }
        }
    }

    AnalysisBundle {
        generated_at: as_of,
        profiles: profile_list,
        rankings,
        risk_assessments,
        graph_metrics,
        recommendations,
    }
}
