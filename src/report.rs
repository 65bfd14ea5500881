use std::fmt::Write;

use crate::index::CategoryIndex;
use crate::models::{AnalysisBundle, EngagementLevel, RecommendationPayload, RiskLevel, Urgency};

/// Render one pass's bundle as a markdown report. Pure formatting; the
/// bundle already carries every derived view.
pub fn build_report(scope: Option<&str>, bundle: &AnalysisBundle) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all students");
    let index = CategoryIndex::from_profiles(bundle.profiles.iter());

    let _ = writeln!(output, "# Engagement Analytics Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        scope_label,
        bundle.generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cohort Overview");
    let _ = writeln!(output, "- Students analyzed: {}", bundle.profiles.len());
    let average_score = if bundle.profiles.is_empty() {
        0.0
    } else {
        bundle.profiles.iter().map(|p| p.total_score).sum::<f64>()
            / bundle.profiles.len() as f64
    };
    let _ = writeln!(output, "- Average engagement score: {average_score:.2}");
    for level in [EngagementLevel::High, EngagementLevel::Medium, EngagementLevel::Low] {
        let _ = writeln!(
            output,
            "- {} engagement: {} students",
            level,
            index.range_by_level(level).len()
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Leaderboard");
    if bundle.rankings.is_empty() {
        let _ = writeln!(output, "No students in this scope.");
    } else {
        for entry in bundle.rankings.iter().take(10) {
            let _ = writeln!(
                output,
                "{}. {} — score {:.2}, consistency {:.0}, {} activities (p{:.0})",
                entry.rank,
                entry.name,
                entry.total_score,
                entry.consistency_score,
                entry.activity_count,
                entry.percentile
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## At-Risk Students");
    let flagged: Vec<_> = bundle
        .risk_assessments
        .iter()
        .filter(|a| !matches!(a.risk_level, RiskLevel::Low))
        .take(10)
        .collect();
    if flagged.is_empty() {
        let _ = writeln!(output, "No students flagged in this window.");
    } else {
        for assessment in flagged {
            let urgency = match assessment.urgency {
                Urgency::Immediate => " — immediate outreach",
                Urgency::Scheduled => "",
            };
            let _ = writeln!(
                output,
                "- {} risk {:.0} ({}, trend {}){}",
                assessment.name,
                assessment.risk_score,
                assessment.risk_level,
                assessment.trend,
                urgency
            );
            for intervention in assessment.recommended_interventions.iter().take(2) {
                let _ = writeln!(output, "  - {intervention}");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Collaboration Network");
    let metrics = &bundle.graph_metrics;
    let _ = writeln!(
        output,
        "- {} students, {} links, density {:.2}",
        metrics.node_count, metrics.edge_count, metrics.density
    );
    let _ = writeln!(output, "- Average degree: {:.2}", metrics.average_degree);
    let _ = writeln!(output, "- Connected components: {}", metrics.component_count);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Suggested Next Steps");
    if bundle.recommendations.is_empty() {
        let _ = writeln!(output, "No peer-based recommendations for this scope.");
    } else {
        for rec in bundle.recommendations.iter().take(10) {
            let line = match &rec.payload {
                RecommendationPayload::Activity { category } => {
                    format!("{}: try {}", rec.student_id, category)
                }
                RecommendationPayload::StudyGroup { members } => {
                    format!("{}: study group with {}", rec.student_id, members[1..].join(", "))
                }
                RecommendationPayload::LearningPath { topics } => {
                    format!("{}: learning path {}", rec.student_id, topics.join(" -> "))
                }
            };
            let _ = writeln!(output, "- {} (confidence {:.2})", line, rec.confidence);
        }
    }

    output
}
