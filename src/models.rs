use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed activity categories tracked by the scorer. The per-category weights
/// live in `scoring::category_weight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AssignmentUploads,
    EventParticipation,
    ClassParticipation,
    PeerCollaboration,
    QuizPerformance,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::AssignmentUploads,
        Category::EventParticipation,
        Category::ClassParticipation,
        Category::PeerCollaboration,
        Category::QuizPerformance,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::AssignmentUploads => "assignment uploads",
            Category::EventParticipation => "event participation",
            Category::ClassParticipation => "class participation",
            Category::PeerCollaboration => "peer collaboration",
            Category::QuizPerformance => "quiz performance",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assignment_uploads" | "assignments" => Ok(Category::AssignmentUploads),
            "event_participation" | "events" => Ok(Category::EventParticipation),
            "class_participation" | "class" => Ok(Category::ClassParticipation),
            "peer_collaboration" | "collaboration" => Ok(Category::PeerCollaboration),
            "quiz_performance" | "quizzes" => Ok(Category::QuizPerformance),
            other => Err(format!("unknown activity category: {other}")),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One recorded activity, immutable once loaded. `engagement_level` is on a
/// 0-10 scale; a missing value defaults to the midpoint at scoring time
/// rather than rejecting the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub student_id: String,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub max_score: f64,
    pub quality_percent: f64,
    pub engagement_level: Option<f64>,
    pub duration_minutes: f64,
    #[serde(default)]
    pub collaborators: Vec<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topic: Option<String>,
}

impl ActivityRecord {
    /// Engagement level with the midpoint default applied, clamped to the
    /// 0-10 scale.
    pub fn effective_engagement(&self) -> f64 {
        self.engagement_level.unwrap_or(5.0).clamp(0.0, 10.0)
    }

    pub fn is_collaborative(&self) -> bool {
        self.collaborators.iter().any(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub cohort: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
}

impl fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngagementLevel::High => "high",
            EngagementLevel::Medium => "medium",
            EngagementLevel::Low => "low",
        };
        f.write_str(label)
    }
}

/// Derived per-student view, recomputed wholesale on every analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentEngagementProfile {
    pub student_id: String,
    pub name: String,
    pub total_score: f64,
    pub consistency_score: f64,
    pub engagement_level: EngagementLevel,
    pub activity_count: usize,
    pub activity_counts: BTreeMap<Category, usize>,
    pub category_averages: BTreeMap<Category, f64>,
    pub weekly_average: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
    Unknown,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
            Trend::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Scheduled,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concern {
    LowEngagementScore,
    DecliningTrend,
    MinimalCollaboration,
    InactivityGap,
}

impl Concern {
    pub fn intervention(&self) -> &'static str {
        match self {
            Concern::LowEngagementScore => {
                "Schedule a one-on-one check-in to review recent coursework"
            }
            Concern::DecliningTrend => "Review recent submissions for signs of disengagement",
            Concern::MinimalCollaboration => "Pair with an active peer group for the next project",
            Concern::InactivityGap => "Send an outreach nudge; no activity in over a week",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub student_id: String,
    pub name: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub urgency: Urgency,
    pub primary_concerns: Vec<Concern>,
    pub recommended_interventions: Vec<String>,
    pub trend: Trend,
}

/// Leaderboard row produced by the ranking engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub student_id: String,
    pub name: String,
    pub total_score: f64,
    pub consistency_score: f64,
    pub activity_count: usize,
    pub percentile: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationPayload {
    Activity { category: Category },
    StudyGroup { members: Vec<String> },
    LearningPath { topics: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub student_id: String,
    #[serde(flatten)]
    pub payload: RecommendationPayload,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub average_degree: f64,
    pub density: f64,
    pub component_count: usize,
    pub component_membership: BTreeMap<String, usize>,
}

/// Immutable output of one analysis pass: everything the presentation
/// layers consume, serializable as one flat JSON document for export.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisBundle {
    pub generated_at: DateTime<Utc>,
    pub profiles: Vec<StudentEngagementProfile>,
    pub rankings: Vec<RankedEntry>,
    pub risk_assessments: Vec<RiskAssessment>,
    pub graph_metrics: NetworkMetrics,
    pub recommendations: Vec<Recommendation>,
}
