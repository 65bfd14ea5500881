use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ActivityRecord, Concern, RiskAssessment, RiskLevel, StudentEngagementProfile, Trend, Urgency,
};

pub const HIGH_RISK_THRESHOLD: f64 = 70.0;
pub const MEDIUM_RISK_THRESHOLD: f64 = 40.0;

/// Engagement floor (0-10 scale) below which an extrapolated score flips a
/// forecast to at-risk.
const LOW_ENGAGEMENT_FLOOR: f64 = 3.0;

/// Trend and forecast classification need at least this many activities.
const MIN_TREND_SAMPLES: usize = 3;

/// Days of inactivity before a high-risk student is escalated to immediate.
const INACTIVITY_ESCALATION_DAYS: i64 = 7;

/// Nominal due window used when a record has a submission time but no
/// deadline: the record timestamp is treated as the due moment with this
/// many minutes of lead.
const FALLBACK_DUE_WINDOW_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeManagementPattern {
    EarlyBird,
    Procrastinator,
    Balanced,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationLevel {
    Minimal,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmissionTiming {
    Early,
    OnTime,
    Late,
}

#[derive(Debug, Clone, Serialize)]
pub struct BehaviorPatterns {
    pub time_management: TimeManagementPattern,
    pub collaboration_level: CollaborationLevel,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prediction {
    Improving,
    Stable,
    Declining,
    AtRisk,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceForecast {
    pub prediction: Prediction,
    pub confidence: f64,
}

/// Behavioral pattern read for one student over the observed window.
pub fn analyze_patterns(student_id: &str, activities: &[ActivityRecord]) -> BehaviorPatterns {
    let mut owned: Vec<&ActivityRecord> = activities
        .iter()
        .filter(|a| a.student_id == student_id)
        .collect();
    owned.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    BehaviorPatterns {
        time_management: time_management_pattern(&owned),
        collaboration_level: collaboration_level(&owned),
        trend: trend(&owned),
    }
}

fn classify_submission(activity: &ActivityRecord) -> Option<SubmissionTiming> {
    let submitted = activity.submitted_at?;
    if let Some(deadline) = activity.deadline {
        let total = deadline - activity.timestamp;
        if total <= Duration::zero() {
            return Some(if submitted > deadline {
                SubmissionTiming::Late
            } else {
                SubmissionTiming::OnTime
            });
        }
        let remaining = deadline - submitted;
        if submitted > deadline {
            Some(SubmissionTiming::Late)
        } else if remaining.num_seconds() as f64 > 0.2 * total.num_seconds() as f64 {
            Some(SubmissionTiming::Early)
        } else {
            Some(SubmissionTiming::OnTime)
        }
    } else {
        // No deadline on record: treat the timestamp as the due moment with
        // a nominal lead window, same 20% threshold.
        let lead = activity.timestamp - submitted;
        if lead < Duration::zero() {
            Some(SubmissionTiming::Late)
        } else if lead.num_minutes() as f64 > 0.2 * FALLBACK_DUE_WINDOW_MINUTES as f64 {
            Some(SubmissionTiming::Early)
        } else {
            Some(SubmissionTiming::OnTime)
        }
    }
}

fn time_management_pattern(activities: &[&ActivityRecord]) -> TimeManagementPattern {
    let timings: Vec<SubmissionTiming> = activities
        .iter()
        .filter_map(|a| classify_submission(a))
        .collect();
    if timings.is_empty() {
        return TimeManagementPattern::Unknown;
    }

    let total = timings.len() as f64;
    let early = timings.iter().filter(|t| **t == SubmissionTiming::Early).count() as f64;
    let late_or_deadline = timings
        .iter()
        .filter(|t| matches!(t, SubmissionTiming::Late | SubmissionTiming::OnTime))
        .count() as f64;

    if early / total >= 0.6 {
        TimeManagementPattern::EarlyBird
    } else if late_or_deadline / total >= 0.6 {
        TimeManagementPattern::Procrastinator
    } else {
        TimeManagementPattern::Balanced
    }
}

fn collaboration_level(activities: &[&ActivityRecord]) -> CollaborationLevel {
    let collaborative = activities.iter().filter(|a| a.is_collaborative()).count();
    match collaborative {
        0 => CollaborationLevel::Minimal,
        1..=4 => CollaborationLevel::Moderate,
        _ => CollaborationLevel::High,
    }
}

/// Compare mean engagement either side of the chronological midpoint of the
/// observed span. Requires at least `MIN_TREND_SAMPLES` activities; an
/// empty side (all records bunched at one instant) reads as stable.
fn trend(activities: &[&ActivityRecord]) -> Trend {
    if activities.len() < MIN_TREND_SAMPLES {
        return Trend::Unknown;
    }
    let first = activities[0].timestamp;
    let last = activities[activities.len() - 1].timestamp;
    let midpoint = first + (last - first) / 2;

    let (mut prior_sum, mut prior_n) = (0.0, 0usize);
    let (mut recent_sum, mut recent_n) = (0.0, 0usize);
    for activity in activities {
        if activity.timestamp > midpoint {
            recent_sum += activity.effective_engagement();
            recent_n += 1;
        } else {
            prior_sum += activity.effective_engagement();
            prior_n += 1;
        }
    }
    if prior_n == 0 || recent_n == 0 {
        return Trend::Stable;
    }

    let prior = prior_sum / prior_n as f64;
    let recent = recent_sum / recent_n as f64;
    if prior == 0.0 {
        return if recent > 0.0 { Trend::Improving } else { Trend::Stable };
    }
    let change = (recent - prior) / prior;
    if change >= 0.10 {
        Trend::Improving
    } else if change <= -0.10 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Linear extrapolation of the engagement slope over `horizon_weeks`. More
/// samples and lower variance raise confidence; the result is clamped to
/// [0, 1].
pub fn predict_future_performance(
    student_id: &str,
    activities: &[ActivityRecord],
    horizon_weeks: f64,
) -> PerformanceForecast {
    let mut owned: Vec<&ActivityRecord> = activities
        .iter()
        .filter(|a| a.student_id == student_id)
        .collect();
    owned.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    if owned.len() < MIN_TREND_SAMPLES {
        return PerformanceForecast {
            prediction: Prediction::Stable,
            confidence: 0.0,
        };
    }

    let first = owned[0].timestamp;
    let points: Vec<(f64, f64)> = owned
        .iter()
        .map(|a| {
            let weeks = (a.timestamp - first).num_minutes() as f64 / (7.0 * 24.0 * 60.0);
            (weeks, a.effective_engagement())
        })
        .collect();

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let var_x = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum::<f64>() / n;
    let var_y = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum::<f64>() / n;
    let cov = points
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum::<f64>()
        / n;

    let slope = if var_x > 0.0 { cov / var_x } else { 0.0 };
    let extrapolated = mean_y + slope * horizon_weeks;
    let confidence = ((n / (n + 5.0)) * (1.0 / (1.0 + var_y))).clamp(0.0, 1.0);

    let prediction = if extrapolated < LOW_ENGAGEMENT_FLOOR {
        Prediction::AtRisk
    } else if mean_y > 0.0 && (extrapolated - mean_y) / mean_y >= 0.10 {
        Prediction::Improving
    } else if mean_y > 0.0 && (extrapolated - mean_y) / mean_y <= -0.10 {
        Prediction::Declining
    } else {
        Prediction::Stable
    };

    PerformanceForecast {
        prediction,
        confidence,
    }
}

/// Composite risk score for every profiled student, descending by score
/// with a student-id tie-break. Students with fewer than three activities
/// report an Unknown level so a thin history is never misread as low risk.
pub fn identify_at_risk(
    profiles: &BTreeMap<String, StudentEngagementProfile>,
    activities: &[ActivityRecord],
    as_of: DateTime<Utc>,
) -> Vec<RiskAssessment> {
    let mut assessments: Vec<RiskAssessment> = profiles
        .values()
        .map(|profile| assess_student(profile, activities, as_of))
        .collect();

    assessments.sort_by(|a, b| {
        b.risk_score
            .total_cmp(&a.risk_score)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
    assessments
}

fn assess_student(
    profile: &StudentEngagementProfile,
    activities: &[ActivityRecord],
    as_of: DateTime<Utc>,
) -> RiskAssessment {
    let patterns = analyze_patterns(&profile.student_id, activities);
    let gap_days = profile
        .last_activity
        .map(|last| (as_of - last).num_days().max(0))
        .unwrap_or(i64::MAX);

    // Component weights: inverse score 40, declining trend 25, minimal
    // collaboration 15, recency gap 20 (capped at a 30-day gap).
    let inverse_score = ((10.0 - profile.total_score) / 10.0).clamp(0.0, 1.0) * 40.0;
    let trend_component = if patterns.trend == Trend::Declining { 25.0 } else { 0.0 };
    let collaboration_component =
        if patterns.collaboration_level == CollaborationLevel::Minimal { 15.0 } else { 0.0 };
    let recency_component = (gap_days.min(30) as f64 / 30.0) * 20.0;

    let risk_score = (inverse_score + trend_component + collaboration_component
        + recency_component)
        .clamp(0.0, 100.0);

    let insufficient = profile.activity_count < MIN_TREND_SAMPLES;
    let risk_level = if insufficient {
        RiskLevel::Unknown
    } else if risk_score >= HIGH_RISK_THRESHOLD {
        RiskLevel::High
    } else if risk_score >= MEDIUM_RISK_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let urgency = if risk_level == RiskLevel::High && gap_days > INACTIVITY_ESCALATION_DAYS {
        Urgency::Immediate
    } else {
        Urgency::Scheduled
    };

    let mut primary_concerns = Vec::new();
    if profile.total_score < 4.0 {
        primary_concerns.push(Concern::LowEngagementScore);
    }
    if patterns.trend == Trend::Declining {
        primary_concerns.push(Concern::DecliningTrend);
    }
    if patterns.collaboration_level == CollaborationLevel::Minimal {
        primary_concerns.push(Concern::MinimalCollaboration);
    }
    if gap_days > INACTIVITY_ESCALATION_DAYS {
        primary_concerns.push(Concern::InactivityGap);
    }

    let recommended_interventions = primary_concerns
        .iter()
        .map(|c| c.intervention().to_string())
        .collect();

    RiskAssessment {
        student_id: profile.student_id.clone(),
        name: profile.name.clone(),
        risk_score,
        risk_level,
        urgency,
        primary_concerns,
        recommended_interventions,
        trend: if insufficient { Trend::Unknown } else { patterns.trend },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, StudentRecord};
    use crate::scoring::build_profiles;
    use chrono::TimeZone;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn sample_activity(student_id: &str, engagement: f64, days_offset: i64) -> ActivityRecord {
        ActivityRecord {
            id: format!("a-{student_id}-{days_offset}"),
            student_id: student_id.to_string(),
            category: Category::AssignmentUploads,
            timestamp: base_time() + Duration::days(days_offset),
            score: engagement,
            max_score: 10.0,
            quality_percent: engagement * 10.0,
            engagement_level: Some(engagement),
            duration_minutes: 40.0,
            collaborators: Vec::new(),
            deadline: None,
            submitted_at: None,
            topic: None,
        }
    }

    fn student(id: &str) -> StudentRecord {
        StudentRecord {
            id: id.to_string(),
            name: format!("Student {id}"),
            cohort: "2026".to_string(),
        }
    }

    #[test]
    fn trend_needs_three_activities() {
        let activities = vec![
            sample_activity("s1", 5.0, 0),
            sample_activity("s1", 9.0, 7),
        ];
        let patterns = analyze_patterns("s1", &activities);
        assert_eq!(patterns.trend, Trend::Unknown);
    }

    #[test]
    fn rising_engagement_reads_improving() {
        let activities = vec![
            sample_activity("s1", 3.0, 0),
            sample_activity("s1", 3.0, 2),
            sample_activity("s1", 8.0, 12),
            sample_activity("s1", 9.0, 14),
        ];
        assert_eq!(analyze_patterns("s1", &activities).trend, Trend::Improving);
    }

    #[test]
    fn falling_engagement_reads_declining() {
        let activities = vec![
            sample_activity("s1", 9.0, 0),
            sample_activity("s1", 8.0, 2),
            sample_activity("s1", 4.0, 12),
            sample_activity("s1", 3.0, 14),
        ];
        assert_eq!(analyze_patterns("s1", &activities).trend, Trend::Declining);
    }

    #[test]
    fn small_change_reads_stable() {
        let activities = vec![
            sample_activity("s1", 7.0, 0),
            sample_activity("s1", 7.2, 5),
            sample_activity("s1", 7.1, 10),
            sample_activity("s1", 7.3, 14),
        ];
        assert_eq!(analyze_patterns("s1", &activities).trend, Trend::Stable);
    }

    #[test]
    fn collaboration_levels_follow_count_tiers() {
        let mut activities = vec![sample_activity("s1", 6.0, 0)];
        assert_eq!(
            analyze_patterns("s1", &activities).collaboration_level,
            CollaborationLevel::Minimal
        );

        for i in 0..2 {
            let mut a = sample_activity("s1", 6.0, i + 1);
            a.collaborators = vec!["s2".to_string()];
            activities.push(a);
        }
        assert_eq!(
            analyze_patterns("s1", &activities).collaboration_level,
            CollaborationLevel::Moderate
        );

        for i in 0..4 {
            let mut a = sample_activity("s1", 6.0, i + 10);
            a.collaborators = vec!["s3".to_string()];
            activities.push(a);
        }
        assert_eq!(
            analyze_patterns("s1", &activities).collaboration_level,
            CollaborationLevel::High
        );
    }

    #[test]
    fn early_submissions_make_an_early_bird() {
        let mut activities = Vec::new();
        for i in 0..5 {
            let mut a = sample_activity("s1", 7.0, i);
            a.deadline = Some(a.timestamp + Duration::days(7));
            a.submitted_at = Some(a.timestamp + Duration::days(1));
            activities.push(a);
        }
        assert_eq!(
            analyze_patterns("s1", &activities).time_management,
            TimeManagementPattern::EarlyBird
        );
    }

    #[test]
    fn deadline_squeakers_are_procrastinators() {
        let mut activities = Vec::new();
        for i in 0..5 {
            let mut a = sample_activity("s1", 7.0, i);
            a.deadline = Some(a.timestamp + Duration::days(7));
            // under 20% of the window remaining
            a.submitted_at = Some(a.timestamp + Duration::days(6) + Duration::hours(12));
            activities.push(a);
        }
        assert_eq!(
            analyze_patterns("s1", &activities).time_management,
            TimeManagementPattern::Procrastinator
        );
    }

    #[test]
    fn no_submission_data_reads_unknown() {
        let activities = vec![sample_activity("s1", 7.0, 0)];
        assert_eq!(
            analyze_patterns("s1", &activities).time_management,
            TimeManagementPattern::Unknown
        );
    }

    #[test]
    fn declining_history_forecasts_at_risk() {
        let activities = vec![
            sample_activity("s1", 8.0, 0),
            sample_activity("s1", 6.0, 7),
            sample_activity("s1", 4.0, 14),
            sample_activity("s1", 3.5, 21),
        ];
        let forecast = predict_future_performance("s1", &activities, 4.0);
        assert_eq!(forecast.prediction, Prediction::AtRisk);
        assert!((0.0..=1.0).contains(&forecast.confidence));
    }

    #[test]
    fn steady_history_forecasts_stable_with_higher_confidence() {
        let steady: Vec<ActivityRecord> =
            (0..8).map(|i| sample_activity("s1", 7.0, i * 3)).collect();
        let noisy = vec![
            sample_activity("s2", 2.0, 0),
            sample_activity("s2", 9.0, 3),
            sample_activity("s2", 3.0, 6),
            sample_activity("s2", 10.0, 9),
        ];
        let steady_forecast = predict_future_performance("s1", &steady, 4.0);
        let noisy_forecast = predict_future_performance("s2", &noisy, 4.0);
        assert_eq!(steady_forecast.prediction, Prediction::Stable);
        assert!(steady_forecast.confidence > noisy_forecast.confidence);
    }

    #[test]
    fn risk_scores_stay_bounded() {
        let students = vec![student("s1"), student("s2"), student("s3")];
        let mut activities = Vec::new();
        for i in 0..20 {
            activities.push(sample_activity("s1", 9.5, i));
        }
        activities.push(sample_activity("s2", 0.0, 0));

        let profiles = build_profiles(&students, &activities);
        let as_of = base_time() + Duration::days(40);
        for assessment in identify_at_risk(&profiles, &activities, as_of) {
            assert!((0.0..=100.0).contains(&assessment.risk_score));
        }
    }

    #[test]
    fn zero_activity_student_is_unknown_not_low() {
        let students = vec![student("s1")];
        let profiles = build_profiles(&students, &[]);
        let assessments = identify_at_risk(&profiles, &[], base_time());
        assert_eq!(assessments[0].risk_level, RiskLevel::Unknown);
        assert_eq!(assessments[0].trend, Trend::Unknown);
        assert!((0.0..=100.0).contains(&assessments[0].risk_score));
    }

    #[test]
    fn inactive_declining_student_is_immediate() {
        let students = vec![student("s1")];
        let activities = vec![
            sample_activity("s1", 5.0, 0),
            sample_activity("s1", 4.0, 3),
            sample_activity("s1", 1.5, 8),
            sample_activity("s1", 1.0, 10),
        ];
        let profiles = build_profiles(&students, &activities);
        // last activity 10 days before the assessment
        let as_of = base_time() + Duration::days(20);
        let assessments = identify_at_risk(&profiles, &activities, as_of);
        let top = &assessments[0];

        assert!(top.risk_score >= HIGH_RISK_THRESHOLD);
        assert_eq!(top.risk_level, RiskLevel::High);
        assert_eq!(top.urgency, Urgency::Immediate);
        assert!(top.primary_concerns.contains(&Concern::DecliningTrend));
        assert!(top.primary_concerns.contains(&Concern::InactivityGap));
        assert!(!top.recommended_interventions.is_empty());
    }

    #[test]
    fn assessments_sorted_by_score_then_id() {
        let students = vec![student("s1"), student("s2")];
        let mut activities = Vec::new();
        for i in 0..16 {
            activities.push(sample_activity("s1", 9.0, i));
            activities.push(sample_activity("s2", 9.0, i));
        }
        let profiles = build_profiles(&students, &activities);
        let assessments = identify_at_risk(&profiles, &activities, base_time() + Duration::days(16));
        assert_eq!(assessments[0].student_id, "s1");
        assert_eq!(assessments[1].student_id, "s2");
        assert!(assessments[0].risk_score >= assessments[1].risk_score);
    }
}
