use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{
    ActivityRecord, Category, EngagementLevel, StudentEngagementProfile, StudentRecord,
};

/// Fixed aggregation weights. Categories with no activity contribute zero;
/// the remaining weights are not renormalized, so a missing category is not
/// penalized beyond its zero contribution.
pub fn category_weight(category: Category) -> f64 {
    match category {
        Category::AssignmentUploads => 0.25,
        Category::EventParticipation => 0.20,
        Category::ClassParticipation => 0.20,
        Category::PeerCollaboration => 0.15,
        Category::QuizPerformance => 0.20,
    }
}

/// Engagement level comes from raw activity count, not score.
pub fn classify_level(activity_count: usize) -> EngagementLevel {
    match activity_count {
        0..=4 => EngagementLevel::Low,
        5..=14 => EngagementLevel::Medium,
        _ => EngagementLevel::High,
    }
}

/// Build one profile per rostered student. Students with no activities get
/// a default profile (score 0, level low) rather than being omitted.
pub fn build_profiles(
    students: &[StudentRecord],
    activities: &[ActivityRecord],
) -> BTreeMap<String, StudentEngagementProfile> {
    let mut by_student: BTreeMap<&str, Vec<&ActivityRecord>> = BTreeMap::new();
    for activity in activities {
        by_student
            .entry(activity.student_id.as_str())
            .or_default()
            .push(activity);
    }

    let mut profiles = BTreeMap::new();
    for student in students {
        let owned = by_student.get(student.id.as_str()).map_or(&[][..], |v| &v[..]);
        profiles.insert(student.id.clone(), profile_for(student, owned));
    }
    profiles
}

fn profile_for(student: &StudentRecord, activities: &[&ActivityRecord]) -> StudentEngagementProfile {
    let mut activity_counts: BTreeMap<Category, usize> = BTreeMap::new();
    let mut engagement_sums: BTreeMap<Category, f64> = BTreeMap::new();
    let mut last_activity: Option<DateTime<Utc>> = None;

    for activity in activities {
        *activity_counts.entry(activity.category).or_insert(0) += 1;
        *engagement_sums.entry(activity.category).or_insert(0.0) +=
            activity.effective_engagement();
        if last_activity.map_or(true, |latest| activity.timestamp > latest) {
            last_activity = Some(activity.timestamp);
        }
    }

    let mut category_averages = BTreeMap::new();
    let mut total_score = 0.0;
    for category in Category::ALL {
        let count = activity_counts.get(&category).copied().unwrap_or(0);
        if count == 0 {
            continue;
        }
        let average = engagement_sums[&category] / count as f64;
        category_averages.insert(category, average);
        total_score += category_weight(category) * average;
    }

    let timestamps: Vec<DateTime<Utc>> = activities.iter().map(|a| a.timestamp).collect();
    let weekly_counts = weekly_activity_counts(&timestamps);
    let weeks = weekly_counts.len().max(1) as f64;

    StudentEngagementProfile {
        student_id: student.id.clone(),
        name: student.name.clone(),
        total_score,
        consistency_score: consistency_score(&weekly_counts),
        engagement_level: classify_level(activities.len()),
        activity_count: activities.len(),
        activity_counts,
        category_averages,
        weekly_average: activities.len() as f64 / weeks,
        last_activity,
    }
}

/// Bucket activity timestamps into 7-day windows from the earliest record.
/// Empty weeks inside the observed span still count as zeros.
fn weekly_activity_counts(timestamps: &[DateTime<Utc>]) -> Vec<usize> {
    let Some(first) = timestamps.iter().min().copied() else {
        return Vec::new();
    };
    let last = timestamps.iter().max().copied().unwrap_or(first);
    let span_weeks = ((last - first).num_days() / 7) as usize + 1;

    let mut counts = vec![0usize; span_weeks];
    for ts in timestamps {
        let week = ((*ts - first).num_days() / 7) as usize;
        counts[week.min(span_weeks - 1)] += 1;
    }
    counts
}

/// 100 minus the coefficient of variation of the weekly counts, scaled to
/// percent and clamped to [0, 100]. A single observed week scores 100.
fn consistency_score(weekly_counts: &[usize]) -> f64 {
    if weekly_counts.len() < 2 {
        return if weekly_counts.is_empty() { 0.0 } else { 100.0 };
    }
    let n = weekly_counts.len() as f64;
    let mean = weekly_counts.iter().sum::<usize>() as f64 / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = weekly_counts
        .iter()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let cv = variance.sqrt() / mean;
    (100.0 - 100.0 * cv).clamp(0.0, 100.0)
}
