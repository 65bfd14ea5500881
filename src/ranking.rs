use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::{RankedEntry, StudentEngagementProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    TotalScore,
    ConsistencyScore,
    WeeklyAverage,
    ActivityCount,
    Name,
    StudentId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Default leaderboard ordering: score first, consistency as the
/// second criterion.
pub const LEADERBOARD_KEYS: [(SortKey, SortOrder); 2] = [
    (SortKey::TotalScore, SortOrder::Descending),
    (SortKey::ConsistencyScore, SortOrder::Descending),
];

fn compare_key(
    a: &StudentEngagementProfile,
    b: &StudentEngagementProfile,
    key: SortKey,
) -> Ordering {
    match key {
        SortKey::TotalScore => a.total_score.total_cmp(&b.total_score),
        SortKey::ConsistencyScore => a.consistency_score.total_cmp(&b.consistency_score),
        SortKey::WeeklyAverage => a.weekly_average.total_cmp(&b.weekly_average),
        SortKey::ActivityCount => a.activity_count.cmp(&b.activity_count),
        SortKey::Name => a.name.cmp(&b.name),
        SortKey::StudentId => a.student_id.cmp(&b.student_id),
    }
}

/// Multi-criteria ranking over the caller's ordered key list. The sort is
/// stable and always falls through to name then student id ascending, so
/// equal entries never land in arbitrary order. Each entry carries
/// `percentile = 100 * (n - rank) / n`.
pub fn rank(
    profiles: &[StudentEngagementProfile],
    keys: &[(SortKey, SortOrder)],
) -> Vec<RankedEntry> {
    let mut ordered: Vec<&StudentEngagementProfile> = profiles.iter().collect();
    ordered.sort_by(|a, b| {
        for (key, order) in keys {
            let cmp = match order {
                SortOrder::Ascending => compare_key(a, b, *key),
                SortOrder::Descending => compare_key(b, a, *key),
            };
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        a.name
            .cmp(&b.name)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    let n = ordered.len();
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, profile)| {
            let rank = i + 1;
            RankedEntry {
                rank,
                student_id: profile.student_id.clone(),
                name: profile.name.clone(),
                total_score: profile.total_score,
                consistency_score: profile.consistency_score,
                activity_count: profile.activity_count,
                percentile: 100.0 * (n - rank) as f64 / n as f64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn profile(id: &str, name: &str, score: f64, consistency: f64) -> StudentEngagementProfile {
        StudentEngagementProfile {
            student_id: id.to_string(),
            name: name.to_string(),
            total_score: score,
            consistency_score: consistency,
            engagement_level: crate::models::EngagementLevel::Medium,
            activity_count: 6,
            activity_counts: BTreeMap::new(),
            category_averages: BTreeMap::new(),
            weekly_average: 2.0,
            last_activity: None,
        }
    }

    #[test]
    fn ranks_and_percentiles_from_score() {
        let profiles = vec![
            profile("s1", "Avery Lee", 4.0, 70.0),
            profile("s2", "Jules Moreno", 8.0, 60.0),
            profile("s3", "Kiara Patel", 6.0, 90.0),
            profile("s4", "Noah Kim", 2.0, 50.0),
        ];
        let ranked = rank(&profiles, &LEADERBOARD_KEYS);
        let ids: Vec<&str> = ranked.iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s3", "s1", "s4"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].percentile, 75.0);
        assert_eq!(ranked[3].percentile, 0.0);
    }

    #[test]
    fn multi_key_comparison_short_circuits() {
        let profiles = vec![
            profile("s1", "Avery Lee", 5.0, 40.0),
            profile("s2", "Jules Moreno", 5.0, 80.0),
        ];
        let ranked = rank(&profiles, &LEADERBOARD_KEYS);
        assert_eq!(ranked[0].student_id, "s2");

        let ranked = rank(
            &profiles,
            &[(SortKey::ConsistencyScore, SortOrder::Ascending)],
        );
        assert_eq!(ranked[0].student_id, "s1");
    }

    #[test]
    fn fully_equal_entries_preserve_input_order() {
        let profiles = vec![
            profile("dup", "Avery Lee", 5.0, 50.0),
            profile("dup", "Avery Lee", 5.0, 50.0),
        ];
        let ranked = rank(&profiles, &LEADERBOARD_KEYS);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
        // identical keys throughout, so stable sort keeps input order
        assert_eq!(ranked[0].student_id, "dup");
    }

    #[test]
    fn permuted_input_yields_identical_output() {
        let a = profile("s1", "Avery Lee", 5.0, 50.0);
        let b = profile("s2", "Avery Lee", 5.0, 50.0);
        let c = profile("s3", "Jules Moreno", 7.0, 10.0);

        let first = rank(&[a.clone(), b.clone(), c.clone()], &LEADERBOARD_KEYS);
        let second = rank(&[c, b, a], &LEADERBOARD_KEYS);
        let first_ids: Vec<&str> = first.iter().map(|e| e.student_id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(first_ids, vec!["s3", "s1", "s2"]);
    }
}
