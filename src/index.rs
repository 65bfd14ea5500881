use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::models::{EngagementLevel, StudentEngagementProfile};

/// B-tree key ordering students by score descending, then student id
/// ascending so equal scores stay deterministic. `total_cmp` gives f64 a
/// total order without NaN surprises.
#[derive(Debug, Clone)]
struct IndexKey {
    score: f64,
    student_id: String,
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.student_id.cmp(&other.student_id))
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

/// Ordered index over the current profile set, keyed by total score.
/// Upsert/remove are O(log n) via the reverse id map; top-k and level range
/// queries walk the tree in order. Levels are count-based rather than
/// score-contiguous, so each entry carries its level as the mapped value.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    entries: BTreeMap<IndexKey, EngagementLevel>,
    by_student: HashMap<String, IndexKey>,
}

impl CategoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles<'a, I>(profiles: I) -> Self
    where
        I: IntoIterator<Item = &'a StudentEngagementProfile>,
    {
        let mut index = Self::new();
        for profile in profiles {
            index.upsert(&profile.student_id, profile.total_score, profile.engagement_level);
        }
        index
    }

    pub fn upsert(&mut self, student_id: &str, score: f64, level: EngagementLevel) {
        self.remove(student_id);
        let key = IndexKey {
            score,
            student_id: student_id.to_string(),
        };
        self.by_student.insert(student_id.to_string(), key.clone());
        self.entries.insert(key, level);
    }

    pub fn remove(&mut self, student_id: &str) -> bool {
        match self.by_student.remove(student_id) {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn score_of(&self, student_id: &str) -> Option<f64> {
        self.by_student.get(student_id).map(|key| key.score)
    }

    /// Highest-scoring k students, score descending with id tie-break.
    pub fn top_k(&self, k: usize) -> Vec<String> {
        self.entries
            .keys()
            .take(k)
            .map(|key| key.student_id.clone())
            .collect()
    }

    /// All students at the given engagement level, in descending score order.
    pub fn range_by_level(&self, level: EngagementLevel) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry_level)| **entry_level == level)
            .map(|(key, _)| key.student_id.clone())
            .collect()
    }
}
