use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ActivityRecord, StudentRecord};

/// Read-only input for one analysis pass. The core never mutates it; each
/// pass derives a fresh output bundle from whatever snapshot it is handed.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ActivitySnapshot {
    #[serde(default)]
    pub students: Vec<StudentRecord>,
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
}

impl ActivitySnapshot {
    /// Students referenced only by activity rows still get a roster entry so
    /// they are never omitted from derived output.
    pub fn ensure_roster(&mut self) {
        let known: HashSet<String> = self.students.iter().map(|s| s.id.clone()).collect();
        let mut added: HashSet<String> = HashSet::new();
        for activity in &self.activities {
            if known.contains(&activity.student_id) || !added.insert(activity.student_id.clone()) {
                continue;
            }
            debug!(student_id = %activity.student_id, "no roster entry; synthesizing one");
            self.students.push(StudentRecord {
                id: activity.student_id.clone(),
                name: activity.student_id.clone(),
                cohort: String::new(),
            });
        }
        self.students.sort_by(|a, b| a.id.cmp(&b.id));
    }

    /// Narrow the snapshot to one cohort or one student before a pass.
    pub fn scoped(mut self, cohort: Option<&str>, student: Option<&str>) -> Self {
        if let Some(cohort) = cohort {
            self.students.retain(|s| s.cohort == cohort);
        } else if let Some(student) = student {
            self.students.retain(|s| s.id == student);
        } else {
            return self;
        }
        let keep: HashSet<&str> = self.students.iter().map(|s| s.id.as_str()).collect();
        self.activities.retain(|a| keep.contains(a.student_id.as_str()));
        self
    }
}

/// Load a snapshot from a `.json` document or a `.csv` of activity rows
/// (with an optional roster sidecar). Chosen by file extension.
pub fn load_snapshot(
    path: &Path,
    students_path: Option<&Path>,
) -> anyhow::Result<ActivitySnapshot> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let mut snapshot = match extension.as_str() {
        "json" => load_json(path)?,
        "csv" => ActivitySnapshot {
            students: Vec::new(),
            activities: load_activities_csv(path)?,
        },
        other => anyhow::bail!("unsupported snapshot format: .{other} (expected .csv or .json)"),
    };

    if let Some(students_path) = students_path {
        snapshot.students = load_students_csv(students_path)?;
    }
    snapshot.ensure_roster();
    Ok(snapshot)
}

fn load_json(path: &Path) -> anyhow::Result<ActivitySnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))
}

pub fn load_activities_csv(path: &Path) -> anyhow::Result<Vec<ActivityRecord>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        id: Option<String>,
        student_id: String,
        category: String,
        timestamp: DateTime<Utc>,
        score: Option<f64>,
        max_score: Option<f64>,
        quality_percent: Option<f64>,
        engagement_level: Option<f64>,
        duration_minutes: Option<f64>,
        collaborators: Option<String>,
        deadline: Option<DateTime<Utc>>,
        submitted_at: Option<DateTime<Utc>>,
        topic: Option<String>,
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut activities = Vec::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!(line = line + 2, %err, "skipping malformed activity row");
                continue;
            }
        };
        let category = match row.category.parse() {
            Ok(category) => category,
            Err(err) => {
                warn!(line = line + 2, %err, "skipping activity row");
                continue;
            }
        };
        if row.student_id.trim().is_empty() {
            warn!(line = line + 2, "skipping activity row with blank student id");
            continue;
        }

        activities.push(ActivityRecord {
            id: row.id.unwrap_or_else(|| format!("import-{}", Uuid::new_v4())),
            student_id: row.student_id,
            category,
            timestamp: row.timestamp,
            score: row.score.unwrap_or(0.0),
            max_score: row.max_score.unwrap_or(100.0),
            quality_percent: row.quality_percent.unwrap_or(0.0),
            engagement_level: row.engagement_level,
            duration_minutes: row.duration_minutes.unwrap_or(0.0),
            collaborators: split_collaborators(row.collaborators.as_deref()),
            deadline: row.deadline,
            submitted_at: row.submitted_at,
            topic: row.topic,
        });
    }

    Ok(activities)
}

pub fn load_students_csv(path: &Path) -> anyhow::Result<Vec<StudentRecord>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        id: String,
        name: String,
        cohort: Option<String>,
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut students = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        students.push(StudentRecord {
            id: row.id,
            name: row.name,
            cohort: row.cohort.unwrap_or_default(),
        });
    }

    Ok(students)
}

fn split_collaborators(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::TimeZone;

    fn activity(student_id: &str) -> ActivityRecord {
        ActivityRecord {
            id: "a1".to_string(),
            student_id: student_id.to_string(),
            category: Category::QuizPerformance,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            score: 8.0,
            max_score: 10.0,
            quality_percent: 80.0,
            engagement_level: Some(7.0),
            duration_minutes: 30.0,
            collaborators: Vec::new(),
            deadline: None,
            submitted_at: None,
            topic: None,
        }
    }

    #[test]
    fn roster_synthesized_for_unknown_students() {
        let mut snapshot = ActivitySnapshot {
            students: vec![StudentRecord {
                id: "s1".to_string(),
                name: "Avery Lee".to_string(),
                cohort: "2026".to_string(),
            }],
            activities: vec![activity("s1"), activity("s2"), activity("s2")],
        };
        snapshot.ensure_roster();
        assert_eq!(snapshot.students.len(), 2);
        assert_eq!(snapshot.students[1].id, "s2");
        assert_eq!(snapshot.students[1].name, "s2");
    }

    #[test]
    fn scoping_by_student_drops_other_activities() {
        let mut snapshot = ActivitySnapshot {
            students: Vec::new(),
            activities: vec![activity("s1"), activity("s2")],
        };
        snapshot.ensure_roster();
        let scoped = snapshot.scoped(None, Some("s2"));
        assert_eq!(scoped.students.len(), 1);
        assert_eq!(scoped.activities.len(), 1);
        assert_eq!(scoped.activities[0].student_id, "s2");
    }

    #[test]
    fn collaborator_field_splits_and_trims() {
        let parsed = split_collaborators(Some("s2; s3 ;;s4"));
        assert_eq!(parsed, vec!["s2", "s3", "s4"]);
        assert!(split_collaborators(None).is_empty());
    }

    #[test]
    fn json_snapshot_parses() {
        let raw = r#"{
            "students": [{"id": "s1", "name": "Avery Lee", "cohort": "2026"}],
            "activities": [{
                "id": "a1", "student_id": "s1", "category": "quiz_performance",
                "timestamp": "2026-03-01T12:00:00Z", "score": 8.0, "max_score": 10.0,
                "quality_percent": 80.0, "engagement_level": null, "duration_minutes": 30.0
            }]
        }"#;
        let snapshot: ActivitySnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.students.len(), 1);
        assert_eq!(snapshot.activities[0].category, Category::QuizPerformance);
        assert_eq!(snapshot.activities[0].effective_engagement(), 5.0);
    }
}
