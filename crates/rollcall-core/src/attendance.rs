//! Attendance aggregation: roster + match results → present/absent record.

use crate::roster::Roster;
use crate::types::{Identity, MatchResult};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Present,
    Absent,
}

/// Attendance for one class photo. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    class_id: String,
    #[serde(serialize_with = "serialize_entries")]
    entries: Vec<(Identity, Status)>,
    faces_detected: usize,
    recognized: Vec<Identity>,
    processed_at: DateTime<Utc>,
}

/// Aggregate counts of a record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    /// Present share of the roster in percent; 0.0 for an empty roster.
    pub percentage: f32,
}

impl AttendanceRecord {
    /// Combine one photo's match results with the class roster.
    ///
    /// Each detection is one entry in `matches`. Identities matched more than
    /// once count once. Identities outside the roster only show up in
    /// [`recognized`](Self::recognized).
    pub fn aggregate(class_id: &str, roster: &Roster, matches: &[MatchResult]) -> Self {
        let mut seen = HashSet::new();
        let recognized: Vec<Identity> = matches
            .iter()
            .filter_map(MatchResult::identity)
            .filter(|identity| seen.insert(*identity))
            .cloned()
            .collect();

        let entries = roster
            .iter()
            .map(|identity| {
                let status = if seen.contains(identity) {
                    Status::Present
                } else {
                    Status::Absent
                };
                (identity.clone(), status)
            })
            .collect();

        Self {
            class_id: class_id.to_string(),
            entries,
            faces_detected: matches.len(),
            recognized,
            processed_at: Utc::now(),
        }
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    /// Roster identities with their status, in roster order.
    pub fn entries(&self) -> &[(Identity, Status)] {
        &self.entries
    }

    pub fn status(&self, identity: &str) -> Option<Status> {
        self.entries
            .iter()
            .find(|(id, _)| id.as_str() == identity)
            .map(|(_, status)| *status)
    }

    pub fn faces_detected(&self) -> usize {
        self.faces_detected
    }

    /// Matched identities, de-duplicated, in first-detection order.
    pub fn recognized(&self) -> &[Identity] {
        &self.recognized
    }

    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }

    pub fn roster_size(&self) -> usize {
        self.entries.len()
    }

    pub fn summary(&self) -> AttendanceSummary {
        let total = self.entries.len();
        let present = self
            .entries
            .iter()
            .filter(|(_, status)| *status == Status::Present)
            .count();
        let percentage = if total == 0 {
            0.0
        } else {
            present as f32 * 100.0 / total as f32
        };
        AttendanceSummary {
            total,
            present,
            absent: total - present,
            percentage,
        }
    }
}

fn serialize_entries<S: Serializer>(
    entries: &[(Identity, Status)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (identity, status) in entries {
        map.serialize_entry(identity, status)?;
    }
    map.end()
}

/// Reply to one attendance request.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceResponse {
    pub class_id: String,
    #[serde(serialize_with = "serialize_entries")]
    pub attendance_details: Vec<(Identity, Status)>,
    pub faces_detected: usize,
    pub recognized_students: Vec<Identity>,
    pub students_recognized: usize,
    pub total_students: usize,
    pub summary: AttendanceSummary,
    pub annotated_image: PathBuf,
    pub photo_size: usize,
    pub processing_status: ProcessingStatus,
    pub message: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Success,
}

impl AttendanceResponse {
    pub fn new(record: AttendanceRecord, annotated_image: PathBuf, photo_size: usize) -> Self {
        let summary = record.summary();
        let message = if record.faces_detected == 0 {
            format!("Attendance processed for class {}. No faces detected.", record.class_id)
        } else {
            format!(
                "Attendance processed for class {}. {} students recognized.",
                record.class_id,
                record.recognized.len()
            )
        };
        Self {
            students_recognized: record.recognized.len(),
            total_students: record.roster_size(),
            faces_detected: record.faces_detected,
            class_id: record.class_id,
            attendance_details: record.entries,
            recognized_students: record.recognized,
            summary,
            annotated_image,
            photo_size,
            processing_status: ProcessingStatus::Success,
            message,
            processed_at: record.processed_at,
        }
    }
}
