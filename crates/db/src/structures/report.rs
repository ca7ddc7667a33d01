//! Report entity.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ObjectKind, User};

/// Report status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    /// Awaiting triage.
    #[default]
    Open,
    /// Someone is on it.
    Assigned,
    /// Resolved.
    Closed,
}

/// A note in a report's thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportNote {
    /// When the note was written.
    pub timestamp: bson::DateTime,
    /// Author.
    pub author_id: ObjectId,
    /// Text.
    pub content: String,
    /// Only visible to moderators.
    #[serde(default)]
    pub internal: bool,
    /// Seen by the reporter.
    #[serde(default)]
    pub read: bool,
    /// Note this one answers.
    #[serde(default)]
    pub reply: String,
}

/// A user's complaint about an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Report {
    /// Report ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Human-facing case number.
    #[serde(default)]
    pub case_id: String,
    /// Kind of the reported object.
    pub target_kind: ObjectKind,
    /// Reported object.
    pub target_id: ObjectId,
    /// Reporter.
    pub actor_id: ObjectId,
    /// Subject.
    #[validate(length(min = 4, max = 100))]
    pub subject: String,
    /// Body.
    #[validate(length(min = 4, max = 2000))]
    pub body: String,
    /// Triage priority.
    #[serde(default)]
    pub priority: i32,
    /// Status.
    #[serde(default)]
    pub status: ReportStatus,
    /// Filing time.
    pub created_at: bson::DateTime,
    /// Close time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<bson::DateTime>,
    /// Last change.
    pub last_updated_at: bson::DateTime,
    /// Assigned moderators.
    #[serde(default)]
    pub assignee_ids: Vec<ObjectId>,
    /// Thread.
    #[serde(default)]
    pub notes: Vec<ReportNote>,

    /// Reporter (relational).
    #[serde(default, skip_serializing)]
    pub reporter: Option<Box<User>>,
    /// Assignees (relational).
    #[serde(default, skip_serializing)]
    pub assignees: Vec<User>,
}

impl Report {
    /// An open report.
    pub fn new(
        id: ObjectId,
        actor_id: ObjectId,
        target_kind: ObjectKind,
        target_id: ObjectId,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = bson::DateTime::now();
        Self {
            id,
            case_id: id.to_hex()[18..].to_uppercase(),
            target_kind,
            target_id,
            actor_id,
            subject: subject.into(),
            body: body.into(),
            priority: 0,
            status: ReportStatus::Open,
            created_at: now,
            closed_at: None,
            last_updated_at: now,
            assignee_ids: Vec::new(),
            notes: Vec::new(),
            reporter: None,
            assignees: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_open() {
        let report = Report::new(
            ObjectId::new(),
            ObjectId::new(),
            ObjectKind::Emote,
            ObjectId::new(),
            "Offensive",
            "This emote is offensive",
        );
        assert_eq!(report.status, ReportStatus::Open);
        assert_eq!(report.case_id.len(), 6);
        assert!(report.validate().is_ok());
    }
}
