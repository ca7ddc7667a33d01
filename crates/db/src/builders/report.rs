use bson::oid::ObjectId;
use bson::doc;

use super::{Buildable, Builder};
use crate::structures::{ObjectKind, Report, ReportNote, ReportStatus};

/// Builder for [`Report`].
pub type ReportBuilder = Builder<Report>;

impl Buildable for Report {
    const KIND: ObjectKind = ObjectKind::Report;

    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Builder<Report> {
    fn touch(&mut self) {
        let (report, update) = self.parts();
        report.last_updated_at = bson::DateTime::now();
        update.set("last_updated_at", report.last_updated_at);
    }

    /// Change the status. Closing records the close time.
    pub fn set_status(&mut self, status: ReportStatus) -> &mut Self {
        let (report, update) = self.parts();
        report.status = status;
        update.set(
            "status",
            match status {
                ReportStatus::Open => "OPEN",
                ReportStatus::Assigned => "ASSIGNED",
                ReportStatus::Closed => "CLOSED",
            },
        );
        if status == ReportStatus::Closed {
            let now = bson::DateTime::now();
            report.closed_at = Some(now);
            update.set("closed_at", now);
        }
        self.touch();
        self
    }

    /// Change the priority.
    pub fn set_priority(&mut self, priority: i32) -> &mut Self {
        let (report, update) = self.parts();
        report.priority = priority;
        update.set("priority", priority);
        self.touch();
        self
    }

    /// Change the subject.
    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        let (report, update) = self.parts();
        report.subject = subject.into();
        update.set("subject", report.subject.clone());
        self.touch();
        self
    }

    /// Assign a moderator.
    pub fn add_assignee(&mut self, user_id: ObjectId) -> &mut Self {
        let (report, update) = self.parts();
        if !report.assignee_ids.contains(&user_id) {
            report.assignee_ids.push(user_id);
        }
        update.add_to_set("assignee_ids", user_id);
        self.touch();
        self
    }

    /// Unassign a moderator.
    pub fn remove_assignee(&mut self, user_id: ObjectId) -> &mut Self {
        let (report, update) = self.parts();
        report.assignee_ids.retain(|id| *id != user_id);
        update.pull("assignee_ids", user_id);
        self.touch();
        self
    }

    /// Append a note.
    pub fn add_note(&mut self, note: ReportNote) -> &mut Self {
        let (report, update) = self.parts();
        update.push(
            "notes",
            doc! {
                "timestamp": note.timestamp,
                "author_id": note.author_id,
                "content": note.content.clone(),
                "internal": note.internal,
                "read": note.read,
                "reply": note.reply.clone(),
            },
        );
        report.notes.push(note);
        self.touch();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::UpdateOp;

    #[test]
    fn test_closing_sets_closed_at() {
        let report = Report::new(
            ObjectId::new(),
            ObjectId::new(),
            ObjectKind::Emote,
            ObjectId::new(),
            "Offensive",
            "Please remove",
        );
        let mut b = ReportBuilder::new(report);
        b.set_status(ReportStatus::Closed);

        assert!(b.snapshot().closed_at.is_some());
        assert!(b.update().has(UpdateOp::Set, "closed_at"));
        assert!(b.update().has(UpdateOp::Set, "last_updated_at"));
        assert_eq!(
            b.update().get(UpdateOp::Set, "status"),
            Some(&bson::Bson::String("CLOSED".to_string()))
        );
    }

    #[test]
    fn test_assignees() {
        let mod_id = ObjectId::new();
        let report = Report::new(
            ObjectId::new(),
            ObjectId::new(),
            ObjectKind::User,
            ObjectId::new(),
            "Harassment",
            "Repeated harassment",
        );
        let mut b = ReportBuilder::new(report);
        b.add_assignee(mod_id).add_assignee(mod_id);
        assert_eq!(b.snapshot().assignee_ids, vec![mod_id]);
        b.remove_assignee(mod_id);
        assert!(b.snapshot().assignee_ids.is_empty());
    }
}
