use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db;
use crate::error::{ErpError, ErpResult};
use crate::model::NotificationKind;
use crate::people;

/// A typed event addressed to one student. Delivery is someone else's job;
/// the core only stores it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub student_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_url: Option<String>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

pub fn emit(
    conn: &Connection,
    now: NaiveDateTime,
    student_id: &str,
    kind: NotificationKind,
    title: &str,
    message: &str,
    related_url: Option<&str>,
) -> ErpResult<String> {
    let id = db::new_id();
    conn.execute(
        "INSERT INTO student_notifications(id, student_id, kind, title, message, related_url,
            is_read, created_at)
         VALUES(?, ?, ?, ?, ?, ?, 0, ?)",
        params![id, student_id, kind, title, message, related_url, now],
    )?;
    Ok(id)
}

pub fn list(conn: &Connection, student_id: &str, unread_only: bool) -> ErpResult<Vec<Notification>> {
    people::student(conn, student_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, student_id, kind, title, message, related_url, is_read, created_at
         FROM student_notifications
         WHERE student_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![student_id, unread_only], |r| {
            Ok(Notification {
                id: r.get(0)?,
                student_id: r.get(1)?,
                kind: r.get(2)?,
                title: r.get(3)?,
                message: r.get(4)?,
                related_url: r.get(5)?,
                is_read: r.get(6)?,
                created_at: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_read(conn: &Connection, student_id: &str, ids: &[String]) -> ErpResult<usize> {
    let mut changed = 0;
    for id in ids {
        let n = conn.execute(
            "UPDATE student_notifications SET is_read = 1 WHERE id = ? AND student_id = ?",
            params![id, student_id],
        )?;
        if n == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM student_notifications WHERE id = ?)",
                [id],
                |r| r.get(0),
            )?;
            if !exists {
                return Err(ErpError::not_found("notification", id));
            }
            return Err(ErpError::PermissionDenied(
                "notification belongs to another student".to_string(),
            ));
        }
        changed += n;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, SponsorType};
    use crate::testkit::Campus;

    #[test]
    fn unread_filter_and_ownership() {
        let campus = Campus::new();
        let a = campus.add_student("CS/001/2024", Gender::Male, SponsorType::Government);
        let b = campus.add_student("CS/002/2024", Gender::Female, SponsorType::Government);
        let n1 = emit(&campus.conn, campus.now(), &a, NotificationKind::Promoted, "t", "m", None)
            .expect("emit");
        emit(&campus.conn, campus.now(), &a, NotificationKind::NotPromoted, "t2", "m2", None)
            .expect("emit");

        assert_eq!(mark_read(&campus.conn, &a, &[n1.clone()]).expect("read"), 1);
        let unread = list(&campus.conn, &a, true).expect("list");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].kind, NotificationKind::NotPromoted);
        assert_eq!(list(&campus.conn, &a, false).expect("all").len(), 2);

        let e = mark_read(&campus.conn, &b, &[n1]).expect_err("not theirs");
        assert_eq!(e.kind(), "PermissionDenied");
    }
}
