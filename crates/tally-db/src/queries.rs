use std::collections::HashSet;

use anyhow::Result;
use rusqlite::Connection;

use crate::Database;
use crate::models::{GroupMessageRow, PersonalMessageRow};

impl Database {
    // -- Personal messages --

    /// Insert a direct message and return the stored row, server-assigned
    /// id and timestamp included.
    pub fn insert_personal_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        body: &str,
    ) -> Result<PersonalMessageRow> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO personal_messages (sender_id, receiver_id, body) VALUES (?1, ?2, ?3)",
                (sender_id, receiver_id, body),
            )?;
            query_personal_message(tx, tx.last_insert_rowid())
        })
    }

    /// Full conversation between two users, both directions, oldest first.
    pub fn personal_history(&self, user_id: i64, other_user_id: i64) -> Result<Vec<PersonalMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, body, is_seen, created_at
                 FROM personal_messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;

            let rows = stmt
                .query_map((user_id, other_user_id), personal_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Flip every unseen message from `sender_id` to `receiver_id` to seen.
    /// Directional and idempotent; returns the number of rows changed.
    pub fn mark_personal_seen(&self, sender_id: i64, receiver_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE personal_messages SET is_seen = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_seen = 0",
                (sender_id, receiver_id),
            )?;
            Ok(changed)
        })
    }

    /// Unseen direct messages for a user, grouped by counterpart sender.
    pub fn count_unseen_personal(&self, user_id: i64) -> Result<Vec<(i64, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, COUNT(*) FROM personal_messages
                 WHERE receiver_id = ?1 AND is_seen = 0
                 GROUP BY sender_id",
            )?;

            let rows = stmt
                .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Group messages --

    /// Insert a group message and flag every other member's seen marker in
    /// the same transaction, so the stored message and the unseen state
    /// never diverge.
    pub fn insert_group_message(
        &self,
        group_id: i64,
        sender_id: i64,
        body: &str,
    ) -> Result<GroupMessageRow> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO group_messages (group_id, sender_id, body) VALUES (?1, ?2, ?3)",
                (group_id, sender_id, body),
            )?;
            let id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE group_seen_markers SET is_seen = 0
                 WHERE group_id = ?1 AND user_id != ?2 AND is_seen = 1",
                (group_id, sender_id),
            )?;

            query_group_message(tx, id)
        })
    }

    /// Ordered history for one group, oldest first.
    pub fn group_history(&self, group_id: i64) -> Result<Vec<GroupMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, group_id, sender_id, body, created_at
                 FROM group_messages
                 WHERE group_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;

            let rows = stmt
                .query_map([group_id], group_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Clear the unseen flag for one member of one group. Idempotent.
    pub fn mark_group_seen(&self, user_id: i64, group_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE group_seen_markers SET is_seen = 1
                 WHERE user_id = ?1 AND group_id = ?2 AND is_seen = 0",
                (user_id, group_id),
            )?;
            Ok(changed)
        })
    }

    /// Groups with unseen activity for a user: (group_id, flagged markers).
    pub fn count_unseen_groups(&self, user_id: i64) -> Result<Vec<(i64, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT group_id, COUNT(*) FROM group_seen_markers
                 WHERE user_id = ?1 AND is_seen = 0
                 GROUP BY group_id",
            )?;

            let rows = stmt
                .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Flagged markers for one (user, group) pair. A user with no marker
    /// row (non-member) counts as fully seen.
    pub fn count_unseen_in_group(&self, user_id: i64, group_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM group_seen_markers
                 WHERE user_id = ?1 AND group_id = ?2 AND is_seen = 0",
                (user_id, group_id),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Group lifecycle --

    /// Create a group with its membership and seen markers as one atomic
    /// unit. The creator is always a member (role `admin`) and duplicate
    /// member ids collapse. Returns the new group id.
    pub fn create_group(&self, name: &str, created_by: i64, member_ids: &[i64]) -> Result<i64> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO groups (name, created_by) VALUES (?1, ?2)",
                (name, created_by),
            )?;
            let group_id = tx.last_insert_rowid();

            let mut seen = HashSet::new();
            for &user_id in std::iter::once(&created_by).chain(member_ids) {
                if !seen.insert(user_id) {
                    continue;
                }
                let role = if user_id == created_by { "admin" } else { "member" };
                tx.execute(
                    "INSERT OR IGNORE INTO group_members (group_id, user_id, role) VALUES (?1, ?2, ?3)",
                    (group_id, user_id, role),
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO group_seen_markers (group_id, user_id, is_seen) VALUES (?1, ?2, 1)",
                    (group_id, user_id),
                )?;
            }

            Ok(group_id)
        })
    }

    /// Delete a group and everything hanging off it: task references are
    /// nulled, markers, memberships and messages removed, then the group
    /// row itself, all in one transaction. Returns false when the group
    /// does not exist (nothing is touched in that case either; the updates
    /// simply match no rows).
    pub fn delete_group(&self, group_id: i64) -> Result<bool> {
        self.with_tx(|tx| {
            tx.execute("UPDATE tasks SET group_id = NULL WHERE group_id = ?1", [group_id])?;
            tx.execute("DELETE FROM group_seen_markers WHERE group_id = ?1", [group_id])?;
            tx.execute("DELETE FROM group_members WHERE group_id = ?1", [group_id])?;
            tx.execute("DELETE FROM group_messages WHERE group_id = ?1", [group_id])?;
            let deleted = tx.execute("DELETE FROM groups WHERE id = ?1", [group_id])?;
            Ok(deleted > 0)
        })
    }

    pub fn group_exists(&self, group_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?1)",
                [group_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn group_member_ids(&self, group_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY user_id",
            )?;

            let rows = stmt
                .query_map([group_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_personal_message(conn: &Connection, id: i64) -> Result<PersonalMessageRow> {
    let row = conn.query_row(
        "SELECT id, sender_id, receiver_id, body, is_seen, created_at
         FROM personal_messages WHERE id = ?1",
        [id],
        personal_row,
    )?;
    Ok(row)
}

fn query_group_message(conn: &Connection, id: i64) -> Result<GroupMessageRow> {
    let row = conn.query_row(
        "SELECT id, group_id, sender_id, body, created_at
         FROM group_messages WHERE id = ?1",
        [id],
        group_row,
    )?;
    Ok(row)
}

fn personal_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersonalMessageRow> {
    Ok(PersonalMessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        body: row.get(3)?,
        is_seen: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

fn group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupMessageRow> {
    Ok(GroupMessageRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn test_db() -> Database {
        Database::open(Path::new(":memory:")).unwrap()
    }

    #[test]
    fn personal_send_visible_in_both_directions() {
        let db = test_db();
        let msg = db.insert_personal_message(1, 2, "hi").unwrap();
        assert!(msg.id > 0);
        assert!(!msg.is_seen);

        let forward = db.personal_history(1, 2).unwrap();
        let backward = db.personal_history(2, 1).unwrap();
        assert_eq!(forward.len(), 1);
        assert_eq!(backward.len(), 1);
        assert_eq!(forward[0].body, "hi");
        assert_eq!(backward[0].body, "hi");
        assert!(!forward[0].is_seen);
    }

    #[test]
    fn personal_history_preserves_send_order() {
        let db = test_db();
        for body in ["one", "two", "three"] {
            db.insert_personal_message(1, 2, body).unwrap();
        }
        let bodies: Vec<_> = db
            .personal_history(2, 1)
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, ["one", "two", "three"]);
    }

    #[test]
    fn personal_history_empty_for_unknown_pair() {
        let db = test_db();
        assert!(db.personal_history(98, 99).unwrap().is_empty());
    }

    #[test]
    fn unseen_counts_follow_sends_and_marks() {
        let db = test_db();
        for _ in 0..3 {
            db.insert_personal_message(1, 2, "ping").unwrap();
        }
        assert_eq!(db.count_unseen_personal(2).unwrap(), vec![(1, 3)]);

        assert_eq!(db.mark_personal_seen(1, 2).unwrap(), 3);
        assert!(db.count_unseen_personal(2).unwrap().is_empty());

        // Second mark changes nothing and still succeeds
        assert_eq!(db.mark_personal_seen(1, 2).unwrap(), 0);
        assert!(db.count_unseen_personal(2).unwrap().is_empty());
    }

    #[test]
    fn mark_personal_seen_is_directional() {
        let db = test_db();
        db.insert_personal_message(1, 2, "a").unwrap();
        db.insert_personal_message(2, 1, "b").unwrap();

        db.mark_personal_seen(1, 2).unwrap();

        assert!(db.count_unseen_personal(2).unwrap().is_empty());
        assert_eq!(db.count_unseen_personal(1).unwrap(), vec![(2, 1)]);
    }

    #[test]
    fn create_group_deduplicates_members_and_includes_creator() {
        let db = test_db();
        let gid = db.create_group("ops", 1, &[2, 2, 3]).unwrap();
        assert_eq!(db.group_member_ids(gid).unwrap(), vec![1, 2, 3]);
        assert!(db.group_exists(gid).unwrap());
    }

    #[test]
    fn group_message_flags_other_members_only() {
        let db = test_db();
        let gid = db.create_group("ops", 5, &[6, 7]).unwrap();

        db.insert_group_message(gid, 6, "hello").unwrap();

        assert_eq!(db.count_unseen_in_group(5, gid).unwrap(), 1);
        assert_eq!(db.count_unseen_in_group(6, gid).unwrap(), 0);
        assert_eq!(db.count_unseen_in_group(7, gid).unwrap(), 1);
        assert_eq!(db.count_unseen_groups(7).unwrap(), vec![(gid, 1)]);
    }

    #[test]
    fn group_history_contains_message_exactly_once() {
        let db = test_db();
        let gid = db.create_group("ops", 5, &[6, 7]).unwrap();
        db.insert_group_message(gid, 6, "hello").unwrap();

        let history = db.group_history(gid).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sender_id, 6);
        assert_eq!(history[0].body, "hello");
    }

    #[test]
    fn mark_group_seen_is_idempotent() {
        let db = test_db();
        let gid = db.create_group("ops", 5, &[6]).unwrap();
        db.insert_group_message(gid, 5, "news").unwrap();

        assert_eq!(db.mark_group_seen(6, gid).unwrap(), 1);
        assert_eq!(db.count_unseen_in_group(6, gid).unwrap(), 0);

        assert_eq!(db.mark_group_seen(6, gid).unwrap(), 0);
        assert_eq!(db.count_unseen_in_group(6, gid).unwrap(), 0);
    }

    #[test]
    fn nonmember_counts_as_seen() {
        let db = test_db();
        let gid = db.create_group("ops", 5, &[6]).unwrap();
        db.insert_group_message(gid, 5, "news").unwrap();

        assert_eq!(db.count_unseen_in_group(99, gid).unwrap(), 0);
        assert!(db.count_unseen_groups(99).unwrap().is_empty());
    }

    #[test]
    fn delete_group_cascades_and_clears_task_refs() {
        let db = test_db();
        let gid = db.create_group("ops", 5, &[6, 7]).unwrap();
        db.insert_group_message(gid, 6, "hello").unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (title, group_id) VALUES ('quarterly close', ?1)",
                [gid],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(db.delete_group(gid).unwrap());

        assert!(!db.group_exists(gid).unwrap());
        assert!(db.group_member_ids(gid).unwrap().is_empty());
        assert!(db.group_history(gid).unwrap().is_empty());
        assert_eq!(db.count_unseen_in_group(7, gid).unwrap(), 0);

        let task_ref: Option<i64> = db
            .with_conn(|conn| {
                let group_id = conn.query_row(
                    "SELECT group_id FROM tasks WHERE title = 'quarterly close'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(group_id)
            })
            .unwrap();
        assert_eq!(task_ref, None);

        // Deleting again reports not-found
        assert!(!db.delete_group(gid).unwrap());
    }
}
