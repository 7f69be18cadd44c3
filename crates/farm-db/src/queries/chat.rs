use anyhow::Result;
use chrono::{DateTime, Utc};
use farm_types::models::ChatMessage;
use rusqlite::Row;
use uuid::Uuid;

use super::{get_ts, now, ts_to_sql};
use crate::Database;

impl Database {
    // -- Chat log --

    /// Append one message to the log. The id is a UUIDv7, so ids sort in
    /// generation order; the timestamp is taken here, at receipt.
    pub fn create_chat_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        message: &str,
    ) -> Result<ChatMessage> {
        self.insert_chat_message(sender_id, receiver_id, message, now())
    }

    pub(crate) fn insert_chat_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        message: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ChatMessage> {
        let record = ChatMessage {
            id: Uuid::now_v7().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            message: message.to_string(),
            created_at,
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages (id, sender_id, receiver_id, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    record.id,
                    record.sender_id,
                    record.receiver_id,
                    record.message,
                    ts_to_sql(&record.created_at)
                ],
            )?;
            Ok(())
        })?;

        Ok(record)
    }

    /// The conversation between `a` and `b` in either direction, oldest first.
    /// With a `limit`, only the most recent `limit` messages are returned.
    pub fn get_chat_messages(&self, a: &str, b: &str, limit: Option<u32>) -> Result<Vec<ChatMessage>> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map_or(-1, i64::from);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, message, created_at FROM (
                     SELECT id, sender_id, receiver_id, message, created_at, rowid AS seq
                     FROM chat_messages
                     WHERE (sender_id = ?1 AND receiver_id = ?2)
                        OR (sender_id = ?2 AND receiver_id = ?1)
                     ORDER BY created_at DESC, seq DESC
                     LIMIT ?3
                 )
                 ORDER BY created_at ASC, seq ASC",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![a, b, limit], chat_message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn chat_message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        message: row.get(3)?,
        created_at: get_ts(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::queries::test_support::db;

    #[test]
    fn test_message_visible_from_both_sides() {
        let db = db();
        let sent = db.create_chat_message("customer-1", "seller-1", "Hi").unwrap();

        let forward = db.get_chat_messages("customer-1", "seller-1", None).unwrap();
        let backward = db.get_chat_messages("seller-1", "customer-1", None).unwrap();
        assert_eq!(forward, vec![sent.clone()]);
        assert_eq!(backward, vec![sent]);

        // Reading is idempotent
        assert_eq!(db.get_chat_messages("customer-1", "seller-1", None).unwrap().len(), 1);
    }

    #[test]
    fn test_conversation_is_chronological() {
        let db = db();
        let base = super::now();
        // Inserted out of order on purpose
        db.insert_chat_message("b", "a", "third", base + Duration::seconds(2)).unwrap();
        db.insert_chat_message("a", "b", "first", base).unwrap();
        db.insert_chat_message("a", "b", "second", base + Duration::seconds(1)).unwrap();

        for (x, y) in [("a", "b"), ("b", "a")] {
            let texts: Vec<_> = db
                .get_chat_messages(x, y, None)
                .unwrap()
                .into_iter()
                .map(|m| m.message)
                .collect();
            assert_eq!(texts, vec!["first", "second", "third"]);
        }
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let db = db();
        let at = super::now();
        let first = db.insert_chat_message("a", "b", "one", at).unwrap();
        let second = db.insert_chat_message("b", "a", "two", at).unwrap();

        let history = db.get_chat_messages("a", "b", None).unwrap();
        assert_eq!(history, vec![first, second]);
    }

    #[test]
    fn test_other_conversations_are_excluded() {
        let db = db();
        db.create_chat_message("a", "b", "for b").unwrap();
        db.create_chat_message("a", "c", "for c").unwrap();
        db.create_chat_message("c", "b", "c to b").unwrap();

        let history = db.get_chat_messages("b", "a", None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "for b");
    }

    #[test]
    fn test_limit_returns_most_recent_oldest_first() {
        let db = db();
        let base = super::now();
        for i in 0..5 {
            db.insert_chat_message("a", "b", &format!("m{}", i), base + Duration::seconds(i))
                .unwrap();
        }

        let texts: Vec<_> = db
            .get_chat_messages("a", "b", Some(2))
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(texts, vec!["m3", "m4"]);
    }

    #[test]
    fn test_ids_follow_generation_order() {
        let db = db();
        let first = db.create_chat_message("a", "b", "one").unwrap();
        let second = db.create_chat_message("a", "b", "two").unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.id < second.id);
    }
}
