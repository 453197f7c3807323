use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use vigil_types::models::{Card, Column, CommentNode};

use crate::Database;
use crate::models::{CardChanges, CommentAggregates, NewCard, NewComment};
use crate::store::EntityStore;

const CARD_COLUMNS: &str = "id, group_id, author_id, title, body, category, status, position, \
     comment_count, last_comment_at, is_comments_closed, created_at, updated_at";

const COMMENT_COLUMNS: &str = "id, card_id, author_id, parent_comment_id, thread_root_id, depth, \
     body, created_at, updated_at, deleted_at";

impl EntityStore for Database {
    // -- Cards --

    fn find_partition(&self, group_id: i64, column: Column) -> Result<Vec<Card>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CARD_COLUMNS} FROM cards
                 WHERE group_id = ?1 AND status = ?2
                 ORDER BY position ASC, id ASC"
            ))?;
            let rows = stmt
                .query_map(params![group_id, column.as_str()], card_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn min_position(&self, group_id: i64, column: Column) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let min = conn.query_row(
                "SELECT MIN(position) FROM cards WHERE group_id = ?1 AND status = ?2",
                params![group_id, column.as_str()],
                |row| row.get::<_, Option<i64>>(0),
            )?;
            Ok(min)
        })
    }

    fn write_position(&self, card_id: i64, position: i64) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE cards SET position = ?2 WHERE id = ?1",
                params![card_id, position],
            )?;
            if changed == 0 {
                return Err(anyhow!("Card not found: {}", card_id));
            }
            Ok(())
        })
    }

    fn get_card(&self, id: i64) -> Result<Option<Card>> {
        self.with_conn(|conn| query_card(conn, id))
    }

    fn create_card(&self, new: &NewCard) -> Result<Card> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO cards (group_id, author_id, title, body, category, status, position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    new.group_id,
                    new.author_id,
                    new.title,
                    new.body,
                    new.category,
                    new.column.as_str(),
                    new.position,
                    now,
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_card(conn, id)?.ok_or_else(|| anyhow!("Card vanished after insert: {}", id))
        })
    }

    fn update_card(&self, id: i64, changes: &CardChanges) -> Result<Card> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE cards SET
                    title = COALESCE(?2, title),
                    body = COALESCE(?3, body),
                    category = COALESCE(?4, category),
                    status = COALESCE(?5, status),
                    position = COALESCE(?6, position),
                    updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    changes.title,
                    changes.body,
                    changes.category,
                    changes.column.map(|c| c.as_str()),
                    changes.position,
                    Utc::now(),
                ],
            )?;
            if changed == 0 {
                return Err(anyhow!("Card not found: {}", id));
            }
            query_card(conn, id)?.ok_or_else(|| anyhow!("Card not found: {}", id))
        })
    }

    fn delete_card(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM cards WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Participants --

    fn is_participant(&self, card_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM card_participants WHERE card_id = ?1 AND user_id = ?2",
                    params![card_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn add_participant(&self, card_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO card_participants (card_id, user_id) VALUES (?1, ?2)",
                params![card_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Comments --

    fn get_comment(&self, id: i64) -> Result<Option<CommentNode>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    fn list_comments(&self, card_id: i64) -> Result<Vec<CommentNode>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMENT_COLUMNS} FROM comments
                 WHERE card_id = ?1 AND deleted_at IS NULL
                 ORDER BY thread_root_id ASC, depth ASC, created_at ASC, id ASC"
            ))?;
            let rows = stmt
                .query_map([card_id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn create_comment_node(&self, new: &NewComment) -> Result<CommentNode> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO comments (card_id, author_id, parent_comment_id, thread_root_id, depth, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new.card_id,
                    new.author_id,
                    new.parent_comment_id,
                    new.thread_root_id,
                    new.depth,
                    new.body,
                    Utc::now(),
                ],
            )?;
            let id = tx.last_insert_rowid();

            // Roots reference themselves once their id is known
            if new.depth == 0 {
                tx.execute("UPDATE comments SET thread_root_id = id WHERE id = ?1", [id])?;
            }
            tx.commit()?;

            query_comment(conn, id)?.ok_or_else(|| anyhow!("Comment vanished after insert: {}", id))
        })
    }

    fn update_comment_body(&self, id: i64, body: &str) -> Result<CommentNode> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE comments SET body = ?2, updated_at = ?3 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, body, Utc::now()],
            )?;
            if changed == 0 {
                return Err(anyhow!("Comment not found: {}", id));
            }
            query_comment(conn, id)?.ok_or_else(|| anyhow!("Comment not found: {}", id))
        })
    }

    fn soft_delete_comment_node(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE comments SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, Utc::now()],
            )?;
            Ok(changed > 0)
        })
    }

    fn count_root_comments(&self, card_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE card_id = ?1 AND depth = 0 AND deleted_at IS NULL",
                [card_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    fn latest_root_comment_at(&self, card_id: i64) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| {
            let latest = conn
                .query_row(
                    "SELECT created_at FROM comments
                     WHERE card_id = ?1 AND depth = 0 AND deleted_at IS NULL
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1",
                    [card_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(latest)
        })
    }

    fn update_card_aggregates(&self, card_id: i64, aggregates: CommentAggregates) -> Result<Card> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE cards SET comment_count = ?2, last_comment_at = ?3 WHERE id = ?1",
                params![card_id, aggregates.comment_count, aggregates.last_comment_at],
            )?;
            if changed == 0 {
                return Err(anyhow!("Card not found: {}", card_id));
            }
            query_card(conn, card_id)?.ok_or_else(|| anyhow!("Card not found: {}", card_id))
        })
    }

    fn set_comments_closed(&self, card_id: i64, closed: bool) -> Result<Card> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE cards SET is_comments_closed = ?2, updated_at = ?3 WHERE id = ?1",
                params![card_id, closed, Utc::now()],
            )?;
            if changed == 0 {
                return Err(anyhow!("Card not found: {}", card_id));
            }
            query_card(conn, card_id)?.ok_or_else(|| anyhow!("Card not found: {}", card_id))
        })
    }
}

fn query_card(conn: &Connection, id: i64) -> Result<Option<Card>> {
    let mut stmt = conn.prepare(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"))?;
    let row = stmt.query_row([id], card_from_row).optional()?;
    Ok(row)
}

fn query_comment(conn: &Connection, id: i64) -> Result<Option<CommentNode>> {
    let mut stmt = conn.prepare(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"))?;
    let row = stmt.query_row([id], comment_from_row).optional()?;
    Ok(row)
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    let status: String = row.get(6)?;
    let column = status
        .parse::<Column>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(Card {
        id: row.get(0)?,
        group_id: row.get(1)?,
        author_id: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        category: row.get(5)?,
        column,
        position: row.get(7)?,
        comment_count: row.get(8)?,
        last_comment_at: row.get(9)?,
        is_comments_closed: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentNode> {
    Ok(CommentNode {
        id: row.get(0)?,
        card_id: row.get(1)?,
        author_id: row.get(2)?,
        parent_comment_id: row.get(3)?,
        thread_root_id: row.get(4)?,
        depth: row.get(5)?,
        body: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        deleted_at: row.get(9)?,
    })
}
