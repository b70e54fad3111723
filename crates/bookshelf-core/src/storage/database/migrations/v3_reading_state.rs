use rusqlite::Connection;

use super::Migration;
use crate::error::Result;
use crate::models::ReadingState;
use crate::storage::database::schema;

pub struct V3ReadingState;

impl Migration for V3ReadingState {
    fn version(&self) -> u32 {
        3
    }

    fn description(&self) -> &'static str {
        "Backfill empty reading states and index the filter columns"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE books SET readingState = ?1
             WHERE readingState IS NULL OR TRIM(readingState) = ''",
            rusqlite::params![ReadingState::Unread],
        )?;
        conn.execute("UPDATE books SET rating = 0 WHERE rating IS NULL", [])?;
        schema::create_indexes(conn)?;
        Ok(())
    }
}
