use rusqlite::Connection;

use super::Migration;
use crate::error::Result;

pub struct V2CoverPath;

impl Migration for V2CoverPath {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Add coverPath column to catalogs created before covers were supported"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        let has_cover_path: bool = conn
            .prepare("SELECT 1 FROM pragma_table_info('books') WHERE name='coverPath'")?
            .exists([])?;

        if !has_cover_path {
            conn.execute_batch("ALTER TABLE books ADD COLUMN coverPath TEXT;")?;
        }
        Ok(())
    }
}
