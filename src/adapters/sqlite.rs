use crate::domain::model::{cell_text, Frame, IfEmpty};
use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    #[default]
    Replace,
    Append,
    Skip,
    Fail,
}

impl FromStr for IfExists {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(IfExists::Replace),
            "append" => Ok(IfExists::Append),
            "skip" => Ok(IfExists::Skip),
            "fail" => Ok(IfExists::Fail),
            other => Err(EtlError::validation(format!(
                "if_exists must be one of replace, append, skip, fail; got '{}'",
                other
            ))),
        }
    }
}

/// Loads frames into SQLite tables. Every column is stored as TEXT.
#[derive(Clone)]
pub struct SqliteLoader {
    pool: SqlitePool,
}

impl SqliteLoader {
    /// `sqlite::memory:` or a database file path (created if missing).
    pub async fn connect(database: &str) -> Result<Self> {
        let options = if database.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(database)?
        } else {
            SqliteConnectOptions::new().filename(database)
        };
        let options = options.create_if_missing(true);

        // One connection keeps an in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("n")?;
        Ok(count > 0)
    }

    /// Writes `frame` to `table`. Returns the number of rows inserted.
    pub async fn load_frame(
        &self,
        table: &str,
        frame: &Frame,
        if_exists: IfExists,
        if_empty: IfEmpty,
    ) -> Result<u64> {
        if table.trim().is_empty() {
            return Err(EtlError::validation("Table name cannot be empty"));
        }
        if frame.is_empty() {
            if_empty.handle(&format!("SQLite load into '{}'", table))?;
            return Ok(0);
        }
        if frame.columns.is_empty() {
            return Err(EtlError::validation("Cannot create a table without columns"));
        }

        let exists = self.table_exists(table).await?;
        match (exists, if_exists) {
            (true, IfExists::Skip) => {
                tracing::info!("⏭️ Table '{}' already exists, skipping load", table);
                return Ok(0);
            }
            (true, IfExists::Fail) => {
                return Err(EtlError::AlreadyExists {
                    resource: format!("table {}", table),
                })
            }
            _ => {}
        }

        let mut tx = self.pool.begin().await?;
        if exists && if_exists == IfExists::Replace {
            sqlx::query(&format!("DROP TABLE {}", quote_ident(table)))
                .execute(&mut *tx)
                .await?;
        }

        let column_defs: Vec<String> = frame
            .columns
            .iter()
            .map(|c| format!("{} TEXT", quote_ident(c)))
            .collect();
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            column_defs.join(", ")
        ))
        .execute(&mut *tx)
        .await?;

        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            frame
                .columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            vec!["?"; frame.columns.len()].join(", ")
        );

        let mut inserted = 0;
        for row in &frame.rows {
            let mut query = sqlx::query(&insert);
            for column in &frame.columns {
                query = match row.data.get(column) {
                    None | Some(Value::Null) => query.bind(None::<String>),
                    value => query.bind(Some(cell_text(value))),
                };
            }
            inserted += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        tracing::info!("💾 Loaded {} rows into SQLite table '{}'", inserted, table);
        Ok(inserted)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame() -> Frame {
        Frame::from_json_rows(vec![
            json!({"id": 1, "name": "alpha", "score": null}),
            json!({"id": 2, "name": "beta \"quoted\"", "score": 2.5}),
        ])
    }

    async fn count(loader: &SqliteLoader, table: &str) -> i64 {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", quote_ident(table)))
            .fetch_one(loader.pool())
            .await
            .unwrap();
        row.try_get("n").unwrap()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_load_creates_table() {
        let loader = SqliteLoader::connect("sqlite::memory:").await.unwrap();

        let inserted = loader
            .load_frame("jobs", &frame(), IfExists::Replace, IfEmpty::Warn)
            .await
            .unwrap();

        assert_eq!(inserted, 2);
        assert!(loader.table_exists("jobs").await.unwrap());

        let row = sqlx::query("SELECT name, score FROM jobs WHERE id = '1'")
            .fetch_one(loader.pool())
            .await
            .unwrap();
        let name: String = row.try_get("name").unwrap();
        let score: Option<String> = row.try_get("score").unwrap();
        assert_eq!(name, "alpha");
        assert!(score.is_none());
    }

    #[tokio::test]
    async fn test_if_exists_modes() {
        let loader = SqliteLoader::connect("sqlite::memory:").await.unwrap();
        loader
            .load_frame("t", &frame(), IfExists::Replace, IfEmpty::Warn)
            .await
            .unwrap();

        loader
            .load_frame("t", &frame(), IfExists::Append, IfEmpty::Warn)
            .await
            .unwrap();
        assert_eq!(count(&loader, "t").await, 4);

        loader
            .load_frame("t", &frame(), IfExists::Replace, IfEmpty::Warn)
            .await
            .unwrap();
        assert_eq!(count(&loader, "t").await, 2);

        let skipped = loader
            .load_frame("t", &frame(), IfExists::Skip, IfEmpty::Warn)
            .await
            .unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(count(&loader, "t").await, 2);

        let err = loader
            .load_frame("t", &frame(), IfExists::Fail, IfEmpty::Warn)
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_empty_frame_creates_no_table() {
        let loader = SqliteLoader::connect("sqlite::memory:").await.unwrap();

        let inserted = loader
            .load_frame("empty", &Frame::new(), IfExists::Replace, IfEmpty::Skip)
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert!(!loader.table_exists("empty").await.unwrap());

        let err = loader
            .load_frame("empty", &Frame::new(), IfExists::Replace, IfEmpty::Fail)
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::EmptyData { .. }));
    }

    #[test]
    fn test_if_exists_parsing() {
        assert_eq!("append".parse::<IfExists>().unwrap(), IfExists::Append);
        assert!("merge".parse::<IfExists>().is_err());
    }
}
