//! 结算记录存储模块
//!
//! 使用SQLite记录每次出单结果，供状态盘点回看。

use crate::core::models::Money;
use anyhow::Result;
use chrono::Local;
use rusqlite::{params, Connection};
use std::path::Path;

/// 一次结算的落库记录
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub created_at: String,
    pub person: String,
    pub project: String,
    pub payable: Money,
    pub blocked: bool,
    pub blocking_codes: String,
}

/// 结算记录库
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// 打开或创建数据库
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_tables()?;
        Ok(db)
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                person TEXT NOT NULL,
                project TEXT NOT NULL,
                payable_cents INTEGER NOT NULL,
                blocked INTEGER NOT NULL DEFAULT 0,
                blocking_codes TEXT NOT NULL DEFAULT ''
            );
            "#,
        )?;
        Ok(())
    }

    /// 记录一次结算
    pub fn record(
        &self,
        run_id: &str,
        person: &str,
        project: &str,
        payable: Money,
        blocked: bool,
        blocking_codes: &[String],
    ) -> Result<()> {
        let created_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.conn.execute(
            "INSERT OR REPLACE INTO runs
             (run_id, created_at, person, project, payable_cents, blocked, blocking_codes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                created_at,
                person,
                project,
                payable.cents(),
                blocked as i64,
                blocking_codes.join(",")
            ],
        )?;
        Ok(())
    }

    /// 最近 n 条结算记录（新的在前）
    pub fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, created_at, person, project, payable_cents, blocked, blocking_codes
             FROM runs ORDER BY created_at DESC, run_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(RunRecord {
                run_id: row.get(0)?,
                created_at: row.get(1)?,
                person: row.get(2)?,
                project: row.get(3)?,
                payable: Money::from_cents(row.get(4)?),
                blocked: row.get::<_, i64>(5)? != 0,
                blocking_codes: row.get(6)?,
            })
        })?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_and_recent() {
        let dir = tempdir().unwrap();
        let db = HistoryDb::open(&dir.path().join("runs.sqlite")).unwrap();

        db.record("run-1", "张三", "演示项目", Money::from_yuan(400), false, &[])
            .unwrap();
        db.record(
            "run-2",
            "李四",
            "演示项目",
            Money::ZERO,
            true,
            &["A".to_string(), "B".to_string()],
        )
        .unwrap();

        let records = db.recent(10).unwrap();
        assert_eq!(records.len(), 2);
        let blocked: Vec<&RunRecord> = records.iter().filter(|r| r.blocked).collect();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].blocking_codes, "A,B");
        assert_eq!(blocked[0].person, "李四");
    }

    #[test]
    fn test_recent_limit() {
        let dir = tempdir().unwrap();
        let db = HistoryDb::open(&dir.path().join("runs.sqlite")).unwrap();
        for index in 0..5 {
            db.record(
                &format!("run-{}", index),
                "张三",
                "演示项目",
                Money::from_yuan(100),
                false,
                &[],
            )
            .unwrap();
        }

        let records = db.recent(3).unwrap();
        assert_eq!(records.len(), 3);
    }
}
