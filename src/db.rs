use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::analysis::AnalysisReport;
use crate::model::{
    AnalysisSummary, CreatedAt, DashboardStats, Keyframe, Verdict, VideoListItem, VideoRecord,
    VideoStatus,
};

/// A freshly uploaded video, before any analysis has run.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub id: String,
    pub farm_id: String,
    pub filename: String,
    pub original_filename: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// A stored video together with the on-disk location of its upload.
#[derive(Debug, Clone)]
pub struct StoredVideo {
    pub record: VideoRecord,
    pub path: PathBuf,
}

pub struct VideoDb {
    conn: Mutex<Connection>,
}

const VIDEO_COLUMNS: &str = "id, farm_id, filename, original_filename, path, status, final, \
     duration, keyframes, summary, analysis_error, created_at";

impl VideoDb {
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("video database lock poisoned"))
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS videos (
                id TEXT PRIMARY KEY,
                farm_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                original_filename TEXT NOT NULL,
                path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'uploaded',
                final TEXT,
                duration REAL,
                keyframes TEXT,
                summary TEXT,
                analysis_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_videos_created ON videos(created_at);
            CREATE INDEX IF NOT EXISTS idx_videos_status ON videos(status);
            CREATE INDEX IF NOT EXISTS idx_videos_final ON videos(final);
        ",
        )?;
        Ok(())
    }

    /// Put videos whose analysis was cut short by a restart back in the queue state.
    pub fn reset_interrupted(&self) -> anyhow::Result<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE videos SET status = 'uploaded', updated_at = ?1 WHERE status = 'processing'",
            params![timestamp(Utc::now())],
        )?;
        Ok(changed)
    }

    pub fn insert_video(&self, video: &NewVideo) -> anyhow::Result<()> {
        let conn = self.conn()?;
        let created = timestamp(video.created_at);
        conn.execute(
            "INSERT INTO videos (id, farm_id, filename, original_filename, path, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'uploaded', ?6, ?6)",
            params![
                video.id,
                video.farm_id,
                video.filename,
                video.original_filename,
                video.path.to_string_lossy(),
                created,
            ],
        )?;
        Ok(())
    }

    pub fn get_video(&self, id: &str) -> anyhow::Result<Option<StoredVideo>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS);
        let video = conn.query_row(&sql, params![id], stored_from_row).optional()?;
        Ok(video)
    }

    /// Newest first.
    pub fn list_videos(&self, limit: usize) -> anyhow::Result<Vec<VideoListItem>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM videos ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            VIDEO_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], stored_from_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(VideoListItem::from(&row?.record));
        }
        Ok(items)
    }

    /// Oldest first, so re-queued work keeps upload order.
    pub fn ids_with_status(&self, status: &VideoStatus) -> anyhow::Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM videos WHERE status = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![status.as_str()], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    pub fn dashboard_stats(&self) -> anyhow::Result<DashboardStats> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN final = 'normal' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN final = 'abnormal' THEN 1 ELSE 0 END), 0)
             FROM videos",
            [],
            |row| {
                Ok(DashboardStats {
                    total: row.get::<_, i64>(0)?.max(0) as u64,
                    done: row.get::<_, i64>(1)?.max(0) as u64,
                    normal: row.get::<_, i64>(2)?.max(0) as u64,
                    abnormal: row.get::<_, i64>(3)?.max(0) as u64,
                })
            },
        )?;
        Ok(stats)
    }

    pub fn mark_processing(&self, id: &str) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE videos SET status = 'processing', analysis_error = NULL, updated_at = ?2 WHERE id = ?1",
            params![id, timestamp(Utc::now())],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_done(&self, id: &str, report: &AnalysisReport) -> anyhow::Result<bool> {
        let keyframes = serde_json::to_string(&report.keyframes)?;
        let summary = serde_json::to_string(&report.summary)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE videos
             SET status = 'done', final = ?2, duration = COALESCE(?3, duration),
                 keyframes = ?4, summary = ?5, analysis_error = NULL, updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                report.final_verdict().as_str(),
                report.duration,
                keyframes,
                summary,
                timestamp(Utc::now()),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_error(&self, id: &str, message: &str) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE videos SET status = 'error', analysis_error = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, message, timestamp(Utc::now())],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_video(&self, id: &str) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM videos WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

/// Fixed-width UTC timestamps so that text ordering is chronological.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn stored_from_row(row: &Row<'_>) -> rusqlite::Result<StoredVideo> {
    let verdict = match row.get::<_, Option<String>>(6)?.as_deref() {
        Some("normal") => Some(Verdict::Normal),
        Some("abnormal") => Some(Verdict::Abnormal),
        _ => None,
    };
    let keyframes: Vec<Keyframe> = row
        .get::<_, Option<String>>(8)?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    let summary: Option<AnalysisSummary> = row
        .get::<_, Option<String>>(9)?
        .and_then(|s| serde_json::from_str(&s).ok());
    let path: String = row.get(4)?;

    Ok(StoredVideo {
        record: VideoRecord {
            video_id: Some(row.get(0)?),
            farm_id: Some(row.get(1)?),
            filename: Some(row.get(2)?),
            original_filename: Some(row.get(3)?),
            status: Some(VideoStatus::from(row.get::<_, String>(5)?)),
            verdict,
            duration: row.get(7)?,
            keyframes,
            summary,
            analysis_error: row.get(10)?,
            created_at: Some(CreatedAt::Iso(row.get(11)?)),
        },
        path: PathBuf::from(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyframeStatus;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, VideoDb) {
        let dir = TempDir::new().unwrap();
        let db = VideoDb::open(&dir.path().join("videos.db")).unwrap();
        (dir, db)
    }

    fn new_video(id: &str, offset_secs: i64) -> NewVideo {
        NewVideo {
            id: id.to_string(),
            farm_id: "farm-7".to_string(),
            filename: format!("{}.mp4", id),
            original_filename: "cage.mp4".to_string(),
            path: PathBuf::from(format!("/tmp/uploads/{}.mp4", id)),
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    fn abnormal_report() -> AnalysisReport {
        AnalysisReport {
            keyframes: vec![Keyframe {
                time: Some(3.0),
                status: Some(KeyframeStatus::Abnormal),
                frame_image_url: Some("/static/keyframes/a_kf1_t3.jpg".to_string()),
                detections: vec![],
            }],
            summary: AnalysisSummary {
                total_count: 4,
                normal_count: 3,
                abnormal_count: 1,
            },
            verdict: None,
            duration: Some(12.5),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let (_dir, db) = open_temp();
        db.insert_video(&new_video("a", 0)).unwrap();

        let stored = db.get_video("a").unwrap().expect("video should exist");
        assert_eq!(stored.record.video_id.as_deref(), Some("a"));
        assert_eq!(stored.record.status, Some(VideoStatus::Uploaded));
        assert_eq!(stored.record.original_filename.as_deref(), Some("cage.mp4"));
        assert!(stored.record.verdict.is_none());
        assert!(stored.record.keyframes.is_empty());
        assert!(stored.record.created_at.unwrap().parse().is_some());
        assert_eq!(stored.path, PathBuf::from("/tmp/uploads/a.mp4"));
    }

    #[test]
    fn test_get_missing() {
        let (_dir, db) = open_temp();
        assert!(db.get_video("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_is_newest_first_and_limited() {
        let (_dir, db) = open_temp();
        db.insert_video(&new_video("old", -30)).unwrap();
        db.insert_video(&new_video("mid", -20)).unwrap();
        db.insert_video(&new_video("new", -10)).unwrap();

        let items = db.list_videos(2).unwrap();
        let ids: Vec<_> = items.iter().filter_map(|i| i.video_id.clone()).collect();
        assert_eq!(ids, vec!["new".to_string(), "mid".to_string()]);
    }

    #[test]
    fn test_lifecycle_and_stats() {
        let (_dir, db) = open_temp();
        db.insert_video(&new_video("a", 0)).unwrap();
        db.insert_video(&new_video("b", 1)).unwrap();
        db.insert_video(&new_video("c", 2)).unwrap();

        assert!(db.mark_processing("a").unwrap());
        assert!(db.mark_done("a", &abnormal_report()).unwrap());
        assert!(db.mark_error("b", "cannot open video").unwrap());

        let a = db.get_video("a").unwrap().unwrap().record;
        assert_eq!(a.status, Some(VideoStatus::Done));
        assert_eq!(a.verdict, Some(Verdict::Abnormal));
        assert_eq!(a.duration, Some(12.5));
        assert_eq!(a.keyframes.len(), 1);
        assert_eq!(a.summary.unwrap().abnormal_count, 1);

        let b = db.get_video("b").unwrap().unwrap().record;
        assert_eq!(b.status, Some(VideoStatus::Error));
        assert_eq!(b.analysis_error.as_deref(), Some("cannot open video"));

        let stats = db.dashboard_stats().unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                total: 3,
                done: 1,
                normal: 0,
                abnormal: 1,
            }
        );
    }

    #[test]
    fn test_empty_stats() {
        let (_dir, db) = open_temp();
        assert_eq!(db.dashboard_stats().unwrap(), DashboardStats::default());
    }

    #[test]
    fn test_reset_interrupted() {
        let (_dir, db) = open_temp();
        db.insert_video(&new_video("a", 0)).unwrap();
        db.insert_video(&new_video("b", 1)).unwrap();
        db.mark_processing("b").unwrap();

        assert_eq!(db.reset_interrupted().unwrap(), 1);
        let queued = db.ids_with_status(&VideoStatus::Uploaded).unwrap();
        assert_eq!(queued, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_delete() {
        let (_dir, db) = open_temp();
        db.insert_video(&new_video("a", 0)).unwrap();
        assert!(db.delete_video("a").unwrap());
        assert!(!db.delete_video("a").unwrap());
        assert!(db.get_video("a").unwrap().is_none());
    }
}
