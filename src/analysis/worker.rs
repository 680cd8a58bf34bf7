use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{AnalysisJob, Analyzer};
use crate::config::ANALYSIS_QUEUE_CAPACITY;
use crate::db::VideoDb;
use crate::error::ServerError;
use crate::model::VideoStatus;
use crate::storage::remove_video_files;

/// Handle for submitting videos to the analysis worker.
///
/// A disabled queue (no analyzer configured) accepts submissions and drops
/// them; those videos stay `uploaded` until a server with an analyzer picks
/// them up on startup.
#[derive(Clone)]
pub struct AnalysisQueue {
    tx: Option<mpsc::Sender<String>>,
    depth: Arc<AtomicUsize>,
}

impl AnalysisQueue {
    pub fn disabled() -> Self {
        Self {
            tx: None,
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Number of videos waiting or in flight.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Non-blocking submit. Fails with `QueueFull` when the channel is at
    /// capacity.
    pub fn enqueue(&self, video_id: &str) -> Result<(), ServerError> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        // Counted before the send; the worker decrements after processing.
        self.depth.fetch_add(1, Ordering::Relaxed);
        match tx.try_send(video_id.to_string()) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                match e {
                    mpsc::error::TrySendError::Full(_) => Err(ServerError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => {
                        Err(ServerError::Other("Analysis worker stopped".to_string()))
                    }
                }
            }
        }
    }

    /// Submit, waiting for room in the queue.
    pub async fn enqueue_wait(&self, video_id: &str) -> Result<(), ServerError> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        self.depth.fetch_add(1, Ordering::Relaxed);
        if tx.send(video_id.to_string()).await.is_err() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(ServerError::Other("Analysis worker stopped".to_string()));
        }
        Ok(())
    }

    /// Submit from a request handler without blocking it. When the queue is
    /// full the id is handed to a task that waits for room.
    pub fn submit(&self, video_id: &str) {
        match self.enqueue(video_id) {
            Ok(()) => {}
            Err(ServerError::QueueFull) => {
                debug!("Analysis queue full, deferring {}", video_id);
                let queue = self.clone();
                let video_id = video_id.to_string();
                tokio::spawn(async move {
                    if let Err(e) = queue.enqueue_wait(&video_id).await {
                        error!("Could not queue {} for analysis: {}", video_id, e);
                    }
                });
            }
            Err(e) => error!("Could not queue {} for analysis: {}", video_id, e),
        }
    }
}

/// Spawn the background worker. Videos are analysed one at a time in
/// submission order.
pub fn spawn_worker(
    db: Arc<VideoDb>,
    analyzer: Arc<dyn Analyzer>,
    keyframe_dir: PathBuf,
) -> (AnalysisQueue, tokio::task::JoinHandle<()>) {
    spawn_worker_with_capacity(db, analyzer, keyframe_dir, ANALYSIS_QUEUE_CAPACITY)
}

pub fn spawn_worker_with_capacity(
    db: Arc<VideoDb>,
    analyzer: Arc<dyn Analyzer>,
    keyframe_dir: PathBuf,
    capacity: usize,
) -> (AnalysisQueue, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<String>(capacity);
    let depth = Arc::new(AtomicUsize::new(0));
    let queue = AnalysisQueue {
        tx: Some(tx),
        depth: depth.clone(),
    };

    let handle = tokio::spawn(async move {
        info!("Analysis worker started");
        while let Some(video_id) = rx.recv().await {
            process_video(&db, analyzer.as_ref(), &keyframe_dir, &video_id).await;
            depth.fetch_sub(1, Ordering::Relaxed);
        }
        info!("Analysis worker stopped");
    });

    (queue, handle)
}

/// Drive one video through `processing` to `done` or `error`.
pub async fn process_video(
    db: &VideoDb,
    analyzer: &dyn Analyzer,
    keyframe_dir: &Path,
    video_id: &str,
) {
    let stored = match db.get_video(video_id) {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            info!("Video {} was deleted before analysis, skipping", video_id);
            return;
        }
        Err(e) => {
            error!("Failed to load video {}: {:#}", video_id, e);
            return;
        }
    };

    if stored.record.status != Some(VideoStatus::Uploaded) {
        warn!(
            "Video {} is {}, not queued; skipping",
            video_id,
            stored
                .record
                .status
                .as_ref()
                .map(VideoStatus::as_str)
                .unwrap_or("unknown")
        );
        return;
    }

    if let Err(e) = db.mark_processing(video_id) {
        error!("Failed to mark {} processing: {:#}", video_id, e);
        return;
    }

    if !stored.path.exists() {
        warn!("Video file for {} not found at {:?}", video_id, stored.path);
        record_failure(db, video_id, "video file not found");
        return;
    }

    let job = AnalysisJob {
        video_id: video_id.to_string(),
        video_path: stored.path,
        keyframe_dir: keyframe_dir.to_path_buf(),
    };

    match analyzer.analyze(&job).await {
        Ok(report) => match db.mark_done(video_id, &report) {
            Ok(true) => info!(
                "Video {} analysed: {}",
                video_id,
                report.final_verdict().as_str()
            ),
            Ok(false) => {
                info!(
                    "Video {} was deleted during analysis, discarding its output",
                    video_id
                );
                remove_video_files(&job.video_path, &report.keyframes, keyframe_dir).await;
            }
            Err(e) => error!("Failed to store analysis of {}: {:#}", video_id, e),
        },
        Err(e) => {
            warn!("Analysis of {} failed: {:#}", video_id, e);
            record_failure(db, video_id, &format!("{:#}", e));
        }
    }
}

fn record_failure(db: &VideoDb, video_id: &str, message: &str) {
    if let Err(e) = db.mark_error(video_id, message) {
        error!("Failed to record analysis error for {}: {:#}", video_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisReport;
    use crate::db::NewVideo;
    use crate::model::{AnalysisSummary, Keyframe, KeyframeStatus, Verdict};
    use chrono::Utc;
    use futures::future::BoxFuture;
    use tempfile::TempDir;

    struct FixedAnalyzer(Result<AnalysisReport, String>);

    impl Analyzer for FixedAnalyzer {
        fn analyze<'a>(
            &'a self,
            _job: &'a AnalysisJob,
        ) -> BoxFuture<'a, anyhow::Result<AnalysisReport>> {
            let result = match &self.0 {
                Ok(report) => Ok(report.clone()),
                Err(msg) => Err(anyhow::anyhow!(msg.clone())),
            };
            Box::pin(async move { result })
        }
    }

    fn insert_video(db: &VideoDb, dir: &Path, id: &str, with_file: bool) {
        let path = dir.join(format!("{}.mp4", id));
        if with_file {
            std::fs::write(&path, b"fake video").unwrap();
        }
        db.insert_video(&NewVideo {
            id: id.to_string(),
            farm_id: "3".to_string(),
            filename: format!("{}.mp4", id),
            original_filename: "pen3.mp4".to_string(),
            path,
            created_at: Utc::now(),
        })
        .unwrap();
    }

    fn setup(with_file: bool) -> (TempDir, VideoDb) {
        let dir = TempDir::new().unwrap();
        let db = VideoDb::open(&dir.path().join("videos.db")).unwrap();
        insert_video(&db, dir.path(), "v1", with_file);
        (dir, db)
    }

    /// Blocks every analysis until the test hands out permits.
    struct GatedAnalyzer(Arc<tokio::sync::Semaphore>);

    impl Analyzer for GatedAnalyzer {
        fn analyze<'a>(
            &'a self,
            _job: &'a AnalysisJob,
        ) -> BoxFuture<'a, anyhow::Result<AnalysisReport>> {
            Box::pin(async move {
                let permit = self.0.acquire().await?;
                permit.forget();
                Ok(AnalysisReport::default())
            })
        }
    }

    /// Writes a keyframe image, then loses the row the way a concurrent
    /// DELETE would.
    struct DeletingAnalyzer(Arc<VideoDb>);

    impl Analyzer for DeletingAnalyzer {
        fn analyze<'a>(
            &'a self,
            job: &'a AnalysisJob,
        ) -> BoxFuture<'a, anyhow::Result<AnalysisReport>> {
            Box::pin(async move {
                let name = format!("{}_kf1_t0.jpg", job.video_id);
                std::fs::write(job.keyframe_dir.join(&name), b"jpg")?;
                self.0.delete_video(&job.video_id)?;
                Ok(AnalysisReport {
                    keyframes: vec![Keyframe {
                        time: Some(0.0),
                        status: Some(KeyframeStatus::Normal),
                        frame_image_url: Some(format!("/static/keyframes/{}", name)),
                        detections: vec![],
                    }],
                    ..Default::default()
                })
            })
        }
    }

    #[tokio::test]
    async fn test_successful_analysis_marks_done() {
        let (dir, db) = setup(true);
        let analyzer = FixedAnalyzer(Ok(AnalysisReport {
            summary: AnalysisSummary {
                total_count: 10,
                normal_count: 10,
                abnormal_count: 0,
            },
            ..Default::default()
        }));

        process_video(&db, &analyzer, dir.path(), "v1").await;

        let record = db.get_video("v1").unwrap().unwrap().record;
        assert_eq!(record.status, Some(VideoStatus::Done));
        assert_eq!(record.verdict, Some(Verdict::Normal));
    }

    #[tokio::test]
    async fn test_failed_analysis_marks_error() {
        let (dir, db) = setup(true);
        let analyzer = FixedAnalyzer(Err("cannot open video".to_string()));

        process_video(&db, &analyzer, dir.path(), "v1").await;

        let record = db.get_video("v1").unwrap().unwrap().record;
        assert_eq!(record.status, Some(VideoStatus::Error));
        assert_eq!(record.analysis_error.as_deref(), Some("cannot open video"));
    }

    #[tokio::test]
    async fn test_missing_file_marks_error() {
        let (dir, db) = setup(false);
        let analyzer = FixedAnalyzer(Ok(AnalysisReport::default()));

        process_video(&db, &analyzer, dir.path(), "v1").await;

        let record = db.get_video("v1").unwrap().unwrap().record;
        assert_eq!(record.status, Some(VideoStatus::Error));
        assert_eq!(record.analysis_error.as_deref(), Some("video file not found"));
    }

    #[tokio::test]
    async fn test_already_done_is_skipped() {
        let (dir, db) = setup(true);
        db.mark_done("v1", &AnalysisReport::default()).unwrap();
        let analyzer = FixedAnalyzer(Err("should not run".to_string()));

        process_video(&db, &analyzer, dir.path(), "v1").await;

        let record = db.get_video("v1").unwrap().unwrap().record;
        assert_eq!(record.status, Some(VideoStatus::Done));
    }

    #[tokio::test]
    async fn test_worker_drains_queue() {
        let (dir, db) = setup(true);
        let db = Arc::new(db);
        let analyzer: Arc<dyn Analyzer> =
            Arc::new(FixedAnalyzer(Ok(AnalysisReport::default())));
        let (queue, _handle) = spawn_worker(db.clone(), analyzer, dir.path().to_path_buf());

        queue.enqueue("v1").unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let status = db.get_video("v1").unwrap().unwrap().record.status;
            if status == Some(VideoStatus::Done) && queue.depth() == 0 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "worker never finished");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_delete_during_analysis_removes_keyframes() {
        let (dir, db) = setup(true);
        let db = Arc::new(db);
        let analyzer = DeletingAnalyzer(db.clone());

        process_video(&db, &analyzer, dir.path(), "v1").await;

        assert!(db.get_video("v1").unwrap().is_none());
        assert!(!dir.path().join("v1_kf1_t0.jpg").exists());
        assert!(!dir.path().join("v1.mp4").exists());
    }

    #[tokio::test]
    async fn test_overflowing_queue_analyses_every_video() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(VideoDb::open(&dir.path().join("videos.db")).unwrap());
        let ids: Vec<String> = (1..=5).map(|i| format!("v{}", i)).collect();
        for id in &ids {
            insert_video(&db, dir.path(), id, true);
        }
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let analyzer: Arc<dyn Analyzer> = Arc::new(GatedAnalyzer(gate.clone()));
        let (queue, _handle) =
            spawn_worker_with_capacity(db.clone(), analyzer, dir.path().to_path_buf(), 1);

        for id in &ids {
            queue.submit(id);
        }
        assert!(queue.depth() >= 1);
        gate.add_permits(ids.len());

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let done = ids
                .iter()
                .filter(|id| {
                    db.get_video(id).unwrap().unwrap().record.status == Some(VideoStatus::Done)
                })
                .count();
            if done == ids.len() && queue.depth() == 0 {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "only {} of {} analysed",
                done,
                ids.len()
            );
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_counting() {
        let (dir, db) = setup(true);
        insert_video(&db, dir.path(), "v2", true);
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let analyzer: Arc<dyn Analyzer> = Arc::new(GatedAnalyzer(gate.clone()));
        let (queue, _handle) =
            spawn_worker_with_capacity(Arc::new(db), analyzer, dir.path().to_path_buf(), 1);

        queue.enqueue("v1").unwrap();
        // Let the worker pick up v1 and block in the analyzer.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        queue.enqueue("v2").unwrap();
        assert!(matches!(queue.enqueue("v3"), Err(ServerError::QueueFull)));
        assert_eq!(queue.depth(), 2);
        gate.add_permits(2);
    }

    #[test]
    fn test_disabled_queue_accepts_and_drops() {
        let queue = AnalysisQueue::disabled();
        assert!(!queue.is_enabled());
        assert!(queue.enqueue("v1").is_ok());
        assert_eq!(queue.depth(), 0);
    }
}
