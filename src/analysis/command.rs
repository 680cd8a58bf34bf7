use anyhow::Context;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{AnalysisJob, AnalysisReport, Analyzer};
use crate::config::{KEYFRAMES_DIR, STATIC_PREFIX};

/// Runs an external analysis program once per video.
///
/// The program is invoked as
/// `<program> <args..> --video-id <id> --video <path> --keyframe-dir <dir>`
/// and must print an [`AnalysisReport`] as JSON on stdout. Anything it writes
/// to stderr is logged.
pub struct CommandAnalyzer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAnalyzer {
    pub fn new(program: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    async fn run(&self, job: &AnalysisJob) -> anyhow::Result<AnalysisReport> {
        info!(
            "Starting analysis of {} with {:?}",
            job.video_id, self.program
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--video-id")
            .arg(&job.video_id)
            .arg("--video")
            .arg(&job.video_path)
            .arg("--keyframe-dir")
            .arg(&job.keyframe_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn analyzer {:?}", self.program))?;

        let mut stdout = child.stdout.take().context("analyzer stdout not captured")?;
        let mut stderr = child.stderr.take().context("analyzer stderr not captured")?;

        let run = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (out_res, err_res) =
                tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            out_res?;
            err_res?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };
        let outcome = tokio::time::timeout(self.timeout, run).await;

        let (status, out, err) = match outcome {
            Ok(result) => result.context("failed to collect analyzer output")?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed-out analyzer: {}", e);
                }
                anyhow::bail!("analysis timed out after {}s", self.timeout.as_secs());
            }
        };

        let stderr_text = String::from_utf8_lossy(&err);
        for line in stderr_text.lines().filter(|l| !l.trim().is_empty()) {
            debug!("[analyzer {}] {}", job.video_id, line);
        }

        if !status.success() {
            let last_line = stderr_text
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output");
            anyhow::bail!("analyzer exited with {}: {}", status, last_line.trim());
        }

        let mut report = parse_report(&out)?;
        normalize_image_urls(&mut report, &job.keyframe_dir);
        info!(
            "Analysis of {} finished: {} keyframes, verdict {}",
            job.video_id,
            report.keyframes.len(),
            report.final_verdict().as_str()
        );
        Ok(report)
    }
}

impl Analyzer for CommandAnalyzer {
    fn analyze<'a>(&'a self, job: &'a AnalysisJob) -> BoxFuture<'a, anyhow::Result<AnalysisReport>> {
        Box::pin(self.run(job))
    }
}

/// The report is either the whole of stdout or, when the program also prints
/// progress lines, its last JSON line.
fn parse_report(stdout: &[u8]) -> anyhow::Result<AnalysisReport> {
    if let Ok(report) = serde_json::from_slice::<AnalysisReport>(stdout) {
        return Ok(report);
    }
    let text = String::from_utf8_lossy(stdout);
    let last_json = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .context("analyzer printed no JSON report")?;
    serde_json::from_str(last_json).context("analyzer report is not valid JSON")
}

/// Keyframe images must be addressable under `/static/keyframes/`. Bare file
/// names and paths inside the keyframe directory are rewritten; URLs that are
/// already absolute are left alone.
fn normalize_image_urls(report: &mut AnalysisReport, keyframe_dir: &Path) {
    for keyframe in &mut report.keyframes {
        let Some(url) = keyframe.frame_image_url.take() else {
            continue;
        };
        let url = url.trim().to_string();
        if url.is_empty() {
            continue;
        }
        let normalized = if url.starts_with(STATIC_PREFIX) || url.contains("://") {
            url
        } else {
            let path = Path::new(&url);
            let relative = path.strip_prefix(keyframe_dir).unwrap_or(path);
            if relative.components().count() == 1 {
                format!(
                    "{}/{}/{}",
                    STATIC_PREFIX,
                    KEYFRAMES_DIR,
                    relative.to_string_lossy()
                )
            } else {
                url
            }
        };
        keyframe.frame_image_url = Some(normalized);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Keyframe, Verdict};

    fn keyframe_with(url: &str) -> Keyframe {
        Keyframe {
            time: Some(0.0),
            status: None,
            frame_image_url: Some(url.to_string()),
            detections: vec![],
        }
    }

    #[test]
    fn test_parse_report_whole_stdout() {
        let report = parse_report(br#"{"final": "normal", "keyframes": []}"#).unwrap();
        assert_eq!(report.verdict, Some(Verdict::Normal));
    }

    #[test]
    fn test_parse_report_after_progress_lines() {
        let stdout = b"[AI] device: cpu\n[AI] done\n{\"summary\": {\"total_count\": 2, \"normal_count\": 1, \"abnormal_count\": 1}}\n";
        let report = parse_report(stdout).unwrap();
        assert_eq!(report.final_verdict(), Verdict::Abnormal);
    }

    #[test]
    fn test_parse_report_without_json() {
        assert!(parse_report(b"nothing useful").is_err());
    }

    #[test]
    fn test_normalize_image_urls() {
        let dir = PathBuf::from("/data/keyframes");
        let mut report = AnalysisReport {
            keyframes: vec![
                keyframe_with("v_kf1_t3.jpg"),
                keyframe_with("/data/keyframes/v_kf2_t6.jpg"),
                keyframe_with("/static/keyframes/v_kf3_t9.jpg"),
                keyframe_with("https://cdn.example.com/v_kf4.jpg"),
            ],
            ..Default::default()
        };
        normalize_image_urls(&mut report, &dir);

        let urls: Vec<_> = report
            .keyframes
            .iter()
            .map(|k| k.frame_image_url.clone().unwrap())
            .collect();
        assert_eq!(
            urls,
            vec![
                "/static/keyframes/v_kf1_t3.jpg",
                "/static/keyframes/v_kf2_t6.jpg",
                "/static/keyframes/v_kf3_t9.jpg",
                "https://cdn.example.com/v_kf4.jpg",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_analyzer_runs_program() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-pipeline.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'progress' >&2\necho '{\"final\":\"abnormal\",\"keyframes\":[{\"time\":3,\"status\":\"abnormal\",\"frame_image_url\":\"k1.jpg\"}]}'\n",
        )
        .unwrap();

        let analyzer = CommandAnalyzer::new(
            PathBuf::from("/bin/sh"),
            vec![script.to_string_lossy().into_owned()],
            Duration::from_secs(30),
        );
        let job = AnalysisJob {
            video_id: "v1".to_string(),
            video_path: dir.path().join("v1.mp4"),
            keyframe_dir: dir.path().to_path_buf(),
        };

        let report = analyzer.analyze(&job).await.unwrap();
        assert_eq!(report.final_verdict(), Verdict::Abnormal);
        assert_eq!(
            report.keyframes[0].frame_image_url.as_deref(),
            Some("/static/keyframes/k1.jpg")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_analyzer_reports_failure() {
        let analyzer = CommandAnalyzer::new(
            PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), "echo 'cannot open video' >&2; exit 3".to_string()],
            Duration::from_secs(30),
        );
        let job = AnalysisJob {
            video_id: "v1".to_string(),
            video_path: PathBuf::from("/nonexistent.mp4"),
            keyframe_dir: PathBuf::from("/tmp"),
        };

        let err = analyzer.analyze(&job).await.unwrap_err();
        assert!(err.to_string().contains("cannot open video"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_analyzer_times_out() {
        let analyzer = CommandAnalyzer::new(
            PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(200),
        );
        let job = AnalysisJob {
            video_id: "v1".to_string(),
            video_path: PathBuf::from("/nonexistent.mp4"),
            keyframe_dir: PathBuf::from("/tmp"),
        };

        let err = analyzer.analyze(&job).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
