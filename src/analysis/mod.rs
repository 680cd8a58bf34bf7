//! Background analysis of uploaded videos.
//!
//! The inference itself (keyframe sampling, detection, classification) runs in
//! an external program; this module queues work, drives that program, and
//! records the outcome on the video.

pub mod command;
pub mod worker;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::{AnalysisSummary, Keyframe, Verdict};

/// Everything an analyzer needs to process one video.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub video_id: String,
    pub video_path: PathBuf,
    pub keyframe_dir: PathBuf,
}

/// Result of analysing one video, as produced by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub keyframes: Vec<Keyframe>,
    #[serde(default)]
    pub summary: AnalysisSummary,
    #[serde(rename = "final", default)]
    pub verdict: Option<Verdict>,
    /// Video length in seconds, when the analyzer could read it.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl AnalysisReport {
    /// The reported verdict, or `abnormal` iff any abnormal insect was counted.
    pub fn final_verdict(&self) -> Verdict {
        match self.verdict {
            Some(verdict) => verdict,
            None if self.summary.abnormal_count > 0 => Verdict::Abnormal,
            None => Verdict::Normal,
        }
    }
}

pub trait Analyzer: Send + Sync {
    fn analyze<'a>(&'a self, job: &'a AnalysisJob) -> BoxFuture<'a, anyhow::Result<AnalysisReport>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_from_summary() {
        let mut report = AnalysisReport::default();
        assert_eq!(report.final_verdict(), Verdict::Normal);

        report.summary.abnormal_count = 2;
        assert_eq!(report.final_verdict(), Verdict::Abnormal);
    }

    #[test]
    fn test_explicit_verdict_wins() {
        let report = AnalysisReport {
            summary: AnalysisSummary {
                total_count: 5,
                normal_count: 4,
                abnormal_count: 1,
            },
            verdict: Some(Verdict::Normal),
            ..Default::default()
        };
        assert_eq!(report.final_verdict(), Verdict::Normal);
    }

    #[test]
    fn test_report_deserializes_pipeline_output() {
        let json = r#"{
            "final": "abnormal",
            "summary": {"total_count": 3, "normal_count": 2, "abnormal_count": 1},
            "keyframes": [{
                "time": 6.0,
                "status": "abnormal",
                "frame_image_url": "/static/keyframes/v_kf1_t6.jpg",
                "detections": [{"x1": 1, "y1": 2, "x2": 30, "y2": 40, "label": "abnormal", "confidence": 0.91}]
            }]
        }"#;
        let report: AnalysisReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.final_verdict(), Verdict::Abnormal);
        assert_eq!(report.keyframes.len(), 1);
        assert_eq!(report.keyframes[0].detections[0].label, "abnormal");
        assert!(report.duration.is_none());
    }
}
