//! Wire types shared by the server routes and the terminal client.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Malformed optional fields fall back to their default instead of failing
/// the whole document.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

/// Processing state of an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoStatus {
    Uploaded,
    Processing,
    Done,
    Error,
    Other(String),
}

impl VideoStatus {
    pub fn as_str(&self) -> &str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Done => "done",
            VideoStatus::Error => "error",
            VideoStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for VideoStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "uploaded" => VideoStatus::Uploaded,
            "processing" => VideoStatus::Processing,
            "done" => VideoStatus::Done,
            "error" => VideoStatus::Error,
            _ => VideoStatus::Other(raw),
        }
    }
}

impl From<VideoStatus> for String {
    fn from(status: VideoStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video-level conclusion, set once analysis is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Normal,
    Abnormal,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Normal => "normal",
            Verdict::Abnormal => "abnormal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KeyframeStatus {
    Normal,
    Abnormal,
    Other(String),
}

impl From<String> for KeyframeStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "normal" => KeyframeStatus::Normal,
            "abnormal" => KeyframeStatus::Abnormal,
            _ => KeyframeStatus::Other(raw),
        }
    }
}

impl From<KeyframeStatus> for String {
    fn from(status: KeyframeStatus) -> Self {
        match status {
            KeyframeStatus::Normal => "normal".to_string(),
            KeyframeStatus::Abnormal => "abnormal".to_string(),
            KeyframeStatus::Other(raw) => raw,
        }
    }
}

/// One detected insect inside a keyframe, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Offset into the video, in seconds.
    #[serde(default, deserialize_with = "lenient")]
    pub time: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<KeyframeStatus>,
    #[serde(default, deserialize_with = "lenient")]
    pub frame_image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default, deserialize_with = "lenient")]
    pub total_count: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub normal_count: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub abnormal_count: u64,
}

/// Creation timestamp as it appears on the wire: either a plain ISO string or
/// an extended-JSON `{"$date": ...}` wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreatedAt {
    Iso(String),
    Wrapped {
        #[serde(rename = "$date")]
        date: DateValue,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateValue {
    Iso(String),
    Millis(i64),
    Long {
        #[serde(rename = "$numberLong")]
        number_long: String,
    },
}

impl CreatedAt {
    /// Resolve to an instant. Offset-less timestamps are taken as UTC.
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        match self {
            CreatedAt::Iso(raw) => parse_iso(raw),
            CreatedAt::Wrapped { date } => match date {
                DateValue::Iso(raw) => parse_iso(raw),
                DateValue::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
                DateValue::Long { number_long } => number_long
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            },
        }
    }
}

fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Full record of one uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct VideoRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub video_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub original_filename: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub farm_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<CreatedAt>,
    /// Length of the video in seconds, once known.
    #[serde(default, deserialize_with = "lenient")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<VideoStatus>,
    #[serde(rename = "final", default, deserialize_with = "lenient")]
    pub verdict: Option<Verdict>,
    #[serde(default, deserialize_with = "lenient")]
    pub keyframes: Vec<Keyframe>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub summary: Option<AnalysisSummary>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub analysis_error: Option<String>,
}

/// Reduced projection of a video used by list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct VideoListItem {
    #[serde(default, deserialize_with = "lenient")]
    pub video_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub original_filename: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub farm_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<CreatedAt>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<VideoStatus>,
    #[serde(rename = "final", default, deserialize_with = "lenient")]
    pub verdict: Option<Verdict>,
}

/// `_id` stands in for `video_id` when the latter is missing or null. When
/// both are present `video_id` wins and `_id` is ignored.
fn merge_legacy_id(mut value: serde_json::Value) -> serde_json::Value {
    if let Some(map) = value.as_object_mut() {
        if let Some(legacy) = map.remove("_id") {
            if map.get("video_id").map_or(true, serde_json::Value::is_null) {
                map.insert("video_id".to_string(), legacy);
            }
        }
    }
    value
}

/// Wire impls for records that carry a video id, routed through
/// `merge_legacy_id` before the derived field handling.
macro_rules! video_id_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                $ty::serialize(self, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = merge_legacy_id(serde_json::Value::deserialize(deserializer)?);
                $ty::deserialize(value).map_err(serde::de::Error::custom)
            }
        }
    };
}

video_id_serde!(VideoRecord);
video_id_serde!(VideoListItem);

impl From<&VideoRecord> for VideoListItem {
    fn from(record: &VideoRecord) -> Self {
        VideoListItem {
            video_id: record.video_id.clone(),
            original_filename: record.original_filename.clone(),
            filename: record.filename.clone(),
            farm_id: record.farm_id.clone(),
            created_at: record.created_at.clone(),
            status: record.status.clone(),
            verdict: record.verdict,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default, deserialize_with = "lenient")]
    pub total: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub done: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub normal: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub abnormal: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub stats: DashboardStats,
    #[serde(default, deserialize_with = "lenient")]
    pub recent: Vec<VideoListItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoListResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub items: Vec<VideoListItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub video_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, deserialize_with = "lenient")]
    pub error: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_created_at_iso_and_wrapped_agree() {
        let plain: CreatedAt = serde_json::from_value(json!("2024-01-01T00:00:00Z")).unwrap();
        let wrapped: CreatedAt =
            serde_json::from_value(json!({"$date": "2024-01-01T00:00:00Z"})).unwrap();
        assert_eq!(plain.parse(), wrapped.parse());
        assert!(plain.parse().is_some());
    }

    #[test]
    fn test_created_at_millis_variants() {
        let millis: CreatedAt = serde_json::from_value(json!({"$date": 1704067200000i64})).unwrap();
        let long: CreatedAt =
            serde_json::from_value(json!({"$date": {"$numberLong": "1704067200000"}})).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(millis.parse(), Some(expected));
        assert_eq!(long.parse(), Some(expected));
    }

    #[test]
    fn test_created_at_naive_is_utc() {
        let naive = CreatedAt::Iso("2024-01-01T09:30:00.123456".to_string());
        let parsed = naive.parse().unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-01T09:30:00.123456+00:00");
    }

    #[test]
    fn test_created_at_garbage() {
        assert!(CreatedAt::Iso("not-a-date".to_string()).parse().is_none());
    }

    #[test]
    fn test_status_unknown_is_preserved() {
        let status: VideoStatus = serde_json::from_value(json!("paused")).unwrap();
        assert_eq!(status, VideoStatus::Other("paused".to_string()));
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("paused"));
    }

    #[test]
    fn test_record_accepts_underscore_id_and_missing_fields() {
        let record: VideoRecord = serde_json::from_value(json!({
            "_id": "abc",
            "status": "done",
            "final": "abnormal",
        }))
        .unwrap();
        assert_eq!(record.video_id.as_deref(), Some("abc"));
        assert_eq!(record.status, Some(VideoStatus::Done));
        assert_eq!(record.verdict, Some(Verdict::Abnormal));
        assert!(record.keyframes.is_empty());
        assert!(record.duration.is_none());
    }

    #[test]
    fn test_both_id_keys_prefer_video_id() {
        let record: VideoRecord = serde_json::from_value(json!({
            "_id": "legacy",
            "video_id": "v1",
            "status": "uploaded",
        }))
        .unwrap();
        assert_eq!(record.video_id.as_deref(), Some("v1"));
        assert_eq!(record.status, Some(VideoStatus::Uploaded));

        let item: VideoListItem =
            serde_json::from_value(json!({"_id": "legacy", "video_id": null})).unwrap();
        assert_eq!(item.video_id.as_deref(), Some("legacy"));
    }

    #[test]
    fn test_record_serializes_video_id_only() {
        let record: VideoRecord = serde_json::from_value(json!({"_id": "abc"})).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["video_id"], "abc");
        assert!(value.get("_id").is_none());
    }

    #[test]
    fn test_malformed_optional_fields_are_dropped() {
        let record: VideoRecord = serde_json::from_value(json!({
            "video_id": "v1",
            "final": "pending",
            "created_at": 17,
            "duration": "long",
            "keyframes": null,
        }))
        .unwrap();
        assert_eq!(record.video_id.as_deref(), Some("v1"));
        assert!(record.verdict.is_none());
        assert!(record.created_at.is_none());
        assert!(record.duration.is_none());
        assert!(record.keyframes.is_empty());
    }

    #[test]
    fn test_keyframe_without_status_or_image() {
        let kf: Keyframe = serde_json::from_value(json!({"time": 3.0})).unwrap();
        assert_eq!(kf.time, Some(3.0));
        assert!(kf.status.is_none());
        assert!(kf.frame_image_url.is_none());
        assert!(kf.detections.is_empty());
    }
}
