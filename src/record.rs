use crate::event::EditEvent;
use crate::scoring::VariantId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp (de)serialization in the battery's historical export format,
/// `"2024-05-01 14:03:22"` in local time.
pub mod clock_format {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(date: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let naive =
            NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| serde::de::Error::custom("timestamp not representable in local time"))
    }
}

/// Derived per-session metrics. The first five fields exist for every
/// variant; the optional tail is variant-specific.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Metrics {
    pub total_presses: u64,
    pub correct_presses: u64,
    pub incorrect_presses: u64,
    pub accuracy_pct: f64,
    #[serde(rename = "speed_keystrokes_per_sec")]
    pub speed_per_sec: f64,

    /// Presses of the target character, whether or not they were on time
    /// (free-count and rhythm variants).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_target_presses: Option<u64>,
    /// Number of scheduled cues (rhythm).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expected_presses_count: Option<usize>,
    /// Population std-dev of inter-press intervals among matched presses
    /// (rhythm).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub average_deviation_ms: Option<f64>,

    /// Dual task: cue changes that actually happened.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub actual_changes: Option<u32>,
    /// Dual task: changes the participant reported seeing.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_reported: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub difference: Option<u32>,

    /// Timed phrase: whether the phrase was matched at all.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_phrase: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_in_time: Option<bool>,

    /// Multi-block passage progress.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_blocks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_blocks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub all_blocks_completed: Option<bool>,
}

/// The immutable output of one completed session. Built only by
/// [`crate::aggregate::finalize`]; ownership passes straight to the
/// session store, and nothing mutates it afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "test_name")]
    pub variant: VariantId,
    pub username: String,
    #[serde(rename = "start_time", with = "clock_format")]
    pub started_at: DateTime<Local>,
    pub total_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_text: Option<String>,
    pub final_text: String,
    pub metrics: Metrics,
    #[serde(rename = "key_events")]
    pub events: Vec<EditEvent>,
    /// The cue schedule, for rhythm sessions.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expected_times: Option<Vec<u64>>,
}
