use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Insert,
    Delete,
}

/// One character-level edit, timestamped relative to the start of the
/// running phase. Classification fields are filled in by the scoring
/// engine, not the recorder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditEvent {
    pub timestamp_ms: u64,
    pub kind: EventKind,
    #[serde(rename = "char", skip_serializing_if = "Option::is_none", default)]
    pub ch: Option<char>,
    pub text_snapshot: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub block_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deviation_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expected_time_ms: Option<u64>,
}

impl EditEvent {
    pub fn is_insert(&self) -> bool {
        self.kind == EventKind::Insert
    }
}

/// Turns raw text-field change notifications into typed edit events.
///
/// Keeps the previous field content so each notification can be diffed
/// against it. A longer text yields one Insert carrying the last character
/// (a batched paste still yields a single event, best effort); a shorter
/// text yields one Delete; an equal-length replace yields nothing. That
/// last case is a documented limitation of the capture method, kept as-is.
#[derive(Debug, Default)]
pub struct Recorder {
    last_text: String,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            last_text: String::new(),
        }
    }

    /// Current field content as of the last observed change.
    pub fn last_text(&self) -> &str {
        &self.last_text
    }

    /// Forget the previous content, e.g. when the input field is cleared
    /// for the next text block.
    pub fn reset(&mut self) {
        self.last_text.clear();
    }

    pub fn on_text_changed(&mut self, new_text: &str, now_ms: u64) -> Option<EditEvent> {
        let prev_len = self.last_text.chars().count();
        let new_len = new_text.chars().count();

        let event = if new_len > prev_len {
            Some(EditEvent {
                timestamp_ms: now_ms,
                kind: EventKind::Insert,
                ch: new_text.chars().last(),
                text_snapshot: new_text.to_string(),
                correct: None,
                block_index: None,
                deviation_ms: None,
                expected_time_ms: None,
            })
        } else if new_len < prev_len {
            Some(EditEvent {
                timestamp_ms: now_ms,
                kind: EventKind::Delete,
                ch: None,
                text_snapshot: new_text.to_string(),
                correct: None,
                block_index: None,
                deviation_ms: None,
                expected_time_ms: None,
            })
        } else {
            None
        };

        self.last_text = new_text.to_string();
        event
    }
}
