use crate::event::EditEvent;
use crate::record::{Metrics, SessionRecord};
use crate::schedule::StimulusSchedule;
use crate::scoring::{ScoringStrategy, SessionConfig, VariantId};
use crate::util;
use chrono::{DateTime, Local};
use itertools::Itertools;

/// Everything the aggregator needs about how the session ended, beyond
/// the event stream itself.
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub username: String,
    pub started_at: DateTime<Local>,
    pub total_time_ms: u64,
    pub final_text: String,
    /// Cues actually fired (dual task).
    pub tick_count: u32,
    /// The participant's reported color-change count, if collected.
    pub user_reported: Option<u32>,
    /// Fully matched blocks (multi-block).
    pub completed_blocks: usize,
    pub all_blocks_completed: bool,
    /// Whether a full target match terminated the session.
    pub phrase_completed: bool,
}

impl SessionOutcome {
    pub fn new(
        username: impl Into<String>,
        started_at: DateTime<Local>,
        total_time_ms: u64,
        final_text: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            started_at,
            total_time_ms,
            final_text: final_text.into(),
            tick_count: 0,
            user_reported: None,
            completed_blocks: 0,
            all_blocks_completed: false,
            phrase_completed: false,
        }
    }
}

/// Reduce a completed event stream to its immutable session record.
///
/// Pure function of its inputs: calling it twice over the same stream
/// yields identical metrics. Incorrect presses are always the complement
/// of correct ones, so `correct + incorrect == total` holds for every
/// variant.
pub fn finalize(
    events: &[EditEvent],
    config: &SessionConfig,
    schedule: Option<&StimulusSchedule>,
    outcome: &SessionOutcome,
) -> SessionRecord {
    let total_presses = events.iter().filter(|e| e.is_insert()).count() as u64;
    let correct_presses = events
        .iter()
        .filter(|e| e.is_insert() && e.correct == Some(true))
        .count() as u64;
    let incorrect_presses = total_presses - correct_presses;

    let mut metrics = Metrics {
        total_presses,
        correct_presses,
        incorrect_presses,
        accuracy_pct: util::accuracy_pct(correct_presses, total_presses),
        speed_per_sec: util::speed_per_sec(total_presses, outcome.total_time_ms),
        ..Metrics::default()
    };

    match &config.strategy {
        ScoringStrategy::FreeCount { .. } => {
            metrics.total_target_presses = Some(correct_presses);
        }
        ScoringStrategy::Rhythm { target } => {
            metrics.total_target_presses = Some(
                events
                    .iter()
                    .filter(|e| {
                        e.is_insert()
                            && e.ch.map(|c| c.eq_ignore_ascii_case(target)).unwrap_or(false)
                    })
                    .count() as u64,
            );
            metrics.expected_presses_count = schedule.map(|s| s.len());
            metrics.average_deviation_ms = Some(rhythm_consistency(events));
        }
        ScoringStrategy::DualTask => {
            let actual = (i64::from(outcome.tick_count) - 1).unsigned_abs() as u32;
            metrics.actual_changes = Some(actual);
            metrics.user_reported = outcome.user_reported;
            metrics.difference = outcome.user_reported.map(|u| u.abs_diff(actual));
        }
        ScoringStrategy::PhraseCopy { .. } => {
            if config.variant == VariantId::TimedPhrase {
                metrics.completed_phrase = Some(outcome.phrase_completed);
                metrics.completed_in_time = Some(
                    outcome.phrase_completed
                        && config
                            .duration_ms
                            .map(|d| outcome.total_time_ms <= d)
                            .unwrap_or(true),
                );
            }
        }
        ScoringStrategy::MultiBlock => {
            let total_blocks = config.text_blocks.as_ref().map(|b| b.len()).unwrap_or(0);
            metrics.completed_blocks = Some(outcome.completed_blocks);
            metrics.total_blocks = Some(total_blocks);
            metrics.all_blocks_completed = Some(outcome.all_blocks_completed);
        }
    }

    let target_text = match &config.strategy {
        ScoringStrategy::MultiBlock => config.text_blocks.as_ref().map(|b| b.join(" ")),
        _ => config.target_text.clone(),
    };

    let expected_times = match &config.strategy {
        ScoringStrategy::Rhythm { .. } => schedule.map(|s| s.expected_times().to_vec()),
        _ => None,
    };

    SessionRecord {
        variant: config.variant,
        username: outcome.username.clone(),
        started_at: outcome.started_at,
        total_time_ms: outcome.total_time_ms,
        target_text,
        final_text: outcome.final_text.clone(),
        metrics,
        events: events.to_vec(),
        expected_times,
    }
}

/// Population std-dev of the intervals between consecutive matched
/// presses, in ms. 0.0 with fewer than two matched presses.
fn rhythm_consistency(events: &[EditEvent]) -> f64 {
    let matched: Vec<u64> = events
        .iter()
        .filter(|e| e.is_insert() && e.correct == Some(true))
        .map(|e| e.timestamp_ms)
        .collect();
    if matched.len() < 2 {
        return 0.0;
    }
    let intervals: Vec<f64> = matched
        .iter()
        .tuple_windows()
        .map(|(a, b)| (b - a) as f64)
        .collect();
    util::std_dev(&intervals).unwrap_or(0.0)
}
