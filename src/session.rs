use crate::aggregate::{self, SessionOutcome};
use crate::event::{EditEvent, EventKind, Recorder};
use crate::record::SessionRecord;
use crate::runtime::{Firing, TimerKind, TimerWheel};
use crate::schedule::{pick_cue_color, StimulusSchedule};
use crate::scoring::{classify_insert, phrase_complete, ScoringStrategy, SessionConfig};
use chrono::{DateTime, Local, Timelike};
use thiserror::Error;

/// Length of the pre-test countdown.
pub const COUNTDOWN_MS: u64 = 3_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Countdown,
    Running,
    Ended,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("start is only valid from the idle phase")]
    AlreadyStarted,
    #[error("the session has not ended yet")]
    NotEnded,
    #[error("only the dual-task variant collects a color count")]
    NoPerceptualTask,
}

/// A cue that fired while advancing the loop. The embedding layer turns
/// these into beeps or circle colors; scoring only ever looks at counts
/// and schedules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cue {
    /// Session-relative due time of the cue.
    pub at_ms: u64,
    /// Dual-task cues carry a color, rhythm beeps do not.
    pub color: Option<&'static str>,
}

/// One live run of a variant: `Idle → Countdown → Running → Ended`.
///
/// Everything is driven from a single cooperative timeline: the caller
/// feeds wall-clock-ish milliseconds into [`Session::advance`] and
/// [`Session::on_text_changed`], and the session polls its own timer
/// wheel before acting, so timer firings and keystrokes can never
/// interleave inconsistently. Ending cancels every pending timer before
/// the phase flips, which makes a stray late tick on a finished session
/// impossible. `Ended` is terminal; [`Session::reset`] hands back a
/// fresh instance instead of rewinding this one.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    username: String,
    phase: Phase,
    wheel: TimerWheel,
    recorder: Recorder,
    events: Vec<EditEvent>,
    schedule: Option<StimulusSchedule>,
    pending_cues: Vec<Cue>,
    tick_count: u32,
    user_reported: Option<u32>,
    block_index: usize,
    block_snapshots: Vec<String>,
    started_at: Option<DateTime<Local>>,
    run_started_ms: Option<u64>,
    ended_rel_ms: Option<u64>,
    phrase_completed: bool,
    all_blocks_completed: bool,
}

impl Session {
    pub fn new(config: SessionConfig, username: impl Into<String>) -> Self {
        Self {
            config,
            username: username.into(),
            phase: Phase::Idle,
            wheel: TimerWheel::new(),
            recorder: Recorder::new(),
            events: Vec::new(),
            schedule: None,
            pending_cues: Vec::new(),
            tick_count: 0,
            user_reported: None,
            block_index: 0,
            block_snapshots: Vec::new(),
            started_at: None,
            run_started_ms: None,
            ended_rel_ms: None,
            phrase_completed: false,
            all_blocks_completed: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn events(&self) -> &[EditEvent] {
        &self.events
    }

    pub fn schedule(&self) -> Option<&StimulusSchedule> {
        self.schedule.as_ref()
    }

    /// Cues fired so far, including the one visible at test start.
    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    /// The text block currently being copied (multi-block variant).
    pub fn current_block(&self) -> Option<&str> {
        self.config
            .text_blocks
            .as_ref()
            .and_then(|blocks| blocks.get(self.block_index))
            .map(|s| s.as_str())
    }

    /// Begin the pre-test countdown. Valid once, from `Idle`.
    pub fn start(&mut self, now_ms: u64) -> Result<(), SessionError> {
        if self.phase != Phase::Idle {
            return Err(SessionError::AlreadyStarted);
        }
        self.wheel.sync(now_ms);
        self.wheel
            .arm_at(TimerKind::Countdown, now_ms + COUNTDOWN_MS, None);
        self.phase = Phase::Countdown;
        Ok(())
    }

    /// Drive the timeline forward, returning any cues that fired.
    pub fn advance(&mut self, now_ms: u64) -> Vec<Cue> {
        self.drain(now_ms);
        std::mem::take(&mut self.pending_cues)
    }

    fn drain(&mut self, now_ms: u64) {
        loop {
            let firings = self.wheel.poll(now_ms);
            if firings.is_empty() {
                break;
            }
            for firing in firings {
                self.handle(firing);
                // a late poll can batch firings due past the deadline;
                // nothing fires into an ended session
                if self.phase == Phase::Ended {
                    return;
                }
            }
        }
    }

    fn handle(&mut self, firing: Firing) {
        match firing.kind {
            TimerKind::Countdown => self.begin_run(firing.due_ms),
            TimerKind::StimulusTick => {
                self.tick_count += 1;
                let rel = firing.due_ms - self.run_started_ms.unwrap_or(firing.due_ms);
                let color = match self.config.strategy {
                    ScoringStrategy::DualTask => Some(pick_cue_color(&mut rand::thread_rng())),
                    _ => None,
                };
                self.pending_cues.push(Cue { at_ms: rel, color });
            }
            TimerKind::Deadline => {
                let rel = firing.due_ms - self.run_started_ms.unwrap_or(firing.due_ms);
                self.end(rel);
            }
        }
    }

    fn begin_run(&mut self, at_ms: u64) {
        self.phase = Phase::Running;
        // Whole-second precision so the record survives the historical
        // `clock_format` serde roundtrip (see REVIEW_FINDINGS.md F3).
        self.started_at = Some(Local::now().with_nanosecond(0).expect("zero nanosecond is valid"));
        self.run_started_ms = Some(at_ms);

        if let (Some(cue), Some(duration)) = (self.config.cue, self.config.duration_ms) {
            if matches!(self.config.strategy, ScoringStrategy::Rhythm { .. }) {
                self.schedule = Some(StimulusSchedule::build(
                    cue.initial_delay_ms,
                    cue.interval_ms,
                    duration,
                ));
            }
            self.wheel.arm_at(
                TimerKind::StimulusTick,
                at_ms + cue.initial_delay_ms,
                Some(cue.interval_ms),
            );
        }
        if let Some(duration) = self.config.duration_ms {
            self.wheel.arm_at(TimerKind::Deadline, at_ms + duration, None);
        }
    }

    /// Feed one text-field change into the session.
    ///
    /// Returns the classified event, or `None` while the session is not
    /// running or when the change is an equal-length replace.
    pub fn on_text_changed(&mut self, new_text: &str, now_ms: u64) -> Option<EditEvent> {
        self.drain(now_ms);
        if self.phase != Phase::Running {
            return None;
        }

        let rel = self.wheel.now_ms() - self.run_started_ms.unwrap_or(0);
        let mut event = self.recorder.on_text_changed(new_text, rel)?;

        if matches!(self.config.strategy, ScoringStrategy::MultiBlock) {
            event.block_index = Some(self.block_index);
        }
        if event.kind == EventKind::Insert {
            let classification = classify_insert(
                &self.config,
                event.ch.unwrap_or('\0'),
                new_text.chars().count(),
                rel,
                self.schedule.as_ref(),
                self.current_block(),
            );
            event.correct = Some(classification.correct);
            event.deviation_ms = classification.deviation_ms;
            event.expected_time_ms = classification.expected_time_ms;
        }
        self.events.push(event.clone());

        if self.config.ends_on_phrase_match() {
            if let Some(target) = self.config.target_text.as_deref() {
                if phrase_complete(target, new_text) {
                    self.phrase_completed = true;
                    self.end(rel);
                    return Some(event);
                }
            }
        }

        if matches!(self.config.strategy, ScoringStrategy::MultiBlock) {
            if let Some(block) = self.current_block() {
                if phrase_complete(block, new_text) {
                    self.block_snapshots.push(new_text.to_string());
                    self.block_index += 1;
                    self.recorder.reset();
                    let total = self
                        .config
                        .text_blocks
                        .as_ref()
                        .map(|b| b.len())
                        .unwrap_or(0);
                    if self.block_index >= total {
                        self.all_blocks_completed = true;
                        self.end(rel);
                    }
                }
            }
        }

        Some(event)
    }

    /// Record the participant's reported color-change count (dual task).
    /// Typically collected after the run ends, before persisting.
    pub fn report_color_changes(&mut self, count: u32) -> Result<(), SessionError> {
        if !matches!(self.config.strategy, ScoringStrategy::DualTask) {
            return Err(SessionError::NoPerceptualTask);
        }
        self.user_reported = Some(count);
        Ok(())
    }

    fn end(&mut self, rel_ms: u64) {
        // cancel first: nothing may fire into an ended session
        self.wheel.cancel_all();

        // a block in progress at the deadline still contributes its text
        if matches!(self.config.strategy, ScoringStrategy::MultiBlock)
            && !self.all_blocks_completed
            && !self.recorder.last_text().trim().is_empty()
        {
            self.block_snapshots.push(self.recorder.last_text().to_string());
        }

        self.ended_rel_ms = Some(rel_ms);
        self.phase = Phase::Ended;
    }

    /// Reduce the finished session to its immutable record. The record is
    /// computed from the captured stream; calling this twice yields
    /// identical results, and a failed save never invalidates it.
    pub fn finalize(&self) -> Result<SessionRecord, SessionError> {
        if self.phase != Phase::Ended {
            return Err(SessionError::NotEnded);
        }
        let started_at = self.started_at.ok_or(SessionError::NotEnded)?;
        let total_time_ms = self.ended_rel_ms.ok_or(SessionError::NotEnded)?;

        let final_text = if matches!(self.config.strategy, ScoringStrategy::MultiBlock) {
            self.block_snapshots.concat()
        } else {
            self.recorder.last_text().to_string()
        };

        let outcome = SessionOutcome {
            username: self.username.clone(),
            started_at,
            total_time_ms,
            final_text,
            tick_count: self.tick_count,
            user_reported: self.user_reported,
            completed_blocks: self.block_index,
            all_blocks_completed: self.all_blocks_completed,
            phrase_completed: self.phrase_completed,
        };
        Ok(aggregate::finalize(
            &self.events,
            &self.config,
            self.schedule.as_ref(),
            &outcome,
        ))
    }

    /// Discard this session and hand back a fresh `Idle` one for the same
    /// variant and participant. All pending timers are drained first; the
    /// old state machine is consumed, never rewound.
    pub fn reset(mut self) -> Session {
        self.wheel.cancel_all();
        Session::new(self.config, self.username)
    }
}
