//! Cooperative timer model: one session, one logical timeline.
//!
//! All timer firings and keystrokes are delivered on the same
//! single-threaded loop; the wheel never calls back, the owner polls it.

pub type TimerId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// The 3-second pre-test countdown.
    Countdown,
    /// A scheduled sensory cue (beep or color change).
    StimulusTick,
    /// The fixed-duration session deadline.
    Deadline,
}

/// One due timer, reported by [`TimerWheel::poll`] in due-time order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Firing {
    pub id: TimerId,
    pub kind: TimerKind,
    /// The scheduled time, not the poll time. Late polls still see the
    /// timestamps the schedule intended.
    pub due_ms: u64,
}

/// One-shot and periodic timer primitives with millisecond resolution,
/// as consumed by the session engine. How firings become audible or
/// visible cues is the embedding layer's business.
pub trait StimulusClock {
    fn after(&mut self, kind: TimerKind, delay_ms: u64) -> TimerId;
    fn every(&mut self, kind: TimerKind, first_after_ms: u64, interval_ms: u64) -> TimerId;
    fn cancel(&mut self, id: TimerId);
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    id: TimerId,
    kind: TimerKind,
    due_ms: u64,
    period: Option<u64>,
}

/// Single-threaded timer queue. Arming is cheap, firing order is total
/// (due time, then arm order), and `cancel_all` drains every pending
/// timer in one step so a finished session cannot receive a stray tick.
#[derive(Debug, Default)]
pub struct TimerWheel {
    armed: Vec<Entry>,
    next_id: TimerId,
    now_ms: u64,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Advance the wheel's notion of "now" without polling. Time never
    /// moves backwards.
    pub fn sync(&mut self, now_ms: u64) {
        if now_ms > self.now_ms {
            self.now_ms = now_ms;
        }
    }

    /// Arm a timer at an absolute due time. `period` reschedules it after
    /// each firing.
    pub fn arm_at(&mut self, kind: TimerKind, due_ms: u64, period: Option<u64>) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.armed.push(Entry {
            id,
            kind,
            due_ms,
            period,
        });
        id
    }

    pub fn cancel_all(&mut self) {
        self.armed.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.armed.is_empty()
    }

    /// Collect every firing due at or before `now_ms`, in due-time order.
    /// Periodic timers that were due multiple times fire once per missed
    /// period, so a slow poll loses nothing.
    pub fn poll(&mut self, now_ms: u64) -> Vec<Firing> {
        self.sync(now_ms);
        let now = self.now_ms;
        let mut fired = Vec::new();
        self.armed.retain_mut(|e| {
            while e.due_ms <= now {
                fired.push(Firing {
                    id: e.id,
                    kind: e.kind,
                    due_ms: e.due_ms,
                });
                match e.period {
                    Some(p) if p > 0 => e.due_ms += p,
                    _ => return false,
                }
            }
            true
        });
        fired.sort_by_key(|f| (f.due_ms, f.id));
        fired
    }
}

impl StimulusClock for TimerWheel {
    fn after(&mut self, kind: TimerKind, delay_ms: u64) -> TimerId {
        self.arm_at(kind, self.now_ms + delay_ms, None)
    }

    fn every(&mut self, kind: TimerKind, first_after_ms: u64, interval_ms: u64) -> TimerId {
        self.arm_at(kind, self.now_ms + first_after_ms, Some(interval_ms))
    }

    fn cancel(&mut self, id: TimerId) {
        self.armed.retain(|e| e.id != id);
    }
}
