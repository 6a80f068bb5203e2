use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Deviation reported when a rhythm press has no schedule to match against.
pub const UNMATCHED_DEVIATION_MS: u64 = u64::MAX;

/// Colors the dual-task cue circle can take. Only the number of changes
/// matters for scoring; the palette exists so the UI layer has something
/// to show.
pub const CUE_PALETTE: [&str; 5] = ["red", "blue", "green", "yellow", "purple"];

/// Pick the next cue color. Repeats are allowed, like the original cue.
pub fn pick_cue_color<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    CUE_PALETTE
        .choose(rng)
        .copied()
        .unwrap_or(CUE_PALETTE[0])
}

/// The expected times of externally scheduled cues, built once when the
/// running phase begins and immutable afterwards.
///
/// Times are `initial_delay + n * interval` for every multiple below the
/// total duration, plus a final tick exactly at the total duration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusSchedule {
    expected_times: Vec<u64>,
}

impl StimulusSchedule {
    pub fn build(initial_delay_ms: u64, interval_ms: u64, total_duration_ms: u64) -> Self {
        let mut expected_times = Vec::new();
        if interval_ms > 0 {
            let mut t = initial_delay_ms;
            while t < total_duration_ms {
                expected_times.push(t);
                t += interval_ms;
            }
        }
        if expected_times.last() != Some(&total_duration_ms) {
            expected_times.push(total_duration_ms);
        }
        Self { expected_times }
    }

    pub fn expected_times(&self) -> &[u64] {
        &self.expected_times
    }

    pub fn len(&self) -> usize {
        self.expected_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected_times.is_empty()
    }

    /// Closest expected time to `t_ms` and the absolute distance to it.
    /// A tie between two neighbors resolves to the earlier one; both sides
    /// are the same distance away.
    pub fn nearest(&self, t_ms: u64) -> Option<(u64, u64)> {
        self.expected_times
            .iter()
            .map(|&e| (e, e.abs_diff(t_ms)))
            .min_by_key(|&(_, d)| d)
    }

    pub fn within_tolerance(&self, t_ms: u64, tolerance_ms: u64) -> bool {
        matches!(self.nearest(t_ms), Some((_, d)) if d <= tolerance_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_appends_final_tick_at_duration() {
        let s = StimulusSchedule::build(500, 1000, 15_000);
        assert_eq!(s.expected_times()[0], 500);
        assert_eq!(s.expected_times()[1], 1500);
        assert_eq!(*s.expected_times().last().unwrap(), 15_000);
        assert_eq!(s.len(), 16); // 500..=14500 every second, plus 15000
    }

    #[test]
    fn build_does_not_duplicate_exact_boundary() {
        let s = StimulusSchedule::build(0, 500, 1_000);
        assert_eq!(s.expected_times(), &[0, 500, 1_000]);
    }

    #[test]
    fn times_strictly_increase() {
        let s = StimulusSchedule::build(500, 1000, 15_000);
        for w in s.expected_times().windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn nearest_finds_closest_time() {
        let s = StimulusSchedule::build(500, 1000, 2_500);
        assert_eq!(s.expected_times(), &[500, 1500, 2500]);
        assert_eq!(s.nearest(520), Some((500, 20)));
        assert_eq!(s.nearest(1400), Some((1500, 100)));
        // equidistant: both neighbors are 500 away
        let (_, d) = s.nearest(1000).unwrap();
        assert_eq!(d, 500);
    }

    #[test]
    fn tolerance_window_is_inclusive() {
        let s = StimulusSchedule::build(500, 1000, 2_500);
        assert!(s.within_tolerance(800, 300));
        assert!(!s.within_tolerance(801, 300));
        assert!(s.within_tolerance(1000, 500));
    }

    #[test]
    fn cue_color_comes_from_palette() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let c = pick_cue_color(&mut rng);
            assert!(CUE_PALETTE.contains(&c));
        }
    }
}
