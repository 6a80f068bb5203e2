use crate::schedule::{StimulusSchedule, UNMATCHED_DEVIATION_MS};
use serde::{Deserialize, Serialize};

/// How far a rhythm press may land from the nearest cue and still count.
pub const RHYTHM_TOLERANCE_MS: u64 = 300;

/// The seven exercises of the assessment battery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantId {
    FreeCount,
    PhraseCopy,
    SequenceCopy,
    DualTask,
    Rhythm,
    TimedPhrase,
    MultiBlock,
}

impl VariantId {
    pub const ALL: [VariantId; 7] = [
        VariantId::FreeCount,
        VariantId::PhraseCopy,
        VariantId::SequenceCopy,
        VariantId::DualTask,
        VariantId::Rhythm,
        VariantId::TimedPhrase,
        VariantId::MultiBlock,
    ];

    /// Position of this exercise in the battery, 1-based.
    pub fn test_number(self) -> u8 {
        match self {
            VariantId::FreeCount => 1,
            VariantId::PhraseCopy => 2,
            VariantId::SequenceCopy => 3,
            VariantId::DualTask => 4,
            VariantId::Rhythm => 5,
            VariantId::TimedPhrase => 6,
            VariantId::MultiBlock => 7,
        }
    }

    /// Stable identifier used as the storage discriminator, e.g. `"test4"`.
    pub fn slug(self) -> &'static str {
        match self {
            VariantId::FreeCount => "test1",
            VariantId::PhraseCopy => "test2",
            VariantId::SequenceCopy => "test3",
            VariantId::DualTask => "test4",
            VariantId::Rhythm => "test5",
            VariantId::TimedPhrase => "test6",
            VariantId::MultiBlock => "test7",
        }
    }
}

/// Per-variant classification rule, selected once at configuration time.
/// Several variants share a rule and differ only in config parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum ScoringStrategy {
    /// Count presses of one target character over a fixed window.
    FreeCount { target: char },
    /// Position-exact comparison against the target text. `cyclic` repeats
    /// the target indefinitely for sequence drills.
    PhraseCopy { cyclic: bool },
    /// Phrase copy plus a concurrent color-counting task.
    DualTask,
    /// Target character gated by proximity to the cue schedule.
    Rhythm { target: char },
    /// Position-exact comparison against the current text block.
    MultiBlock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchMode {
    ExactCharacter,
    CaseInsensitivePhrase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CueConfig {
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
}

/// Fixed configuration of one exercise. Built via [`SessionConfig::preset`];
/// the constants mirror the clinical battery this engine was built for.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub variant: VariantId,
    pub strategy: ScoringStrategy,
    /// Deadline for duration-terminated variants.
    pub duration_ms: Option<u64>,
    pub target_text: Option<String>,
    pub text_blocks: Option<Vec<String>>,
    pub match_mode: MatchMode,
    pub cue: Option<CueConfig>,
}

const TARGET_PHRASE: &str = "Lupra zenok tir";
const TARGET_SEQUENCE: &str = "asdf";

const PASSAGE_BLOCKS: [&str; 5] = [
    "El sol brilla sobre el",
    "lago. Los niños juegan",
    "en la orilla. Un perro",
    "ladra desde la barca.",
    "Todos ríen bajo el cielo.",
];

impl SessionConfig {
    pub fn preset(variant: VariantId) -> Self {
        match variant {
            VariantId::FreeCount => Self {
                variant,
                strategy: ScoringStrategy::FreeCount { target: 'k' },
                duration_ms: Some(15_000),
                target_text: None,
                text_blocks: None,
                match_mode: MatchMode::ExactCharacter,
                cue: None,
            },
            VariantId::PhraseCopy => Self {
                variant,
                strategy: ScoringStrategy::PhraseCopy { cyclic: false },
                duration_ms: None,
                target_text: Some(TARGET_PHRASE.to_string()),
                text_blocks: None,
                match_mode: MatchMode::CaseInsensitivePhrase,
                cue: None,
            },
            VariantId::SequenceCopy => Self {
                variant,
                strategy: ScoringStrategy::PhraseCopy { cyclic: true },
                duration_ms: Some(30_000),
                target_text: Some(TARGET_SEQUENCE.to_string()),
                text_blocks: None,
                match_mode: MatchMode::ExactCharacter,
                cue: None,
            },
            VariantId::DualTask => Self {
                variant,
                strategy: ScoringStrategy::DualTask,
                duration_ms: Some(30_000),
                target_text: Some(TARGET_PHRASE.to_string()),
                text_blocks: None,
                match_mode: MatchMode::CaseInsensitivePhrase,
                cue: Some(CueConfig {
                    initial_delay_ms: 0,
                    interval_ms: 2_000,
                }),
            },
            VariantId::Rhythm => Self {
                variant,
                strategy: ScoringStrategy::Rhythm { target: 'k' },
                duration_ms: Some(15_000),
                target_text: None,
                text_blocks: None,
                match_mode: MatchMode::ExactCharacter,
                cue: Some(CueConfig {
                    initial_delay_ms: 500,
                    interval_ms: 1_000,
                }),
            },
            VariantId::TimedPhrase => Self {
                variant,
                strategy: ScoringStrategy::PhraseCopy { cyclic: false },
                duration_ms: Some(30_000),
                target_text: Some(TARGET_PHRASE.to_string()),
                text_blocks: None,
                match_mode: MatchMode::CaseInsensitivePhrase,
                cue: None,
            },
            VariantId::MultiBlock => Self {
                variant,
                strategy: ScoringStrategy::MultiBlock,
                duration_ms: Some(300_000),
                target_text: None,
                text_blocks: Some(PASSAGE_BLOCKS.iter().map(|b| b.to_string()).collect()),
                match_mode: MatchMode::CaseInsensitivePhrase,
                cue: None,
            },
        }
    }

    /// Whether a full case-insensitive target match ends the session.
    pub fn ends_on_phrase_match(&self) -> bool {
        self.match_mode == MatchMode::CaseInsensitivePhrase
            && matches!(
                self.strategy,
                ScoringStrategy::PhraseCopy { cyclic: false } | ScoringStrategy::DualTask
            )
    }
}

/// Outcome of classifying a single inserted character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub correct: bool,
    pub deviation_ms: Option<u64>,
    pub expected_time_ms: Option<u64>,
}

impl Classification {
    fn plain(correct: bool) -> Self {
        Self {
            correct,
            deviation_ms: None,
            expected_time_ms: None,
        }
    }
}

fn expected_char(target: &str, idx: usize, cyclic: bool) -> Option<char> {
    let len = target.chars().count();
    if len == 0 {
        return None;
    }
    let idx = if cyclic { idx % len } else { idx };
    target.chars().nth(idx)
}

/// Case-insensitive full-text match, used for phrase and block completion.
pub fn phrase_complete(target: &str, text: &str) -> bool {
    text.to_lowercase() == target.to_lowercase()
}

/// Classify one inserted character against the active target state.
///
/// `new_len` is the character count of the field after the insert, so the
/// position being judged is `new_len - 1` — position-exact on purpose: an
/// earlier mistake shifts every later comparison, which is exactly the
/// raw error signal the battery wants.
pub fn classify_insert(
    config: &SessionConfig,
    ch: char,
    new_len: usize,
    now_ms: u64,
    schedule: Option<&StimulusSchedule>,
    current_block: Option<&str>,
) -> Classification {
    let idx = new_len.saturating_sub(1);
    match &config.strategy {
        ScoringStrategy::FreeCount { target } => {
            Classification::plain(ch.eq_ignore_ascii_case(target))
        }
        ScoringStrategy::PhraseCopy { cyclic } => {
            let expected = config
                .target_text
                .as_deref()
                .and_then(|t| expected_char(t, idx, *cyclic));
            Classification::plain(expected == Some(ch))
        }
        ScoringStrategy::DualTask => {
            let expected = config
                .target_text
                .as_deref()
                .and_then(|t| expected_char(t, idx, false));
            Classification::plain(expected == Some(ch))
        }
        ScoringStrategy::Rhythm { target } => match schedule {
            Some(s) => {
                let (expected_time, deviation) = match s.nearest(now_ms) {
                    Some(pair) => pair,
                    None => {
                        return Classification {
                            correct: false,
                            deviation_ms: Some(UNMATCHED_DEVIATION_MS),
                            expected_time_ms: None,
                        }
                    }
                };
                Classification {
                    correct: ch.eq_ignore_ascii_case(target)
                        && deviation <= RHYTHM_TOLERANCE_MS,
                    deviation_ms: Some(deviation),
                    expected_time_ms: Some(expected_time),
                }
            }
            // no schedule: degrade to unmatched, never fail the press
            None => Classification {
                correct: false,
                deviation_ms: Some(UNMATCHED_DEVIATION_MS),
                expected_time_ms: None,
            },
        },
        ScoringStrategy::MultiBlock => {
            let expected = current_block.and_then(|b| expected_char(b, idx, false));
            Classification::plain(expected == Some(ch))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::StimulusSchedule;

    #[test]
    fn every_variant_has_a_preset() {
        for v in VariantId::ALL {
            let cfg = SessionConfig::preset(v);
            assert_eq!(cfg.variant, v);
        }
    }

    #[test]
    fn variant_slugs_are_stable() {
        assert_eq!(VariantId::FreeCount.slug(), "test1");
        assert_eq!(VariantId::MultiBlock.slug(), "test7");
        assert_eq!(VariantId::DualTask.test_number(), 4);
    }

    #[test]
    fn free_count_folds_case() {
        let cfg = SessionConfig::preset(VariantId::FreeCount);
        assert!(classify_insert(&cfg, 'k', 1, 100, None, None).correct);
        assert!(classify_insert(&cfg, 'K', 2, 200, None, None).correct);
        assert!(!classify_insert(&cfg, 'x', 3, 300, None, None).correct);
    }

    #[test]
    fn phrase_copy_is_position_exact() {
        let mut cfg = SessionConfig::preset(VariantId::PhraseCopy);
        cfg.target_text = Some("cat".to_string());
        assert!(classify_insert(&cfg, 'c', 1, 0, None, None).correct);
        // a wrong char at position 2 stays wrong even though 'x' appears nowhere
        assert!(!classify_insert(&cfg, 'x', 2, 0, None, None).correct);
        assert!(classify_insert(&cfg, 't', 3, 0, None, None).correct);
        // past the end of the target nothing can be correct
        assert!(!classify_insert(&cfg, 't', 4, 0, None, None).correct);
    }

    #[test]
    fn phrase_copy_chars_are_case_sensitive() {
        let mut cfg = SessionConfig::preset(VariantId::PhraseCopy);
        cfg.target_text = Some("Cat".to_string());
        assert!(!classify_insert(&cfg, 'c', 1, 0, None, None).correct);
        assert!(classify_insert(&cfg, 'C', 1, 0, None, None).correct);
    }

    #[test]
    fn sequence_copy_cycles_the_target() {
        let cfg = SessionConfig::preset(VariantId::SequenceCopy);
        // "asdf" repeated: position 4 expects 'a' again
        assert!(classify_insert(&cfg, 'a', 1, 0, None, None).correct);
        assert!(classify_insert(&cfg, 'f', 4, 0, None, None).correct);
        assert!(classify_insert(&cfg, 'a', 5, 0, None, None).correct);
        assert!(!classify_insert(&cfg, 'f', 5, 0, None, None).correct);
    }

    #[test]
    fn rhythm_needs_char_and_timing() {
        let cfg = SessionConfig::preset(VariantId::Rhythm);
        let s = StimulusSchedule::build(500, 1000, 2_500);

        let c = classify_insert(&cfg, 'k', 1, 520, Some(&s), None);
        assert!(c.correct);
        assert_eq!(c.deviation_ms, Some(20));
        assert_eq!(c.expected_time_ms, Some(500));

        // right time, wrong key
        let c = classify_insert(&cfg, 'a', 2, 520, Some(&s), None);
        assert!(!c.correct);
        assert_eq!(c.deviation_ms, Some(20));

        // right key, dead between two cues
        let c = classify_insert(&cfg, 'k', 3, 1000, Some(&s), None);
        assert!(!c.correct);
        assert_eq!(c.deviation_ms, Some(500));
    }

    #[test]
    fn rhythm_without_schedule_degrades_to_unmatched() {
        let cfg = SessionConfig::preset(VariantId::Rhythm);
        let c = classify_insert(&cfg, 'k', 1, 520, None, None);
        assert!(!c.correct);
        assert_eq!(c.deviation_ms, Some(UNMATCHED_DEVIATION_MS));
        assert_eq!(c.expected_time_ms, None);
    }

    #[test]
    fn multi_block_scores_against_current_block() {
        let cfg = SessionConfig::preset(VariantId::MultiBlock);
        assert!(classify_insert(&cfg, 'a', 1, 0, None, Some("ab")).correct);
        assert!(!classify_insert(&cfg, 'b', 1, 0, None, Some("ab")).correct);
        assert!(classify_insert(&cfg, 'b', 2, 0, None, Some("ab")).correct);
    }

    #[test]
    fn phrase_completion_ignores_case_including_unicode() {
        assert!(phrase_complete("Lupra zenok tir", "lupra Zenok TIR"));
        assert!(phrase_complete("Todos ríen bajo el cielo.", "todos RÍEN bajo el cielo."));
        assert!(!phrase_complete("cat", "cxt"));
    }

    #[test]
    fn termination_modes_per_variant() {
        assert!(SessionConfig::preset(VariantId::PhraseCopy).ends_on_phrase_match());
        assert!(SessionConfig::preset(VariantId::DualTask).ends_on_phrase_match());
        assert!(SessionConfig::preset(VariantId::TimedPhrase).ends_on_phrase_match());
        assert!(!SessionConfig::preset(VariantId::FreeCount).ends_on_phrase_match());
        assert!(!SessionConfig::preset(VariantId::SequenceCopy).ends_on_phrase_match());
        assert!(!SessionConfig::preset(VariantId::MultiBlock).ends_on_phrase_match());
    }
}
