/*!
 * Tests for batch packing
 */

use translatity::app_config::{BudgetUnit, ChunkingConfig};
use translatity::subtitle_codec::{Cue, SubtitleCodec};
use translatity::translation::chunker::{ApproxTokens, Chunker, CostEstimator};
use crate::common;

fn varied_cues() -> Vec<Cue> {
    let texts = ["Hi", "How are you doing today?", "Fine.", "A much longer line that takes real space on screen", "Ok", "Bye"];
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Cue::from_text(i + 1, i as u64 * 1000, i as u64 * 1000 + 800, t))
        .collect()
}

/// Test the ten cue, four per batch scenario
#[test]
fn test_split_withTenCuesFourPerBatch_shouldMakeThreeBatches() {
    let cues = SubtitleCodec::parse(&common::sample_srt(10)).unwrap();
    let batches = Chunker::new(4, 100_000).split(&cues, "en", "fr");

    assert_eq!(batches.iter().map(|b| b.cues.len()).collect::<Vec<_>>(), vec![4, 4, 2]);
    assert_eq!(batches[2].cues[0].index, 9);
    assert!(batches.iter().all(|b| b.context_digest.is_empty()));
    assert!(batches.iter().all(|b| b.source_language == "en" && b.target_language == "fr"));
}

/// Test that every batch stays within both limits unless it holds a single oversized cue
#[test]
fn test_split_withVariedCues_shouldStayWithinBounds() {
    let cues = varied_cues();
    for (max_units, max_cost) in [(1, 10), (2, 30), (3, 60), (10, 25)] {
        let chunker = Chunker::new(max_units, max_cost);
        let batches = chunker.split(&cues, "en", "de");

        let flattened: Vec<Cue> = batches.iter().flat_map(|b| b.cues.clone()).collect();
        assert_eq!(flattened, cues);

        for batch in &batches {
            let cost: usize = batch.cues.iter().map(|c| c.char_count()).sum();
            assert!(!batch.is_empty());
            assert!(batch.len() <= max_units);
            assert!(cost <= max_cost || batch.len() == 1);
        }
    }
}

/// Test that the token budget packs more text per batch than the char budget
#[test]
fn test_from_config_withTokenBudget_shouldUseTokenEstimate() {
    let cues = varied_cues();
    let char_config = ChunkingConfig { max_units_per_batch: 100, max_chars_per_batch: 20, budget_unit: BudgetUnit::Chars };
    let token_config = ChunkingConfig { budget_unit: BudgetUnit::Tokens, ..char_config.clone() };

    let by_chars = Chunker::from_config(&char_config).split(&cues, "en", "fr");
    let by_tokens = Chunker::from_config(&token_config).split(&cues, "en", "fr");

    assert!(by_tokens.len() < by_chars.len());
    let token_cost: usize = by_tokens[0].cues.iter().map(|c| ApproxTokens.cost(c)).sum();
    assert!(token_cost <= 20);
}

/// Test a custom cost estimator
#[test]
fn test_with_estimator_withFlatCost_shouldCountCues() {
    struct Flat;
    impl CostEstimator for Flat {
        fn cost(&self, _cue: &Cue) -> usize {
            10
        }
    }

    let batches = Chunker::new(100, 30).with_estimator(Box::new(Flat)).split(&varied_cues(), "en", "fr");
    assert_eq!(batches.iter().map(|b| b.cues.len()).collect::<Vec<_>>(), vec![3, 3]);
}
