/*!
 * Batch packing.
 *
 * Cues are packed greedily, in order, into batches bounded by a cue count and
 * a cost budget. A cue is never split; a cue that alone exceeds the budget
 * gets a batch of its own.
 */

use log::{debug, error, warn};

use crate::app_config::{BudgetUnit, ChunkingConfig};
use crate::subtitle_codec::Cue;

/// Measures how much of the batch budget a cue uses
pub trait CostEstimator: Send + Sync {
    fn cost(&self, cue: &Cue) -> usize;
}

/// Unicode scalar count of the cue text
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCount;

impl CostEstimator for CharCount {
    fn cost(&self, cue: &Cue) -> usize {
        cue.char_count()
    }
}

/// Rough token estimate, four characters per token
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokens;

impl CostEstimator for ApproxTokens {
    fn cost(&self, cue: &Cue) -> usize {
        cue.char_count().div_ceil(4)
    }
}

// @struct: Group of consecutive cues sent in one request
#[derive(Debug, Clone, PartialEq)]
pub struct CueBatch {
    // @field: Position of the batch in its file, from 0
    pub ordinal: usize,

    // @field: Cues, never empty
    pub cues: Vec<Cue>,

    pub source_language: String,

    pub target_language: String,

    // @field: Recently translated text, filled in right before the batch is sent
    pub context_digest: String,
}

impl CueBatch {
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

/// Splits cue lists into batches
pub struct Chunker {
    max_units: usize,
    max_cost: usize,
    estimator: Box<dyn CostEstimator>,
}

impl Chunker {
    /// Create a chunker counting characters. Limits below 1 are raised to 1.
    pub fn new(max_units_per_batch: usize, max_cost_per_batch: usize) -> Self {
        Self {
            max_units: max_units_per_batch.max(1),
            max_cost: max_cost_per_batch.max(1),
            estimator: Box::new(CharCount),
        }
    }

    /// Replace the cost function
    pub fn with_estimator(mut self, estimator: Box<dyn CostEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        let chunker = Self::new(config.max_units_per_batch, config.max_chars_per_batch);
        match config.budget_unit {
            BudgetUnit::Chars => chunker,
            BudgetUnit::Tokens => chunker.with_estimator(Box::new(ApproxTokens)),
        }
    }

    pub fn max_units(&self) -> usize {
        self.max_units
    }

    pub fn max_cost(&self) -> usize {
        self.max_cost
    }

    /// Partition `cues` into ordered batches covering every cue exactly once
    pub fn split(&self, cues: &[Cue], source_language: &str, target_language: &str) -> Vec<CueBatch> {
        if cues.is_empty() {
            warn!("No subtitle cues to split into batches");
            return Vec::new();
        }

        let mut groups: Vec<Vec<Cue>> = Vec::new();
        let mut current: Vec<Cue> = Vec::with_capacity(self.max_units);
        let mut current_cost = 0;

        for cue in cues {
            let cost = self.estimator.cost(cue);

            if cost > self.max_cost {
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                    current_cost = 0;
                }
                debug!("Cue {} is oversized (cost {}), placing it in its own batch", cue.index, cost);
                groups.push(vec![cue.clone()]);
                continue;
            }

            if !current.is_empty() && (current_cost + cost > self.max_cost || current.len() >= self.max_units) {
                groups.push(std::mem::take(&mut current));
                current_cost = 0;
            }

            current.push(cue.clone());
            current_cost += cost;
        }

        if !current.is_empty() {
            groups.push(current);
        }

        let packed: usize = groups.iter().map(Vec::len).sum();
        if packed != cues.len() {
            error!("Lost cues during batching: {} in, {} out", cues.len(), packed);
        } else if log::max_level() >= log::LevelFilter::Debug {
            for (i, group) in groups.iter().enumerate() {
                let cost: usize = group.iter().map(|c| self.estimator.cost(c)).sum();
                debug!("Batch {}: {} cues, cost {}", i + 1, group.len(), cost);
            }
        }

        groups
            .into_iter()
            .enumerate()
            .map(|(ordinal, cues)| CueBatch {
                ordinal,
                cues,
                source_language: source_language.to_string(),
                target_language: target_language.to_string(),
                context_digest: String::new(),
            })
            .collect()
    }
}
