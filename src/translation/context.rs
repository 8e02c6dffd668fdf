/*!
 * Rolling context window.
 *
 * Keeps the most recently translated cues of a file so that later batches can
 * be sent with a short digest of what came before.
 */

use std::collections::VecDeque;

use crate::app_config::ContextConfig;

/// Bounded window over recently translated cue texts
#[derive(Debug, Clone)]
pub struct ContextDigest {
    max_cues: usize,
    max_chars: usize,
    recent: VecDeque<String>,
}

impl ContextDigest {
    pub fn new(max_cues: usize, max_chars: usize) -> Self {
        Self {
            max_cues,
            max_chars,
            recent: VecDeque::with_capacity(max_cues),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.max_cues, config.max_chars)
    }

    /// Append translated cues (one line group per cue), oldest first
    pub fn record(&mut self, translated: &[Vec<String>]) {
        if self.max_cues == 0 {
            return;
        }
        for lines in translated {
            let joined = lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if joined.is_empty() {
                continue;
            }
            if self.recent.len() == self.max_cues {
                self.recent.pop_front();
            }
            self.recent.push_back(joined);
        }
    }

    /// Render the digest, one cue per line.
    ///
    /// Older cues are dropped until the text fits `max_chars`. When the newest
    /// cue alone is too long only its tail is kept.
    pub fn render(&self) -> String {
        if self.max_chars == 0 {
            return String::new();
        }

        let mut kept: Vec<&str> = Vec::new();
        let mut used = 0;
        for text in self.recent.iter().rev() {
            let len = text.chars().count();
            let extra = if kept.is_empty() { len } else { len + 1 };
            if used + extra > self.max_chars {
                break;
            }
            used += extra;
            kept.push(text);
        }

        if kept.is_empty() {
            return match self.recent.back() {
                Some(newest) => {
                    let skip = newest.chars().count().saturating_sub(self.max_chars);
                    newest.chars().skip(skip).collect()
                }
                None => String::new(),
            };
        }

        kept.reverse();
        kept.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }
}
