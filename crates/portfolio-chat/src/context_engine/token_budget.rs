//! Keeps system prompt + history + message under the model's input budget
//!
//! Reduction runs in three stages, each only if the previous one left the
//! request over the threshold: drop oldest history, shrink the context
//! section of the prompt, truncate the prompt.

use tracing::{debug, info, warn};

use super::prompt_builder::CONTEXT_SECTION_MARKER;
use crate::memory::Message;
use crate::utils::TextUtils;

/// Start of every context block inside the context section
pub const CONTEXT_BLOCK_PREFIX: &str = "### ";

pub const TRUNCATION_MARKER: &str = "\n\n[... context truncated to fit the token limit ...]";

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Model context window in tokens
    pub context_limit: usize,
    /// Tokens kept free for the answer
    pub response_reserve: usize,
    /// Fraction of the safe limit that triggers reduction
    pub threshold_ratio: f64,
    /// Extra tokens removed beyond the deficit when dropping history
    pub safety_margin: usize,
    pub per_message_overhead: usize,
    pub request_overhead: usize,
    pub min_history: usize,
    pub min_contexts: usize,
    /// Fraction of the safe limit (in chars) the prompt is cut to in the last stage
    pub truncate_ratio: f64,
    pub chars_per_token: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            context_limit: 120_000,
            response_reserve: 4_000,
            threshold_ratio: 0.8,
            safety_margin: 1_000,
            per_message_overhead: 10,
            request_overhead: 100,
            min_history: 2,
            min_contexts: 1,
            truncate_ratio: 0.8,
            chars_per_token: 4.0,
        }
    }
}

impl BudgetConfig {
    pub fn safe_limit(&self) -> usize {
        self.context_limit.saturating_sub(self.response_reserve)
    }

    pub fn threshold(&self) -> usize {
        (self.safe_limit() as f64 * self.threshold_ratio) as usize
    }

    fn max_prompt_chars(&self) -> usize {
        (self.safe_limit() as f64 * self.chars_per_token * self.truncate_ratio) as usize
    }
}

/// Character-count token estimator
#[derive(Debug, Clone, Copy)]
pub struct TokenCounter {
    chars_per_token: f64,
    per_message_overhead: usize,
}

impl TokenCounter {
    pub fn new(chars_per_token: f64, per_message_overhead: usize) -> Self {
        Self {
            chars_per_token: if chars_per_token > 0.0 { chars_per_token } else { 4.0 },
            per_message_overhead,
        }
    }

    pub fn count(&self, text: &str) -> usize {
        if TextUtils::is_blank(text) {
            return 0;
        }
        (text.chars().count() as f64 / self.chars_per_token).ceil() as usize
    }

    pub fn count_message(&self, message: &Message) -> usize {
        self.count(&message.content) + self.per_message_overhead
    }

    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        let config = BudgetConfig::default();
        Self::new(config.chars_per_token, config.per_message_overhead)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBudgetResult {
    pub prompt: String,
    pub history: Vec<Message>,
    pub token_estimate: usize,
    pub was_reduced: bool,
}

pub struct TokenBudget {
    config: BudgetConfig,
    counter: TokenCounter,
}

impl TokenBudget {
    pub fn new(config: BudgetConfig) -> Self {
        let counter = TokenCounter::new(config.chars_per_token, config.per_message_overhead);
        Self { config, counter }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    fn total(&self, prompt: &str, history: &[Message], message: &str) -> usize {
        self.counter.count(prompt)
            + self.counter.count_messages(history)
            + self.counter.count(message)
            + self.config.request_overhead
    }

    pub fn optimize(
        &self,
        system_prompt: &str,
        history: &[Message],
        current_message: &str,
    ) -> TokenBudgetResult {
        let threshold = self.config.threshold();
        let initial = self.total(system_prompt, history, current_message);

        if initial <= threshold {
            debug!("Token estimate {} within threshold {}", initial, threshold);
            return TokenBudgetResult {
                prompt: system_prompt.to_string(),
                history: history.to_vec(),
                token_estimate: initial,
                was_reduced: false,
            };
        }

        info!(
            "Token estimate {} exceeds threshold {} (safe limit {}), reducing",
            initial,
            threshold,
            self.config.safe_limit()
        );

        let mut prompt = system_prompt.to_string();
        let history = self.drop_oldest_history(history, initial - threshold + self.config.safety_margin);
        let mut total = self.total(&prompt, &history, current_message);
        info!("After history reduction: {} messages, ~{} tokens", history.len(), total);

        let mut has_context_section = prompt.contains(CONTEXT_SECTION_MARKER);
        if total > threshold && has_context_section {
            match self.shrink_context_section(&prompt) {
                Some(shrunk) => {
                    prompt = shrunk;
                    total = self.total(&prompt, &history, current_message);
                    info!("After context reduction: ~{} tokens", total);
                }
                None => has_context_section = false,
            }
        }

        if total > threshold || !has_context_section {
            let max_chars = self.config.max_prompt_chars();
            if prompt.chars().count() > max_chars {
                let mut truncated = TextUtils::truncate_chars(&prompt, max_chars).to_string();
                truncated.push_str(TRUNCATION_MARKER);
                prompt = truncated;
                total = self.total(&prompt, &history, current_message);
                info!("After prompt truncation ({} chars): ~{} tokens", max_chars, total);
            }
        }

        if total > threshold {
            warn!("Request still estimated at {} tokens after reduction (threshold {})", total, threshold);
        }

        TokenBudgetResult {
            prompt,
            history,
            token_estimate: total,
            was_reduced: true,
        }
    }

    fn drop_oldest_history(&self, history: &[Message], tokens_to_remove: usize) -> Vec<Message> {
        let mut start = 0;
        let mut removed = 0;
        while removed < tokens_to_remove && history.len() - start > self.config.min_history {
            removed += self.counter.count_message(&history[start]);
            start += 1;
        }
        if start > 0 {
            debug!("Dropped {} oldest messages (~{} tokens)", start, removed);
        }
        history[start..].to_vec()
    }

    /// Keeps the prompt prefix and header verbatim plus about half of the `### ` blocks.
    /// None when the section has no blocks to drop.
    fn shrink_context_section(&self, prompt: &str) -> Option<String> {
        let marker_at = prompt.find(CONTEXT_SECTION_MARKER)?;
        let section_start = marker_at + CONTEXT_SECTION_MARKER.len();
        let (head, section) = prompt.split_at(section_start);

        let starts: Vec<usize> = section
            .match_indices(CONTEXT_BLOCK_PREFIX)
            .map(|(i, _)| i)
            .collect();
        if starts.is_empty() {
            return None;
        }

        let keep = (starts.len() / 2).max(self.config.min_contexts);
        if keep >= starts.len() {
            return None;
        }

        debug!("Keeping {} of {} context blocks", keep, starts.len());
        let end = starts[keep];
        let mut shrunk = String::with_capacity(head.len() + end);
        shrunk.push_str(head);
        shrunk.push_str(section[..end].trim_end());
        Some(shrunk)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Threshold of 900 tokens with no response reserve
    fn small_budget() -> TokenBudget {
        TokenBudget::new(BudgetConfig {
            context_limit: 1125,
            response_reserve: 0,
            ..Default::default()
        })
    }

    fn history_of(count: usize, chars: usize) -> Vec<Message> {
        (0..count)
            .map(|i| {
                let body = format!("{i:03}");
                let filler = "x".repeat(chars - body.len());
                if i % 2 == 0 {
                    Message::user(format!("{body}{filler}"))
                } else {
                    Message::assistant(format!("{body}{filler}"))
                }
            })
            .collect()
    }

    fn prompt_with_blocks(prefix_chars: usize, blocks: usize, block_chars: usize) -> String {
        let mut prompt = "p".repeat(prefix_chars);
        prompt.push_str(CONTEXT_SECTION_MARKER);
        for i in 0..blocks {
            prompt.push_str(&format!("\n\n{}doc{}\n{}", CONTEXT_BLOCK_PREFIX, i, "c".repeat(block_chars)));
        }
        prompt
    }

    #[test]
    fn test_counter_estimates() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("   "), 0);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
        // chars, not bytes
        assert_eq!(counter.count("ação"), 1);
        assert_eq!(counter.count_messages(&[Message::user("abcd"), Message::user("")]), 21);
    }

    #[test]
    fn test_thresholds_from_defaults() {
        let config = BudgetConfig::default();
        assert_eq!(config.safe_limit(), 116_000);
        assert_eq!(config.threshold(), 92_800);
        assert_eq!(config.max_prompt_chars(), 371_200);
    }

    #[test]
    fn test_below_threshold_is_untouched() {
        let budget = TokenBudget::default();
        let prompt = prompt_with_blocks(100, 3, 100);
        let history = history_of(4, 40);

        let result = budget.optimize(&prompt, &history, "olá");
        assert!(!result.was_reduced);
        assert_eq!(result.prompt, prompt);
        assert_eq!(result.history, history);
        assert_eq!(result.token_estimate, budget.counter().count(&prompt) + 4 * 20 + 1 + 100);
    }

    #[test]
    fn test_history_dropped_before_prompt() {
        let budget = small_budget();
        let prompt = "s".repeat(2000); // 500 tokens
        let history = history_of(20, 200); // 20 x (50 + 10)

        let result = budget.optimize(&prompt, &history, "");
        assert!(result.was_reduced);
        assert_eq!(result.prompt, prompt);
        assert_eq!(result.history.len(), 2);
        assert_eq!(result.history[0].content, history[18].content);
        assert_eq!(result.history[1].content, history[19].content);
        assert_eq!(result.token_estimate, 500 + 120 + 100);
    }

    #[test]
    fn test_history_floor_is_respected() {
        let budget = small_budget();
        let prompt = "s".repeat(8000);
        let history = history_of(3, 40);

        let result = budget.optimize(&prompt, &history, "");
        assert!(result.was_reduced);
        assert_eq!(result.history.len(), 2);
    }

    #[test]
    fn test_context_section_shrinks_to_half() {
        let budget = small_budget();
        // 100 prefix chars + 6 blocks of ~1000 chars, about 1550 tokens
        let prompt = prompt_with_blocks(100, 6, 1000);

        let result = budget.optimize(&prompt, &[], "");
        assert!(result.was_reduced);
        assert!(result.prompt.starts_with(&"p".repeat(100)));
        assert!(result.prompt.contains(CONTEXT_SECTION_MARKER));
        assert!(result.prompt.contains("### doc2"));
        assert!(!result.prompt.contains("### doc3"));
        assert!(!result.prompt.ends_with(TRUNCATION_MARKER));
        assert!(result.token_estimate <= budget.config().threshold());
    }

    #[test]
    fn test_single_block_is_kept_then_truncated() {
        let budget = small_budget();
        let prompt = prompt_with_blocks(10, 1, 6000);

        let result = budget.optimize(&prompt, &[], "");
        assert!(result.was_reduced);
        assert!(result.prompt.contains("### doc0"));
        assert!(result.prompt.ends_with(TRUNCATION_MARKER));
        let max_chars = budget.config().max_prompt_chars();
        assert_eq!(result.prompt.chars().count(), max_chars + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_prompt_without_context_section_is_truncated() {
        let budget = small_budget();
        let prompt = "z".repeat(10_000);

        let result = budget.optimize(&prompt, &history_of(2, 40), "oi");
        assert!(result.was_reduced);
        assert!(result.prompt.ends_with(TRUNCATION_MARKER));
        assert!(result.prompt.starts_with("zzz"));
        assert!(result.token_estimate < 2500);
    }

    #[test]
    fn test_still_over_budget_is_reported_not_failed() {
        let budget = TokenBudget::new(BudgetConfig {
            context_limit: 200,
            response_reserve: 0,
            ..Default::default()
        });
        let result = budget.optimize("", &history_of(2, 2000), &"m".repeat(4000));
        assert!(result.was_reduced);
        assert!(result.token_estimate > budget.config().threshold());
        assert_eq!(result.history.len(), 2);
    }
}
