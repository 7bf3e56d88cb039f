//! Deterministic token estimation.
//!
//! Context budgeting needs a provider-independent estimate that is
//! cheap, monotonic in input length, and stable across runs. A fixed
//! characters-per-token ratio with ceiling rounding satisfies all
//! three; exact provider tokenization is never consulted here.

/// Fixed-ratio token estimator.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: usize,
    per_message_overhead: usize,
}

/// Default ratio: four characters per token.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Minimum per-message framing overhead, in tokens.
pub const MIN_MESSAGE_OVERHEAD: usize = 4;

impl TokenEstimator {
    /// Create an estimator with the default 4:1 ratio.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            per_message_overhead: MIN_MESSAGE_OVERHEAD,
        }
    }

    /// Create an estimator with a custom ratio.
    ///
    /// A ratio of zero is clamped to one; the per-message overhead is
    /// clamped to at least [`MIN_MESSAGE_OVERHEAD`].
    #[must_use]
    pub const fn with_ratio(chars_per_token: usize, per_message_overhead: usize) -> Self {
        let chars_per_token = if chars_per_token == 0 {
            1
        } else {
            chars_per_token
        };
        let per_message_overhead = if per_message_overhead < MIN_MESSAGE_OVERHEAD {
            MIN_MESSAGE_OVERHEAD
        } else {
            per_message_overhead
        };
        Self {
            chars_per_token,
            per_message_overhead,
        }
    }

    /// Estimate the token count of a text.
    ///
    /// Ceiling division: any non-empty text costs at least one token.
    #[must_use]
    pub const fn estimate(&self, text: &str) -> usize {
        text.len().div_ceil(self.chars_per_token)
    }

    /// Inverse mapping: how many characters fit in a token budget.
    #[must_use]
    pub const fn chars_for(&self, tokens: usize) -> usize {
        tokens.saturating_mul(self.chars_per_token)
    }

    /// Estimate the total cost of a list of message texts, including
    /// the fixed per-message framing overhead.
    #[must_use]
    pub fn estimate_messages<S: AsRef<str>>(&self, messages: &[S]) -> usize {
        messages.iter().fold(0usize, |acc, m| {
            acc.saturating_add(self.estimate(m.as_ref()))
                .saturating_add(self.per_message_overhead)
        })
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}
