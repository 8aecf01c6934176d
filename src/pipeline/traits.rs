use candle_core::Tensor;

use crate::error::ScorerError;
use crate::scoring::Vocabulary;

/// The four neural computations the scorer drives, treated as a black box.
///
/// Word-index tensors are `u32` vectors with one entry per hypothesis row.
/// Errors are returned unchanged to the caller of the scorer.
pub trait NeuralOracle: Send + Sync {
    /// Source representation; the first returned channel is the context.
    fn encode_representation(&self, tokens: &[u32]) -> candle_core::Result<Vec<Tensor>>;

    /// Initial decoder state row derived from a context.
    fn init_state(&self, context: &Tensor) -> candle_core::Result<Tensor>;

    /// One probability distribution over the target vocabulary per state row.
    fn next_probabilities(
        &self,
        context: &Tensor,
        step: usize,
        previous_words: &Tensor,
        state: &Tensor,
    ) -> candle_core::Result<Tensor>;

    /// Next state row for each state row after consuming `words`.
    fn next_state(
        &self,
        context: &Tensor,
        step: usize,
        words: &Tensor,
        state: &Tensor,
    ) -> candle_core::Result<Tensor>;

    fn device_label(&self) -> String {
        "cpu".to_string()
    }
}

/// Turns a raw source sentence into source-vocabulary indices.
pub trait SentencePreparer: Send + Sync {
    fn prepare(&self, sentence: &str, vocab: &Vocabulary) -> Result<Vec<u32>, ScorerError>;
}
