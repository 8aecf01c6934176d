use std::sync::Arc;

use candle_core::Tensor;

use crate::error::ScorerError;
use crate::pipeline::traits::NeuralOracle;
use crate::scoring::batching::{
    aligned_log_probabilities, as_batch_row, candidate_log_probabilities, index_tensor,
    replicate_row, split_states, stack_states, state_row,
};
use crate::scoring::{Timer, VocabularyMapper};
use crate::types::{AlignedScores, CandidateScores, ContextVector, DecoderState, ScoreResult};

/// Step marker passed to the probability and state oracles on every call.
pub const DECODING_STEP: usize = 0;

const ALIGNED: &str = "score_batch_aligned";
const ALIGNED_PROBS: &str = "score_batch_aligned.probs";
const ALIGNED_STATES: &str = "score_batch_aligned.states";

/// Stateless incremental scorer. Decoder state flows through caller-held
/// values; row `i` of every input list corresponds to row `i` of every output.
pub struct IncrementalScorer {
    oracle: Arc<dyn NeuralOracle>,
    vocab: Arc<VocabularyMapper>,
    timer: Arc<Timer>,
}

/// Batched previous words and states entering one oracle call.
struct Batch {
    previous: Vec<u32>,
    state: Tensor,
}

impl IncrementalScorer {
    pub fn new(oracle: Arc<dyn NeuralOracle>, vocab: Arc<VocabularyMapper>) -> Self {
        Self::with_timer(oracle, vocab, Arc::new(Timer::new()))
    }

    pub fn with_timer(
        oracle: Arc<dyn NeuralOracle>,
        vocab: Arc<VocabularyMapper>,
        timer: Arc<Timer>,
    ) -> Self {
        Self {
            oracle,
            vocab,
            timer,
        }
    }

    pub fn vocab(&self) -> &VocabularyMapper {
        &self.vocab
    }

    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    /// Scores `next_words` in order as one path through the model, starting
    /// after `last_word` (empty for none) from `state` (`None` derives the
    /// initial state from the context).
    pub fn score_one<S: AsRef<str>>(
        &self,
        next_words: &[S],
        context: &ContextVector,
        last_word: &str,
        state: Option<&DecoderState>,
    ) -> Result<ScoreResult, ScorerError> {
        if next_words.is_empty() {
            return Err(ScorerError::invalid_input("score_one needs at least one word"));
        }
        let device = context.tensor().device();
        let mut previous = self.vocab.lookup_previous(last_word);
        let mut current = match state {
            Some(state) => state_row(state)?,
            None => self.initial_row(context)?,
        };

        let mut log_prob = 0.0f64;
        for word in next_words {
            let index = self.vocab.lookup(word.as_ref());
            let previous_tensor = index_tensor(&[previous], device)?;
            let probs = self
                .oracle
                .next_probabilities(context.tensor(), DECODING_STEP, &previous_tensor, &current)
                .map_err(|e| ScorerError::oracle("next_probabilities", e))?;
            log_prob += aligned_log_probabilities(&probs, &[index])?[0];

            let word_tensor = index_tensor(&[index], device)?;
            current = self
                .oracle
                .next_state(context.tensor(), DECODING_STEP, &word_tensor, &current)
                .map_err(|e| ScorerError::oracle("next_state", e))?;
            previous = index;
        }

        Ok(ScoreResult {
            log_prob,
            state: DecoderState::new(as_batch_row(current)?),
        })
    }

    /// Single-word form of [`score_one`](Self::score_one).
    pub fn score_word(
        &self,
        next_word: &str,
        context: &ContextVector,
        last_word: &str,
        state: Option<&DecoderState>,
    ) -> Result<ScoreResult, ScorerError> {
        self.score_one(&[next_word], context, last_word, state)
    }

    /// Scores a shared candidate set against every hypothesis.
    ///
    /// The hypothesis count is `last_words.len()`, or 1 when it is empty.
    /// States are advanced once per candidate with that candidate broadcast
    /// to every hypothesis, so `states[c][h]` is hypothesis `h` continued by
    /// candidate `c`.
    pub fn score_batch_multi_next<S: AsRef<str>, L: AsRef<str>>(
        &self,
        candidates: &[S],
        context: &ContextVector,
        last_words: &[L],
        states: &[DecoderState],
    ) -> Result<CandidateScores, ScorerError> {
        let batch = self.prepare_batch(context, last_words, states)?;
        let count = batch.previous.len();
        let device = context.tensor().device();
        let candidate_indices: Vec<u32> = candidates
            .iter()
            .map(|word| self.vocab.lookup(word.as_ref()))
            .collect();

        let probs = self.probabilities(context, &batch, device)?;
        let scores = candidate_log_probabilities(&probs, count, &candidate_indices)?;

        let mut next_states = Vec::with_capacity(candidate_indices.len());
        for &index in &candidate_indices {
            let broadcast = index_tensor(&vec![index; count], device)?;
            let advanced = self
                .oracle
                .next_state(context.tensor(), DECODING_STEP, &broadcast, &batch.state)
                .map_err(|e| ScorerError::oracle("next_state", e))?;
            next_states.push(split_states(&advanced, count, "next_state")?);
        }

        Ok(CandidateScores {
            scores,
            states: next_states,
            unknown: self.unknown_flags(candidates),
        })
    }

    /// Scores `next_words[i]` against hypothesis `i` and advances each
    /// hypothesis by its own word. This is the per-expansion hot path and
    /// every stage is timed.
    pub fn score_batch_aligned<S: AsRef<str>, L: AsRef<str>>(
        &self,
        next_words: &[S],
        context: &ContextVector,
        last_words: &[L],
        states: &[DecoderState],
    ) -> Result<AlignedScores, ScorerError> {
        let _call = self.timer.scope(ALIGNED);
        let batch = self.prepare_batch(context, last_words, states)?;
        let count = batch.previous.len();
        if next_words.len() != count {
            return Err(ScorerError::invalid_input(format!(
                "{} next words for {} hypotheses",
                next_words.len(),
                count
            )));
        }
        let device = context.tensor().device();
        let next_indices: Vec<u32> = next_words
            .iter()
            .map(|word| self.vocab.lookup(word.as_ref()))
            .collect();

        let scores = {
            let _probs = self.timer.scope(ALIGNED_PROBS);
            let probs = self.probabilities(context, &batch, device)?;
            aligned_log_probabilities(&probs, &next_indices)?
        };

        let new_states = {
            let _states = self.timer.scope(ALIGNED_STATES);
            self.advance(context, &next_indices, &batch.state)?
        };

        Ok(AlignedScores {
            scores,
            states: new_states,
            unknown: self.unknown_flags(next_words),
        })
    }

    /// Advances each hypothesis by its own next word without scoring it.
    pub fn advance_states<S: AsRef<str>>(
        &self,
        next_words: &[S],
        context: &ContextVector,
        states: &[DecoderState],
    ) -> Result<Vec<DecoderState>, ScorerError> {
        if states.is_empty() || next_words.len() != states.len() {
            return Err(ScorerError::invalid_input(format!(
                "{} next words for {} states",
                next_words.len(),
                states.len()
            )));
        }
        let indices: Vec<u32> = next_words
            .iter()
            .map(|word| self.vocab.lookup(word.as_ref()))
            .collect();
        let stacked = stack_states(states)?;
        self.advance(context, &indices, &stacked)
    }

    /// `true` for each word absent from the target vocabulary.
    pub fn unknown_flags<S: AsRef<str>>(&self, words: &[S]) -> Vec<bool> {
        words
            .iter()
            .map(|word| !self.vocab.is_known(word.as_ref()))
            .collect()
    }

    /// `true` for each word present in the target vocabulary.
    pub fn is_known_batch<S: AsRef<str>>(&self, words: &[S]) -> Vec<bool> {
        self.vocab.is_known_batch(words)
    }

    /// N-best extraction is not provided by this scorer.
    pub fn nbest(&self, _state: &DecoderState) -> Option<Vec<(String, f64)>> {
        None
    }

    /// Decoder state a hypothesis starts from before any target word.
    pub fn initial_state(&self, context: &ContextVector) -> Result<DecoderState, ScorerError> {
        self.initial_row(context).map(DecoderState::new)
    }

    fn initial_row(&self, context: &ContextVector) -> Result<Tensor, ScorerError> {
        let state = self
            .oracle
            .init_state(context.tensor())
            .map_err(|e| ScorerError::oracle("init_state", e))?;
        as_batch_row(state)
    }

    fn prepare_batch<L: AsRef<str>>(
        &self,
        context: &ContextVector,
        last_words: &[L],
        states: &[DecoderState],
    ) -> Result<Batch, ScorerError> {
        let previous: Vec<u32> = if last_words.is_empty() {
            vec![crate::scoring::NO_PREVIOUS_WORD]
        } else {
            last_words
                .iter()
                .map(|word| self.vocab.lookup_previous(word.as_ref()))
                .collect()
        };
        let count = previous.len();

        let state = if states.is_empty() {
            replicate_row(&self.initial_row(context)?, count)?
        } else if states.len() == count {
            stack_states(states)?
        } else {
            return Err(ScorerError::invalid_input(format!(
                "{} states for {} hypotheses",
                states.len(),
                count
            )));
        };
        Ok(Batch { previous, state })
    }

    fn probabilities(
        &self,
        context: &ContextVector,
        batch: &Batch,
        device: &candle_core::Device,
    ) -> Result<Tensor, ScorerError> {
        let previous = index_tensor(&batch.previous, device)?;
        self.oracle
            .next_probabilities(context.tensor(), DECODING_STEP, &previous, &batch.state)
            .map_err(|e| ScorerError::oracle("next_probabilities", e))
    }

    fn advance(
        &self,
        context: &ContextVector,
        indices: &[u32],
        state: &Tensor,
    ) -> Result<Vec<DecoderState>, ScorerError> {
        let words = index_tensor(indices, context.tensor().device())?;
        let advanced = self
            .oracle
            .next_state(context.tensor(), DECODING_STEP, &words, state)
            .map_err(|e| ScorerError::oracle("next_state", e))?;
        split_states(&advanced, indices.len(), "next_state")
    }
}
