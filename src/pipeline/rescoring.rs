use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::error::ScorerError;
use crate::pipeline::scorer::IncrementalScorer;
use crate::scoring::EOS_TOKEN;
use crate::types::{ContextVector, DecoderState};

/// Decoder-side state carried by a partial translation.
///
/// Two hypotheses with the same recent-word history are interchangeable for
/// recombination, so equality and ordering ignore the decoder tensor.
#[derive(Debug, Clone)]
pub struct HypothesisState {
    state: DecoderState,
    last_word: String,
    history: VecDeque<String>,
}

impl HypothesisState {
    /// State of a hypothesis that has produced no target words yet.
    pub fn initial(state: DecoderState) -> Self {
        Self {
            state,
            last_word: String::new(),
            history: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    /// Most recent target word, empty before the first word.
    pub fn last_word(&self) -> &str {
        &self.last_word
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    fn extend(&self, words: &[&str], state: DecoderState, state_length: usize) -> Self {
        let mut history = self.history.clone();
        history.extend(words.iter().map(|w| w.to_string()));
        while history.len() > state_length {
            history.pop_front();
        }
        let last_word = words
            .last()
            .map(|w| w.to_string())
            .unwrap_or_else(|| self.last_word.clone());
        Self {
            state,
            last_word,
            history,
        }
    }
}

impl PartialEq for HypothesisState {
    fn eq(&self, other: &Self) -> bool {
        self.history == other.history
    }
}

impl Eq for HypothesisState {}

impl PartialOrd for HypothesisState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HypothesisState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.history.cmp(&other.history)
    }
}

/// One hypothesis extended by one target phrase.
pub struct PhraseRequest<'a> {
    pub hypothesis: &'a HypothesisState,
    pub phrase: &'a [String],
    /// Appends the end-of-sequence token once the source is fully covered.
    pub source_complete: bool,
}

#[derive(Debug, Clone)]
pub struct PhraseScore {
    pub log_prob: f64,
    pub unknown_count: usize,
    pub next: HypothesisState,
}

/// Scores many phrase extensions with one aligned batch call per word position.
pub struct PhraseRescorer<'a> {
    scorer: &'a IncrementalScorer,
    batch_size: usize,
    state_length: usize,
}

impl<'a> PhraseRescorer<'a> {
    pub fn new(scorer: &'a IncrementalScorer, batch_size: usize, state_length: usize) -> Self {
        Self {
            scorer,
            batch_size: batch_size.max(1),
            state_length,
        }
    }

    pub fn initial_hypothesis(
        &self,
        context: &ContextVector,
    ) -> Result<HypothesisState, ScorerError> {
        self.scorer
            .initial_state(context)
            .map(HypothesisState::initial)
    }

    /// Results are returned in request order.
    pub fn rescore(
        &self,
        context: &ContextVector,
        requests: &[PhraseRequest<'_>],
    ) -> Result<Vec<PhraseScore>, ScorerError> {
        let mut results = Vec::with_capacity(requests.len());
        for (chunk_index, chunk) in requests.chunks(self.batch_size).enumerate() {
            tracing::debug!(
                chunk = chunk_index,
                hypotheses = chunk.len(),
                total = requests.len(),
                "rescoring phrase chunk"
            );
            results.extend(self.rescore_chunk(context, chunk)?);
        }
        Ok(results)
    }

    fn rescore_chunk(
        &self,
        context: &ContextVector,
        chunk: &[PhraseRequest<'_>],
    ) -> Result<Vec<PhraseScore>, ScorerError> {
        let words: Vec<Vec<&str>> = chunk
            .iter()
            .map(|request| {
                let mut words: Vec<&str> = request.phrase.iter().map(String::as_str).collect();
                if request.source_complete {
                    words.push(EOS_TOKEN);
                }
                words
            })
            .collect();
        let mut states: Vec<DecoderState> = chunk
            .iter()
            .map(|request| request.hypothesis.state.clone())
            .collect();
        let mut last_words: Vec<&str> = chunk
            .iter()
            .map(|request| request.hypothesis.last_word())
            .collect();
        let mut log_probs = vec![0.0f64; chunk.len()];
        let mut unknown_counts = vec![0usize; chunk.len()];

        let longest = words.iter().map(Vec::len).max().unwrap_or(0);
        for position in 0..longest {
            let active: Vec<usize> = (0..chunk.len())
                .filter(|&i| words[i].len() > position)
                .collect();
            let next: Vec<&str> = active.iter().map(|&i| words[i][position]).collect();
            let previous: Vec<&str> = active.iter().map(|&i| last_words[i]).collect();
            let active_states: Vec<DecoderState> =
                active.iter().map(|&i| states[i].clone()).collect();

            let scored =
                self.scorer
                    .score_batch_aligned(&next, context, &previous, &active_states)?;
            for (k, state) in scored.states.into_iter().enumerate() {
                let i = active[k];
                log_probs[i] += scored.scores[k];
                if scored.unknown[k] {
                    unknown_counts[i] += 1;
                }
                states[i] = state;
                last_words[i] = next[k];
            }
        }

        Ok(chunk
            .iter()
            .zip(words)
            .zip(states)
            .enumerate()
            .map(|(i, ((request, words), state))| PhraseScore {
                log_prob: log_probs[i],
                unknown_count: unknown_counts[i],
                next: request
                    .hypothesis
                    .extend(&words, state, self.state_length),
            })
            .collect())
    }
}
