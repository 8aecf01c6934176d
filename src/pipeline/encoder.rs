use std::sync::Arc;

use crate::error::ScorerError;
use crate::pipeline::traits::{NeuralOracle, SentencePreparer};
use crate::scoring::VocabularyMapper;
use crate::types::ContextVector;

/// Encodes source sentences into context vectors, once per sentence.
pub struct ContextEncoder {
    oracle: Arc<dyn NeuralOracle>,
    vocab: Arc<VocabularyMapper>,
    preparer: Box<dyn SentencePreparer>,
}

impl ContextEncoder {
    pub fn new(
        oracle: Arc<dyn NeuralOracle>,
        vocab: Arc<VocabularyMapper>,
        preparer: Box<dyn SentencePreparer>,
    ) -> Self {
        Self {
            oracle,
            vocab,
            preparer,
        }
    }

    pub fn encode(&self, source_sentence: &str) -> Result<ContextVector, ScorerError> {
        let tokens = self.preparer.prepare(source_sentence, self.vocab.source())?;
        let channels = self
            .oracle
            .encode_representation(&tokens)
            .map_err(|e| ScorerError::oracle("encode_representation", e))?;
        let context = channels.into_iter().next().ok_or_else(|| {
            ScorerError::shape("encode_representation", "representation oracle returned no channels")
        })?;
        Ok(ContextVector::new(context))
    }
}
