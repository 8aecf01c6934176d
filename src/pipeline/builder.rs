use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::{ModelStateConfig, ScorerConfig};
use crate::error::ScorerError;
use crate::pipeline::defaults::WhitespacePreparer;
use crate::pipeline::encoder::ContextEncoder;
use crate::pipeline::model_runtime::CandleOracle;
use crate::pipeline::rescoring::PhraseRescorer;
use crate::pipeline::scorer::IncrementalScorer;
use crate::pipeline::traits::{NeuralOracle, SentencePreparer};
use crate::scoring::{Timer, Vocabulary, VocabularyMapper};

/// Loads model state, vocabularies and the oracle, and wires them into a
/// ready [`LoadedScorer`].
pub struct ScorerBuilder {
    config: ScorerConfig,
    oracle: Option<Arc<dyn NeuralOracle>>,
    sentence_preparer: Option<Box<dyn SentencePreparer>>,
    timer: Option<Arc<Timer>>,
}

/// Everything a decoder needs to score one sentence after another.
pub struct LoadedScorer {
    pub encoder: ContextEncoder,
    pub scorer: IncrementalScorer,
    pub timer: Arc<Timer>,
    batch_size: usize,
    state_length: usize,
}

impl LoadedScorer {
    /// Phrase rescorer using the configured batch size and history length.
    pub fn rescorer(&self) -> PhraseRescorer<'_> {
        PhraseRescorer::new(&self.scorer, self.batch_size, self.state_length)
    }
}

impl ScorerBuilder {
    pub fn new(config: ScorerConfig) -> Self {
        Self {
            config,
            oracle: None,
            sentence_preparer: None,
            timer: None,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn NeuralOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_sentence_preparer(mut self, preparer: Box<dyn SentencePreparer>) -> Self {
        self.sentence_preparer = Some(preparer);
        self
    }

    pub fn with_timer(mut self, timer: Arc<Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn build(self) -> Result<LoadedScorer, ScorerError> {
        let state = ModelStateConfig::load(Path::new(&self.config.state_path))?;

        let source = load_vocabulary(
            Path::new(&self.config.source_vocab_path),
            state.unk_index_source,
        )?;
        let target = load_vocabulary(
            Path::new(&self.config.target_vocab_path),
            state.unk_index_target,
        )?;
        tracing::info!(
            source_words = source.len(),
            target_words = target.len(),
            "vocabularies loaded"
        );
        let vocab = Arc::new(VocabularyMapper::new(
            source,
            target,
            self.config.eos_sentinel,
        ));

        let oracle: Arc<dyn NeuralOracle> = match self.oracle {
            Some(oracle) => oracle,
            None => Arc::new(CandleOracle::load(&self.config, &state)?),
        };
        let timer = self.timer.unwrap_or_else(|| Arc::new(Timer::new()));
        let preparer = self.sentence_preparer.unwrap_or_else(|| {
            Box::new(WhitespacePreparer {
                eos_index: state.eos_index_source,
                max_length: self.config.max_source_length,
            })
        });

        Ok(LoadedScorer {
            encoder: ContextEncoder::new(oracle.clone(), vocab.clone(), preparer),
            scorer: IncrementalScorer::with_timer(oracle, vocab, timer.clone()),
            timer,
            batch_size: self.config.batch_size,
            state_length: self.config.state_length,
        })
    }
}

fn load_vocabulary(path: &Path, unk_index: u32) -> Result<Vocabulary, ScorerError> {
    let data =
        std::fs::read_to_string(path).map_err(|e| ScorerError::io("read vocabulary", e))?;
    let raw: HashMap<String, u32> =
        serde_json::from_str(&data).map_err(|e| ScorerError::json("parse vocabulary", e))?;
    Ok(Vocabulary::new(raw, unk_index))
}
