pub mod config;
pub mod error;
mod model;
pub mod pipeline;
pub mod scoring;
pub mod types;

pub use config::{ModelStateConfig, ScorerConfig};
pub use error::ScorerError;
pub use pipeline::builder::{LoadedScorer, ScorerBuilder};
pub use pipeline::encoder::ContextEncoder;
pub use pipeline::rescoring::{HypothesisState, PhraseRequest, PhraseRescorer, PhraseScore};
pub use pipeline::scorer::IncrementalScorer;
pub use pipeline::traits::{NeuralOracle, SentencePreparer};
pub use scoring::{Timer, Vocabulary, VocabularyMapper, EOS_TOKEN, NO_PREVIOUS_WORD};
pub use types::{AlignedScores, CandidateScores, ContextVector, DecoderState, ScoreResult};
