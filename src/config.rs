use std::path::Path;

use crate::error::ScorerError;

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub state_path: String,
    pub model_path: String,
    pub source_vocab_path: String,
    pub target_vocab_path: String,
    pub device: String,
    /// Index the target `</s>` entry is forced to after loading.
    pub eos_sentinel: u32,
    /// Maximum hypotheses per phrase-rescoring chunk.
    pub batch_size: usize,
    /// Number of recent target words kept in a hypothesis history.
    pub state_length: usize,
    /// Maximum source tokens accepted by the encoder; 0 disables the check.
    pub max_source_length: usize,
}

impl ScorerConfig {
    pub const DEFAULT_EOS_SENTINEL: u32 = 30_000;
    pub const DEFAULT_BATCH_SIZE: usize = 1_000;
    pub const DEFAULT_STATE_LENGTH: usize = 5;
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            state_path: String::new(),
            model_path: String::new(),
            source_vocab_path: String::new(),
            target_vocab_path: String::new(),
            device: "cpu".to_string(),
            eos_sentinel: Self::DEFAULT_EOS_SENTINEL,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            state_length: Self::DEFAULT_STATE_LENGTH,
            max_source_length: 0,
        }
    }
}

/// Model state stored next to the weights. Accepts the legacy groundhog key names.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ModelStateConfig {
    #[serde(alias = "n_sym_source")]
    pub source_vocab_size: usize,
    #[serde(alias = "n_sym_target")]
    pub target_vocab_size: usize,
    #[serde(alias = "rank_n_approx")]
    pub embedding_dim: usize,
    #[serde(alias = "dim")]
    pub hidden_dim: usize,
    #[serde(default)]
    pub state_dim: Option<usize>,
    #[serde(default = "default_unk", alias = "unk_sym_source")]
    pub unk_index_source: u32,
    #[serde(default = "default_unk", alias = "unk_sym_target")]
    pub unk_index_target: u32,
    #[serde(default, alias = "null_sym_source")]
    pub eos_index_source: u32,
    #[serde(default, alias = "null_sym_target")]
    pub eos_index_target: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_unk() -> u32 {
    1
}
fn default_seed() -> u64 {
    1234
}

impl ModelStateConfig {
    pub(crate) fn load(path: &Path) -> Result<Self, ScorerError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ScorerError::io("read model state", e))?;
        serde_json::from_str(&data).map_err(|e| ScorerError::json("parse model state", e))
    }

    /// Decoder state width; falls back to the encoder width when unset.
    pub fn state_dim(&self) -> usize {
        self.state_dim.unwrap_or(self.hidden_dim)
    }
}
