use candle_core::Tensor;

/// Encoded source sentence. Produced once per sentence and shared read-only by
/// every scoring call for that sentence.
#[derive(Debug, Clone)]
pub struct ContextVector(Tensor);

impl ContextVector {
    pub fn new(tensor: Tensor) -> Self {
        Self(tensor)
    }

    pub fn tensor(&self) -> &Tensor {
        &self.0
    }
}

/// Recurrent decoder state of one hypothesis, kept as a single batch row
/// (leading dimension 1).
#[derive(Debug, Clone)]
pub struct DecoderState(Tensor);

impl DecoderState {
    pub fn new(tensor: Tensor) -> Self {
        Self(tensor)
    }

    pub fn tensor(&self) -> &Tensor {
        &self.0
    }

    pub fn into_tensor(self) -> Tensor {
        self.0
    }
}

/// Result of extending one hypothesis by a sequence of words.
#[derive(Debug, Clone)]
pub struct ScoreResult {
    /// Sum of natural-log probabilities along the scored words.
    pub log_prob: f64,
    pub state: DecoderState,
}

/// Result of scoring a shared candidate set against every hypothesis.
#[derive(Debug, Clone)]
pub struct CandidateScores {
    /// `scores[hypothesis][candidate]`.
    pub scores: Vec<Vec<f64>>,
    /// `states[candidate][hypothesis]`.
    pub states: Vec<Vec<DecoderState>>,
    /// One flag per candidate; `true` when the word is absent from the target vocabulary.
    pub unknown: Vec<bool>,
}

/// Result of scoring one next word per hypothesis.
#[derive(Debug, Clone)]
pub struct AlignedScores {
    pub scores: Vec<f64>,
    pub states: Vec<DecoderState>,
    /// One flag per next word; `true` when the word is absent from the target vocabulary.
    pub unknown: Vec<bool>,
}
