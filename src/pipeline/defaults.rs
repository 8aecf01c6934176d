use crate::error::ScorerError;
use crate::pipeline::traits::SentencePreparer;
use crate::scoring::Vocabulary;

/// Whitespace tokenization against the source vocabulary, terminated by the
/// source end-of-sequence index.
pub struct WhitespacePreparer {
    pub eos_index: u32,
    /// 0 disables the length check.
    pub max_length: usize,
}

impl SentencePreparer for WhitespacePreparer {
    fn prepare(&self, sentence: &str, vocab: &Vocabulary) -> Result<Vec<u32>, ScorerError> {
        let mut tokens: Vec<u32> = sentence
            .split_whitespace()
            .map(|word| vocab.lookup(word))
            .collect();
        if tokens.is_empty() {
            return Err(ScorerError::invalid_input("source sentence has no tokens"));
        }
        if self.max_length > 0 && tokens.len() > self.max_length {
            return Err(ScorerError::invalid_input(format!(
                "source sentence has {} tokens, limit is {}",
                tokens.len(),
                self.max_length
            )));
        }
        tokens.push(self.eos_index);
        Ok(tokens)
    }
}
