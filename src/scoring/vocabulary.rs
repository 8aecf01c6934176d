use std::collections::HashMap;

/// Previous-word index meaning "no word has been emitted yet".
pub const NO_PREVIOUS_WORD: u32 = 0;

/// Target-side end-of-sequence token.
pub const EOS_TOKEN: &str = "</s>";

/// Word to index table with an unknown-word fallback. Immutable once built.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    word_to_index: HashMap<String, u32>,
    index_to_word: HashMap<u32, String>,
    unk_index: u32,
}

impl Vocabulary {
    pub fn new(word_to_index: HashMap<String, u32>, unk_index: u32) -> Self {
        let index_to_word = word_to_index
            .iter()
            .map(|(word, &index)| (index, word.clone()))
            .collect();
        Self {
            word_to_index,
            index_to_word,
            unk_index,
        }
    }

    /// Index of `word`, or the unknown-word index when absent.
    pub fn lookup(&self, word: &str) -> u32 {
        self.word_to_index
            .get(word)
            .copied()
            .unwrap_or(self.unk_index)
    }

    pub fn is_known(&self, word: &str) -> bool {
        self.word_to_index.contains_key(word)
    }

    pub fn word(&self, index: u32) -> Option<&str> {
        self.index_to_word.get(&index).map(String::as_str)
    }

    pub fn unk_index(&self) -> u32 {
        self.unk_index
    }

    pub fn len(&self) -> usize {
        self.word_to_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_to_index.is_empty()
    }

    /// Forces `word` to `index`, replacing any reverse entry it previously owned.
    fn overwrite(&mut self, word: &str, index: u32) -> Option<u32> {
        let previous = self.word_to_index.insert(word.to_string(), index);
        if let Some(old) = previous {
            if self.index_to_word.get(&old).map(String::as_str) == Some(word) {
                self.index_to_word.remove(&old);
            }
        }
        self.index_to_word.insert(index, word.to_string());
        previous
    }
}

/// Source and target vocabularies used by the encoder and the scorer.
#[derive(Debug, Clone)]
pub struct VocabularyMapper {
    source: Vocabulary,
    target: Vocabulary,
    eos_sentinel: u32,
}

impl VocabularyMapper {
    /// Builds the mapper and overrides the target `</s>` entry to `eos_sentinel`.
    pub fn new(source: Vocabulary, mut target: Vocabulary, eos_sentinel: u32) -> Self {
        let previous = target.overwrite(EOS_TOKEN, eos_sentinel);
        tracing::debug!(
            raw_index = ?previous,
            sentinel = eos_sentinel,
            "overriding target end-of-sequence index"
        );
        Self {
            source,
            target,
            eos_sentinel,
        }
    }

    /// Target index of `word`, falling back to the unknown-word index.
    pub fn lookup(&self, word: &str) -> u32 {
        self.target.lookup(word)
    }

    /// Target index of a previous word; the empty string means no previous word.
    pub fn lookup_previous(&self, word: &str) -> u32 {
        if word.is_empty() {
            NO_PREVIOUS_WORD
        } else {
            self.target.lookup(word)
        }
    }

    pub fn is_known(&self, word: &str) -> bool {
        self.target.is_known(word)
    }

    pub fn is_known_batch<S: AsRef<str>>(&self, words: &[S]) -> Vec<bool> {
        words.iter().map(|w| self.is_known(w.as_ref())).collect()
    }

    pub fn word(&self, index: u32) -> Option<&str> {
        self.target.word(index)
    }

    pub fn source(&self) -> &Vocabulary {
        &self.source
    }

    pub fn target(&self) -> &Vocabulary {
        &self.target
    }

    pub fn eos_sentinel(&self) -> u32 {
        self.eos_sentinel
    }
}
