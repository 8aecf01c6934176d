pub(crate) mod batching;
pub mod timer;
pub mod vocabulary;

pub use timer::{IntervalSummary, Timer, TimerScope};
pub use vocabulary::{Vocabulary, VocabularyMapper, EOS_TOKEN, NO_PREVIOUS_WORD};
