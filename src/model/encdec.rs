use candle_core::{Module, Tensor, D};
use candle_nn::{Embedding, Linear, VarBuilder};

use crate::config::ModelStateConfig;
use crate::model::layers::TanhCell;

/// Conditional recurrent encoder-decoder.
///
/// The source is encoded into one annotation row per token. Decoding is
/// conditioned on the mean of those annotations, so the decoder state is a
/// single `(n, state_dim)` matrix for `n` hypotheses.
pub(crate) struct RnnEncoderDecoder {
    source_embed: Embedding,
    encoder: TanhCell,
    init: Linear,
    target_embed: Embedding,
    readout_state: Linear,
    readout_word: Linear,
    readout_context: Linear,
    readout_output: Linear,
    transition: TanhCell,
    hidden_dim: usize,
}

impl RnnEncoderDecoder {
    pub(crate) fn load(cfg: &ModelStateConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let state_dim = cfg.state_dim();
        let readout = vb.pp("readout");
        Ok(Self {
            source_embed: candle_nn::embedding(
                cfg.source_vocab_size,
                cfg.embedding_dim,
                vb.pp("source_embed"),
            )?,
            encoder: TanhCell::load(cfg.embedding_dim, cfg.hidden_dim, None, vb.pp("encoder"))?,
            init: candle_nn::linear(cfg.hidden_dim, state_dim, vb.pp("init"))?,
            target_embed: candle_nn::embedding(
                cfg.target_vocab_size,
                cfg.embedding_dim,
                vb.pp("target_embed"),
            )?,
            readout_state: candle_nn::linear(state_dim, cfg.embedding_dim, readout.pp("state"))?,
            readout_word: candle_nn::linear_no_bias(
                cfg.embedding_dim,
                cfg.embedding_dim,
                readout.pp("word"),
            )?,
            readout_context: candle_nn::linear_no_bias(
                cfg.hidden_dim,
                cfg.embedding_dim,
                readout.pp("context"),
            )?,
            readout_output: candle_nn::linear(
                cfg.embedding_dim,
                cfg.target_vocab_size,
                readout.pp("output"),
            )?,
            transition: TanhCell::load(
                cfg.embedding_dim,
                state_dim,
                Some(cfg.hidden_dim),
                vb.pp("transition"),
            )?,
            hidden_dim: cfg.hidden_dim,
        })
    }

    /// Returns `[annotations (len, hidden), last hidden (1, hidden)]`.
    pub(crate) fn encode(&self, tokens: &Tensor) -> candle_core::Result<Vec<Tensor>> {
        let embedded = self.source_embed.forward(tokens)?;
        let src_len = embedded.dim(0)?;
        let mut hidden = Tensor::zeros((1, self.hidden_dim), embedded.dtype(), embedded.device())?;
        let mut annotations = Vec::with_capacity(src_len);
        for t in 0..src_len {
            let x = embedded.narrow(0, t, 1)?;
            hidden = self.encoder.forward(&x, &hidden, None)?;
            annotations.push(hidden.clone());
        }
        Ok(vec![Tensor::cat(&annotations, 0)?, hidden])
    }

    pub(crate) fn init_state(&self, context: &Tensor) -> candle_core::Result<Tensor> {
        self.init.forward(&pool(context)?)?.tanh()
    }

    pub(crate) fn next_probabilities(
        &self,
        context: &Tensor,
        previous_words: &Tensor,
        state: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let pooled = pool(context)?;
        let previous = self.embed_previous(previous_words)?;
        let pre = (self.readout_state.forward(state)? + self.readout_word.forward(&previous)?)?
            .broadcast_add(&self.readout_context.forward(&pooled)?)?
            .tanh()?;
        let logits = self.readout_output.forward(&pre)?;
        candle_nn::ops::softmax(&logits, D::Minus1)
    }

    pub(crate) fn next_state(
        &self,
        context: &Tensor,
        words: &Tensor,
        state: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let pooled = pool(context)?;
        let embedded = self.target_embed.forward(words)?;
        self.transition.forward(&embedded, state, Some(&pooled))
    }

    /// Index 0 means "no previous word" and embeds to zeros.
    fn embed_previous(&self, previous_words: &Tensor) -> candle_core::Result<Tensor> {
        let embedded = self.target_embed.forward(previous_words)?;
        let mask = previous_words
            .ne(0u32)?
            .to_dtype(embedded.dtype())?
            .unsqueeze(1)?;
        embedded.broadcast_mul(&mask)
    }
}

/// Mean over annotation rows, as a `(1, hidden)` summary.
fn pool(context: &Tensor) -> candle_core::Result<Tensor> {
    match context.rank() {
        1 => context.unsqueeze(0),
        _ => context.mean_keepdim(0),
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device};

    use super::*;

    fn small_config() -> ModelStateConfig {
        serde_json::from_str(
            r#"{
                "source_vocab_size": 6,
                "target_vocab_size": 8,
                "embedding_dim": 3,
                "hidden_dim": 4,
                "state_dim": 5
            }"#,
        )
        .expect("valid state json")
    }

    #[test]
    fn zero_model_shapes_and_uniform_distribution() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = RnnEncoderDecoder::load(&small_config(), vb).expect("load model");

        let tokens = Tensor::new(&[2u32, 3, 0], &Device::Cpu).unwrap();
        let channels = model.encode(&tokens).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].dims(), &[3, 4]);
        assert_eq!(channels[1].dims(), &[1, 4]);

        let state = model.init_state(&channels[0]).unwrap();
        assert_eq!(state.dims(), &[1, 5]);

        let batch = Tensor::cat(&[&state, &state], 0).unwrap();
        let prev = Tensor::new(&[0u32, 4], &Device::Cpu).unwrap();
        let probs = model
            .next_probabilities(&channels[0], &prev, &batch)
            .unwrap();
        assert_eq!(probs.dims(), &[2, 8]);
        for row in probs.to_vec2::<f32>().unwrap() {
            for p in row {
                assert!((p - 0.125).abs() < 1e-6);
            }
        }

        let next = model.next_state(&channels[0], &prev, &batch).unwrap();
        assert_eq!(next.dims(), &[2, 5]);
    }

    #[test]
    fn no_previous_word_embeds_to_zero() {
        let device = Device::Cpu;
        let varmap = candle_nn::VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = RnnEncoderDecoder::load(&small_config(), vb).expect("load model");

        let previous = Tensor::new(&[0u32, 3], &device).unwrap();
        let embedded = model.embed_previous(&previous).unwrap();
        let rows = embedded.to_vec2::<f32>().unwrap();
        assert!(rows[0].iter().all(|&v| v == 0.0));
        assert_eq!(rows[1].len(), 3);
    }
}
