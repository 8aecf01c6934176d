use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use crate::config::{ModelStateConfig, ScorerConfig};
use crate::error::ScorerError;
use crate::model::encdec::RnnEncoderDecoder;
use crate::pipeline::traits::NeuralOracle;

/// Default oracle backed by the candle encoder-decoder.
pub(crate) struct CandleOracle {
    model: RnnEncoderDecoder,
    device: Device,
}

impl CandleOracle {
    pub(crate) fn load(
        config: &ScorerConfig,
        state: &ModelStateConfig,
    ) -> Result<Self, ScorerError> {
        let device = parse_device(&config.device)?;

        let model_data = std::fs::read(&config.model_path)
            .map_err(|e| ScorerError::io("read safetensors", e))?;
        let vb = VarBuilder::from_buffered_safetensors(model_data, DType::F32, &device)
            .map_err(|e| ScorerError::runtime("load safetensors", e))?;
        let model = RnnEncoderDecoder::load(state, vb)
            .map_err(|e| ScorerError::runtime("build model", e))?;

        tracing::info!(
            source_vocab = state.source_vocab_size,
            target_vocab = state.target_vocab_size,
            hidden_dim = state.hidden_dim,
            state_dim = state.state_dim(),
            ?device,
            "encoder-decoder Candle runtime loaded"
        );

        Ok(Self { model, device })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(model: RnnEncoderDecoder, device: Device) -> Self {
        Self { model, device }
    }
}

fn parse_device(device: &str) -> Result<Device, ScorerError> {
    if device.eq_ignore_ascii_case("cpu") {
        Ok(Device::Cpu)
    } else if device.eq_ignore_ascii_case("cuda") {
        Device::new_cuda(0).map_err(|e| ScorerError::runtime("CUDA init", e))
    } else {
        Err(ScorerError::invalid_input(format!(
            "unsupported device '{device}', expected 'cpu' or 'cuda'"
        )))
    }
}

impl NeuralOracle for CandleOracle {
    fn encode_representation(&self, tokens: &[u32]) -> candle_core::Result<Vec<Tensor>> {
        let tokens = Tensor::new(tokens, &self.device)?;
        self.model.encode(&tokens)
    }

    fn init_state(&self, context: &Tensor) -> candle_core::Result<Tensor> {
        self.model.init_state(context)
    }

    fn next_probabilities(
        &self,
        context: &Tensor,
        _step: usize,
        previous_words: &Tensor,
        state: &Tensor,
    ) -> candle_core::Result<Tensor> {
        self.model
            .next_probabilities(context, &previous_words.to_device(&self.device)?, state)
    }

    fn next_state(
        &self,
        context: &Tensor,
        _step: usize,
        words: &Tensor,
        state: &Tensor,
    ) -> candle_core::Result<Tensor> {
        self.model
            .next_state(context, &words.to_device(&self.device)?, state)
    }

    fn device_label(&self) -> String {
        if self.device.is_cuda() {
            "cuda".to_string()
        } else if self.device.is_metal() {
            "metal".to_string()
        } else {
            "cpu".to_string()
        }
    }
}
