use candle_core::{Module, Tensor};
use candle_nn::{Linear, VarBuilder};

/// Elman-style recurrence `h' = tanh(W_x x + W_h h + W_c c + b)`.
///
/// The context projection is optional so the same cell serves the source
/// encoder (no context) and the decoder transition (conditioned on the
/// pooled source summary).
pub(crate) struct TanhCell {
    input: Linear,
    recurrent: Linear,
    context: Option<Linear>,
}

impl TanhCell {
    pub(crate) fn load(
        input_dim: usize,
        hidden_dim: usize,
        context_dim: Option<usize>,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let context = context_dim
            .map(|dim| candle_nn::linear_no_bias(dim, hidden_dim, vb.pp("context")))
            .transpose()?;
        Ok(Self {
            input: candle_nn::linear(input_dim, hidden_dim, vb.pp("input"))?,
            recurrent: candle_nn::linear_no_bias(hidden_dim, hidden_dim, vb.pp("recurrent"))?,
            context,
        })
    }

    /// `xs` is `(n, input_dim)`, `hidden` is `(n, hidden_dim)`, `context`
    /// is `(1, context_dim)` and broadcast over the rows.
    pub(crate) fn forward(
        &self,
        xs: &Tensor,
        hidden: &Tensor,
        context: Option<&Tensor>,
    ) -> candle_core::Result<Tensor> {
        let mut pre = (self.input.forward(xs)? + self.recurrent.forward(hidden)?)?;
        if let (Some(projection), Some(context)) = (&self.context, context) {
            pre = pre.broadcast_add(&projection.forward(context)?)?;
        }
        pre.tanh()
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device};

    use super::*;

    #[test]
    fn zero_weights_give_zero_state() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let cell = TanhCell::load(3, 4, Some(2), vb).expect("load cell");
        let xs = Tensor::ones((2, 3), DType::F32, &Device::Cpu).unwrap();
        let h = Tensor::ones((2, 4), DType::F32, &Device::Cpu).unwrap();
        let c = Tensor::ones((1, 2), DType::F32, &Device::Cpu).unwrap();
        let out = cell.forward(&xs, &h, Some(&c)).unwrap();
        assert_eq!(out.dims(), &[2, 4]);
        let values = out.to_vec2::<f32>().unwrap();
        assert!(values.iter().flatten().all(|&v| v == 0.0));
    }
}
