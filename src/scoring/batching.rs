use candle_core::{DType, Device, Tensor};

use crate::error::ScorerError;
use crate::types::DecoderState;

/// Index vector handed to the oracles as previous or next words.
pub(crate) fn index_tensor(indices: &[u32], device: &Device) -> Result<Tensor, ScorerError> {
    Tensor::new(indices, device).map_err(|e| ScorerError::oracle("word index tensor", e))
}

/// Normalizes an oracle state output to one leading batch row.
pub(crate) fn as_batch_row(state: Tensor) -> Result<Tensor, ScorerError> {
    if state.rank() == 1 {
        state
            .unsqueeze(0)
            .map_err(|e| ScorerError::oracle("state row reshape", e))
    } else {
        Ok(state)
    }
}

/// One state as a single leading row; rank-1 states gain the batch axis.
pub(crate) fn state_row(state: &DecoderState) -> Result<Tensor, ScorerError> {
    let row = as_batch_row(state.tensor().clone())?;
    let rows = row
        .dim(0)
        .map_err(|e| ScorerError::oracle("decoder state rows", e))?;
    if rows != 1 {
        return Err(ScorerError::shape(
            "decoder state",
            format!("decoder state has {rows} rows, expected 1"),
        ));
    }
    Ok(row)
}

/// Stacks per-hypothesis states into one batched state, in input order.
pub(crate) fn stack_states(states: &[DecoderState]) -> Result<Tensor, ScorerError> {
    let rows = states
        .iter()
        .map(state_row)
        .collect::<Result<Vec<_>, _>>()?;
    Tensor::cat(&rows, 0).map_err(|e| ScorerError::oracle("stack decoder states", e))
}

/// Repeats a single state row `count` times.
pub(crate) fn replicate_row(row: &Tensor, count: usize) -> Result<Tensor, ScorerError> {
    if count == 1 {
        return Ok(row.clone());
    }
    let rows = vec![row; count];
    Tensor::cat(&rows, 0).map_err(|e| ScorerError::oracle("replicate initial state", e))
}

/// Splits a batched state back into one state per row, preserving row order.
pub(crate) fn split_states(
    batched: &Tensor,
    expected_rows: usize,
    context: &'static str,
) -> Result<Vec<DecoderState>, ScorerError> {
    check_rows(batched, expected_rows, context)?;
    (0..expected_rows)
        .map(|row| {
            batched
                .narrow(0, row, 1)
                .map(DecoderState::new)
                .map_err(|e| ScorerError::oracle(context, e))
        })
        .collect()
}

/// Natural log of `probabilities[i, indices[i]]` for every row `i`.
///
/// Only the selected entries leave the device. Zero probabilities become
/// `-inf` and are returned as such.
pub(crate) fn aligned_log_probabilities(
    probabilities: &Tensor,
    indices: &[u32],
) -> Result<Vec<f64>, ScorerError> {
    check_rows(probabilities, indices.len(), "next_probabilities")?;
    check_width(probabilities, indices)?;
    let ids = index_tensor(indices, probabilities.device())?;
    ids.unsqueeze(1)
        .and_then(|ids| probabilities.gather(&ids, 1))
        .and_then(|t| t.squeeze(1))
        .and_then(|t| t.to_dtype(DType::F64))
        .and_then(|t| t.log())
        .and_then(|t| t.to_vec1::<f64>())
        .map_err(|e| ScorerError::oracle("log probabilities", e))
}

/// Natural log of the `candidates` columns, one row per hypothesis.
pub(crate) fn candidate_log_probabilities(
    probabilities: &Tensor,
    expected_rows: usize,
    candidates: &[u32],
) -> Result<Vec<Vec<f64>>, ScorerError> {
    check_rows(probabilities, expected_rows, "next_probabilities")?;
    check_width(probabilities, candidates)?;
    if candidates.is_empty() {
        return Ok(vec![Vec::new(); expected_rows]);
    }
    let ids = index_tensor(candidates, probabilities.device())?;
    probabilities
        .index_select(&ids, 1)
        .and_then(|t| t.to_dtype(DType::F64))
        .and_then(|t| t.log())
        .and_then(|t| t.to_vec2::<f64>())
        .map_err(|e| ScorerError::oracle("log probabilities", e))
}

fn check_width(probabilities: &Tensor, indices: &[u32]) -> Result<(), ScorerError> {
    let width = probabilities
        .dim(1)
        .map_err(|e| ScorerError::oracle("next_probabilities", e))?;
    match indices.iter().find(|&&index| index as usize >= width) {
        Some(index) => Err(ScorerError::shape(
            "gather log probability",
            format!("word index {index} outside distribution of width {width}"),
        )),
        None => Ok(()),
    }
}

fn check_rows(
    tensor: &Tensor,
    expected_rows: usize,
    context: &'static str,
) -> Result<(), ScorerError> {
    let rows = tensor.dim(0).map_err(|e| ScorerError::oracle(context, e))?;
    if rows != expected_rows {
        return Err(ScorerError::shape(
            context,
            format!("oracle returned {rows} rows for {expected_rows} hypotheses"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[f32]) -> Tensor {
        Tensor::new(values, &Device::Cpu).unwrap().unsqueeze(0).unwrap()
    }

    #[test]
    fn stack_then_split_preserves_row_order() {
        let states = vec![
            DecoderState::new(row(&[1.0, 2.0])),
            DecoderState::new(row(&[3.0, 4.0])),
            DecoderState::new(row(&[5.0, 6.0])),
        ];
        let stacked = stack_states(&states).unwrap();
        assert_eq!(stacked.dims(), &[3, 2]);

        let split = split_states(&stacked, 3, "test").unwrap();
        let values: Vec<Vec<f32>> = split
            .iter()
            .map(|s| s.tensor().squeeze(0).unwrap().to_vec1::<f32>().unwrap())
            .collect();
        assert_eq!(values, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
    }

    #[test]
    fn split_rejects_wrong_row_count() {
        let stacked = Tensor::zeros((2, 3), DType::F32, &Device::Cpu).unwrap();
        let err = split_states(&stacked, 3, "next_state").unwrap_err();
        assert!(matches!(err, ScorerError::Shape { .. }));
    }

    #[test]
    fn replicate_row_repeats_state() {
        let replicated = replicate_row(&row(&[7.0, 8.0]), 4).unwrap();
        assert_eq!(replicated.dims(), &[4, 2]);
        let values = replicated.to_vec2::<f32>().unwrap();
        assert!(values.iter().all(|r| r == &vec![7.0, 8.0]));
    }

    #[test]
    fn rank_one_state_gets_batch_row() {
        let flat = Tensor::new(&[1.0f32, 2.0, 3.0], &Device::Cpu).unwrap();
        assert_eq!(as_batch_row(flat).unwrap().dims(), &[1, 3]);
    }

    #[test]
    fn zero_probability_logs_to_negative_infinity() {
        let probs = Tensor::new(&[[0.5f32, 0.5, 0.0], [0.0, 0.25, 0.75]], &Device::Cpu).unwrap();
        let scores = aligned_log_probabilities(&probs, &[2, 1]).unwrap();
        assert!(scores[0].is_infinite() && scores[0] < 0.0);
        assert!((scores[1] - 0.25f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn aligned_selection_reads_each_row_at_its_own_index() {
        let probs = Tensor::new(
            &[[0.1f32, 0.2, 0.7], [0.6, 0.3, 0.1], [0.2, 0.2, 0.6]],
            &Device::Cpu,
        )
        .unwrap();
        let scores = aligned_log_probabilities(&probs, &[2, 0, 1]).unwrap();
        let expected = [0.7f32, 0.6, 0.2];
        for (score, p) in scores.iter().zip(expected) {
            assert!((score - (p as f64).ln()).abs() < 1e-6);
        }
    }

    #[test]
    fn candidate_selection_keeps_candidate_order_per_row() {
        let probs = Tensor::new(&[[0.1f32, 0.2, 0.7], [0.6, 0.3, 0.1]], &Device::Cpu).unwrap();
        let scores = candidate_log_probabilities(&probs, 2, &[2, 0, 2]).unwrap();
        let expected = [[0.7f32, 0.1, 0.7], [0.1, 0.6, 0.1]];
        for (row, expected_row) in scores.iter().zip(expected) {
            assert_eq!(row.len(), 3);
            for (score, p) in row.iter().zip(expected_row) {
                assert!((score - (p as f64).ln()).abs() < 1e-6);
            }
        }
        assert_eq!(
            candidate_log_probabilities(&probs, 2, &[]).unwrap(),
            vec![Vec::<f64>::new(), Vec::new()]
        );
    }

    #[test]
    fn index_outside_distribution_is_a_shape_error() {
        let probs = Tensor::new(&[[0.5f32, 0.5]], &Device::Cpu).unwrap();
        let err = aligned_log_probabilities(&probs, &[30_000]).unwrap_err();
        assert!(matches!(err, ScorerError::Shape { .. }));
        assert!(err.to_string().contains("30000"));
        let err = candidate_log_probabilities(&probs, 1, &[1, 2]).unwrap_err();
        assert!(err.to_string().contains("width 2"));
    }

    #[test]
    fn selection_rejects_wrong_row_count() {
        let probs = Tensor::new(&[[0.5f32, 0.5]], &Device::Cpu).unwrap();
        let err = aligned_log_probabilities(&probs, &[0, 1]).unwrap_err();
        assert!(err.to_string().contains("1 rows for 2 hypotheses"));
    }

    #[test]
    fn rank_one_states_are_stacked_as_rows() {
        let flat = DecoderState::new(Tensor::new(&[1.0f32, 2.0], &Device::Cpu).unwrap());
        let stacked = stack_states(&[flat, DecoderState::new(row(&[3.0, 4.0]))]).unwrap();
        assert_eq!(stacked.dims(), &[2, 2]);
        assert_eq!(
            stacked.to_vec2::<f32>().unwrap(),
            vec![vec![1.0, 2.0], vec![3.0, 4.0]]
        );
    }

    #[test]
    fn multi_row_state_is_rejected_before_stacking() {
        let two_rows = DecoderState::new(Tensor::zeros((2, 2), DType::F32, &Device::Cpu).unwrap());
        let err = stack_states(&[two_rows]).unwrap_err();
        assert!(matches!(err, ScorerError::Shape { .. }));
        assert!(err.to_string().contains("2 rows, expected 1"));
    }
}
