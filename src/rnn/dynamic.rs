// Copyright 2018 The naive-nmt Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::rnn::cells::CellState;
use crate::rnn::stack::MultiRnnCell;
use tch::{Kind, Tensor};

/// Mask of the valid time steps, shape `[time, batch]`, 1.0 where `t < length[b]`.
pub fn sequence_mask(sequence_length: &Tensor, max_time: i64) -> Tensor {
    let lengths = sequence_length.to_kind(Kind::Int64);
    Tensor::arange(max_time, (Kind::Int64, lengths.device()))
        .unsqueeze(1)
        .lt_tensor(&lengths.unsqueeze(0))
        .to_kind(Kind::Float)
}

/// Unrolls a stack of cells over a time-major batch of variable-length sequences.
///
/// Past the end of a sequence its state is carried through unchanged and its outputs are zero,
/// so the final states are the states at each sequence's last valid step.
///
/// # Arguments
///
/// * `cell` - stack of recurrent cells
/// * `inputs` - `Tensor` of shape `[time, batch, input_size]`
/// * `sequence_length` - `Tensor` of shape `[batch]` with the valid length of every sequence
/// * `initial_state` - one state per layer, zero states when `None`
/// * `train` - enables dropout
///
/// # Returns
///
/// * outputs of the top layer, shape `[time, batch, num_units]`
/// * final state of every layer
pub fn dynamic_rnn(
    cell: &MultiRnnCell,
    inputs: &Tensor,
    sequence_length: &Tensor,
    initial_state: Option<Vec<CellState>>,
    train: bool,
) -> (Tensor, Vec<CellState>) {
    let size = inputs.size();
    let (max_time, batch_size) = (size[0], size[1]);
    let mut states =
        initial_state.unwrap_or_else(|| cell.zero_state(batch_size, inputs.device()));
    let mask = sequence_mask(sequence_length, max_time).to_device(inputs.device());

    let mut outputs = Vec::with_capacity(max_time as usize);
    for t in 0..max_time {
        let step_mask = mask.get(t).unsqueeze(1);
        let (output, new_states) = cell.step(&inputs.get(t), &states, train);
        states = states
            .iter()
            .zip(new_states.iter())
            .map(|(state, new_state)| state.select(new_state, &step_mask))
            .collect();
        outputs.push(output * &step_mask);
    }

    let outputs = if outputs.is_empty() {
        Tensor::zeros(
            [0, batch_size, cell.num_units()],
            (Kind::Float, inputs.device()),
        )
    } else {
        Tensor::stack(&outputs, 0)
    };
    (outputs, states)
}

/// Reverses every sequence of a time-major batch within its own length; padding steps stay in
/// place.
///
/// # Arguments
///
/// * `inputs` - `Tensor` of shape `[time, batch, depth]`
/// * `sequence_length` - `Tensor` of shape `[batch]`
pub fn reverse_sequence(inputs: &Tensor, sequence_length: &Tensor) -> Tensor {
    let size = inputs.size();
    let (max_time, batch_size, depth) = (size[0], size[1], size[2]);
    let device = inputs.device();
    let lengths = sequence_length
        .to_kind(Kind::Int64)
        .to_device(device)
        .unsqueeze(0);
    let time = Tensor::arange(max_time, (Kind::Int64, device)).unsqueeze(1);

    let valid = time.lt_tensor(&lengths).to_kind(Kind::Int64);
    let reversed = &lengths - 1 - &time;
    let index: Tensor = &reversed * &valid + &time * (1 - &valid);
    let index = index
        .unsqueeze(-1)
        .expand([max_time, batch_size, depth], false);
    inputs.gather(0, &index, false)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rnn::stack::StackConfig;
    use crate::rnn::UnitType;
    use tch::{nn, Device};

    #[test]
    fn reverse_sequence_keeps_padding() {
        // time-major [4, 2, 1]: sequence 0 has length 3, sequence 1 has length 4
        let inputs = Tensor::from_slice(&[1f32, 10., 2., 20., 3., 30., 0., 40.]).view([4, 2, 1]);
        let lengths = Tensor::from_slice(&[3i64, 4]);
        let reversed = reverse_sequence(&inputs, &lengths);
        let first: Vec<f64> = (0..4).map(|t| reversed.double_value(&[t, 0, 0])).collect();
        let second: Vec<f64> = (0..4).map(|t| reversed.double_value(&[t, 1, 0])).collect();
        assert_eq!(first, vec![3., 2., 1., 0.]);
        assert_eq!(second, vec![40., 30., 20., 10.]);
    }

    #[test]
    fn outputs_past_length_are_zero_and_state_is_frozen() {
        let vs = nn::VarStore::new(Device::Cpu);
        let cell = MultiRnnCell::new(
            vs.root(),
            &StackConfig {
                unit_type: UnitType::Gru,
                num_layers: 2,
                num_residual_layers: 0,
                input_size: 3,
                num_units: 4,
                forget_bias: 1.0,
                dropout: 0.0,
                init_weight: 0.1,
            },
        );
        let inputs = Tensor::rand([5, 2, 3], (Kind::Float, Device::Cpu));
        let lengths = Tensor::from_slice(&[2i64, 5]);
        let (outputs, states) = dynamic_rnn(&cell, &inputs, &lengths, None, false);

        assert_eq!(outputs.size(), vec![5, 2, 4]);
        assert_eq!(states.len(), 2);
        let padded: f64 = outputs
            .narrow(0, 2, 3)
            .select(1, 0)
            .abs()
            .sum(Kind::Float)
            .double_value(&[]);
        assert_eq!(padded, 0.0);

        // the final state of the short sequence is its state after two steps
        let (_, short_states) = dynamic_rnn(
            &cell,
            &inputs.narrow(0, 0, 2),
            &Tensor::from_slice(&[2i64, 2]),
            None,
            false,
        );
        let difference = (states[1].output().get(0) - short_states[1].output().get(0))
            .abs()
            .max()
            .double_value(&[]);
        assert!(difference < 1e-6);
    }
}
