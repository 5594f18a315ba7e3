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

use crate::common::linear::{dense, Dense, DenseConfig};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::nn::{Init, Module};
use tch::{nn, Device, Kind, Tensor};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// # Recurrent unit used by the encoder and decoder stacks
pub enum UnitType {
    Lstm,
    Gru,
    LayerNormLstm,
    Nas,
}

/// # State of a recurrent cell
pub enum CellState {
    /// Memory cell and hidden state of the LSTM family (LSTM, LayerNormLSTM, NAS)
    Lstm { c: Tensor, h: Tensor },
    /// Hidden state of a GRU
    Gru(Tensor),
}

impl CellState {
    /// Hidden state, also the output of the cell, shape `[batch, num_units]`.
    pub fn output(&self) -> &Tensor {
        match self {
            CellState::Lstm { h, .. } => h,
            CellState::Gru(h) => h,
        }
    }

    pub fn shallow_clone(&self) -> CellState {
        self.map(Tensor::shallow_clone)
    }

    /// Keeps `next` where `mask` is 1 and `self` where it is 0. `mask` has shape `[batch, 1]`.
    pub fn select(&self, next: &CellState, mask: &Tensor) -> CellState {
        let keep = 1.0 - mask;
        let pick = |old: &Tensor, new: &Tensor| new * mask + old * &keep;
        match (self, next) {
            (CellState::Lstm { c, h }, CellState::Lstm { c: next_c, h: next_h }) => {
                CellState::Lstm {
                    c: pick(c, next_c),
                    h: pick(h, next_h),
                }
            }
            (CellState::Gru(h), CellState::Gru(next_h)) => CellState::Gru(pick(h, next_h)),
            _ => next.shallow_clone(),
        }
    }

    /// Reorders (or repeats) batch entries, used to follow beam search back-pointers.
    pub fn index_select(&self, indices: &Tensor) -> CellState {
        self.map(|tensor| tensor.index_select(0, indices))
    }

    /// Repeats every batch entry `times` times in a row.
    pub fn tile(&self, times: i64) -> CellState {
        self.map(|tensor| {
            let size = tensor.size();
            tensor
                .unsqueeze(1)
                .expand([size[0], times, size[1]], false)
                .reshape([size[0] * times, size[1]])
        })
    }

    /// Stacked view of the state: `[batch, units]` for a GRU, `[2, batch, units]` (c then h)
    /// for the LSTM family.
    pub fn to_tensor(&self) -> Tensor {
        match self {
            CellState::Lstm { c, h } => Tensor::stack(&[c, h], 0),
            CellState::Gru(h) => h.shallow_clone(),
        }
    }

    fn map<F: Fn(&Tensor) -> Tensor>(&self, f: F) -> CellState {
        match self {
            CellState::Lstm { c, h } => CellState::Lstm { c: f(c), h: f(h) },
            CellState::Gru(h) => CellState::Gru(f(h)),
        }
    }
}

/// One time step of a recurrent cell
pub trait RecurrentCell {
    fn num_units(&self) -> i64;

    fn zero_state(&self, batch_size: i64, device: Device) -> CellState;

    /// Computes the next state for an input of shape `[batch, input_size]`.
    fn step(&self, input: &Tensor, state: &CellState) -> CellState;
}

fn zeros(batch_size: i64, num_units: i64, device: Device) -> Tensor {
    Tensor::zeros([batch_size, num_units], (Kind::Float, device))
}

fn lstm_zero_state(batch_size: i64, num_units: i64, device: Device) -> CellState {
    CellState::Lstm {
        c: zeros(batch_size, num_units, device),
        h: zeros(batch_size, num_units, device),
    }
}

fn lstm_parts(state: &CellState) -> (&Tensor, &Tensor) {
    match state {
        CellState::Lstm { c, h } => (c, h),
        CellState::Gru(h) => (h, h),
    }
}

/// Basic LSTM cell: gates `i, j, f, o` computed from `[input ; h]`.
pub struct LstmCell {
    kernel: Dense,
    num_units: i64,
    forget_bias: f64,
}

impl LstmCell {
    pub fn new<'p, P>(
        p: P,
        input_size: i64,
        num_units: i64,
        forget_bias: f64,
        init_weight: f64,
    ) -> LstmCell
    where
        P: Borrow<nn::Path<'p>>,
    {
        let kernel = dense(
            p,
            input_size + num_units,
            4 * num_units,
            DenseConfig::new(init_weight),
        );
        LstmCell {
            kernel,
            num_units,
            forget_bias,
        }
    }
}

impl RecurrentCell for LstmCell {
    fn num_units(&self) -> i64 {
        self.num_units
    }

    fn zero_state(&self, batch_size: i64, device: Device) -> CellState {
        lstm_zero_state(batch_size, self.num_units, device)
    }

    fn step(&self, input: &Tensor, state: &CellState) -> CellState {
        let (c, h) = lstm_parts(state);
        let gates = Tensor::cat(&[input, h], 1).apply(&self.kernel).chunk(4, 1);
        let (i, j, f, o) = (&gates[0], &gates[1], &gates[2], &gates[3]);
        let new_c = c * (f + self.forget_bias).sigmoid() + i.sigmoid() * j.tanh();
        let new_h = new_c.tanh() * o.sigmoid();
        CellState::Lstm { c: new_c, h: new_h }
    }
}

/// LSTM cell with layer normalization of every gate pre-activation and of the new memory cell.
pub struct LayerNormLstmCell {
    kernel: Dense,
    gate_norms: Vec<nn::LayerNorm>,
    state_norm: nn::LayerNorm,
    num_units: i64,
    forget_bias: f64,
}

impl LayerNormLstmCell {
    pub fn new<'p, P>(
        p: P,
        input_size: i64,
        num_units: i64,
        forget_bias: f64,
        init_weight: f64,
    ) -> LayerNormLstmCell
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let kernel = dense(
            p,
            input_size + num_units,
            4 * num_units,
            DenseConfig::no_bias(init_weight),
        );
        let gate_norms = ["input", "transform", "forget", "output"]
            .iter()
            .map(|name| nn::layer_norm(p / *name, vec![num_units], Default::default()))
            .collect();
        let state_norm = nn::layer_norm(p / "state", vec![num_units], Default::default());
        LayerNormLstmCell {
            kernel,
            gate_norms,
            state_norm,
            num_units,
            forget_bias,
        }
    }
}

impl RecurrentCell for LayerNormLstmCell {
    fn num_units(&self) -> i64 {
        self.num_units
    }

    fn zero_state(&self, batch_size: i64, device: Device) -> CellState {
        lstm_zero_state(batch_size, self.num_units, device)
    }

    fn step(&self, input: &Tensor, state: &CellState) -> CellState {
        let (c, h) = lstm_parts(state);
        let gates: Vec<Tensor> = Tensor::cat(&[input, h], 1)
            .apply(&self.kernel)
            .chunk(4, 1)
            .iter()
            .zip(self.gate_norms.iter())
            .map(|(gate, norm)| gate.apply(norm))
            .collect();
        let (i, j, f, o) = (&gates[0], &gates[1], &gates[2], &gates[3]);
        let new_c = c * (f + self.forget_bias).sigmoid() + i.sigmoid() * j.tanh();
        let new_c = new_c.apply(&self.state_norm);
        let new_h = new_c.tanh() * o.sigmoid();
        CellState::Lstm { c: new_c, h: new_h }
    }
}

/// Gated recurrent unit.
pub struct GruCell {
    gates: Dense,
    candidate: Dense,
    num_units: i64,
}

impl GruCell {
    pub fn new<'p, P>(p: P, input_size: i64, num_units: i64, init_weight: f64) -> GruCell
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let gates = dense(
            p / "gates",
            input_size + num_units,
            2 * num_units,
            DenseConfig {
                bias_init: Some(Init::Const(1.)),
                ..DenseConfig::new(init_weight)
            },
        );
        let candidate = dense(
            p / "candidate",
            input_size + num_units,
            num_units,
            DenseConfig::new(init_weight),
        );
        GruCell {
            gates,
            candidate,
            num_units,
        }
    }
}

impl RecurrentCell for GruCell {
    fn num_units(&self) -> i64 {
        self.num_units
    }

    fn zero_state(&self, batch_size: i64, device: Device) -> CellState {
        CellState::Gru(zeros(batch_size, self.num_units, device))
    }

    fn step(&self, input: &Tensor, state: &CellState) -> CellState {
        let h = state.output();
        let gates = Tensor::cat(&[input, h], 1)
            .apply(&self.gates)
            .sigmoid()
            .chunk(2, 1);
        let (r, u) = (&gates[0], &gates[1]);
        let candidate = Tensor::cat(&[input, &(r * h)], 1)
            .apply(&self.candidate)
            .tanh();
        let new_h = u * h + (1.0 - u) * candidate;
        CellState::Gru(new_h)
    }
}

/// Recurrent cell found by neural architecture search (Zoph & Le, 2017).
pub struct NasCell {
    input_kernel: Dense,
    recurrent_kernel: Dense,
    num_units: i64,
}

impl NasCell {
    pub fn new<'p, P>(p: P, input_size: i64, num_units: i64, init_weight: f64) -> NasCell
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let input_kernel = dense(
            p / "kernel",
            input_size,
            8 * num_units,
            DenseConfig::no_bias(init_weight),
        );
        let recurrent_kernel = dense(
            p / "recurrent_kernel",
            num_units,
            8 * num_units,
            DenseConfig::no_bias(init_weight),
        );
        NasCell {
            input_kernel,
            recurrent_kernel,
            num_units,
        }
    }
}

impl RecurrentCell for NasCell {
    fn num_units(&self) -> i64 {
        self.num_units
    }

    fn zero_state(&self, batch_size: i64, device: Device) -> CellState {
        lstm_zero_state(batch_size, self.num_units, device)
    }

    fn step(&self, input: &Tensor, state: &CellState) -> CellState {
        let (c_prev, m_prev) = lstm_parts(state);
        let x = self.input_kernel.forward(input).chunk(8, 1);
        let m = self.recurrent_kernel.forward(m_prev).chunk(8, 1);

        let layer1_0 = (&x[0] + &m[0]).sigmoid();
        let layer1_1 = (&x[1] + &m[1]).relu();
        let layer1_2 = (&x[2] + &m[2]).sigmoid();
        let layer1_3 = (&x[3] * &m[3]).relu();
        let layer1_4 = (&x[4] + &m[4]).tanh();
        let layer1_5 = (&x[5] + &m[5]).sigmoid();
        let layer1_6 = (&x[6] + &m[6]).tanh();
        let layer1_7 = (&x[7] + &m[7]).sigmoid();

        let layer2_0 = (layer1_0 * layer1_1).tanh();
        let layer2_1 = (layer1_2 + layer1_3).tanh();
        let layer2_2 = (layer1_4 * layer1_5).tanh();
        let layer2_3 = (layer1_6 + layer1_7).sigmoid();

        let layer2_0 = (layer2_0 + c_prev).tanh();
        let new_c = layer2_0 * layer2_1;
        let layer3_1 = (layer2_2 + layer2_3).tanh();
        let new_m = (&new_c * layer3_1).tanh();
        CellState::Lstm { c: new_c, h: new_m }
    }
}

/// # Any of the supported recurrent cells
pub enum RnnCell {
    Lstm(LstmCell),
    Gru(GruCell),
    LayerNormLstm(LayerNormLstmCell),
    Nas(NasCell),
}

impl RnnCell {
    /// Builds a single cell of the given unit type.
    pub fn new<'p, P>(
        p: P,
        unit_type: UnitType,
        input_size: i64,
        num_units: i64,
        forget_bias: f64,
        init_weight: f64,
    ) -> RnnCell
    where
        P: Borrow<nn::Path<'p>>,
    {
        match unit_type {
            UnitType::Lstm => RnnCell::Lstm(LstmCell::new(
                p,
                input_size,
                num_units,
                forget_bias,
                init_weight,
            )),
            UnitType::Gru => RnnCell::Gru(GruCell::new(p, input_size, num_units, init_weight)),
            UnitType::LayerNormLstm => RnnCell::LayerNormLstm(LayerNormLstmCell::new(
                p,
                input_size,
                num_units,
                forget_bias,
                init_weight,
            )),
            UnitType::Nas => RnnCell::Nas(NasCell::new(p, input_size, num_units, init_weight)),
        }
    }
}

impl RecurrentCell for RnnCell {
    fn num_units(&self) -> i64 {
        match self {
            RnnCell::Lstm(cell) => cell.num_units(),
            RnnCell::Gru(cell) => cell.num_units(),
            RnnCell::LayerNormLstm(cell) => cell.num_units(),
            RnnCell::Nas(cell) => cell.num_units(),
        }
    }

    fn zero_state(&self, batch_size: i64, device: Device) -> CellState {
        match self {
            RnnCell::Lstm(cell) => cell.zero_state(batch_size, device),
            RnnCell::Gru(cell) => cell.zero_state(batch_size, device),
            RnnCell::LayerNormLstm(cell) => cell.zero_state(batch_size, device),
            RnnCell::Nas(cell) => cell.zero_state(batch_size, device),
        }
    }

    fn step(&self, input: &Tensor, state: &CellState) -> CellState {
        match self {
            RnnCell::Lstm(cell) => cell.step(input, state),
            RnnCell::Gru(cell) => cell.step(input, state),
            RnnCell::LayerNormLstm(cell) => cell.step(input, state),
            RnnCell::Nas(cell) => cell.step(input, state),
        }
    }
}
