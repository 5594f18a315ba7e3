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

use crate::common::dropout::Dropout;
use crate::rnn::cells::{CellState, RecurrentCell, RnnCell, UnitType};
use std::borrow::Borrow;
use tch::{nn, Device, Tensor};

#[derive(Debug, Clone, Copy)]
/// # Shape of a stack of recurrent cells
pub struct StackConfig {
    pub unit_type: UnitType,
    pub num_layers: i64,
    /// Residual connections are added to the last `num_residual_layers` layers.
    pub num_residual_layers: i64,
    pub input_size: i64,
    pub num_units: i64,
    pub forget_bias: f64,
    pub dropout: f64,
    pub init_weight: f64,
}

/// # Stack of recurrent cells
/// The output of each layer is the input of the next one. Dropout is applied to the input of
/// every cell while training; residual layers add their input to their output.
pub struct MultiRnnCell {
    cells: Vec<RnnCell>,
    residual: Vec<bool>,
    dropout: Dropout,
    num_units: i64,
}

impl MultiRnnCell {
    pub fn new<'p, P>(p: P, config: &StackConfig) -> MultiRnnCell
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let first_residual_layer = config.num_layers - config.num_residual_layers;

        let mut cells = Vec::with_capacity(config.num_layers as usize);
        let mut residual = Vec::with_capacity(config.num_layers as usize);
        for layer_index in 0..config.num_layers {
            let input_size = if layer_index == 0 {
                config.input_size
            } else {
                config.num_units
            };
            cells.push(RnnCell::new(
                p / format!("cell_{}", layer_index),
                config.unit_type,
                input_size,
                config.num_units,
                config.forget_bias,
                config.init_weight,
            ));
            // A residual connection needs matching input and output sizes.
            residual.push(layer_index >= first_residual_layer && input_size == config.num_units);
        }

        MultiRnnCell {
            cells,
            residual,
            dropout: Dropout::new(config.dropout),
            num_units: config.num_units,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.cells.len()
    }

    pub fn num_units(&self) -> i64 {
        self.num_units
    }

    pub fn zero_state(&self, batch_size: i64, device: Device) -> Vec<CellState> {
        self.cells
            .iter()
            .map(|cell| cell.zero_state(batch_size, device))
            .collect()
    }

    /// Runs one time step through every layer.
    ///
    /// # Arguments
    ///
    /// * `input` - input of shape `[batch, input_size]`
    /// * `states` - one state per layer
    /// * `train` - enables dropout
    ///
    /// # Returns
    ///
    /// * output of the top layer, shape `[batch, num_units]`
    /// * the new state of every layer
    pub fn step(
        &self,
        input: &Tensor,
        states: &[CellState],
        train: bool,
    ) -> (Tensor, Vec<CellState>) {
        let mut x = input.shallow_clone();
        let mut new_states = Vec::with_capacity(self.cells.len());
        for ((cell, state), residual) in self
            .cells
            .iter()
            .zip(states.iter())
            .zip(self.residual.iter())
        {
            let cell_input = x.apply_t(&self.dropout, train);
            let new_state = cell.step(&cell_input, state);
            x = if *residual {
                new_state.output() + &x
            } else {
                new_state.output().shallow_clone()
            };
            new_states.push(new_state);
        }
        (x, new_states)
    }
}
