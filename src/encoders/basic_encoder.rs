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

use crate::embeddings::Embedding;
use crate::hparams::HParams;
use crate::inputters::Mode;
use crate::rnn::{dynamic_rnn, reverse_sequence, CellState, MultiRnnCell, StackConfig, UnitType};
use crate::NmtError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::{nn, Kind, Tensor};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// # Direction of the encoder
pub enum EncoderType {
    /// Stack of forward layers
    Uni,
    /// Forward and backward stacks of half the layers each
    Bi,
}

#[derive(Debug, Clone)]
/// # Encoder configuration
pub struct EncoderConfig {
    pub encoder_type: EncoderType,
    pub unit_type: UnitType,
    pub num_layers: i64,
    pub num_residual_layers: i64,
    pub input_size: i64,
    pub num_units: i64,
    pub forget_bias: f64,
    pub dropout: f64,
    pub init_weight: f64,
    pub time_major: bool,
}

impl EncoderConfig {
    /// Encoder settings of `hparams` for inputs of dimension `input_size`.
    pub fn from_hparams(hparams: &HParams, input_size: i64) -> EncoderConfig {
        EncoderConfig {
            encoder_type: hparams.encoder_type,
            unit_type: hparams.unit_type,
            num_layers: hparams.num_encoder_layers,
            num_residual_layers: hparams.num_encoder_residual_layers,
            input_size,
            num_units: hparams.num_units,
            forget_bias: hparams.forget_bias,
            dropout: hparams.dropout,
            init_weight: hparams.init_weight,
            time_major: hparams.time_major,
        }
    }
}

/// Container for the encoder output.
pub struct EncoderOutput {
    /// Top layer outputs, `[time, batch, units]` when time major, `[batch, time, units]`
    /// otherwise. Bidirectional encoders concatenate both directions (`2 * units`).
    pub outputs: Tensor,
    /// Final state of every layer. Bidirectional states are interleaved
    /// (`fw_0, bw_0, fw_1, bw_1, ...`).
    pub states: Vec<CellState>,
}

enum EncoderCells {
    Uni(MultiRnnCell),
    Bi {
        forward: MultiRnnCell,
        backward: MultiRnnCell,
    },
}

/// # Recurrent encoder
/// Unidirectional or bidirectional stack of recurrent cells turning embedded source sequences
/// into hidden representations.
pub struct BasicEncoder {
    cells: EncoderCells,
    time_major: bool,
}

impl BasicEncoder {
    /// Build a new `BasicEncoder`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the encoder
    /// * `config` - `EncoderConfig` defining the layers
    ///
    /// # Errors
    ///
    /// * `InvalidConfigurationError` for a bidirectional encoder with an odd number of layers
    ///
    /// # Example
    ///
    /// ```no_run
    /// use naive_nmt::encoders::{BasicEncoder, EncoderConfig};
    /// use naive_nmt::hparams::HParams;
    /// use tch::{nn, Device};
    ///
    /// let hparams = HParams::default();
    /// let vs = nn::VarStore::new(Device::Cpu);
    /// let config = EncoderConfig::from_hparams(&hparams, hparams.source_embedding_size);
    /// let encoder = BasicEncoder::new(&vs.root() / "encoder", &config)?;
    /// # Ok::<(), naive_nmt::NmtError>(())
    /// ```
    pub fn new<'p, P>(p: P, config: &EncoderConfig) -> Result<BasicEncoder, NmtError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let stack_config = StackConfig {
            unit_type: config.unit_type,
            num_layers: config.num_layers,
            num_residual_layers: config.num_residual_layers,
            input_size: config.input_size,
            num_units: config.num_units,
            forget_bias: config.forget_bias,
            dropout: config.dropout,
            init_weight: config.init_weight,
        };

        let cells = match config.encoder_type {
            EncoderType::Uni => EncoderCells::Uni(MultiRnnCell::new(p / "uni", &stack_config)),
            EncoderType::Bi => {
                if config.num_layers % 2 != 0 {
                    return Err(NmtError::InvalidConfigurationError(format!(
                        "a bidirectional encoder needs an even number of layers, got {}",
                        config.num_layers
                    )));
                }
                let bi_config = StackConfig {
                    num_layers: config.num_layers / 2,
                    num_residual_layers: config.num_residual_layers / 2,
                    ..stack_config
                };
                EncoderCells::Bi {
                    forward: MultiRnnCell::new(p / "bidirectional" / "fw", &bi_config),
                    backward: MultiRnnCell::new(p / "bidirectional" / "bw", &bi_config),
                }
            }
        };

        Ok(BasicEncoder {
            cells,
            time_major: config.time_major,
        })
    }

    /// Encodes a batch of embedded sequences.
    ///
    /// # Arguments
    ///
    /// * `mode` - dropout is only active in `Mode::Train`
    /// * `sequence_inputs` - `Tensor` of shape `[time, batch, input_size]` when the encoder is
    ///   time major, `[batch, time, input_size]` otherwise
    /// * `sequence_length` - `Tensor` of shape `[batch]` with the unpadded lengths
    ///
    /// # Returns
    ///
    /// * `EncoderOutput` with the top layer outputs and the final state of every layer
    pub fn encode(
        &self,
        mode: Mode,
        sequence_inputs: &Tensor,
        sequence_length: &Tensor,
    ) -> Result<EncoderOutput, NmtError> {
        if sequence_inputs.dim() != 3 {
            return Err(NmtError::ValueError(format!(
                "encoder inputs must have 3 dimensions, got {:?}",
                sequence_inputs.size()
            )));
        }
        let train = mode == Mode::Train;
        let inputs = if self.time_major {
            sequence_inputs.shallow_clone()
        } else {
            sequence_inputs.transpose(0, 1)
        };
        let (_, batch_size, _) = inputs.size3()?;
        if sequence_length.size() != [batch_size] {
            return Err(NmtError::ValueError(format!(
                "expected {} sequence lengths, got {:?}",
                batch_size,
                sequence_length.size()
            )));
        }
        let sequence_length = sequence_length
            .to_kind(Kind::Int64)
            .to_device(inputs.device());

        let (outputs, states) = match &self.cells {
            EncoderCells::Uni(cell) => dynamic_rnn(cell, &inputs, &sequence_length, None, train),
            EncoderCells::Bi { forward, backward } => {
                let (fw_outputs, fw_states) =
                    dynamic_rnn(forward, &inputs, &sequence_length, None, train);
                let reversed_inputs = reverse_sequence(&inputs, &sequence_length);
                let (bw_outputs, bw_states) =
                    dynamic_rnn(backward, &reversed_inputs, &sequence_length, None, train);
                let bw_outputs = reverse_sequence(&bw_outputs, &sequence_length);

                let outputs = Tensor::cat(&[fw_outputs, bw_outputs], -1);
                let mut states = Vec::with_capacity(fw_states.len() * 2);
                for (fw_state, bw_state) in fw_states.into_iter().zip(bw_states.into_iter()) {
                    states.push(fw_state);
                    states.push(bw_state);
                }
                (outputs, states)
            }
        };

        let outputs = if self.time_major {
            outputs
        } else {
            outputs.transpose(0, 1)
        };
        Ok(EncoderOutput { outputs, states })
    }

    /// Embeds a padded batch of source tokens with the encoder embedding, then encodes it.
    /// The tokens are always given batch first.
    pub fn encode_tokens<S: AsRef<str>>(
        &self,
        mode: Mode,
        embedding: &Embedding,
        source: &[Vec<S>],
        source_length: &Tensor,
    ) -> Result<EncoderOutput, NmtError> {
        let inputs = embedding.encoder_embedding_input(source)?;
        let inputs = if self.time_major {
            inputs.transpose(0, 1)
        } else {
            inputs
        };
        self.encode(mode, &inputs, source_length)
    }

    pub fn num_layers(&self) -> usize {
        match &self.cells {
            EncoderCells::Uni(cell) => cell.num_layers(),
            EncoderCells::Bi { forward, backward } => forward.num_layers() + backward.num_layers(),
        }
    }

    pub fn time_major(&self) -> bool {
        self.time_major
    }
}
