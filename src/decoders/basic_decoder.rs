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
use crate::decoders::beam_search::{pad_ids, BeamSearch};
use crate::embeddings::Embedding;
use crate::hparams::HParams;
use crate::inputters::Mode;
use crate::rnn::{dynamic_rnn, CellState, MultiRnnCell, StackConfig, UnitType};
use crate::NmtError;
use std::borrow::Borrow;
use std::convert::TryFrom;
use tch::nn::Module;
use tch::{nn, Device, Kind, Tensor};

#[derive(Debug, Clone)]
/// # Decoder configuration
pub struct DecoderConfig {
    pub unit_type: UnitType,
    pub num_layers: i64,
    pub num_residual_layers: i64,
    /// Dimension of the target embeddings
    pub input_size: i64,
    pub num_units: i64,
    pub forget_bias: f64,
    pub dropout: f64,
    pub init_weight: f64,
    pub target_vocab_size: i64,
    pub sos: String,
    pub eos: String,
    pub tgt_max_len_infer: i64,
    pub decoding_length_factor: f64,
}

impl DecoderConfig {
    pub fn from_hparams(
        hparams: &HParams,
        input_size: i64,
        target_vocab_size: i64,
    ) -> DecoderConfig {
        DecoderConfig {
            unit_type: hparams.unit_type,
            num_layers: hparams.num_decoder_layers,
            num_residual_layers: hparams.num_decoder_residual_layers,
            input_size,
            num_units: hparams.num_units,
            forget_bias: hparams.forget_bias,
            dropout: hparams.dropout,
            init_weight: hparams.init_weight,
            target_vocab_size,
            sos: hparams.sos.clone(),
            eos: hparams.eos.clone(),
            tgt_max_len_infer: hparams.tgt_max_len_infer,
            decoding_length_factor: hparams.decoding_length_factor,
        }
    }
}

/// # Recurrent decoder
/// Stack of recurrent cells initialized with the final encoder states, followed by a bias-free
/// projection onto the target vocabulary. Trains with teacher forcing and translates with greedy
/// or beam search decoding.
pub struct BasicDecoder {
    cell: MultiRnnCell,
    output_projection: Dense,
    sos: String,
    eos: String,
    tgt_max_len_infer: i64,
    decoding_length_factor: f64,
}

impl BasicDecoder {
    /// Build a new `BasicDecoder`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the decoder
    /// * `config` - `DecoderConfig` defining the layers and the decoding limits
    ///
    /// # Example
    ///
    /// ```no_run
    /// use naive_nmt::decoders::{BasicDecoder, DecoderConfig};
    /// use naive_nmt::hparams::HParams;
    /// use tch::{nn, Device};
    ///
    /// let hparams = HParams::default();
    /// let vs = nn::VarStore::new(Device::Cpu);
    /// let config = DecoderConfig::from_hparams(&hparams, hparams.target_embedding_size, 17191);
    /// let decoder = BasicDecoder::new(&vs.root() / "decoder", &config);
    /// ```
    pub fn new<'p, P>(p: P, config: &DecoderConfig) -> BasicDecoder
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let cell = MultiRnnCell::new(
            p / "rnn",
            &StackConfig {
                unit_type: config.unit_type,
                num_layers: config.num_layers,
                num_residual_layers: config.num_residual_layers,
                input_size: config.input_size,
                num_units: config.num_units,
                forget_bias: config.forget_bias,
                dropout: config.dropout,
                init_weight: config.init_weight,
            },
        );
        let output_projection = dense(
            p / "output_projection",
            config.num_units,
            config.target_vocab_size,
            DenseConfig::no_bias(config.init_weight),
        );
        BasicDecoder {
            cell,
            output_projection,
            sos: config.sos.clone(),
            eos: config.eos.clone(),
            tgt_max_len_infer: config.tgt_max_len_infer,
            decoding_length_factor: config.decoding_length_factor,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.cell.num_layers()
    }

    /// Decoder state to start from: the encoder states when given, zeros otherwise.
    ///
    /// # Errors
    ///
    /// * `InvalidConfigurationError` if the encoder does not provide one state per decoder layer
    pub fn initial_state(
        &self,
        encoder_states: Option<Vec<CellState>>,
        batch_size: i64,
        device: Device,
    ) -> Result<Vec<CellState>, NmtError> {
        match encoder_states {
            Some(states) if states.len() != self.num_layers() => {
                Err(NmtError::InvalidConfigurationError(format!(
                    "the encoder provides {} states for {} decoder layers",
                    states.len(),
                    self.num_layers()
                )))
            }
            Some(states) => Ok(states),
            None => Ok(self.cell.zero_state(batch_size, device)),
        }
    }

    /// Projects decoder outputs onto the target vocabulary.
    pub fn project(&self, outputs: &Tensor) -> Tensor {
        self.output_projection.forward(outputs)
    }

    /// Decodes a padded batch of target inputs with teacher forcing.
    ///
    /// # Arguments
    ///
    /// * `mode` - dropout is only active in `Mode::Train`
    /// * `embedding` - provides the decoder embedding of the target tokens
    /// * `target_input` - padded target tokens starting with `sos`
    /// * `target_length` - `Tensor` of shape `[batch]`
    /// * `initial_state` - final encoder states, zeros when `None`
    ///
    /// # Returns
    ///
    /// * logits of shape `[batch, time, target_vocab_size]`
    pub fn decode_train<S: AsRef<str>>(
        &self,
        mode: Mode,
        embedding: &Embedding,
        target_input: &[Vec<S>],
        target_length: &Tensor,
        initial_state: Option<Vec<CellState>>,
    ) -> Result<Tensor, NmtError> {
        let inputs = embedding.decoder_embedding_input(target_input)?.transpose(0, 1);
        let batch_size = inputs.size()[1];
        let initial_state = self.initial_state(initial_state, batch_size, inputs.device())?;
        let target_length = target_length
            .to_kind(Kind::Int64)
            .to_device(inputs.device());

        let (outputs, _) = dynamic_rnn(
            &self.cell,
            &inputs,
            &target_length,
            Some(initial_state),
            mode == Mode::Train,
        );
        Ok(self.project(&outputs).transpose(0, 1))
    }

    /// Decoding steps allowed for a source batch: `tgt_max_len_infer` when set, otherwise
    /// `decoding_length_factor` times the longest source sentence.
    pub fn maximum_iterations(&self, max_source_length: i64) -> i64 {
        if self.tgt_max_len_infer > 0 {
            self.tgt_max_len_infer
        } else {
            (max_source_length as f64 * self.decoding_length_factor).round() as i64
        }
    }

    fn special_ids(&self, embedding: &Embedding) -> (i64, i64) {
        let vocab = embedding.target_vocab();
        (vocab.token_to_id(&self.sos), vocab.token_to_id(&self.eos))
    }

    /// One inference step: embeds `ids`, advances the cell and returns log-probabilities.
    fn inference_step(
        &self,
        embedding: &Embedding,
        ids: &Tensor,
        states: &[CellState],
    ) -> (Tensor, Vec<CellState>) {
        let inputs = embedding.decoder_embedding_lookup(ids);
        let (output, new_states) = self.cell.step(&inputs, states, false);
        let log_probs = self.project(&output).log_softmax(-1, Kind::Float);
        (log_probs, new_states)
    }

    /// Greedy decoding: starts from `sos` and feeds back the most likely token until every
    /// sequence produced `eos` or `max_iterations` is reached.
    ///
    /// # Returns
    ///
    /// * ids of shape `[batch, length]`, `eos` after the end of each sequence
    pub fn decode_greedy(
        &self,
        embedding: &Embedding,
        initial_state: Vec<CellState>,
        batch_size: i64,
        max_iterations: i64,
    ) -> Result<Tensor, NmtError> {
        let device = embedding.device();
        let (sos_id, eos_id) = self.special_ids(embedding);
        let mut states = self.initial_state(Some(initial_state), batch_size, device)?;
        let mut ids = Tensor::full([batch_size], sos_id, (Kind::Int64, device));
        let mut finished = Tensor::zeros([batch_size], (Kind::Int64, device));

        let mut outputs = Vec::with_capacity(max_iterations.max(0) as usize);
        for _ in 0..max_iterations {
            let (log_probs, new_states) = self.inference_step(embedding, &ids, &states);
            states = new_states;
            let next = log_probs.argmax(-1, false);
            let next: Tensor = &next * (1 - &finished) + &finished * eos_id;
            finished = finished.logical_or(&next.eq(eos_id)).to_kind(Kind::Int64);
            outputs.push(next.shallow_clone());
            ids = next;
            if finished.sum(Kind::Int64).int64_value(&[]) == batch_size {
                break;
            }
        }

        if outputs.is_empty() {
            return Ok(pad_ids(&vec![vec![]; batch_size as usize], eos_id, device));
        }
        Ok(Tensor::stack(&outputs, 1))
    }

    /// Beam search decoding, see [`BeamSearch`].
    pub fn decode_beam(
        &self,
        embedding: &Embedding,
        initial_state: Vec<CellState>,
        batch_size: i64,
        beam_width: i64,
        length_penalty_weight: f64,
        max_iterations: i64,
    ) -> Result<Tensor, NmtError> {
        let device = embedding.device();
        let (sos_id, eos_id) = self.special_ids(embedding);
        let initial_state = self.initial_state(Some(initial_state), batch_size, device)?;
        let search = BeamSearch {
            beam_width,
            length_penalty_weight,
            sos_id,
            eos_id,
            max_iterations,
        };
        search.search(&initial_state, batch_size, device, |ids, states| {
            self.inference_step(embedding, ids, states)
        })
    }

    /// Maps decoded ids to target tokens, dropping everything from the first `eos`.
    pub fn ids_to_tokens(
        &self,
        embedding: &Embedding,
        ids: &Tensor,
    ) -> Result<Vec<Vec<String>>, NmtError> {
        let vocab = embedding.target_vocab();
        let eos_id = vocab.token_to_id(&self.eos);
        let ids = ids.to_device(Device::Cpu).to_kind(Kind::Int64);
        (0..ids.size()[0])
            .map(|row| {
                let row_ids = Vec::<i64>::try_from(&ids.get(row))?;
                let end = row_ids
                    .iter()
                    .position(|&id| id == eos_id)
                    .unwrap_or(row_ids.len());
                Ok(vocab.reverse_lookup(&row_ids[..end]))
            })
            .collect()
    }
}
