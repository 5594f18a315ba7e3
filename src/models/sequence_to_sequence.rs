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

use crate::decoders::BasicDecoder;
use crate::embeddings::Embedding;
use crate::encoders::BasicEncoder;
use crate::hparams::HParams;
use crate::inputters::{Batch, Inputter, Mode};
use crate::rnn::sequence_mask;
use crate::NmtError;
use tch::{Device, Kind, Tensor};

/// Container for the training loss of a batch.
pub struct LossOutput {
    /// Cross-entropy summed over the target tokens, divided by the batch size
    pub loss: Tensor,
    /// Number of target tokens the loss was computed on
    pub predict_count: i64,
}

/// # Encoder-decoder translation model
/// Chains an `Inputter`, the shared `Embedding`, a `BasicEncoder` and a `BasicDecoder`.
/// The decoder starts from the final encoder states.
pub struct SequenceToSequence<I: Inputter> {
    inputter: I,
    embedding: Embedding,
    encoder: BasicEncoder,
    decoder: BasicDecoder,
    hparams: HParams,
}

impl<I: Inputter> SequenceToSequence<I> {
    /// Assembles a model from its components.
    ///
    /// # Errors
    ///
    /// * `InvalidConfigurationError` if the encoder and decoder layer counts differ
    pub fn from_parts(
        inputter: I,
        embedding: Embedding,
        encoder: BasicEncoder,
        decoder: BasicDecoder,
        hparams: HParams,
    ) -> Result<SequenceToSequence<I>, NmtError> {
        if encoder.num_layers() != decoder.num_layers() {
            return Err(NmtError::InvalidConfigurationError(format!(
                "encoder has {} layers but decoder has {}",
                encoder.num_layers(),
                decoder.num_layers()
            )));
        }
        Ok(SequenceToSequence {
            inputter,
            embedding,
            encoder,
            decoder,
            hparams,
        })
    }

    pub fn inputter(&self) -> &I {
        &self.inputter
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    pub fn embedding_mut(&mut self) -> &mut Embedding {
        &mut self.embedding
    }

    pub fn encoder(&self) -> &BasicEncoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &BasicDecoder {
        &self.decoder
    }

    pub fn hparams(&self) -> &HParams {
        &self.hparams
    }

    fn device(&self) -> Device {
        self.embedding.device()
    }

    /// Forward pass with teacher forcing.
    ///
    /// # Arguments
    ///
    /// * `batch` - training or evaluation `Batch` (with targets)
    /// * `train` - enables dropout
    ///
    /// # Returns
    ///
    /// * logits of shape `[batch, target_time, target_vocab_size]`
    pub fn forward_t(&self, batch: &Batch, train: bool) -> Result<Tensor, NmtError> {
        let mode = if train { Mode::Train } else { Mode::Eval };
        let device = self.device();
        let source_length = self.inputter.source_sequence_length(batch, device);
        let encoder_output =
            self.encoder
                .encode_tokens(mode, &self.embedding, &batch.source, &source_length)?;

        let target_input = batch
            .target_input
            .as_deref()
            .ok_or_else(|| NmtError::ValueError("batch has no target sequences".into()))?;
        let target_length = self.inputter.target_sequence_length(batch, device)?;
        self.decoder.decode_train(
            mode,
            &self.embedding,
            target_input,
            &target_length,
            Some(encoder_output.states),
        )
    }

    /// Masked cross-entropy of `logits` against the target outputs of `batch`, summed over
    /// the valid tokens and divided by the batch size.
    pub fn compute_loss(&self, logits: &Tensor, batch: &Batch) -> Result<LossOutput, NmtError> {
        let target_output = self.inputter.target_output(batch)?;
        let target_ids = self
            .embedding
            .target_ids(target_output)?
            .to_device(logits.device());
        let target_length = self
            .inputter
            .target_sequence_length(batch, logits.device())?;
        let max_time = target_ids.size()[1];
        let mask = sequence_mask(&target_length, max_time).transpose(0, 1);

        let crossent = -logits
            .log_softmax(-1, Kind::Float)
            .gather(2, &target_ids.unsqueeze(-1), false)
            .squeeze_dim(-1);
        let loss = (crossent * mask).sum(Kind::Float) / batch.batch_size() as f64;
        Ok(LossOutput {
            loss,
            predict_count: batch.target_word_count(),
        })
    }

    /// Translates one batch of source sentences, greedy when `beam_width == 0`.
    pub fn infer_batch(&self, batch: &Batch) -> Result<Vec<Vec<String>>, NmtError> {
        tch::no_grad(|| {
            let device = self.device();
            let source_length = self.inputter.source_sequence_length(batch, device);
            let encoder_output = self.encoder.encode_tokens(
                Mode::Predict,
                &self.embedding,
                &batch.source,
                &source_length,
            )?;
            let max_iterations = self
                .decoder
                .maximum_iterations(batch.max_source_length());
            let ids = if self.hparams.beam_width > 0 {
                self.decoder.decode_beam(
                    &self.embedding,
                    encoder_output.states,
                    batch.batch_size(),
                    self.hparams.beam_width,
                    self.hparams.length_penalty_weight,
                    max_iterations,
                )?
            } else {
                self.decoder.decode_greedy(
                    &self.embedding,
                    encoder_output.states,
                    batch.batch_size(),
                    max_iterations,
                )?
            };
            self.decoder.ids_to_tokens(&self.embedding, &ids)
        })
    }

    /// Translates raw sentences, returning one space-joined translation per input sentence.
    pub fn infer<S: AsRef<str>>(&self, sentences: &[S]) -> Result<Vec<String>, NmtError> {
        let sentences: Vec<String> = sentences.iter().map(|s| s.as_ref().to_string()).collect();
        let batches = self
            .inputter
            .serving_input_receiver(&sentences, &self.hparams);
        self.translate_batches(batches)
    }

    /// Translates the prediction data of the inputter.
    pub fn infer_file(&self) -> Result<Vec<String>, NmtError> {
        let batches: Vec<Batch> = self
            .inputter
            .iterator(Mode::Predict, &self.hparams, 0)?
            .collect();
        self.translate_batches(batches)
    }

    fn translate_batches(&self, batches: Vec<Batch>) -> Result<Vec<String>, NmtError> {
        let mut translations = Vec::new();
        for batch in batches.iter() {
            for tokens in self.infer_batch(batch)? {
                translations.push(tokens.join(" "));
            }
        }
        Ok(translations)
    }
}
