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

use crate::decoders::{BasicDecoder, DecoderConfig};
use crate::embeddings::{Embedding, EmbeddingConfig};
use crate::encoders::{BasicEncoder, EncoderConfig};
use crate::hparams::HParams;
use crate::inputters::TextInputter;
use crate::models::SequenceToSequence;
use crate::NmtError;
use std::borrow::Borrow;
use std::path::PathBuf;
use tch::nn;

/// # Text-file translation model
/// A `SequenceToSequence` model reading plain text files through a `TextInputter`.
pub type BasicModel = SequenceToSequence<TextInputter>;

impl SequenceToSequence<TextInputter> {
    /// Build a new `BasicModel`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the encoder and decoder. The embeddings are kept in
    ///   their own variable stores (see `Embedding::var_stores`).
    /// * `hparams` - `HParams` for every component of the model
    /// * `infer_file` - file to translate with `infer_file`, `source_test_file` when `None`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use naive_nmt::hparams::HParams;
    /// use naive_nmt::models::BasicModel;
    /// use naive_nmt::Config;
    /// use tch::{nn, Device};
    ///
    /// let hparams = HParams::from_file("hparams.json")?;
    /// let vs = nn::VarStore::new(Device::cuda_if_available());
    /// let model = BasicModel::new(vs.root(), &hparams, None)?;
    /// let translations = model.infer(&["hello world"])?;
    /// # Ok::<(), naive_nmt::NmtError>(())
    /// ```
    pub fn new<'p, P>(
        p: P,
        hparams: &HParams,
        infer_file: Option<PathBuf>,
    ) -> Result<BasicModel, NmtError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        hparams.validate()?;

        let inputter = TextInputter::new(infer_file);
        let embedding = Embedding::new(&EmbeddingConfig::from_hparams(hparams, p.device())?)?;

        let encoder_config =
            EncoderConfig::from_hparams(hparams, embedding.encoder_embedding().embedding_size());
        let encoder = BasicEncoder::new(p / "encoder", &encoder_config)?;

        let decoder_config = DecoderConfig::from_hparams(
            hparams,
            embedding.decoder_embedding().embedding_size(),
            embedding.target_vocab().size(),
        );
        let decoder = BasicDecoder::new(p / "decoder", &decoder_config);

        tracing::info!(
            "built {:?} {:?} model with {} layers of {} units",
            hparams.encoder_type,
            hparams.unit_type,
            hparams.num_encoder_layers,
            hparams.num_units
        );
        SequenceToSequence::from_parts(inputter, embedding, encoder, decoder, hparams.clone())
    }
}
