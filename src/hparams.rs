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

//! # Hyper-parameters
//!
//! A single flat record consumed by every component of the model (inputter, embedding,
//! encoder, decoder and trainer). It is read from a JSON file through the [`Config`] trait:
//!
//! ```no_run
//! use naive_nmt::hparams::HParams;
//! use naive_nmt::Config;
//!
//! let hparams = HParams::from_file("path/to/hparams.json")?;
//! hparams.validate()?;
//! # Ok::<(), naive_nmt::NmtError>(())
//! ```
//!
//! Missing keys fall back to the values of `HParams::default()`.

use crate::encoders::EncoderType;
use crate::rnn::UnitType;
use crate::vocab::check_vocab;
use crate::{Config, NmtError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
/// # Optimizer used by the trainer
pub enum OptimizerType {
    Sgd,
    Adam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HParams {
    // Data
    pub source_train_file: Option<PathBuf>,
    pub target_train_file: Option<PathBuf>,
    pub source_dev_file: Option<PathBuf>,
    pub target_dev_file: Option<PathBuf>,
    pub source_test_file: Option<PathBuf>,
    pub target_test_file: Option<PathBuf>,
    pub source_vocab_file: Option<PathBuf>,
    pub target_vocab_file: Option<PathBuf>,
    pub source_embedding_file: Option<PathBuf>,
    pub target_embedding_file: Option<PathBuf>,
    pub out_dir: PathBuf,

    // Vocabulary
    pub source_vocab_size: Option<i64>,
    pub target_vocab_size: Option<i64>,
    pub share_vocab: bool,
    pub check_special_token: bool,
    pub unk: String,
    pub unk_id: i64,
    pub sos: String,
    pub eos: String,

    // Embedding
    pub source_embedding_size: i64,
    pub target_embedding_size: i64,
    pub num_embedding_partitions: i64,

    // Network
    pub num_units: i64,
    pub num_encoder_layers: i64,
    pub num_decoder_layers: i64,
    pub num_encoder_residual_layers: i64,
    pub num_decoder_residual_layers: i64,
    pub encoder_type: EncoderType,
    pub unit_type: UnitType,
    pub forget_bias: f64,
    pub dropout: f64,
    pub init_weight: f64,
    pub time_major: bool,

    // Dataset
    pub random_seed: i64,
    pub num_buckets: i64,
    pub src_max_len: i64,
    pub tgt_max_len: i64,
    pub src_max_len_infer: i64,
    pub tgt_max_len_infer: i64,
    pub buff_size: i64,
    pub skip_count: i64,
    pub batch_size: i64,
    pub infer_batch_size: i64,

    // Inference
    pub beam_width: i64,
    pub length_penalty_weight: f64,
    pub decoding_length_factor: f64,

    // Training
    pub optimizer: OptimizerType,
    pub learning_rate: f64,
    pub max_gradient_norm: f64,
    pub num_train_steps: i64,
    pub steps_per_stats: i64,
    pub steps_per_external_eval: i64,
}

impl Config for HParams {}

impl Default for HParams {
    fn default() -> Self {
        HParams {
            source_train_file: None,
            target_train_file: None,
            source_dev_file: None,
            target_dev_file: None,
            source_test_file: None,
            target_test_file: None,
            source_vocab_file: None,
            target_vocab_file: None,
            source_embedding_file: None,
            target_embedding_file: None,
            out_dir: PathBuf::from("/tmp/model"),
            source_vocab_size: None,
            target_vocab_size: None,
            share_vocab: false,
            check_special_token: true,
            unk: "<unk>".to_string(),
            unk_id: 0,
            sos: "<s>".to_string(),
            eos: "</s>".to_string(),
            source_embedding_size: 256,
            target_embedding_size: 256,
            num_embedding_partitions: 0,
            num_units: 256,
            num_encoder_layers: 2,
            num_decoder_layers: 2,
            num_encoder_residual_layers: 0,
            num_decoder_residual_layers: 0,
            encoder_type: EncoderType::Bi,
            unit_type: UnitType::Lstm,
            forget_bias: 1.0,
            dropout: 0.2,
            init_weight: 0.1,
            time_major: true,
            random_seed: 1000,
            num_buckets: 5,
            src_max_len: 50,
            tgt_max_len: 50,
            src_max_len_infer: 0,
            tgt_max_len_infer: 0,
            buff_size: 1024,
            skip_count: 0,
            batch_size: 128,
            infer_batch_size: 32,
            beam_width: 0,
            length_penalty_weight: 0.0,
            decoding_length_factor: 2.0,
            optimizer: OptimizerType::Sgd,
            learning_rate: 1.0,
            max_gradient_norm: 5.0,
            num_train_steps: 12000,
            steps_per_stats: 100,
            steps_per_external_eval: 1000,
        }
    }
}

impl HParams {
    /// Checks the settings that cannot be caught while building the individual components.
    pub fn validate(&self) -> Result<(), NmtError> {
        if self.num_units <= 0 {
            return Err(NmtError::InvalidConfigurationError(format!(
                "num_units must be positive, got {}",
                self.num_units
            )));
        }
        if self.num_encoder_layers <= 0 || self.num_decoder_layers <= 0 {
            return Err(NmtError::InvalidConfigurationError(
                "the encoder and the decoder need at least one layer".into(),
            ));
        }
        if self.encoder_type == EncoderType::Bi && self.num_encoder_layers % 2 != 0 {
            return Err(NmtError::InvalidConfigurationError(format!(
                "num_encoder_layers must be even when encoder_type is bi, got {}",
                self.num_encoder_layers
            )));
        }
        if self.num_encoder_layers != self.num_decoder_layers {
            return Err(NmtError::InvalidConfigurationError(format!(
                "the decoder is initialized with the encoder state: num_encoder_layers ({}) must equal num_decoder_layers ({})",
                self.num_encoder_layers, self.num_decoder_layers
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NmtError::InvalidConfigurationError(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.batch_size <= 0 || self.infer_batch_size <= 0 {
            return Err(NmtError::InvalidConfigurationError(
                "batch sizes must be positive".into(),
            ));
        }
        if self.beam_width < 0 {
            return Err(NmtError::InvalidConfigurationError(format!(
                "beam_width must not be negative, got {}",
                self.beam_width
            )));
        }
        Ok(())
    }

    /// With `check_special_token`, makes sure both vocabularies start with `unk`, `sos` and
    /// `eos`, pointing the vocabulary files to fixed copies written in `out_dir/source` and
    /// `out_dir/target` when needed and updating the vocabulary sizes.
    pub fn check_vocab_files(&mut self) -> Result<(), NmtError> {
        if !self.check_special_token {
            return Ok(());
        }
        if let Some(source_vocab_file) = &self.source_vocab_file {
            let source_dir = self.out_dir.join("source");
            let (path, size) =
                check_vocab(source_vocab_file, source_dir, &self.unk, &self.sos, &self.eos)?;
            self.source_vocab_file = Some(path);
            self.source_vocab_size = Some(size);
        }
        let target_vocab_file = if self.share_vocab {
            self.target_vocab_file.clone().or_else(|| self.source_vocab_file.clone())
        } else {
            self.target_vocab_file.clone()
        };
        if let Some(target_vocab_file) = target_vocab_file {
            let target_dir = self.out_dir.join("target");
            let (path, size) =
                check_vocab(&target_vocab_file, target_dir, &self.unk, &self.sos, &self.eos)?;
            self.target_vocab_file = Some(path);
            self.target_vocab_size = Some(size);
        }
        Ok(())
    }

    /// Residual layers of each direction of a bidirectional encoder.
    pub fn num_bi_residual_layers(&self) -> i64 {
        self.num_encoder_residual_layers / 2
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let hparams: HParams =
            serde_json::from_str(r#"{"unit_type": "gru", "encoder_type": "uni", "num_units": 32}"#)
                .unwrap();
        assert_eq!(hparams.unit_type, UnitType::Gru);
        assert_eq!(hparams.encoder_type, EncoderType::Uni);
        assert_eq!(hparams.num_units, 32);
        assert_eq!(hparams.eos, "</s>");
        assert_eq!(hparams.num_buckets, 5);
    }

    #[test]
    fn odd_bidirectional_layers_are_rejected() {
        let hparams = HParams {
            num_encoder_layers: 3,
            num_decoder_layers: 3,
            ..Default::default()
        };
        assert!(matches!(
            hparams.validate(),
            Err(NmtError::InvalidConfigurationError(_))
        ));
    }

    #[test]
    fn unknown_unit_type_fails_to_parse() {
        let parsed: Result<HParams, _> = serde_json::from_str(r#"{"unit_type": "rnn"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn vocab_files_get_special_tokens() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let vocab_file = dir.path().join("vocab.src");
        std::fs::write(&vocab_file, "hello\nworld\n")?;
        let out_dir = dir.path().join("out");
        let mut hparams = HParams {
            source_vocab_file: Some(vocab_file),
            share_vocab: true,
            out_dir: out_dir.clone(),
            ..Default::default()
        };

        hparams.check_vocab_files()?;
        assert_eq!(hparams.source_vocab_size, Some(5));
        assert_eq!(hparams.target_vocab_size, Some(5));
        assert_eq!(
            hparams.source_vocab_file,
            Some(out_dir.join("source").join("vocab.src"))
        );
        assert_eq!(hparams.target_vocab_file, hparams.source_vocab_file);
        Ok(())
    }

    #[test]
    fn vocab_files_with_the_same_name_stay_apart() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let write_vocab = |language: &str, content: &str| -> anyhow::Result<PathBuf> {
            let language_dir = dir.path().join(language);
            std::fs::create_dir_all(&language_dir)?;
            let path = language_dir.join("vocab.txt");
            std::fs::write(&path, content)?;
            Ok(path)
        };
        let mut hparams = HParams {
            source_vocab_file: Some(write_vocab("en", "hello\nworld\n")?),
            target_vocab_file: Some(write_vocab("vi", "xin\nchao\nban\n")?),
            out_dir: dir.path().join("out"),
            ..Default::default()
        };

        hparams.check_vocab_files()?;

        assert_eq!(hparams.source_vocab_size, Some(5));
        assert_eq!(hparams.target_vocab_size, Some(6));
        let source_vocab = crate::vocab::load_vocab(hparams.source_vocab_file.as_ref().unwrap())?;
        let target_vocab = crate::vocab::load_vocab(hparams.target_vocab_file.as_ref().unwrap())?;
        assert_eq!(source_vocab, vec!["<unk>", "<s>", "</s>", "hello", "world"]);
        assert_eq!(
            target_vocab,
            vec!["<unk>", "<s>", "</s>", "xin", "chao", "ban"]
        );
        Ok(())
    }
}
