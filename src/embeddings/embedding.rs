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

use crate::common::linear::uniform_init;
use crate::embeddings::pretrained::{
    frozen_embedding_rows, load_embedding_txt, NUM_TRAINABLE_TOKENS,
};
use crate::hparams::HParams;
use crate::vocab::{VocabTable, UNK, UNK_ID};
use crate::NmtError;
use std::path::{Path, PathBuf};
use tch::nn::Init;
use tch::{nn, Device, Kind, Tensor};

/// Vocabularies larger than this keep their embedding matrix in host memory.
pub const VOCAB_SIZE_THRESHOLD: i64 = 50000;

/// Device holding the embedding matrix of a vocabulary of `vocab_size` tokens.
pub fn embedding_device(vocab_size: i64, default_device: Device) -> Device {
    if vocab_size > VOCAB_SIZE_THRESHOLD {
        Device::Cpu
    } else {
        default_device
    }
}

/// Row count of each shard when `vocab_size` rows are split over `num_partitions` shards.
/// The first `vocab_size % num_partitions` shards hold one extra row.
pub fn partition_sizes(vocab_size: i64, num_partitions: i64) -> Vec<i64> {
    let num_partitions = num_partitions.min(vocab_size).max(1);
    let base = vocab_size / num_partitions;
    let extra = vocab_size % num_partitions;
    (0..num_partitions)
        .map(|index| if index < extra { base + 1 } else { base })
        .collect()
}

#[derive(Debug, Clone)]
/// # Embedding configuration
/// Vocabulary, pretrained files and placement settings of the encoder and decoder embeddings.
pub struct EmbeddingConfig {
    pub src_vocab_file: PathBuf,
    pub tgt_vocab_file: PathBuf,
    /// Expected vocabulary sizes. Taken from the vocabulary files when `None`.
    pub src_vocab_size: Option<i64>,
    pub tgt_vocab_size: Option<i64>,
    pub src_embedding_size: i64,
    pub tgt_embedding_size: i64,
    pub src_embedding_file: Option<PathBuf>,
    pub tgt_embedding_file: Option<PathBuf>,
    pub share_vocab: bool,
    pub num_partitions: i64,
    pub unk: String,
    pub unk_id: i64,
    pub init_weight: f64,
    /// Device of the model. Embedding outputs are returned on this device.
    pub device: Device,
}

impl EmbeddingConfig {
    pub fn new<P: AsRef<Path>>(
        src_vocab_file: P,
        tgt_vocab_file: P,
        src_embedding_size: i64,
        tgt_embedding_size: i64,
        device: Device,
    ) -> EmbeddingConfig {
        EmbeddingConfig {
            src_vocab_file: src_vocab_file.as_ref().to_path_buf(),
            tgt_vocab_file: tgt_vocab_file.as_ref().to_path_buf(),
            src_vocab_size: None,
            tgt_vocab_size: None,
            src_embedding_size,
            tgt_embedding_size,
            src_embedding_file: None,
            tgt_embedding_file: None,
            share_vocab: false,
            num_partitions: 0,
            unk: UNK.to_string(),
            unk_id: UNK_ID,
            init_weight: 0.1,
            device,
        }
    }

    pub fn from_hparams(hparams: &HParams, device: Device) -> Result<EmbeddingConfig, NmtError> {
        let src_vocab_file = hparams.source_vocab_file.clone().ok_or_else(|| {
            NmtError::InvalidConfigurationError("source_vocab_file must be set".into())
        })?;
        let tgt_vocab_file = if hparams.share_vocab {
            hparams
                .target_vocab_file
                .clone()
                .unwrap_or_else(|| src_vocab_file.clone())
        } else {
            hparams.target_vocab_file.clone().ok_or_else(|| {
                NmtError::InvalidConfigurationError("target_vocab_file must be set".into())
            })?
        };
        Ok(EmbeddingConfig {
            src_vocab_file,
            tgt_vocab_file,
            src_vocab_size: hparams.source_vocab_size,
            tgt_vocab_size: hparams.target_vocab_size,
            src_embedding_size: hparams.source_embedding_size,
            tgt_embedding_size: hparams.target_embedding_size,
            src_embedding_file: hparams.source_embedding_file.clone(),
            tgt_embedding_file: hparams.target_embedding_file.clone(),
            share_vocab: hparams.share_vocab,
            num_partitions: hparams.num_embedding_partitions,
            unk: hparams.unk.clone(),
            unk_id: hparams.unk_id,
            init_weight: hparams.init_weight,
            device,
        })
    }
}

/// Storage of one embedding matrix
enum MatrixStorage {
    /// Single `[vocab_size, embedding_size]` variable
    Variable(Tensor),
    /// Row shards, concatenated in order
    Partitioned(Vec<Tensor>),
    /// Trainable special token rows followed by frozen pretrained rows
    Pretrained { trainable: Tensor, frozen: Tensor },
}

/// # Embedding matrix with its own variable store
/// Each matrix lives in a `VarStore` placed by [`embedding_device`], which may differ from the
/// device of the rest of the model.
pub struct EmbeddingMatrix {
    var_store: nn::VarStore,
    storage: MatrixStorage,
    vocab_size: i64,
    embedding_size: i64,
}

impl EmbeddingMatrix {
    fn variable(
        name: &str,
        vocab_size: i64,
        embedding_size: i64,
        num_partitions: i64,
        init: Init,
        device: Device,
    ) -> EmbeddingMatrix {
        let var_store = nn::VarStore::new(device);
        let p = var_store.root() / "embedding";
        let storage = if num_partitions > 1 {
            let p = &p / name;
            let shards = partition_sizes(vocab_size, num_partitions)
                .into_iter()
                .enumerate()
                .map(|(index, rows)| {
                    p.var(&format!("part_{}", index), &[rows, embedding_size], init)
                })
                .collect();
            MatrixStorage::Partitioned(shards)
        } else {
            MatrixStorage::Variable(p.var(name, &[vocab_size, embedding_size], init))
        };
        EmbeddingMatrix {
            var_store,
            storage,
            vocab_size,
            embedding_size,
        }
    }

    fn pretrained(
        vocab: &VocabTable,
        embedding_file: &Path,
        embedding_size: i64,
        init: Init,
        device: Device,
    ) -> Result<EmbeddingMatrix, NmtError> {
        let pretrained = load_embedding_txt(embedding_file)?;
        if pretrained.embedding_size != embedding_size {
            tracing::warn!(
                "embedding size of {} is {}, overriding the configured size {}",
                embedding_file.display(),
                pretrained.embedding_size,
                embedding_size
            );
        }
        let num_trainable_tokens = NUM_TRAINABLE_TOKENS.min(vocab.size());

        let var_store = nn::VarStore::new(device);
        let p = var_store.root() / "embedding" / "pretrained_embedding";
        let trainable = p.var(
            "embedding_matrix_variable",
            &[num_trainable_tokens, pretrained.embedding_size],
            init,
        );
        let frozen =
            frozen_embedding_rows(vocab.tokens(), &pretrained, num_trainable_tokens, device)?;
        tracing::debug!(
            "loaded {} pretrained vectors of size {} from {}",
            pretrained.vectors.len(),
            pretrained.embedding_size,
            embedding_file.display()
        );
        Ok(EmbeddingMatrix {
            var_store,
            storage: MatrixStorage::Pretrained { trainable, frozen },
            vocab_size: vocab.size(),
            embedding_size: pretrained.embedding_size,
        })
    }

    /// Full `[vocab_size, embedding_size]` matrix.
    pub fn matrix(&self) -> Tensor {
        match &self.storage {
            MatrixStorage::Variable(matrix) => matrix.shallow_clone(),
            MatrixStorage::Partitioned(shards) => Tensor::cat(shards, 0),
            MatrixStorage::Pretrained { trainable, frozen } => {
                Tensor::cat(&[trainable, frozen], 0)
            }
        }
    }

    /// Embeds a tensor of ids of any shape, adding a trailing embedding dimension.
    pub fn lookup(&self, ids: &Tensor) -> Tensor {
        let matrix = self.matrix();
        let ids = ids.to_device(matrix.device());
        Tensor::embedding(&matrix, &ids, -1, false, false)
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.var_store
    }

    pub fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.var_store
    }

    pub fn device(&self) -> Device {
        self.var_store.device()
    }

    pub fn vocab_size(&self) -> i64 {
        self.vocab_size
    }

    pub fn embedding_size(&self) -> i64 {
        self.embedding_size
    }

    pub fn num_partitions(&self) -> usize {
        match &self.storage {
            MatrixStorage::Partitioned(shards) => shards.len(),
            _ => 1,
        }
    }

    pub fn is_pretrained(&self) -> bool {
        matches!(self.storage, MatrixStorage::Pretrained { .. })
    }
}

/// # Encoder and decoder embeddings
/// Holds the source and target vocabulary tables and the two embedding matrices. With a shared
/// vocabulary the decoder reads the encoder matrix.
pub struct Embedding {
    src_str2idx: VocabTable,
    tgt_str2idx: VocabTable,
    encoder_embedding: EmbeddingMatrix,
    decoder_embedding: Option<EmbeddingMatrix>,
    share_vocab: bool,
    device: Device,
}

impl Embedding {
    /// Loads the vocabulary tables and creates (or loads) the embedding matrices.
    ///
    /// # Arguments
    ///
    /// * `config` - `EmbeddingConfig` with the vocabulary files, sizes and pretrained files
    ///
    /// # Errors
    ///
    /// * `ValueError` if pretrained embeddings are combined with `num_partitions > 1`
    /// * `ValueError` if the vocabulary is shared but the source and target sizes differ
    /// * `ValueError` if a configured vocabulary size does not match its vocabulary file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use naive_nmt::embeddings::{Embedding, EmbeddingConfig};
    /// use tch::Device;
    ///
    /// let config = EmbeddingConfig::new("vocab.en", "vocab.vi", 128, 128, Device::Cpu);
    /// let embedding = Embedding::new(&config)?;
    /// let inputs = embedding.encoder_embedding_input(&[vec!["hello", "world"]])?;
    /// # Ok::<(), naive_nmt::NmtError>(())
    /// ```
    pub fn new(config: &EmbeddingConfig) -> Result<Embedding, NmtError> {
        let src_str2idx = VocabTable::from_file(&config.src_vocab_file, &config.unk, config.unk_id)?;
        let tgt_str2idx = VocabTable::from_file(&config.tgt_vocab_file, &config.unk, config.unk_id)?;

        let uses_pretrained =
            config.src_embedding_file.is_some() || config.tgt_embedding_file.is_some();
        if uses_pretrained && config.num_partitions > 1 {
            return Err(NmtError::ValueError(
                "Can't set num_partitions > 1 when using pretrained embedding".into(),
            ));
        }

        let src_vocab_size = checked_vocab_size(&src_str2idx, config.src_vocab_size, "source")?;
        let tgt_vocab_size = checked_vocab_size(&tgt_str2idx, config.tgt_vocab_size, "target")?;
        let init = uniform_init(config.init_weight);

        let encoder_embedding = create_or_load_embedding(
            "encoder_embedding",
            &src_str2idx,
            config.src_embedding_file.as_deref(),
            src_vocab_size,
            config.src_embedding_size,
            config.num_partitions,
            init,
            config.device,
        )?;

        let decoder_embedding = if config.share_vocab {
            if src_vocab_size != tgt_vocab_size {
                return Err(NmtError::ValueError(
                    "Share embedding but different src/tgt vocab size.".into(),
                ));
            }
            None
        } else {
            Some(create_or_load_embedding(
                "decoder_embedding",
                &tgt_str2idx,
                config.tgt_embedding_file.as_deref(),
                tgt_vocab_size,
                config.tgt_embedding_size,
                config.num_partitions,
                init,
                config.device,
            )?)
        };

        tracing::info!(
            "embeddings: source vocab {} (device {:?}), target vocab {}, shared: {}",
            src_vocab_size,
            encoder_embedding.device(),
            tgt_vocab_size,
            config.share_vocab
        );

        Ok(Embedding {
            src_str2idx,
            tgt_str2idx,
            encoder_embedding,
            decoder_embedding,
            share_vocab: config.share_vocab,
            device: config.device,
        })
    }

    pub fn encoder_embedding(&self) -> &EmbeddingMatrix {
        &self.encoder_embedding
    }

    pub fn decoder_embedding(&self) -> &EmbeddingMatrix {
        self.decoder_embedding
            .as_ref()
            .unwrap_or(&self.encoder_embedding)
    }

    pub fn source_vocab(&self) -> &VocabTable {
        &self.src_str2idx
    }

    pub fn target_vocab(&self) -> &VocabTable {
        &self.tgt_str2idx
    }

    pub fn share_vocab(&self) -> bool {
        self.share_vocab
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Source token ids of a padded token batch, shape `[batch, time]`.
    pub fn source_ids<S: AsRef<str>>(&self, inputs: &[Vec<S>]) -> Result<Tensor, NmtError> {
        token_ids(&self.src_str2idx, inputs, self.device)
    }

    /// Target token ids of a padded token batch, shape `[batch, time]`.
    pub fn target_ids<S: AsRef<str>>(&self, inputs: &[Vec<S>]) -> Result<Tensor, NmtError> {
        token_ids(&self.tgt_str2idx, inputs, self.device)
    }

    /// Embeds a padded batch of source tokens, shape `[batch, time, src_embedding_size]`.
    pub fn encoder_embedding_input<S: AsRef<str>>(
        &self,
        inputs: &[Vec<S>],
    ) -> Result<Tensor, NmtError> {
        let ids = self.source_ids(inputs)?;
        Ok(self.encoder_embedding_lookup(&ids))
    }

    /// Embeds a padded batch of target tokens, shape `[batch, time, tgt_embedding_size]`.
    pub fn decoder_embedding_input<S: AsRef<str>>(
        &self,
        inputs: &[Vec<S>],
    ) -> Result<Tensor, NmtError> {
        let ids = self.target_ids(inputs)?;
        Ok(self.decoder_embedding_lookup(&ids))
    }

    pub fn encoder_embedding_lookup(&self, ids: &Tensor) -> Tensor {
        self.encoder_embedding.lookup(ids).to_device(self.device)
    }

    pub fn decoder_embedding_lookup(&self, ids: &Tensor) -> Tensor {
        self.decoder_embedding().lookup(ids).to_device(self.device)
    }

    /// Variable stores of the matrices, encoder first. A shared vocabulary has a single store.
    pub fn var_stores(&self) -> Vec<&nn::VarStore> {
        let mut stores = vec![self.encoder_embedding.var_store()];
        if let Some(decoder_embedding) = &self.decoder_embedding {
            stores.push(decoder_embedding.var_store());
        }
        stores
    }

    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), NmtError> {
        let dir = dir.as_ref();
        self.encoder_embedding
            .var_store()
            .save(dir.join("encoder_embedding.ot"))?;
        if let Some(decoder_embedding) = &self.decoder_embedding {
            decoder_embedding
                .var_store()
                .save(dir.join("decoder_embedding.ot"))?;
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(&mut self, dir: P) -> Result<(), NmtError> {
        let dir = dir.as_ref();
        self.encoder_embedding
            .var_store_mut()
            .load(dir.join("encoder_embedding.ot"))?;
        if let Some(decoder_embedding) = &mut self.decoder_embedding {
            decoder_embedding
                .var_store_mut()
                .load(dir.join("decoder_embedding.ot"))?;
        }
        Ok(())
    }
}

fn checked_vocab_size(
    vocab: &VocabTable,
    expected: Option<i64>,
    side: &str,
) -> Result<i64, NmtError> {
    match expected {
        Some(size) if size != vocab.size() => Err(NmtError::ValueError(format!(
            "{} vocab size is {} but the vocabulary file has {} entries",
            side,
            size,
            vocab.size()
        ))),
        _ => Ok(vocab.size()),
    }
}

#[allow(clippy::too_many_arguments)]
fn create_or_load_embedding(
    name: &str,
    vocab: &VocabTable,
    embedding_file: Option<&Path>,
    vocab_size: i64,
    embedding_size: i64,
    num_partitions: i64,
    init: Init,
    default_device: Device,
) -> Result<EmbeddingMatrix, NmtError> {
    let device = embedding_device(vocab_size, default_device);
    match embedding_file {
        Some(embedding_file) => {
            EmbeddingMatrix::pretrained(vocab, embedding_file, embedding_size, init, device)
        }
        None => Ok(EmbeddingMatrix::variable(
            name,
            vocab_size,
            embedding_size,
            num_partitions,
            init,
            device,
        )),
    }
}

fn token_ids<S: AsRef<str>>(
    vocab: &VocabTable,
    inputs: &[Vec<S>],
    device: Device,
) -> Result<Tensor, NmtError> {
    let batch_size = inputs.len() as i64;
    let max_len = inputs.iter().map(Vec::len).max().unwrap_or(0);
    if inputs.iter().any(|sequence| sequence.len() != max_len) {
        return Err(NmtError::ValueError(
            "token batches must be padded to a common length".into(),
        ));
    }
    let ids: Vec<i64> = inputs
        .iter()
        .flat_map(|sequence| vocab.lookup(sequence))
        .collect();
    Ok(Tensor::from_slice(&ids)
        .view([batch_size, max_len as i64])
        .to_kind(Kind::Int64)
        .to_device(device))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn large_vocabularies_stay_on_cpu() {
        assert_eq!(
            embedding_device(VOCAB_SIZE_THRESHOLD + 1, Device::Cuda(0)),
            Device::Cpu
        );
        assert_eq!(
            embedding_device(VOCAB_SIZE_THRESHOLD, Device::Cuda(0)),
            Device::Cuda(0)
        );
    }

    #[test]
    fn partition_sizes_cover_the_vocabulary() {
        assert_eq!(partition_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(partition_sizes(2, 4), vec![1, 1]);
        assert_eq!(partition_sizes(7, 1), vec![7]);
        assert_eq!(partition_sizes(100, 4).iter().sum::<i64>(), 100);
    }
}
