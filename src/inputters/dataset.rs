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

use crate::hparams::HParams;
use crate::NmtError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tch::{Device, Kind, Tensor};

/// # Padded batch of token sequences
/// Every sequence of a batch is padded with the end of sentence token to the longest one.
/// Target fields are `None` for inference batches.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub source: Vec<Vec<String>>,
    pub source_length: Vec<i64>,
    /// `sos` followed by the target tokens
    pub target_input: Option<Vec<Vec<String>>>,
    /// Target tokens followed by `eos`
    pub target_output: Option<Vec<Vec<String>>>,
    pub target_length: Option<Vec<i64>>,
}

impl Batch {
    pub fn batch_size(&self) -> i64 {
        self.source.len() as i64
    }

    pub fn max_source_length(&self) -> i64 {
        self.source_length.iter().copied().max().unwrap_or(0)
    }

    pub fn source_length_tensor(&self, device: Device) -> Tensor {
        lengths_tensor(&self.source_length, device)
    }

    pub fn target_length_tensor(&self, device: Device) -> Option<Tensor> {
        self.target_length
            .as_ref()
            .map(|lengths| lengths_tensor(lengths, device))
    }

    /// Number of target tokens (including `eos`), used to report per-word statistics.
    pub fn target_word_count(&self) -> i64 {
        self.target_length
            .as_ref()
            .map(|lengths| lengths.iter().sum())
            .unwrap_or(0)
    }
}

fn lengths_tensor(lengths: &[i64], device: Device) -> Tensor {
    Tensor::from_slice(lengths)
        .to_kind(Kind::Int64)
        .to_device(device)
}

#[derive(Debug, Clone)]
/// # Batching settings
pub struct DatasetConfig {
    pub sos: String,
    pub eos: String,
    /// Source and target truncation lengths, no truncation when `<= 0`
    pub src_max_len: i64,
    pub tgt_max_len: i64,
    pub num_buckets: i64,
    pub batch_size: i64,
    pub random_seed: i64,
    pub skip_count: i64,
    /// Size of the shuffle buffer, no shuffling when `<= 0`
    pub buff_size: i64,
}

impl DatasetConfig {
    pub fn training(hparams: &HParams) -> DatasetConfig {
        DatasetConfig {
            sos: hparams.sos.clone(),
            eos: hparams.eos.clone(),
            src_max_len: hparams.src_max_len,
            tgt_max_len: hparams.tgt_max_len,
            num_buckets: hparams.num_buckets,
            batch_size: hparams.batch_size,
            random_seed: hparams.random_seed,
            skip_count: hparams.skip_count,
            buff_size: hparams.buff_size,
        }
    }

    /// Evaluation keeps the training truncation and bucketing, in file order.
    pub fn evaluation(hparams: &HParams) -> DatasetConfig {
        DatasetConfig {
            skip_count: 0,
            buff_size: 0,
            ..DatasetConfig::training(hparams)
        }
    }

    pub fn inference(hparams: &HParams) -> DatasetConfig {
        DatasetConfig {
            src_max_len: hparams.src_max_len_infer,
            tgt_max_len: hparams.tgt_max_len_infer,
            num_buckets: 1,
            batch_size: hparams.infer_batch_size,
            skip_count: 0,
            buff_size: 0,
            ..DatasetConfig::training(hparams)
        }
    }

    /// Width of a length bucket.
    pub fn bucket_width(&self) -> i64 {
        if self.src_max_len > 0 {
            (self.src_max_len + self.num_buckets - 1) / self.num_buckets
        } else {
            10
        }
    }

    /// Bucket of a pair, from the longer of its two sides.
    pub fn bucket_id(&self, source_length: i64, target_length: i64) -> i64 {
        let width = self.bucket_width().max(1);
        let bucket_id = (source_length / width).max(target_length / width);
        bucket_id.min(self.num_buckets)
    }
}

/// Reads the lines of a text file.
pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>, NmtError> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| {
        NmtError::IOError(format!("Could not open data file {}: {}", path.display(), e))
    })?;
    BufReader::new(f)
        .lines()
        .map(|line| line.map_err(NmtError::from))
        .collect()
}

fn split_and_truncate(line: &str, max_len: i64) -> Vec<String> {
    let tokens = line.split_whitespace().map(String::from);
    if max_len > 0 {
        tokens.take(max_len as usize).collect()
    } else {
        tokens.collect()
    }
}

/// Pads every sequence to the longest one of the batch.
pub fn pad_sequences(sequences: Vec<Vec<String>>, pad: &str) -> Vec<Vec<String>> {
    let max_len = sequences.iter().map(Vec::len).max().unwrap_or(0);
    sequences
        .into_iter()
        .map(|mut sequence| {
            sequence.resize(max_len, pad.to_string());
            sequence
        })
        .collect()
}

/// Visits `0..len` in the order of a shuffle buffer of `buffer_size` elements: the buffer is
/// filled in order and each output is drawn uniformly from it. The draws come from a generator
/// seeded with `seed`, libtorch's global generator is left untouched.
pub fn shuffle_order(len: usize, buffer_size: usize, seed: i64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed as u64);
    let buffer_size = buffer_size.max(1);
    let mut next = 0usize;
    let mut buffer: Vec<usize> = Vec::with_capacity(buffer_size);
    let mut order = Vec::with_capacity(len);
    for _ in 0..len {
        while buffer.len() < buffer_size && next < len {
            buffer.push(next);
            next += 1;
        }
        let position = rng.gen_range(0..buffer.len());
        order.push(buffer.swap_remove(position));
    }
    order
}

/// # Parallel corpus
/// Source/target pairs split on whitespace, with empty pairs dropped and both sides truncated.
#[derive(Debug, Clone)]
pub struct ParallelDataset {
    pairs: Vec<(Vec<String>, Vec<String>)>,
    config: DatasetConfig,
}

impl ParallelDataset {
    pub fn from_files<P: AsRef<Path>>(
        source_file: P,
        target_file: P,
        config: DatasetConfig,
    ) -> Result<ParallelDataset, NmtError> {
        let source_lines = read_lines(source_file)?;
        let target_lines = read_lines(target_file)?;
        if source_lines.len() != target_lines.len() {
            tracing::warn!(
                "source and target files have {} and {} lines, extra lines are ignored",
                source_lines.len(),
                target_lines.len()
            );
        }
        Ok(ParallelDataset::from_lines(
            &source_lines,
            &target_lines,
            config,
        ))
    }

    pub fn from_lines<S: AsRef<str>>(
        source_lines: &[S],
        target_lines: &[S],
        config: DatasetConfig,
    ) -> ParallelDataset {
        let pairs: Vec<(Vec<String>, Vec<String>)> = source_lines
            .iter()
            .zip(target_lines.iter())
            .skip(config.skip_count.max(0) as usize)
            .map(|(source, target)| {
                (
                    split_and_truncate(source.as_ref(), config.src_max_len),
                    split_and_truncate(target.as_ref(), config.tgt_max_len),
                )
            })
            .filter(|(source, target)| !source.is_empty() && !target.is_empty())
            .collect();
        tracing::debug!("parallel dataset with {} pairs", pairs.len());
        ParallelDataset { pairs, config }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Batches of one pass over the data. With a shuffle buffer the order depends on
    /// `random_seed + epoch`; with more than one bucket, pairs of similar lengths are batched
    /// together.
    pub fn batches(&self, epoch: i64) -> Vec<Batch> {
        let order: Vec<usize> = if self.config.buff_size > 0 {
            shuffle_order(
                self.pairs.len(),
                self.config.buff_size as usize,
                self.config.random_seed + epoch,
            )
        } else {
            (0..self.pairs.len()).collect()
        };

        let batch_size = self.config.batch_size.max(1) as usize;
        if self.config.num_buckets <= 1 {
            return order
                .chunks(batch_size)
                .map(|indices| self.make_batch(indices))
                .collect();
        }

        let mut buckets: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        let mut batches = Vec::new();
        for index in order {
            let (source, target) = &self.pairs[index];
            // `tgt_in` is one token longer than the target itself
            let bucket_id = self
                .config
                .bucket_id(source.len() as i64, target.len() as i64 + 1);
            let bucket = buckets.entry(bucket_id).or_insert_with(Vec::new);
            bucket.push(index);
            if bucket.len() == batch_size {
                batches.push(self.make_batch(bucket));
                bucket.clear();
            }
        }
        for bucket in buckets.values().filter(|bucket| !bucket.is_empty()) {
            batches.push(self.make_batch(bucket));
        }
        batches
    }

    fn make_batch(&self, indices: &[usize]) -> Batch {
        let mut source = Vec::with_capacity(indices.len());
        let mut target_input = Vec::with_capacity(indices.len());
        let mut target_output = Vec::with_capacity(indices.len());
        for &index in indices {
            let (source_tokens, target_tokens) = &self.pairs[index];
            source.push(source_tokens.clone());

            let mut input = Vec::with_capacity(target_tokens.len() + 1);
            input.push(self.config.sos.clone());
            input.extend(target_tokens.iter().cloned());
            target_input.push(input);

            let mut output = target_tokens.clone();
            output.push(self.config.eos.clone());
            target_output.push(output);
        }
        let source_length = source.iter().map(|s| s.len() as i64).collect();
        let target_length = target_input.iter().map(|s| s.len() as i64).collect();

        Batch {
            source: pad_sequences(source, &self.config.eos),
            source_length,
            target_input: Some(pad_sequences(target_input, &self.config.eos)),
            target_output: Some(pad_sequences(target_output, &self.config.eos)),
            target_length: Some(target_length),
        }
    }
}

/// Batches source sentences for inference, in order, without bucketing.
pub fn inference_batches<S: AsRef<str>>(sentences: &[S], config: &DatasetConfig) -> Vec<Batch> {
    let batch_size = config.batch_size.max(1) as usize;
    sentences
        .chunks(batch_size)
        .map(|chunk| {
            let source: Vec<Vec<String>> = chunk
                .iter()
                .map(|sentence| split_and_truncate(sentence.as_ref(), config.src_max_len))
                .collect();
            let source_length = source.iter().map(|s| s.len() as i64).collect();
            Batch {
                source: pad_sequences(source, &config.eos),
                source_length,
                target_input: None,
                target_output: None,
                target_length: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> DatasetConfig {
        DatasetConfig {
            sos: "<s>".into(),
            eos: "</s>".into(),
            src_max_len: 50,
            tgt_max_len: 50,
            num_buckets: 5,
            batch_size: 2,
            random_seed: 1000,
            skip_count: 0,
            buff_size: 0,
        }
    }

    #[test]
    fn bucket_ids_follow_the_longer_side() {
        let config = config();
        assert_eq!(config.bucket_width(), 10);
        assert_eq!(config.bucket_id(3, 12), 1);
        assert_eq!(config.bucket_id(45, 2), 4);
        assert_eq!(config.bucket_id(500, 2), 5);
        let unbounded = DatasetConfig {
            src_max_len: 0,
            ..config
        };
        assert_eq!(unbounded.bucket_width(), 10);
    }

    #[test]
    fn targets_are_framed_and_padded_with_eos() {
        let dataset = ParallelDataset::from_lines(
            &["a b c", "d"],
            &["x y", "z"],
            DatasetConfig {
                num_buckets: 1,
                ..config()
            },
        );
        let batches = dataset.batches(0);
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.source[1], vec!["d", "</s>", "</s>"]);
        assert_eq!(batch.source_length, vec![3, 1]);
        let target_input = batch.target_input.as_ref().unwrap();
        let target_output = batch.target_output.as_ref().unwrap();
        assert_eq!(target_input[0], vec!["<s>", "x", "y"]);
        assert_eq!(target_output[0], vec!["x", "y", "</s>"]);
        assert_eq!(target_input[1], vec!["<s>", "z", "</s>"]);
        assert_eq!(batch.target_length, Some(vec![3, 2]));
    }

    #[test]
    fn empty_pairs_are_dropped_and_sides_truncated() {
        let dataset = ParallelDataset::from_lines(
            &["a b c d", "", "e"],
            &["x", "y", "   "],
            DatasetConfig {
                src_max_len: 2,
                ..config()
            },
        );
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.batches(0)[0].source[0], vec!["a", "b"]);
    }

    #[test]
    fn skip_count_drops_leading_pairs() {
        let dataset = ParallelDataset::from_lines(
            &["a", "b", "c"],
            &["x", "y", "z"],
            DatasetConfig {
                skip_count: 2,
                ..config()
            },
        );
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.batches(0)[0].source[0], vec!["c"]);
    }

    #[test]
    fn shuffle_is_a_seeded_permutation() {
        let order = shuffle_order(100, 16, 7);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<usize>>());
        assert_eq!(order, shuffle_order(100, 16, 7));
    }

    fn sentence(length: usize) -> String {
        (0..length)
            .map(|i| format!("w{}", i))
            .collect::<Vec<String>>()
            .join(" ")
    }

    #[test]
    fn full_buckets_come_first_then_leftovers_in_bucket_order() {
        let sources: Vec<String> = [1, 12, 25, 2, 15, 3].iter().map(|&n| sentence(n)).collect();
        let targets = vec![String::from("x"); sources.len()];
        let dataset = ParallelDataset::from_lines(&sources, &targets, config());

        let batches = dataset.batches(0);

        let lengths: Vec<Vec<i64>> = batches
            .iter()
            .map(|batch| batch.source_length.clone())
            .collect();
        assert_eq!(lengths, vec![vec![1, 2], vec![12, 15], vec![3], vec![25]]);
        let config = dataset.config();
        let bucket_ids: Vec<i64> = batches
            .iter()
            .map(|batch| {
                let target_length = batch.target_length.as_ref().unwrap();
                let ids: Vec<i64> = batch
                    .source_length
                    .iter()
                    .zip(target_length.iter())
                    .map(|(&source, &target)| config.bucket_id(source, target))
                    .collect();
                assert!(ids.iter().all(|&id| id == ids[0]));
                ids[0]
            })
            .collect();
        assert_eq!(bucket_ids, vec![0, 1, 0, 2]);
    }

    #[test]
    fn shuffled_buckets_keep_every_pair() {
        let sources: Vec<String> = (1..=30).map(|n| sentence(n % 23 + 1)).collect();
        let targets: Vec<String> = (1..=30).map(|n| sentence(n % 7 + 1)).collect();
        let dataset = ParallelDataset::from_lines(
            &sources,
            &targets,
            DatasetConfig {
                buff_size: 8,
                ..config()
            },
        );

        let batches = dataset.batches(3);

        assert_eq!(
            batches.iter().map(Batch::batch_size).sum::<i64>(),
            dataset.len() as i64
        );
        assert!(batches.iter().all(|batch| batch.batch_size() <= 2));
    }

    #[test]
    fn every_epoch_is_reshuffled() {
        let sources: Vec<String> = (0..20).map(|i| format!("s{}", i)).collect();
        let targets = vec![String::from("x"); sources.len()];
        let dataset = ParallelDataset::from_lines(
            &sources,
            &targets,
            DatasetConfig {
                num_buckets: 1,
                buff_size: 8,
                ..config()
            },
        );
        let order = |epoch: i64| -> Vec<String> {
            dataset
                .batches(epoch)
                .into_iter()
                .flat_map(|batch| batch.source.into_iter().map(|tokens| tokens[0].clone()))
                .collect()
        };

        let first_epoch = order(0);

        assert_eq!(first_epoch.len(), 20);
        assert_eq!(first_epoch, order(0));
        assert_ne!(first_epoch, order(1));
    }
}
