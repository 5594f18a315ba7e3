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

use crate::NmtError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tch::{Device, Tensor};

/// Number of leading vocabulary entries (the special tokens) that remain trainable when the
/// rest of the embedding matrix is loaded from a pretrained file.
pub const NUM_TRAINABLE_TOKENS: i64 = 3;

/// # Word vectors read from a text embedding file
#[derive(Debug, Clone)]
pub struct PretrainedVectors {
    pub vectors: HashMap<String, Vec<f32>>,
    pub embedding_size: i64,
}

/// Reads a text embedding file: one `word v_1 v_2 ... v_d` record per line, fields separated by
/// single spaces. Every vector must have the same dimension.
pub fn load_embedding_txt<P: AsRef<Path>>(path: P) -> Result<PretrainedVectors, NmtError> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| {
        NmtError::IOError(format!(
            "Could not open embedding file {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut vectors = HashMap::new();
    let mut embedding_size: Option<usize> = None;
    for line in BufReader::new(f).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(' ');
        let word = match fields.next() {
            Some(word) => word.to_string(),
            None => continue,
        };
        let vector = fields
            .map(|value| value.parse::<f32>())
            .collect::<Result<Vec<f32>, _>>()?;
        match embedding_size {
            Some(size) if size != vector.len() => {
                return Err(NmtError::ValueError(format!(
                    "All embedding size should be same: expected {}, got {} for `{}`",
                    size,
                    vector.len(),
                    word
                )));
            }
            Some(_) => {}
            None => embedding_size = Some(vector.len()),
        }
        vectors.insert(word, vector);
    }

    let embedding_size = embedding_size.ok_or_else(|| {
        NmtError::ValueError(format!("Embedding file {} is empty", path.display()))
    })?;
    Ok(PretrainedVectors {
        vectors,
        embedding_size: embedding_size as i64,
    })
}

/// Builds the frozen part of a pretrained embedding matrix: the rows of every vocabulary token
/// after the first `num_trainable_tokens`, shape `[vocab_size - num_trainable_tokens, dim]`.
///
/// The leading trainable tokens do not need a pretrained vector, every other token does.
pub fn frozen_embedding_rows(
    vocab: &[String],
    pretrained: &PretrainedVectors,
    num_trainable_tokens: i64,
    device: Device,
) -> Result<Tensor, NmtError> {
    let dim = pretrained.embedding_size;
    let num_trainable_tokens = (num_trainable_tokens.max(0) as usize).min(vocab.len());
    let frozen_tokens = &vocab[num_trainable_tokens..];

    let mut values: Vec<f32> = Vec::with_capacity(frozen_tokens.len() * dim as usize);
    for token in frozen_tokens {
        match pretrained.vectors.get(token) {
            Some(vector) => values.extend_from_slice(vector),
            None => {
                return Err(NmtError::ValueError(format!(
                    "Token `{}` has no vector in the pretrained embedding file",
                    token
                )));
            }
        }
    }
    Ok(Tensor::from_slice(&values)
        .view([frozen_tokens.len() as i64, dim])
        .to_device(device))
}
