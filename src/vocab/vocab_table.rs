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
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default unknown token
pub const UNK: &str = "<unk>";
/// Default start of sentence token
pub const SOS: &str = "<s>";
/// Default end of sentence token
pub const EOS: &str = "</s>";
/// Default unknown token id
pub const UNK_ID: i64 = 0;

/// # Bidirectional token/index table backed by a vocabulary file
/// Tokens are indexed by their line number. Lookups never fail: unknown tokens map to `unk_id`
/// and out-of-range ids map to the `unk` token.
#[derive(Debug, Clone)]
pub struct VocabTable {
    tokens: Vec<String>,
    indices: HashMap<String, i64>,
    unk: String,
    unk_id: i64,
}

impl VocabTable {
    /// Reads a newline-delimited UTF-8 vocabulary file.
    ///
    /// # Arguments
    ///
    /// * `path` - vocabulary file, one token per line
    /// * `unk` - token returned for ids outside of the vocabulary
    /// * `unk_id` - id returned for tokens outside of the vocabulary
    ///
    /// # Example
    ///
    /// ```no_run
    /// use naive_nmt::vocab::VocabTable;
    ///
    /// let vocab = VocabTable::from_file("path/to/vocab.en", "<unk>", 0)?;
    /// let ids = vocab.lookup(&["hello", "world"]);
    /// # Ok::<(), naive_nmt::NmtError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P, unk: &str, unk_id: i64) -> Result<VocabTable, NmtError> {
        let tokens = load_vocab(path)?;
        Ok(VocabTable::from_tokens(tokens, unk, unk_id))
    }

    pub fn from_tokens(tokens: Vec<String>, unk: &str, unk_id: i64) -> VocabTable {
        let mut indices = HashMap::with_capacity(tokens.len());
        for (index, token) in tokens.iter().enumerate() {
            // First occurrence wins, as for a file-backed hash table.
            indices.entry(token.clone()).or_insert(index as i64);
        }
        VocabTable {
            tokens,
            indices,
            unk: unk.to_string(),
            unk_id,
        }
    }

    pub fn size(&self) -> i64 {
        self.tokens.len() as i64
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn unk(&self) -> &str {
        &self.unk
    }

    pub fn unk_id(&self) -> i64 {
        self.unk_id
    }

    pub fn contains(&self, token: &str) -> bool {
        self.indices.contains_key(token)
    }

    pub fn token_to_id(&self, token: &str) -> i64 {
        *self.indices.get(token).unwrap_or(&self.unk_id)
    }

    pub fn id_to_token(&self, id: i64) -> &str {
        if id < 0 {
            return &self.unk;
        }
        self.tokens
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or(&self.unk)
    }

    pub fn lookup<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<i64> {
        tokens
            .iter()
            .map(|token| self.token_to_id(token.as_ref()))
            .collect()
    }

    pub fn reverse_lookup(&self, ids: &[i64]) -> Vec<String> {
        ids.iter()
            .map(|id| self.id_to_token(*id).to_string())
            .collect()
    }
}

/// Reads the tokens of a vocabulary file, one per line, surrounding whitespace removed.
pub fn load_vocab<P: AsRef<Path>>(path: P) -> Result<Vec<String>, NmtError> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| {
        NmtError::IOError(format!(
            "Could not open vocabulary file {}: {}",
            path.display(),
            e
        ))
    })?;
    let mut tokens = Vec::new();
    for line in BufReader::new(f).lines() {
        tokens.push(line?.trim().to_string());
    }
    Ok(tokens)
}

/// Makes sure the vocabulary starts with `unk`, `sos` and `eos`.
///
/// When it does not, a copy with the three special tokens prepended is written to `out_dir`
/// (same file name) and its path is returned with the new size. Otherwise the input file is
/// returned untouched.
pub fn check_vocab<P: AsRef<Path>, Q: AsRef<Path>>(
    vocab_file: P,
    out_dir: Q,
    unk: &str,
    sos: &str,
    eos: &str,
) -> Result<(PathBuf, i64), NmtError> {
    let vocab_file = vocab_file.as_ref();
    let mut tokens = load_vocab(vocab_file)?;
    let has_special_tokens =
        tokens.len() >= 3 && tokens[0] == unk && tokens[1] == sos && tokens[2] == eos;
    if has_special_tokens {
        return Ok((vocab_file.to_path_buf(), tokens.len() as i64));
    }

    tracing::info!(
        "vocabulary {} does not start with {}, {}, {}: prepending them",
        vocab_file.display(),
        unk,
        sos,
        eos
    );
    let mut checked = vec![unk.to_string(), sos.to_string(), eos.to_string()];
    checked.append(&mut tokens);

    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;
    let file_name = vocab_file.file_name().ok_or_else(|| {
        NmtError::IOError(format!("Invalid vocabulary path {}", vocab_file.display()))
    })?;
    let new_vocab_file = out_dir.join(file_name);
    let mut writer = BufWriter::new(File::create(&new_vocab_file)?);
    for token in checked.iter() {
        writeln!(writer, "{}", token)?;
    }
    writer.flush()?;
    Ok((new_vocab_file, checked.len() as i64))
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> VocabTable {
        VocabTable::from_tokens(
            vec!["<unk>", "<s>", "</s>", "hello", "world"]
                .into_iter()
                .map(String::from)
                .collect(),
            UNK,
            UNK_ID,
        )
    }

    #[test]
    fn unknown_tokens_map_to_default_id() {
        let vocab = table();
        assert_eq!(vocab.lookup(&["hello", "there", "world"]), vec![3, 0, 4]);
    }

    #[test]
    fn out_of_range_ids_map_to_default_token() {
        let vocab = table();
        assert_eq!(
            vocab.reverse_lookup(&[4, 17, -1]),
            vec!["world".to_string(), "<unk>".to_string(), "<unk>".to_string()]
        );
    }
}
