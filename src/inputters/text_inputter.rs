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
use crate::inputters::dataset::{
    inference_batches, read_lines, Batch, DatasetConfig, ParallelDataset,
};
use crate::inputters::{Inputter, Mode};
use crate::NmtError;
use std::path::{Path, PathBuf};

/// # Inputter over plain text files
/// One sentence per line, tokens separated by whitespace. Training reads the `*_train_file`
/// pair, evaluation the `*_dev_file` pair and prediction the file given at construction
/// (`source_test_file` when none was given).
#[derive(Debug, Clone, Default)]
pub struct TextInputter {
    predict_file: Option<PathBuf>,
}

impl TextInputter {
    pub fn new(predict_file: Option<PathBuf>) -> TextInputter {
        TextInputter { predict_file }
    }

    pub fn predict_file(&self) -> Option<&Path> {
        self.predict_file.as_deref()
    }

    fn parallel_files<'a>(
        mode: Mode,
        hparams: &'a HParams,
    ) -> Result<(&'a Path, &'a Path), NmtError> {
        let (source, target, name) = match mode {
            Mode::Train => (
                &hparams.source_train_file,
                &hparams.target_train_file,
                "train",
            ),
            Mode::Eval => (&hparams.source_dev_file, &hparams.target_dev_file, "dev"),
            Mode::Predict => {
                return Err(NmtError::ValueError(
                    "prediction has no target file".into(),
                ))
            }
        };
        match (source, target) {
            (Some(source), Some(target)) => Ok((source.as_path(), target.as_path())),
            _ => Err(NmtError::InvalidConfigurationError(format!(
                "source_{name}_file and target_{name}_file must be set",
                name = name
            ))),
        }
    }

    /// Parallel dataset of `mode` (`Mode::Train` or `Mode::Eval`).
    pub fn dataset(&self, mode: Mode, hparams: &HParams) -> Result<ParallelDataset, NmtError> {
        let (source_file, target_file) = TextInputter::parallel_files(mode, hparams)?;
        let config = match mode {
            Mode::Train => DatasetConfig::training(hparams),
            _ => DatasetConfig::evaluation(hparams),
        };
        tracing::info!(
            "loading {:?} data from {} and {}",
            mode,
            source_file.display(),
            target_file.display()
        );
        ParallelDataset::from_files(source_file, target_file, config)
    }
}

impl Inputter for TextInputter {
    fn iterator(
        &self,
        mode: Mode,
        hparams: &HParams,
        epoch: i64,
    ) -> Result<std::vec::IntoIter<Batch>, NmtError> {
        let batches = match mode {
            Mode::Train | Mode::Eval => self.dataset(mode, hparams)?.batches(epoch),
            Mode::Predict => {
                let predict_file = self
                    .predict_file
                    .as_ref()
                    .or_else(|| hparams.source_test_file.as_ref())
                    .ok_or_else(|| {
                        NmtError::InvalidConfigurationError(
                            "no file to translate: set a predict file or source_test_file".into(),
                        )
                    })?;
                let sentences = read_lines(predict_file)?;
                inference_batches(&sentences, &DatasetConfig::inference(hparams))
            }
        };
        Ok(batches.into_iter())
    }
}
