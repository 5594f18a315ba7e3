//! # Input pipelines
//!
//! An `Inputter` turns text files into padded batches of tokens. Training batches are drawn
//! from a shuffle buffer, grouped by length into buckets and padded with the end of sentence
//! token; prediction batches keep the order of the input file.
//!
//! ```no_run
//! use naive_nmt::hparams::HParams;
//! use naive_nmt::inputters::{Inputter, Mode, TextInputter};
//!
//! let hparams = HParams::default();
//! let inputter = TextInputter::new(Some("input.txt".into()));
//! for batch in inputter.iterator(Mode::Predict, &hparams, 0)? {
//!     println!("{:?}", batch.source);
//! }
//! # Ok::<(), naive_nmt::NmtError>(())
//! ```

mod dataset;
mod text_inputter;

pub use dataset::{
    inference_batches, pad_sequences, read_lines, shuffle_order, Batch, DatasetConfig,
    ParallelDataset,
};
pub use text_inputter::TextInputter;

use crate::hparams::HParams;
use crate::NmtError;
use tch::{Device, Tensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Running mode of a model
pub enum Mode {
    Train,
    Eval,
    Predict,
}

/// # Source of model inputs
pub trait Inputter {
    /// Batches of one pass over the data of `mode`. `epoch` changes the shuffling order of
    /// training data.
    fn iterator(
        &self,
        mode: Mode,
        hparams: &HParams,
        epoch: i64,
    ) -> Result<std::vec::IntoIter<Batch>, NmtError>;

    /// Number of tokens of every (unpadded) sequence.
    fn get_length(&self, sequences: &[Vec<String>]) -> Vec<i64> {
        sequences.iter().map(|s| s.len() as i64).collect()
    }

    fn source_sequence_length(&self, batch: &Batch, device: Device) -> Tensor {
        batch.source_length_tensor(device)
    }

    fn target_sequence_length(&self, batch: &Batch, device: Device) -> Result<Tensor, NmtError> {
        batch
            .target_length_tensor(device)
            .ok_or_else(|| NmtError::ValueError("batch has no target sequences".into()))
    }

    fn target_output<'a>(&self, batch: &'a Batch) -> Result<&'a [Vec<String>], NmtError> {
        batch
            .target_output
            .as_deref()
            .ok_or_else(|| NmtError::ValueError("batch has no target sequences".into()))
    }

    /// Batches raw sentences for translation.
    fn serving_input_receiver(&self, sentences: &[String], hparams: &HParams) -> Vec<Batch> {
        inference_batches(sentences, &DatasetConfig::inference(hparams))
    }
}
