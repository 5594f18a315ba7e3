//! # Translation models
//!
//! `SequenceToSequence` ties an inputter, the embeddings, an encoder and a decoder together
//! and exposes the training forward pass, the loss and inference. `BasicModel` is the
//! text-file flavour built entirely from `HParams`.

mod basic_model;
mod sequence_to_sequence;

pub use basic_model::BasicModel;
pub use sequence_to_sequence::{LossOutput, SequenceToSequence};
