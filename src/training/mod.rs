//! # Training driver
//!
//! `Trainer` runs the optimization loop of a `SequenceToSequence` model: teacher-forced
//! forward pass, masked cross-entropy, gradient clipping and one optimizer step per variable
//! store. It periodically logs training perplexity, evaluates the dev set and writes
//! checkpoints that `load_basic_model` restores for translation.

mod trainer;

pub use trainer::{
    load_basic_model, perplexity, StepOutput, Trainer, TrainingStats, HPARAMS_FILE,
    MODEL_CHECKPOINT,
};
