//! # naive-nmt
//!
//! Recurrent sequence-to-sequence neural machine translation on top of
//! [tch-rs](https://github.com/LaurentMazare/tch-rs), the Rust bindings of libtorch.
//!
//! A translation model is assembled from four parts:
//! - an **inputter** reading parallel text files into padded, length-bucketed batches
//!   ([`inputters`])
//! - the **embeddings** of the source and target vocabularies, optionally shared, partitioned
//!   or initialized from pretrained vectors ([`embeddings`], [`vocab`])
//! - a unidirectional or bidirectional recurrent **encoder** ([`encoders`]) built from LSTM,
//!   GRU, layer-normalized LSTM or NAS cells ([`rnn`])
//! - a recurrent **decoder** trained with teacher forcing and decoding greedily or with beam
//!   search ([`decoders`])
//!
//! Every component is configured from a single [`hparams::HParams`] record.
//!
//! ```no_run
//! use naive_nmt::hparams::HParams;
//! use naive_nmt::models::BasicModel;
//! use naive_nmt::training::Trainer;
//! use naive_nmt::Config;
//! use tch::{nn, Device};
//!
//! let hparams = HParams::from_file("hparams.json")?;
//! let vs = nn::VarStore::new(Device::cuda_if_available());
//! let model = BasicModel::new(vs.root(), &hparams, None)?;
//! let mut trainer = Trainer::new(model, vs, &hparams)?;
//! trainer.train()?;
//!
//! let translations = trainer.model().infer(&["a source sentence"])?;
//! # Ok::<(), naive_nmt::NmtError>(())
//! ```

pub mod common;
pub mod decoders;
pub mod embeddings;
pub mod encoders;
pub mod hparams;
pub mod inputters;
pub mod models;
pub mod rnn;
pub mod training;
pub mod vocab;

pub use common::error::NmtError;
pub use common::Config;
