//! # Encoder and decoder embeddings
//!
//! Embedding matrices for the source and target vocabularies, created as fresh variables,
//! split into row shards, or loaded from a text file of pretrained vectors.
//!
//! With pretrained vectors the first three vocabulary entries (`<unk>`, `<s>`, `</s>`) get a
//! trainable `[3, dim]` variable while the remaining rows are frozen. The two are concatenated
//! on every read so the optimizer only sees the trainable slice.
//!
//! ```no_run
//! use naive_nmt::embeddings::{Embedding, EmbeddingConfig};
//! use tch::Device;
//!
//! let mut config = EmbeddingConfig::new("vocab.en", "vocab.vi", 300, 300, Device::Cpu);
//! config.src_embedding_file = Some("glove.en.300d.txt".into());
//! let embedding = Embedding::new(&config)?;
//! # Ok::<(), naive_nmt::NmtError>(())
//! ```

mod embedding;
mod pretrained;

pub use embedding::{
    embedding_device, partition_sizes, Embedding, EmbeddingConfig, EmbeddingMatrix,
    VOCAB_SIZE_THRESHOLD,
};
pub use pretrained::{
    frozen_embedding_rows, load_embedding_txt, PretrainedVectors, NUM_TRAINABLE_TOKENS,
};
