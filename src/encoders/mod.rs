//! # Sequence encoders
//!
//! `BasicEncoder` runs a unidirectional or bidirectional stack of recurrent cells over
//! embedded source sequences. With `EncoderType::Bi`, `num_layers / 2` layers run forward and
//! as many run over the reversed sequences; their outputs are concatenated and their final
//! states interleaved so the decoder receives one state per encoder layer.

mod basic_encoder;

pub use basic_encoder::{BasicEncoder, EncoderConfig, EncoderOutput, EncoderType};
