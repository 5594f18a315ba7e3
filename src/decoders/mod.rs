//! # Sequence decoders
//!
//! `BasicDecoder` generates target sentences from the final encoder states. Training feeds the
//! reference target tokens (teacher forcing) and returns logits over the target vocabulary;
//! inference either feeds back the most likely token (greedy) or keeps the `beam_width` best
//! hypotheses ranked by a length-penalized log-probability.

mod basic_decoder;
mod beam_search;

pub use basic_decoder::{BasicDecoder, DecoderConfig};
pub use beam_search::{length_penalty, pad_ids, BeamSearch};
