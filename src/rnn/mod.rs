//! # Recurrent building blocks
//!
//! Cells (LSTM, GRU, layer-normalized LSTM and NAS), stacks of cells with dropout and residual
//! connections, and an unrolling loop for padded batches of variable-length sequences.

mod cells;
mod dynamic;
mod stack;

pub use cells::{
    CellState, GruCell, LayerNormLstmCell, LstmCell, NasCell, RecurrentCell, RnnCell, UnitType,
};
pub use dynamic::{dynamic_rnn, reverse_sequence, sequence_mask};
pub use stack::{MultiRnnCell, StackConfig};
