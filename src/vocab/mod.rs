//! # Vocabulary tables
//!
//! String to index and index to string tables loaded from newline-delimited vocabulary files.
//! Both directions have a default value so lookups are total: unknown tokens resolve to the
//! unknown id, ids outside of the table resolve to the unknown token.

mod vocab_table;

pub use vocab_table::{check_vocab, load_vocab, VocabTable, EOS, SOS, UNK, UNK_ID};
