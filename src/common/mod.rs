pub mod config;
pub(crate) mod dropout;
pub mod error;
pub(crate) mod linear;

pub use config::Config;
