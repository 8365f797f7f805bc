//! Core types, traits, constants and errors (always compiled).

pub mod constants;
mod error;
mod traits;
mod types;

pub use constants::*;
pub use error::*;
pub use traits::*;
pub use types::*;
