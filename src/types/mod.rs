//! Type definitions for novapg

mod account;
mod error;
mod metric;

pub use account::*;
pub use error::*;
pub use metric::*;
