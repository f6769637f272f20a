//! System documents and their structural invariants.

mod types;
mod validate;

pub use types::*;
pub use validate::{ValidationError, Violation, validate};
