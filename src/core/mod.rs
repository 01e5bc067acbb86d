//! Core constants, errors and collaborator traits.
//!
//! Nothing in here performs I/O; the connection machinery in
//! [`conn`](crate::conn) builds on these pieces.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
