//! Door-controller topic hierarchy and message parsing

pub mod topics;

pub use topics::*;
