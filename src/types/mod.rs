//! Type definitions

pub mod job;
pub mod record;

pub use job::*;
pub use record::*;
