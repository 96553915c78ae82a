//! Candidate matching and unattended reconciliation

pub mod auto;
pub mod matcher;
pub mod scoring;

pub use auto::*;
pub use matcher::*;
pub use scoring::*;
