//! foreman: a minimal process supervisor built on POSIX signals.
//!
//! Two binaries share this crate: `foreman` (the interactive supervisor,
//! owning a roster of workers) and `foreman-worker` (an autonomous tally
//! process). The only transport between them is signal delivery with the
//! sender's pid as payload; see `protocol` for the wire contract.

pub mod commands;
pub mod config;
pub mod process;
pub mod protocol;
pub mod roster;
pub mod sampler;
pub mod signals;
pub mod supervisor;
pub mod worker;
