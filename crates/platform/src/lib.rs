#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Platform facts and process execution for sprig
//!
//! This crate provides:
//! - [`PlatformFacts`]: the host architecture triple and the compilers
//!   available to the concretizer's toolchain tie-break
//! - [`ProcessOperations`]: async command execution used by compiler
//!   detection and by the build executor

pub mod facts;
pub mod process;

pub use facts::{parse_os_release, PlatformFacts, DEFAULT_COMPILER_CANDIDATES};
pub use process::{CommandOutput, HostProcess, PlatformCommand, ProcessOperations};
