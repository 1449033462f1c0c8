#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Per-node builds for sprig
//!
//! A build is two steps behind two seams. A [`SourceProvider`] places the
//! node's sources in its stage directory, then a [`BuildExecutor`] runs the
//! configure, build and install phases into the node's prefix. The
//! scheduler owns both as trait objects so tests can substitute either.
//!
//! Phase commands come from a [`BuildSystem`] strategy chosen by the
//! node's build-system tag; recipe hooks run around each phase.

pub mod build_systems;
mod context;
mod executor;
mod hooks;
mod source;

pub use build_systems::{strategy_for, BuildDirs, BuildSystem};
pub use context::BuildRequest;
pub use executor::{BuildExecutor, BuildReport, PhaseExecutor};
pub use hooks::{HookCommand, PhaseHooks};
pub use source::{copy_directory_recursive, MirrorSourceProvider, SourceProvider, ARCHIVE_SUFFIXES};
