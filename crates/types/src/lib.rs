#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core value types for sprig
//!
//! Versions and version constraints, variant values, dependency edge
//! types, compiler and architecture descriptors, build-system tags and
//! build phases. These are the leaf values the spec
//! model is assembled from.

pub mod build_system;
pub mod deptypes;
pub mod toolchain;
pub mod variant;
pub mod version;

pub use build_system::{BuildPhase, BuildSystemKind, HookStage};
pub use deptypes::DepTypes;
pub use toolchain::{ArchSpec, CompilerSpec};
pub use variant::VariantValue;
pub use version::{Version, VersionConstraint, VersionItem, VersionRange, INFINITY_VERSIONS};
