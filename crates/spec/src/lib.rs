#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Spec data model for sprig
//!
//! A [`Spec`] is an immutable, possibly partial package request; the
//! constraint operations return new values and never mutate their inputs.
//! A [`ConcreteDag`] is the resolved form: every node pinned and hashed,
//! with one node per package name.

mod dag;
mod hash;
mod parse;
mod spec;

pub use dag::{ConcreteDag, ConcreteEdge, ConcreteNode, DagBuilder, NodeDraft, NodeId};
pub use parse::format_variant;
pub use spec::{DependencySpec, Spec, VariantSchema};
