#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Concretization for sprig
//!
//! The resolver turns abstract specs into a single [`ConcreteDag`] in which
//! every node has one version, one value per variant, one compiler and one
//! architecture. The search is a depth-first backtracking walk over package
//! and virtual slots: each slot's candidates are tried in preference order
//! and every constraint is forward-checked against the remaining
//! candidates of the slot it lands on. When every branch fails, all the
//! conflicts met on the way are reported together.
//!
//! [`ConcreteDag`]: sprig_spec::ConcreteDag

mod candidates;
mod resolver;
mod state;

pub use resolver::{Resolver, ResolverOptions};
