//! This module contains the abstract domain over which the analysis
//! operates: 256-bit values, stacks and memories that are either concretely
//! known or unknown, together with the lattice operations that combine them.
//!
//! # Lattice Structure
//!
//! Every type in this module forms a small lattice. Values have exactly two
//! levels (a concrete word, or [`value::AbsValue::Top`]), stacks and memories
//! are unknown as a whole or concrete in shape, and whole machine states add
//! an unreachable bottom element. Joins are pointwise wherever the shapes
//! agree and widen to the unknown element wherever they do not.
//!
//! # Aliasing
//!
//! All of the types here are plain values. The interpreter clones a state
//! before mutating it, so states reachable from multiple worklist entries are
//! never aliased.

pub mod memory;
pub mod stack;
pub mod state;
pub mod value;

pub use memory::AbsMemory;
pub use stack::AbsStack;
pub use state::{AbsState, MachineState};
pub use value::AbsValue;
