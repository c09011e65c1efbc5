//! Pythia Syntax Tree
//!
//! Immutable syntax-tree model for the Pythia inference engine.
//!
//! This crate provides:
//! - An arena-based module tree (`ModuleTree`) with stable node ids
//! - Typed node payloads for scopes, statements and expressions
//! - Scope-aware searches (returns, yields, nested scopes, name tables)
//! - A `TreeBuilder` for constructing trees (used by the parser front end
//!   and by tests)
//!
//! The tree is read-only input for the evaluation layer: it is never mutated
//! after `TreeBuilder::finish`, so trees can be shared freely behind `Rc`.

#![warn(missing_docs)]

pub mod builder;
pub mod span;
pub mod tree;

pub use builder::TreeBuilder;
pub use span::Span;
pub use tree::{
    Literal, ModuleTree, Node, NodeId, NodeKey, NodeKind, NodeRef,
};
