//! Pythia Evaluation Layer
//!
//! Wrapper representation and value-set inference for a static
//! type-inference engine over a dynamically typed language. Given parsed
//! syntax, this crate computes conservative sets of possible runtime values
//! at a program point without ever executing the analyzed code.
//!
//! This crate provides:
//! - Wrappers overlaying syntax nodes with evaluation behavior
//!   (class, function, instance, module)
//! - Method-resolution order and decorator resolution
//! - Per-call activations with return/yield inference and a recursion guard
//! - Instance self-attribute mining and descriptor dispatch
//! - Package and namespace-package path modeling
//! - A session holding the identity caches and the diagnostics sink
//!
//! # Usage
//!
//! ```ignore
//! use pythia_eval::{Arguments, Session};
//! use pythia_syntax::{NodeRef, TreeBuilder};
//!
//! // Build (or parse) a module tree, then ask wrappers questions.
//! let session = Session::new();
//! let class = session.class_wrapper(&class_node);
//! let mro = class.mro(&session);
//! let instances = class.call(&session, Arguments::none(&session));
//! ```
//!
//! Inference never aborts on problems in the analyzed code: lookup misses
//! produce empty value sets plus diagnostics, and only structural misuse of
//! the wrapper layer itself surfaces as an error.

#![warn(missing_docs)]

pub mod class;
pub mod collab;
pub mod diagnostic;
pub mod error;
pub mod execution;
pub mod function;
pub mod instance;
pub mod module;
pub mod names;
pub mod session;
pub mod value;

// Re-export main types
pub use class::ClassWrapper;
pub use collab::{
    ArgumentBinder, Arguments, BoundParam, CallObserver, Collaborators, ContainerTracker,
    EvalContext, ExpressionEvaluator, ImportResolver, NativeBridge, Reachability,
    ReachabilityClassifier, ReturnHintProvider,
};
pub use diagnostic::{Diagnostic, ErrorCode};
pub use error::{EvalError, EvalResult};
pub use execution::{EffectiveParent, FunctionExecution};
pub use function::{FunctionWrapper, GeneratorValue};
pub use instance::{ElementParent, InstanceElement, InstanceWrapper};
pub use module::ModuleWrapper;
pub use names::{Binding, BindingSource, NameMap, SyntheticKind};
pub use session::{Session, SessionConfig};
pub use value::{NativeKind, NativeObject, Value, ValueSet};
