//! Evaluation errors
//!
//! Two categories with different policies. Lookup misses (missing
//! attributes, uncallable objects) are expected while analyzing code that
//! may not even run; callers catch them, report a diagnostic and continue
//! with an empty value set. Structural misuse (an operation a wrapper kind
//! does not support) indicates a defect in the evaluation layer itself and
//! is allowed to propagate.

use thiserror::Error;

/// Result alias for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors produced by wrapper operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// No sub-scope or attribute with the given name exists on the target
    #[error("no attribute or sub-scope named '{name}' on {on}")]
    SubscopeNotFound {
        /// The looked-up name
        name: String,
        /// Description of the search target
        on: String,
    },

    /// The target cannot be called
    #[error("{on} is not callable")]
    NotCallable {
        /// Description of the call target
        on: String,
    },

    /// The operation is not part of the target wrapper kind's contract
    #[error("operation '{op}' is not supported on {on}")]
    UnsupportedOperation {
        /// Operation name
        op: &'static str,
        /// Description of the target
        on: String,
    },

    /// `path()` was requested on a module that is not a package
    #[error("{on} is not a package")]
    NotAPackage {
        /// Description of the module
        on: String,
    },
}

impl EvalError {
    /// Whether this is an expected lookup miss (empty set + diagnostic at
    /// the call site) rather than a structural defect
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            EvalError::SubscopeNotFound { .. } | EvalError::NotCallable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_miss_classification() {
        let miss = EvalError::SubscopeNotFound {
            name: "__iter__".to_string(),
            on: "instance of C".to_string(),
        };
        assert!(miss.is_lookup_miss());

        let misuse = EvalError::UnsupportedOperation {
            op: "path",
            on: "function f".to_string(),
        };
        assert!(!misuse.is_lookup_miss());
    }

    #[test]
    fn test_error_display() {
        let err = EvalError::NotCallable {
            on: "module m".to_string(),
        };
        assert_eq!(format!("{}", err), "module m is not callable");
    }
}
