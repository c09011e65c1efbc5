//! Source spans
//!
//! Byte-offset spans with line/column information, attached to every node.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A region of source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset
    pub start: u32,
    /// End byte offset (exclusive)
    pub end: u32,
    /// 1-indexed line of the start offset
    pub line: u32,
    /// 1-indexed column of the start offset
    pub column: u32,
}

impl Span {
    /// Create a new span
    pub fn new(start: u32, end: u32, line: u32, column: u32) -> Self {
        Span {
            start,
            end,
            line,
            column,
        }
    }

    /// Span for synthesized nodes with no source location
    pub fn synthetic() -> Self {
        Span::new(0, 0, 1, 1)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
