//! Per-AST Source Metadata
//!
//! A [`SourceInfo`] travels with every AST: the description used in
//! diagnostics, the line-offset index of the text the AST was parsed
//! from, the start offset of each expression, the macro-call map, and
//! the ecosystem-extension tags the AST depends on.
//!
//! The macro-call map holds, for each macro in the tree, the call as
//! the user wrote it, keyed by the id of the expansion's root node.
//! Inside a stored call, interior nodes carry id 0 and sub-expressions
//! that survived into the expansion appear as id-only `NotSet`
//! placeholders; the unparser resolves those back into the main tree.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Expr, ExprId};
use crate::source::{location_for_offset, SourceLocation};

/// An ecosystem feature the AST depends on, as a `(name, version)` tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub version: u64,
}

impl Extension {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Source metadata for one AST.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    description: String,
    line_offsets: Vec<u32>,
    positions: HashMap<ExprId, u32>,
    macro_calls: HashMap<ExprId, Expr>,
    extensions: Vec<Extension>,
}

impl SourceInfo {
    pub fn new(description: impl Into<String>, line_offsets: Vec<u32>) -> Self {
        Self {
            description: description.into(),
            line_offsets,
            positions: HashMap::new(),
            macro_calls: HashMap::new(),
            extensions: Vec::new(),
        }
    }

    /// Label used in error messages, typically a file name.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Line offsets of the source text the AST was parsed from. These
    /// are never recomputed from a mutated tree.
    pub fn line_offsets(&self) -> &[u32] {
        &self.line_offsets
    }

    /// Code-point start offset of the expression with the given id.
    pub fn position_of(&self, id: ExprId) -> Option<u32> {
        self.positions.get(&id).copied()
    }

    /// Line/column of the expression with the given id.
    pub fn location_of(&self, id: ExprId) -> Option<SourceLocation> {
        let offset = self.position_of(id)?;
        location_for_offset(&self.line_offsets, offset as usize)
    }

    pub fn positions(&self) -> &HashMap<ExprId, u32> {
        &self.positions
    }

    pub fn set_position(&mut self, id: ExprId, offset: u32) {
        self.positions.insert(id, offset);
    }

    pub fn remove_position(&mut self, id: ExprId) -> bool {
        self.positions.remove(&id).is_some()
    }

    /// The macro-call map: expansion root id to unexpanded call.
    pub fn macro_calls(&self) -> &HashMap<ExprId, Expr> {
        &self.macro_calls
    }

    pub fn macro_call(&self, id: ExprId) -> Option<&Expr> {
        self.macro_calls.get(&id)
    }

    pub fn add_macro_call(&mut self, id: ExprId, call: Expr) {
        self.macro_calls.insert(id, call);
    }

    pub fn remove_macro_call(&mut self, id: ExprId) -> Option<Expr> {
        self.macro_calls.remove(&id)
    }

    pub(crate) fn macro_calls_mut(&mut self) -> &mut HashMap<ExprId, Expr> {
        &mut self.macro_calls
    }

    /// Extension tags in first-seen order.
    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Record an extension tag, de-duplicating by `(name, version)`.
    pub fn add_extension(&mut self, extension: Extension) {
        if !self.extensions.contains(&extension) {
            self.extensions.push(extension);
        }
    }
}
