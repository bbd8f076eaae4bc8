//! AST Model
//!
//! This module defines the expression tree that every later stage
//! operates over: the [`Constant`] literal values, the [`Expr`] node
//! with its stable 64-bit id, the [`Ast`] pairing a root expression
//! with its [`SourceInfo`], and the [`ExprFactory`] that stamps fresh
//! ids onto newly built nodes.
//!
//! # Ids
//!
//! Every id in a tree is unique and strictly positive. Id equality is
//! the canonical equality relation for nodes within one AST. Id 0 is
//! reserved for the interior nodes of unexpanded macro calls stored in
//! the macro-call map — those nodes are not part of the main tree's id
//! space.
//!
//! # Immutability
//!
//! An AST, once produced by the parser, is never modified in place.
//! The mutation engine consumes an AST and produces a new one; shared
//! fragments are logically immutable and freely shareable across
//! threads.

pub mod navigation;
pub mod printer;
pub mod source_info;

pub use source_info::{Extension, SourceInfo};

use serde::{Deserialize, Serialize};

/// Stable identifier of an expression node within one AST.
pub type ExprId = i64;

/// A typed literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Internal sentinel for constants that failed to materialize.
    Error(String),
}

impl Constant {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Null => "null",
            Constant::Bool(_) => "bool",
            Constant::Int(_) => "int",
            Constant::Uint(_) => "uint",
            Constant::Double(_) => "double",
            Constant::String(_) => "string",
            Constant::Bytes(_) => "bytes",
            Constant::Error(_) => "error",
        }
    }
}

/// One entry of a message-construction expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructEntry {
    pub field: String,
    pub value: Expr,
    pub optional: bool,
}

/// One entry of a map-construction expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
    pub optional: bool,
}

/// The single looping/accumulating construct. All looping macros
/// desugar into this node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensionExpr {
    /// First iteration variable (element, or key for two-variable
    /// forms).
    pub iter_var: String,
    /// Second iteration variable for two-variable comprehensions.
    pub iter_var2: Option<String>,
    /// The range being iterated.
    pub iter_range: Expr,
    /// Accumulator variable name.
    pub accu_var: String,
    /// Accumulator initializer, evaluated in the enclosing scope.
    pub accu_init: Expr,
    /// Evaluated before each step; a false result ends the loop.
    pub loop_condition: Expr,
    /// Produces the next accumulator value.
    pub loop_step: Expr,
    /// Evaluated with the final accumulator bound.
    pub result: Expr,
}

/// The value of an expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Placeholder for a sub-expression hoisted into the macro-call
    /// map; carries only the id of the node it stands for.
    NotSet,
    Constant(Constant),
    Ident {
        name: String,
    },
    Select {
        operand: Box<Expr>,
        field: String,
        /// Set on the expansion of the `has()` macro: the select tests
        /// field presence instead of producing the field value.
        test_only: bool,
    },
    Call {
        /// Receiver for member calls; absent for global calls.
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    List {
        elements: Vec<Expr>,
        /// Indices into `elements` marked with the optional-entry
        /// syntax `[?e]`.
        optional_indices: Vec<u32>,
    },
    Struct {
        message_type: String,
        entries: Vec<StructEntry>,
    },
    Map {
        entries: Vec<MapEntry>,
    },
    Comprehension(Box<ComprehensionExpr>),
}

/// Discriminant of an [`ExprKind`], for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprVariant {
    NotSet,
    Constant,
    Ident,
    Select,
    Call,
    List,
    Struct,
    Map,
    Comprehension,
}

impl ExprVariant {
    /// Upper-case name used by the AST printer.
    pub fn display_name(&self) -> &'static str {
        match self {
            ExprVariant::NotSet => "NOT_SET",
            ExprVariant::Constant => "CONSTANT",
            ExprVariant::Ident => "IDENT",
            ExprVariant::Select => "SELECT",
            ExprVariant::Call => "CALL",
            ExprVariant::List => "LIST",
            ExprVariant::Struct => "STRUCT",
            ExprVariant::Map => "MAP",
            ExprVariant::Comprehension => "COMPREHENSION",
        }
    }
}

/// An expression node: a stable id plus its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: ExprId, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    pub fn variant(&self) -> ExprVariant {
        match &self.kind {
            ExprKind::NotSet => ExprVariant::NotSet,
            ExprKind::Constant(_) => ExprVariant::Constant,
            ExprKind::Ident { .. } => ExprVariant::Ident,
            ExprKind::Select { .. } => ExprVariant::Select,
            ExprKind::Call { .. } => ExprVariant::Call,
            ExprKind::List { .. } => ExprVariant::List,
            ExprKind::Struct { .. } => ExprVariant::Struct,
            ExprKind::Map { .. } => ExprVariant::Map,
            ExprKind::Comprehension(_) => ExprVariant::Comprehension,
        }
    }

    /// Immediate structural children, in deterministic order: select
    /// operand; call target then arguments; list elements; struct entry
    /// values in declared order; map entries as key, value pairs in
    /// declared order; comprehension range, accumulator initializer,
    /// loop condition, loop step, result.
    pub fn children(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        match &self.kind {
            ExprKind::NotSet | ExprKind::Constant(_) | ExprKind::Ident { .. } => {}
            ExprKind::Select { operand, .. } => out.push(operand.as_ref()),
            ExprKind::Call { target, args, .. } => {
                if let Some(target) = target {
                    out.push(target.as_ref());
                }
                out.extend(args.iter());
            }
            ExprKind::List { elements, .. } => out.extend(elements.iter()),
            ExprKind::Struct { entries, .. } => out.extend(entries.iter().map(|e| &e.value)),
            ExprKind::Map { entries } => {
                for entry in entries {
                    out.push(&entry.key);
                    out.push(&entry.value);
                }
            }
            ExprKind::Comprehension(comp) => {
                out.push(&comp.iter_range);
                out.push(&comp.accu_init);
                out.push(&comp.loop_condition);
                out.push(&comp.loop_step);
                out.push(&comp.result);
            }
        }
        out
    }

    /// Mutable view of the immediate children, same order as
    /// [`Expr::children`].
    pub(crate) fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut out = Vec::new();
        match &mut self.kind {
            ExprKind::NotSet | ExprKind::Constant(_) | ExprKind::Ident { .. } => {}
            ExprKind::Select { operand, .. } => out.push(operand.as_mut()),
            ExprKind::Call { target, args, .. } => {
                if let Some(target) = target {
                    out.push(target.as_mut());
                }
                out.extend(args.iter_mut());
            }
            ExprKind::List { elements, .. } => out.extend(elements.iter_mut()),
            ExprKind::Struct { entries, .. } => {
                out.extend(entries.iter_mut().map(|e| &mut e.value))
            }
            ExprKind::Map { entries } => {
                for entry in entries {
                    out.push(&mut entry.key);
                    out.push(&mut entry.value);
                }
            }
            ExprKind::Comprehension(comp) => {
                out.push(&mut comp.iter_range);
                out.push(&mut comp.accu_init);
                out.push(&mut comp.loop_condition);
                out.push(&mut comp.loop_step);
                out.push(&mut comp.result);
            }
        }
        out
    }

    /// Pre-order walk over this node and its descendants.
    pub fn walk(&self, visit: &mut impl FnMut(&Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Find the node with the given id in this subtree.
    pub fn find(&self, id: ExprId) -> Option<&Expr> {
        if self.id == id {
            return Some(self);
        }
        for child in self.children() {
            if let Some(found) = child.find(id) {
                return Some(found);
            }
        }
        None
    }

    /// Largest id in this subtree.
    pub fn max_id(&self) -> ExprId {
        let mut max = 0;
        self.walk(&mut |e| max = max.max(e.id));
        max
    }

    /// Number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Structural equality ignoring ids: same shape, names, and
    /// constants everywhere.
    pub fn same_shape(&self, other: &Expr) -> bool {
        match (&self.kind, &other.kind) {
            (ExprKind::NotSet, ExprKind::NotSet) => true,
            (ExprKind::Constant(a), ExprKind::Constant(b)) => a == b,
            (ExprKind::Ident { name: a }, ExprKind::Ident { name: b }) => a == b,
            (
                ExprKind::Select {
                    operand: a_op,
                    field: a_field,
                    test_only: a_test,
                },
                ExprKind::Select {
                    operand: b_op,
                    field: b_field,
                    test_only: b_test,
                },
            ) => a_field == b_field && a_test == b_test && a_op.same_shape(b_op),
            (
                ExprKind::Call {
                    target: a_target,
                    function: a_fn,
                    args: a_args,
                },
                ExprKind::Call {
                    target: b_target,
                    function: b_fn,
                    args: b_args,
                },
            ) => {
                a_fn == b_fn
                    && a_args.len() == b_args.len()
                    && match (a_target, b_target) {
                        (Some(a), Some(b)) => a.same_shape(b),
                        (None, None) => true,
                        _ => false,
                    }
                    && a_args.iter().zip(b_args).all(|(a, b)| a.same_shape(b))
            }
            (
                ExprKind::List {
                    elements: a_el,
                    optional_indices: a_opt,
                },
                ExprKind::List {
                    elements: b_el,
                    optional_indices: b_opt,
                },
            ) => {
                a_opt == b_opt
                    && a_el.len() == b_el.len()
                    && a_el.iter().zip(b_el).all(|(a, b)| a.same_shape(b))
            }
            (
                ExprKind::Struct {
                    message_type: a_ty,
                    entries: a_entries,
                },
                ExprKind::Struct {
                    message_type: b_ty,
                    entries: b_entries,
                },
            ) => {
                a_ty == b_ty
                    && a_entries.len() == b_entries.len()
                    && a_entries.iter().zip(b_entries).all(|(a, b)| {
                        a.field == b.field
                            && a.optional == b.optional
                            && a.value.same_shape(&b.value)
                    })
            }
            (ExprKind::Map { entries: a_entries }, ExprKind::Map { entries: b_entries }) => {
                a_entries.len() == b_entries.len()
                    && a_entries.iter().zip(b_entries).all(|(a, b)| {
                        a.optional == b.optional
                            && a.key.same_shape(&b.key)
                            && a.value.same_shape(&b.value)
                    })
            }
            (ExprKind::Comprehension(a), ExprKind::Comprehension(b)) => {
                a.iter_var == b.iter_var
                    && a.iter_var2 == b.iter_var2
                    && a.accu_var == b.accu_var
                    && a.iter_range.same_shape(&b.iter_range)
                    && a.accu_init.same_shape(&b.accu_init)
                    && a.loop_condition.same_shape(&b.loop_condition)
                    && a.loop_step.same_shape(&b.loop_step)
                    && a.result.same_shape(&b.result)
            }
            _ => false,
        }
    }
}

/// Stamps monotonically increasing ids onto newly built nodes.
#[derive(Debug, Clone)]
pub struct ExprFactory {
    next_id: ExprId,
}

impl Default for ExprFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprFactory {
    /// A factory whose first id is 1.
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// A factory whose first id is `start`.
    pub fn with_start_id(start: ExprId) -> Self {
        Self { next_id: start.max(1) }
    }

    pub fn next_id(&mut self) -> ExprId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Id the next call to [`ExprFactory::next_id`] will hand out.
    pub fn peek_id(&self) -> ExprId {
        self.next_id
    }

    pub fn new_const(&mut self, value: Constant) -> Expr {
        Expr::new(self.next_id(), ExprKind::Constant(value))
    }

    pub fn new_ident(&mut self, name: impl Into<String>) -> Expr {
        Expr::new(self.next_id(), ExprKind::Ident { name: name.into() })
    }

    pub fn new_select(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Select {
                operand: Box::new(operand),
                field: field.into(),
                test_only: false,
            },
        )
    }

    pub fn new_presence_test(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Select {
                operand: Box::new(operand),
                field: field.into(),
                test_only: true,
            },
        )
    }

    pub fn new_global_call(&mut self, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Call {
                target: None,
                function: function.into(),
                args,
            },
        )
    }

    pub fn new_member_call(
        &mut self,
        target: Expr,
        function: impl Into<String>,
        args: Vec<Expr>,
    ) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Call {
                target: Some(Box::new(target)),
                function: function.into(),
                args,
            },
        )
    }

    pub fn new_list(&mut self, elements: Vec<Expr>, optional_indices: Vec<u32>) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::List {
                elements,
                optional_indices,
            },
        )
    }

    pub fn new_struct(
        &mut self,
        message_type: impl Into<String>,
        entries: Vec<StructEntry>,
    ) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Struct {
                message_type: message_type.into(),
                entries,
            },
        )
    }

    pub fn new_map(&mut self, entries: Vec<MapEntry>) -> Expr {
        Expr::new(self.next_id(), ExprKind::Map { entries })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_comprehension(
        &mut self,
        iter_var: impl Into<String>,
        iter_var2: Option<String>,
        iter_range: Expr,
        accu_var: impl Into<String>,
        accu_init: Expr,
        loop_condition: Expr,
        loop_step: Expr,
        result: Expr,
    ) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Comprehension(Box::new(ComprehensionExpr {
                iter_var: iter_var.into(),
                iter_var2,
                iter_range,
                accu_var: accu_var.into(),
                accu_init,
                loop_condition,
                loop_step,
                result,
            })),
        )
    }

    /// An id-only placeholder node referencing `id`, used inside
    /// unexpanded macro-call trees.
    pub fn new_not_set(id: ExprId) -> Expr {
        Expr::new(id, ExprKind::NotSet)
    }
}

/// A parsed abstract syntax tree: the root expression plus its source
/// metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    root: Expr,
    source_info: SourceInfo,
}

impl Ast {
    pub fn new(root: Expr, source_info: SourceInfo) -> Self {
        Self { root, source_info }
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn source_info(&self) -> &SourceInfo {
        &self.source_info
    }

    pub fn into_parts(self) -> (Expr, SourceInfo) {
        (self.root, self.source_info)
    }

    /// Find a node in the main tree by id.
    pub fn find_expr(&self, id: ExprId) -> Option<&Expr> {
        self.root.find(id)
    }
}
