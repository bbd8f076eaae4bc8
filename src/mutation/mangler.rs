//! Comprehension Identifier Mangling
//!
//! Systematic renaming of comprehension variables so that rearranged
//! subtrees cannot capture each other's identifiers. Every
//! comprehension's iteration and accumulator variables are renamed to
//!
//! ```text
//! <prefix>:<depth>:<typeIndex>
//! ```
//!
//! where depth is the comprehension nesting level (0 at the outermost)
//! and typeIndex distinguishes iteration-variable types at one depth.
//! Type information only exists on checked ASTs; for the parsed ASTs
//! this crate handles, typeIndex is always 0.
//!
//! Substitution is scope-aware: the iteration range and accumulator
//! initializer of a comprehension are rewritten in the enclosing
//! scope, the loop condition and step under the comprehension's own
//! bindings, and the result under the accumulator binding alone. An
//! inner comprehension that rebinds an outer name shadows it, and
//! references inside the inner body resolve to the inner binding.

use std::collections::{BTreeMap, HashMap};

use crate::ast::{Ast, ComprehensionExpr, Expr, ExprId, ExprKind, SourceInfo};
use crate::error::CelError;

use super::{AstMutator, Budget};

/// Outcome of a mangling pass.
#[derive(Debug, Clone)]
pub struct MangleResult {
    /// The rewritten AST. Node ids are unchanged.
    pub ast: Ast,
    /// Mangled name to original name, for every renamed variable.
    pub renames: BTreeMap<String, String>,
}

/// Per-comprehension rename set, used to patch macro-call entries.
struct ComprehensionRenames {
    pairs: Vec<(String, String)>,
}

impl AstMutator {
    /// Rename every comprehension's iteration and accumulator
    /// variables to capture-proof positional names.
    pub fn mangle_comprehension_identifiers(
        &self,
        ast: &Ast,
        iter_prefix: &str,
        iter2_prefix: &str,
        accu_prefix: &str,
    ) -> Result<MangleResult, CelError> {
        let mut budget = Budget::new(self.iteration_limit);
        let prefixes = Prefixes {
            iter: iter_prefix,
            iter2: iter2_prefix,
            accu: accu_prefix,
        };
        let mut state = MangleState {
            prefixes,
            renames: BTreeMap::new(),
            by_comprehension: HashMap::new(),
        };
        let scope = HashMap::new();
        let root = mangle_expr(ast.root(), &scope, 0, &mut state, &mut budget)?;

        // Macro-call entries store the declared variable names inline;
        // rewrite them to match the renamed comprehensions.
        let mut info = SourceInfo::new(
            ast.source_info().description(),
            ast.source_info().line_offsets().to_vec(),
        );
        for (&id, &offset) in ast.source_info().positions() {
            info.set_position(id, offset);
        }
        for extension in ast.source_info().extensions() {
            info.add_extension(extension.clone());
        }
        for (&key, call) in ast.source_info().macro_calls() {
            let patched = match state.by_comprehension.get(&key) {
                Some(renames) => patch_macro_call(call, renames, &mut budget)?,
                None => call.clone(),
            };
            info.add_macro_call(key, patched);
        }

        Ok(MangleResult {
            ast: Ast::new(root, info),
            renames: state.renames,
        })
    }
}

struct Prefixes<'a> {
    iter: &'a str,
    iter2: &'a str,
    accu: &'a str,
}

impl Prefixes<'_> {
    fn mangled(&self, prefix: &str, depth: usize) -> String {
        // typeIndex is 0 on parsed ASTs; checked ASTs would index
        // distinct iteration-variable types at this depth.
        format!("{}:{}:0", prefix, depth)
    }
}

struct MangleState<'a> {
    prefixes: Prefixes<'a>,
    renames: BTreeMap<String, String>,
    by_comprehension: HashMap<ExprId, ComprehensionRenames>,
}

/// Rewrite `expr` under `scope` (original name to mangled name).
/// `depth` is the nesting level assigned to the next comprehension
/// found.
fn mangle_expr(
    expr: &Expr,
    scope: &HashMap<String, String>,
    depth: usize,
    state: &mut MangleState<'_>,
    budget: &mut Budget,
) -> Result<Expr, CelError> {
    budget.charge()?;
    let kind = match &expr.kind {
        ExprKind::NotSet => ExprKind::NotSet,
        ExprKind::Constant(value) => ExprKind::Constant(value.clone()),
        ExprKind::Ident { name } => match scope.get(name) {
            Some(mangled) => ExprKind::Ident {
                name: mangled.clone(),
            },
            None => ExprKind::Ident { name: name.clone() },
        },
        ExprKind::Select {
            operand,
            field,
            test_only,
        } => ExprKind::Select {
            operand: Box::new(mangle_expr(operand, scope, depth, state, budget)?),
            field: field.clone(),
            test_only: *test_only,
        },
        ExprKind::Call {
            target,
            function,
            args,
        } => {
            let target = match target {
                Some(target) => Some(Box::new(mangle_expr(target, scope, depth, state, budget)?)),
                None => None,
            };
            let mut new_args = Vec::with_capacity(args.len());
            for arg in args {
                new_args.push(mangle_expr(arg, scope, depth, state, budget)?);
            }
            ExprKind::Call {
                target,
                function: function.clone(),
                args: new_args,
            }
        }
        ExprKind::List {
            elements,
            optional_indices,
        } => {
            let mut new_elements = Vec::with_capacity(elements.len());
            for element in elements {
                new_elements.push(mangle_expr(element, scope, depth, state, budget)?);
            }
            ExprKind::List {
                elements: new_elements,
                optional_indices: optional_indices.clone(),
            }
        }
        ExprKind::Struct {
            message_type,
            entries,
        } => {
            let mut new_entries = Vec::with_capacity(entries.len());
            for entry in entries {
                new_entries.push(crate::ast::StructEntry {
                    field: entry.field.clone(),
                    value: mangle_expr(&entry.value, scope, depth, state, budget)?,
                    optional: entry.optional,
                });
            }
            ExprKind::Struct {
                message_type: message_type.clone(),
                entries: new_entries,
            }
        }
        ExprKind::Map { entries } => {
            let mut new_entries = Vec::with_capacity(entries.len());
            for entry in entries {
                new_entries.push(crate::ast::MapEntry {
                    key: mangle_expr(&entry.key, scope, depth, state, budget)?,
                    value: mangle_expr(&entry.value, scope, depth, state, budget)?,
                    optional: entry.optional,
                });
            }
            ExprKind::Map {
                entries: new_entries,
            }
        }
        ExprKind::Comprehension(comp) => ExprKind::Comprehension(Box::new(mangle_comprehension(
            expr.id, comp, scope, depth, state, budget,
        )?)),
    };
    Ok(Expr::new(expr.id, kind))
}

fn mangle_comprehension(
    id: ExprId,
    comp: &ComprehensionExpr,
    scope: &HashMap<String, String>,
    depth: usize,
    state: &mut MangleState<'_>,
    budget: &mut Budget,
) -> Result<ComprehensionExpr, CelError> {
    let new_iter = state.prefixes.mangled(state.prefixes.iter, depth);
    let new_iter2 = comp
        .iter_var2
        .as_ref()
        .map(|_| state.prefixes.mangled(state.prefixes.iter2, depth));
    let new_accu = state.prefixes.mangled(state.prefixes.accu, depth);

    let mut pairs = vec![
        (comp.iter_var.clone(), new_iter.clone()),
        (comp.accu_var.clone(), new_accu.clone()),
    ];
    state.renames.insert(new_iter.clone(), comp.iter_var.clone());
    state.renames.insert(new_accu.clone(), comp.accu_var.clone());
    if let (Some(old), Some(new)) = (&comp.iter_var2, &new_iter2) {
        state.renames.insert(new.clone(), old.clone());
        pairs.push((old.clone(), new.clone()));
    }
    state
        .by_comprehension
        .insert(id, ComprehensionRenames { pairs });

    // Range and initializer belong to the enclosing scope; the loop
    // body sees the iteration and accumulator bindings; the result
    // sees only the accumulator.
    let iter_range = mangle_expr(&comp.iter_range, scope, depth + 1, state, budget)?;
    let accu_init = mangle_expr(&comp.accu_init, scope, depth + 1, state, budget)?;

    let mut body_scope = scope.clone();
    body_scope.insert(comp.iter_var.clone(), new_iter.clone());
    if let (Some(old), Some(new)) = (&comp.iter_var2, &new_iter2) {
        body_scope.insert(old.clone(), new.clone());
    }
    body_scope.insert(comp.accu_var.clone(), new_accu.clone());
    let loop_condition = mangle_expr(&comp.loop_condition, &body_scope, depth + 1, state, budget)?;
    let loop_step = mangle_expr(&comp.loop_step, &body_scope, depth + 1, state, budget)?;

    let mut result_scope = scope.clone();
    result_scope.insert(comp.accu_var.clone(), new_accu.clone());
    let result = mangle_expr(&comp.result, &result_scope, depth + 1, state, budget)?;

    Ok(ComprehensionExpr {
        iter_var: new_iter,
        iter_var2: new_iter2,
        iter_range,
        accu_var: new_accu,
        accu_init,
        loop_condition,
        loop_step,
        result,
    })
}

/// Rewrite the inline identifier arguments of a recorded macro call
/// (the declared variable names, stored with id 0) to their mangled
/// spellings. Placeholder references are untouched; the nodes they
/// point at were renamed in the main tree.
fn patch_macro_call(
    call: &Expr,
    renames: &ComprehensionRenames,
    budget: &mut Budget,
) -> Result<Expr, CelError> {
    budget.charge()?;
    let mut out = call.clone();
    let mut stack: Vec<&mut Expr> = vec![&mut out];
    while let Some(node) = stack.pop() {
        budget.charge()?;
        if node.id == 0 {
            if let ExprKind::Ident { name } = &mut node.kind {
                if let Some((_, mangled)) =
                    renames.pairs.iter().find(|(original, _)| original == name)
                {
                    *name = mangled.clone();
                }
            }
        }
        stack.extend(node.children_mut());
    }
    Ok(out)
}
