//! Mutation Engine
//!
//! Produces new ASTs from existing ones by structural subtree
//! replacement, preserving the AST and source-info invariants: ids
//! stay unique and positive, positions for removed nodes are dropped,
//! macro-call entries follow their expansions, and extension tags are
//! merged without duplicates.
//!
//! The engine never mutates its inputs. Every operation charges node
//! visits against a per-call budget and fails with `IterationLimit`
//! when the budget runs out, bounding work on adversarial trees.

pub mod mangler;

pub use mangler::MangleResult;

use std::collections::{HashMap, HashSet};

use crate::ast::{
    Ast, Constant, Expr, ExprFactory, ExprId, ExprKind, Extension, SourceInfo,
};
use crate::error::CelError;
use crate::parser::macros::{BINDINGS_EXTENSION, BIND_UNUSED_ITER_VAR};

/// Default node-visit budget per mutation call.
pub const DEFAULT_ITERATION_LIMIT: usize = 1_500;

/// Structural AST rewriter.
#[derive(Debug, Clone)]
pub struct AstMutator {
    iteration_limit: usize,
}

impl Default for AstMutator {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATION_LIMIT)
    }
}

impl AstMutator {
    /// A mutator that visits at most `iteration_limit` nodes per call.
    pub fn new(iteration_limit: usize) -> Self {
        Self { iteration_limit }
    }

    /// Replace the subtree rooted at `target_id` with `new_expr`,
    /// stamped with fresh ids above everything already in `ast`.
    pub fn replace_subtree(
        &self,
        ast: &Ast,
        new_expr: Expr,
        target_id: ExprId,
    ) -> Result<Ast, CelError> {
        self.replace_inner(ast, new_expr, None, target_id)
    }

    /// Replace the subtree rooted at `target_id` with another AST's
    /// root, merging the replacement's positions, macro-call map, and
    /// extensions.
    pub fn replace_subtree_with_ast(
        &self,
        ast: &Ast,
        new_ast: &Ast,
        target_id: ExprId,
    ) -> Result<Ast, CelError> {
        self.replace_inner(
            ast,
            new_ast.root().clone(),
            Some(new_ast.source_info()),
            target_id,
        )
    }

    /// Construct a fresh AST whose root is a global call over the
    /// supplied ASTs.
    pub fn new_global_call(&self, function: &str, args: Vec<Ast>) -> Result<Ast, CelError> {
        self.build_call(None, function, args)
    }

    /// Construct a fresh AST whose root is a member call on `target`.
    pub fn new_member_call(
        &self,
        target: Ast,
        function: &str,
        args: Vec<Ast>,
    ) -> Result<Ast, CelError> {
        self.build_call(Some(target), function, args)
    }

    /// Renumber every id to `1..n` in pre-order, remapping positions,
    /// macro-call keys, and placeholder references. Normalizes two
    /// structurally equal ASTs to identical trees.
    pub fn renumber_ids_consecutively(&self, ast: &Ast) -> Result<Ast, CelError> {
        let mut budget = Budget::new(self.iteration_limit);
        let mut mapping = HashMap::new();
        let mut next: ExprId = 1;
        let mut order = Vec::new();
        collect_pre_order(ast.root(), &mut order, &mut budget)?;
        for id in order {
            mapping.entry(id).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            });
        }
        let root = remap_ids(ast.root(), &mapping, &mut budget)?;
        let source_info = remap_source_info(ast.source_info(), &mapping, &mut budget)?;
        Ok(Ast::new(root, source_info))
    }

    /// Synthesize a `cel.bind` macro binding `var_name` to `var_init`
    /// with body `result_expr`, replacing the node `target_id` in
    /// `ast`. The macro-call map entry for the new comprehension is
    /// registered so the bind unparses in surface form.
    pub fn new_bind_macro(
        &self,
        ast: &Ast,
        var_name: &str,
        var_init: &Ast,
        result_expr: Expr,
        target_id: ExprId,
    ) -> Result<Ast, CelError> {
        let mut budget = Budget::new(self.iteration_limit);

        // Rebuild the pieces on one factory so ids inside the bind
        // subtree are unique before the replacement restamps them.
        let mut factory = ExprFactory::new();
        let mut init_mapping = HashMap::new();
        let accu_init = restamp(var_init.root(), &mut factory, &mut init_mapping, &mut budget)?;
        let accu_init_id = accu_init.id;
        let mut result_mapping = HashMap::new();
        let result = restamp(&result_expr, &mut factory, &mut result_mapping, &mut budget)?;
        let result_id = result.id;

        let iter_range = factory.new_list(vec![], vec![]);
        let loop_condition = factory.new_const(Constant::Bool(false));
        let loop_step = factory.new_ident(var_name);
        let comprehension = factory.new_comprehension(
            BIND_UNUSED_ITER_VAR,
            None,
            iter_range,
            var_name,
            accu_init,
            loop_condition,
            loop_step,
            result,
        );

        // Carry the replacement's own source info: the init AST's
        // remapped metadata plus the bind's macro-call entry, keyed by
        // the pre-replacement comprehension id. The replacement remaps
        // keys and references together with the tree.
        let mut info = SourceInfo::default();
        for (&old, &new) in &init_mapping {
            if let Some(offset) = var_init.source_info().position_of(old) {
                info.set_position(new, offset);
            }
        }
        for (id, call) in var_init.source_info().macro_calls() {
            if let Some(&new_id) = init_mapping.get(id) {
                let remapped = remap_macro_value(call, &init_mapping, &mut budget)?;
                info.add_macro_call(new_id, remapped);
            }
        }
        for extension in var_init.source_info().extensions() {
            info.add_extension(extension.clone());
        }
        let recorded = Expr::new(
            0,
            ExprKind::Call {
                target: Some(Box::new(Expr::new(
                    0,
                    ExprKind::Ident {
                        name: "cel".to_string(),
                    },
                ))),
                function: "bind".to_string(),
                args: vec![
                    Expr::new(
                        0,
                        ExprKind::Ident {
                            name: var_name.to_string(),
                        },
                    ),
                    ExprFactory::new_not_set(accu_init_id),
                    ExprFactory::new_not_set(result_id),
                ],
            },
        );
        info.add_macro_call(comprehension.id, recorded);
        let (name, version) = BINDINGS_EXTENSION;
        info.add_extension(Extension::new(name, version));

        self.replace_inner(ast, comprehension, Some(&info), target_id)
    }

    fn build_call(
        &self,
        target: Option<Ast>,
        function: &str,
        args: Vec<Ast>,
    ) -> Result<Ast, CelError> {
        let mut budget = Budget::new(self.iteration_limit);
        let mut factory = ExprFactory::new();
        let mut info = SourceInfo::default();
        let mut first_info_taken = false;

        let mut adopt = |ast: &Ast,
                         factory: &mut ExprFactory,
                         info: &mut SourceInfo,
                         first_info_taken: &mut bool,
                         budget: &mut Budget|
         -> Result<Expr, CelError> {
            let mut mapping = HashMap::new();
            let stamped = restamp(ast.root(), factory, &mut mapping, budget)?;
            if !*first_info_taken {
                *first_info_taken = true;
                *info = SourceInfo::new(
                    ast.source_info().description(),
                    ast.source_info().line_offsets().to_vec(),
                );
            }
            merge_source_info(info, ast.source_info(), &mapping, budget)?;
            Ok(stamped)
        };

        let target_expr = match &target {
            Some(target_ast) => Some(adopt(
                target_ast,
                &mut factory,
                &mut info,
                &mut first_info_taken,
                &mut budget,
            )?),
            None => None,
        };
        let mut arg_exprs = Vec::with_capacity(args.len());
        for arg in &args {
            arg_exprs.push(adopt(
                arg,
                &mut factory,
                &mut info,
                &mut first_info_taken,
                &mut budget,
            )?);
        }
        let root = match target_expr {
            Some(target_expr) => factory.new_member_call(target_expr, function, arg_exprs),
            None => factory.new_global_call(function, arg_exprs),
        };
        Ok(Ast::new(root, info))
    }

    fn replace_inner(
        &self,
        ast: &Ast,
        new_expr: Expr,
        new_info: Option<&SourceInfo>,
        target_id: ExprId,
    ) -> Result<Ast, CelError> {
        let mut budget = Budget::new(self.iteration_limit);
        if ast.find_expr(target_id).is_none() {
            return Err(CelError::invalid_state(format!(
                "no expression with id {} in the tree",
                target_id
            )));
        }

        // Stamp the replacement with ids above everything in `ast`.
        let mut factory = ExprFactory::with_start_id(ast.root().max_id() + 1);
        let mut mapping = HashMap::new();
        let stamped = restamp(&new_expr, &mut factory, &mut mapping, &mut budget)?;
        let new_root_id = stamped.id;

        let root = replace_node(ast.root(), target_id, stamped, &mut budget)?;

        // Ids surviving in the result.
        let mut retained = HashSet::new();
        let mut stack = vec![&root];
        while let Some(expr) = stack.pop() {
            budget.charge()?;
            retained.insert(expr.id);
            stack.extend(expr.children());
        }

        let mut info = SourceInfo::new(
            ast.source_info().description(),
            ast.source_info().line_offsets().to_vec(),
        );

        // Positions: keep retained nodes, adopt the replacement's.
        for (&id, &offset) in ast.source_info().positions() {
            if retained.contains(&id) {
                info.set_position(id, offset);
            }
        }
        if let Some(new_info) = new_info {
            for (&old, &new) in &mapping {
                if let Some(offset) = new_info.position_of(old) {
                    info.set_position(new, offset);
                }
            }
        }

        // Macro calls: entries keyed inside the removed subtree drop
        // out with their keys; a placeholder that referenced the
        // replaced node now references the replacement's root.
        for (&key, call) in ast.source_info().macro_calls() {
            if !retained.contains(&key) {
                continue;
            }
            let updated = repoint_refs(call, target_id, new_root_id, &mut budget)?;
            if macro_refs_resolve(&updated, &retained, &mut budget)? {
                info.add_macro_call(key, updated);
            }
        }
        if let Some(new_info) = new_info {
            for (old_key, call) in new_info.macro_calls() {
                if let Some(&new_key) = mapping.get(old_key) {
                    let remapped = remap_macro_value(call, &mapping, &mut budget)?;
                    info.add_macro_call(new_key, remapped);
                }
            }
        }

        // Extensions merge in order, de-duplicated by (name, version).
        for extension in ast.source_info().extensions() {
            info.add_extension(extension.clone());
        }
        if let Some(new_info) = new_info {
            for extension in new_info.extensions() {
                info.add_extension(extension.clone());
            }
        }

        Ok(Ast::new(root, info))
    }
}

/// Per-call node-visit budget.
pub(crate) struct Budget {
    remaining: usize,
    limit: usize,
}

impl Budget {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            remaining: limit,
            limit,
        }
    }

    pub(crate) fn charge(&mut self) -> Result<(), CelError> {
        if self.remaining == 0 {
            return Err(CelError::IterationLimit { limit: self.limit });
        }
        self.remaining -= 1;
        Ok(())
    }
}

/// Deep-copy `expr`, stamping fresh ids from `factory` and recording
/// the old-to-new mapping for non-zero ids.
fn restamp(
    expr: &Expr,
    factory: &mut ExprFactory,
    mapping: &mut HashMap<ExprId, ExprId>,
    budget: &mut Budget,
) -> Result<Expr, CelError> {
    budget.charge()?;
    let new_id = factory.next_id();
    if expr.id != 0 {
        mapping.insert(expr.id, new_id);
    }
    let kind = match &expr.kind {
        ExprKind::NotSet => ExprKind::NotSet,
        ExprKind::Constant(value) => ExprKind::Constant(value.clone()),
        ExprKind::Ident { name } => ExprKind::Ident { name: name.clone() },
        ExprKind::Select {
            operand,
            field,
            test_only,
        } => ExprKind::Select {
            operand: Box::new(restamp(operand, factory, mapping, budget)?),
            field: field.clone(),
            test_only: *test_only,
        },
        ExprKind::Call {
            target,
            function,
            args,
        } => {
            let target = match target {
                Some(target) => Some(Box::new(restamp(target, factory, mapping, budget)?)),
                None => None,
            };
            let mut new_args = Vec::with_capacity(args.len());
            for arg in args {
                new_args.push(restamp(arg, factory, mapping, budget)?);
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
                new_elements.push(restamp(element, factory, mapping, budget)?);
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
                    value: restamp(&entry.value, factory, mapping, budget)?,
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
                    key: restamp(&entry.key, factory, mapping, budget)?,
                    value: restamp(&entry.value, factory, mapping, budget)?,
                    optional: entry.optional,
                });
            }
            ExprKind::Map {
                entries: new_entries,
            }
        }
        ExprKind::Comprehension(comp) => {
            ExprKind::Comprehension(Box::new(crate::ast::ComprehensionExpr {
                iter_var: comp.iter_var.clone(),
                iter_var2: comp.iter_var2.clone(),
                iter_range: restamp(&comp.iter_range, factory, mapping, budget)?,
                accu_var: comp.accu_var.clone(),
                accu_init: restamp(&comp.accu_init, factory, mapping, budget)?,
                loop_condition: restamp(&comp.loop_condition, factory, mapping, budget)?,
                loop_step: restamp(&comp.loop_step, factory, mapping, budget)?,
                result: restamp(&comp.result, factory, mapping, budget)?,
            }))
        }
    };
    Ok(Expr::new(new_id, kind))
}

/// Copy `expr` with the node `target_id` replaced by `replacement`.
fn replace_node(
    expr: &Expr,
    target_id: ExprId,
    replacement: Expr,
    budget: &mut Budget,
) -> Result<Expr, CelError> {
    budget.charge()?;
    if expr.id == target_id {
        return Ok(replacement);
    }
    let mut out = expr.clone();
    replace_in_children(&mut out, target_id, replacement, budget)?;
    Ok(out)
}

fn replace_in_children(
    expr: &mut Expr,
    target_id: ExprId,
    replacement: Expr,
    budget: &mut Budget,
) -> Result<(), CelError> {
    // The clone above copied the whole subtree; walk it and swap the
    // target in place. Only one node can match: ids are unique.
    let mut stack: Vec<&mut Expr> = vec![expr];
    while let Some(node) = stack.pop() {
        budget.charge()?;
        for child in node.children_mut() {
            if child.id == target_id {
                *child = replacement;
                return Ok(());
            }
            stack.push(child);
        }
    }
    Err(CelError::invalid_state(format!(
        "no expression with id {} in the tree",
        target_id
    )))
}

fn collect_pre_order(
    expr: &Expr,
    order: &mut Vec<ExprId>,
    budget: &mut Budget,
) -> Result<(), CelError> {
    budget.charge()?;
    order.push(expr.id);
    for child in expr.children() {
        collect_pre_order(child, order, budget)?;
    }
    Ok(())
}

/// Copy `expr`, rewriting every non-zero id through `mapping`.
fn remap_ids(
    expr: &Expr,
    mapping: &HashMap<ExprId, ExprId>,
    budget: &mut Budget,
) -> Result<Expr, CelError> {
    budget.charge()?;
    let mut out = expr.clone();
    let mut stack: Vec<&mut Expr> = vec![&mut out];
    while let Some(node) = stack.pop() {
        budget.charge()?;
        if node.id != 0 {
            if let Some(&new_id) = mapping.get(&node.id) {
                node.id = new_id;
            }
        }
        stack.extend(node.children_mut());
    }
    Ok(out)
}

/// Remap a macro-call value: interior nodes keep id 0, placeholder
/// references follow the mapping.
fn remap_macro_value(
    call: &Expr,
    mapping: &HashMap<ExprId, ExprId>,
    budget: &mut Budget,
) -> Result<Expr, CelError> {
    remap_ids(call, mapping, budget)
}

/// Rewrite placeholder references equal to `from` into `to`.
fn repoint_refs(
    call: &Expr,
    from: ExprId,
    to: ExprId,
    budget: &mut Budget,
) -> Result<Expr, CelError> {
    let mut out = call.clone();
    let mut stack: Vec<&mut Expr> = vec![&mut out];
    while let Some(node) = stack.pop() {
        budget.charge()?;
        if matches!(node.kind, ExprKind::NotSet) && node.id == from {
            node.id = to;
        }
        stack.extend(node.children_mut());
    }
    Ok(out)
}

/// Whether every placeholder reference in a macro-call value points at
/// a retained node.
fn macro_refs_resolve(
    call: &Expr,
    retained: &HashSet<ExprId>,
    budget: &mut Budget,
) -> Result<bool, CelError> {
    let mut stack = vec![call];
    while let Some(node) = stack.pop() {
        budget.charge()?;
        if matches!(node.kind, ExprKind::NotSet) && node.id != 0 && !retained.contains(&node.id) {
            return Ok(false);
        }
        stack.extend(node.children());
    }
    Ok(true)
}

/// Merge positions and macro calls from `source` through an id
/// mapping, and extensions verbatim.
fn merge_source_info(
    info: &mut SourceInfo,
    source: &SourceInfo,
    mapping: &HashMap<ExprId, ExprId>,
    budget: &mut Budget,
) -> Result<(), CelError> {
    for (&old, &new) in mapping {
        if let Some(offset) = source.position_of(old) {
            info.set_position(new, offset);
        }
    }
    for (old_key, call) in source.macro_calls() {
        if let Some(&new_key) = mapping.get(old_key) {
            let remapped = remap_macro_value(call, mapping, budget)?;
            info.add_macro_call(new_key, remapped);
        }
    }
    for extension in source.extensions() {
        info.add_extension(extension.clone());
    }
    Ok(())
}

/// Remap an entire source info through an id mapping (used by
/// consecutive renumbering, where every id is in the mapping).
fn remap_source_info(
    source: &SourceInfo,
    mapping: &HashMap<ExprId, ExprId>,
    budget: &mut Budget,
) -> Result<SourceInfo, CelError> {
    let mut info = SourceInfo::new(source.description(), source.line_offsets().to_vec());
    for (&old, &offset) in source.positions() {
        if let Some(&new) = mapping.get(&old) {
            info.set_position(new, offset);
        }
    }
    for (old_key, call) in source.macro_calls() {
        if let Some(&new_key) = mapping.get(old_key) {
            let remapped = remap_macro_value(call, mapping, budget)?;
            info.add_macro_call(new_key, remapped);
        }
    }
    for extension in source.extensions() {
        info.add_extension(extension.clone());
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprVariant;
    use crate::parser::{parse, unparser::unparse};

    fn ids_of(ast: &Ast) -> HashSet<ExprId> {
        let mut ids = HashSet::new();
        ast.root().walk(&mut |e| {
            ids.insert(e.id);
        });
        ids
    }

    fn assert_ids_unique_and_positive(ast: &Ast) {
        let mut seen = HashSet::new();
        ast.root().walk(&mut |e| {
            assert!(e.id > 0, "non-positive id {}", e.id);
            assert!(seen.insert(e.id), "duplicate id {}", e.id);
        });
    }

    #[test]
    fn test_replace_constant_subtree() {
        let ast = parse("1 + 2").unwrap();
        let two = ast
            .root()
            .children()
            .iter()
            .find(|c| matches!(c.kind, ExprKind::Constant(Constant::Int(2))))
            .map(|c| c.id)
            .unwrap();
        let mut f = ExprFactory::new();
        let replacement = f.new_const(Constant::Int(42));

        let mutated = AstMutator::default()
            .replace_subtree(&ast, replacement, two)
            .unwrap();
        assert_ids_unique_and_positive(&mutated);
        assert_eq!(unparse(&mutated).unwrap(), "1 + 42");
        // The input is unaffected.
        assert_eq!(unparse(&ast).unwrap(), "1 + 2");
    }

    #[test]
    fn test_replace_keeps_unrelated_ids_and_positions() {
        let ast = parse("ab + cd").unwrap();
        let root_id = ast.root().id;
        let left_id = ast.root().children()[0].id;
        let right_id = ast.root().children()[1].id;

        let mut f = ExprFactory::new();
        let replacement = f.new_ident("xy");
        let mutated = AstMutator::default()
            .replace_subtree(&ast, replacement, right_id)
            .unwrap();

        let ids = ids_of(&mutated);
        assert!(ids.contains(&root_id));
        assert!(ids.contains(&left_id));
        assert!(!ids.contains(&right_id));
        assert_eq!(mutated.source_info().position_of(left_id), Some(0));
        assert_eq!(mutated.source_info().position_of(right_id), None);
    }

    #[test]
    fn test_replace_root() {
        let ast = parse("1 + 2").unwrap();
        let mut f = ExprFactory::new();
        let replacement = f.new_const(Constant::Bool(true));
        let mutated = AstMutator::default()
            .replace_subtree(&ast, replacement, ast.root().id)
            .unwrap();
        assert_eq!(unparse(&mutated).unwrap(), "true");
        assert_ids_unique_and_positive(&mutated);
    }

    #[test]
    fn test_replace_missing_target_fails() {
        let ast = parse("1 + 2").unwrap();
        let mut f = ExprFactory::new();
        let replacement = f.new_const(Constant::Int(0));
        assert!(matches!(
            AstMutator::default().replace_subtree(&ast, replacement, 999),
            Err(CelError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_replace_macro_root_drops_entry() {
        let ast = parse("[1].exists(x, x > 0)").unwrap();
        assert_eq!(ast.source_info().macro_calls().len(), 1);
        let mut f = ExprFactory::new();
        let replacement = f.new_const(Constant::Bool(true));
        let mutated = AstMutator::default()
            .replace_subtree(&ast, replacement, ast.root().id)
            .unwrap();
        assert!(mutated.source_info().macro_calls().is_empty());
    }

    #[test]
    fn test_replace_inside_macro_updates_placeholder() {
        // Replace the predicate body inside the exists expansion; the
        // recorded macro call must follow to the new node.
        let ast = parse("[1].exists(x, x > 0)").unwrap();
        let comp = match &ast.root().kind {
            ExprKind::Comprehension(comp) => comp,
            other => panic!("expected comprehension, got {:?}", other),
        };
        // loop_step is @result || <pred>; grab the predicate.
        let pred_id = match &comp.loop_step.kind {
            ExprKind::Call { args, .. } => args[1].id,
            other => panic!("expected call, got {:?}", other),
        };

        let replacement_ast = parse("x == 1").unwrap();
        let mutated = AstMutator::default()
            .replace_subtree_with_ast(&ast, &replacement_ast, pred_id)
            .unwrap();
        assert_ids_unique_and_positive(&mutated);
        assert_eq!(unparse(&mutated).unwrap(), "[1].exists(x, x == 1)");
    }

    #[test]
    fn test_replace_with_macro_bearing_ast_merges_entries() {
        let ast = parse("true && false").unwrap();
        let false_id = ast.root().children()[1].id;
        let replacement = parse("[1].exists(y, y > 0)").unwrap();
        let mutated = AstMutator::default()
            .replace_subtree_with_ast(&ast, &replacement, false_id)
            .unwrap();
        assert_ids_unique_and_positive(&mutated);
        assert_eq!(mutated.source_info().macro_calls().len(), 1);
        assert_eq!(
            unparse(&mutated).unwrap(),
            "true && [1].exists(y, y > 0)"
        );
    }

    #[test]
    fn test_extension_merge_dedup() {
        let ast = parse("cel.bind(v, 1, v) == 1").unwrap();
        let right = parse("cel.bind(w, 2, w)").unwrap();
        let one_id = ast.root().children()[1].id;
        let mutated = AstMutator::default()
            .replace_subtree_with_ast(&ast, &right, one_id)
            .unwrap();
        let tags: Vec<_> = mutated
            .source_info()
            .extensions()
            .iter()
            .map(|e| (e.name.as_str(), e.version))
            .collect();
        assert_eq!(tags, vec![("bindings", 1)]);
    }

    #[test]
    fn test_new_global_call_merges_sources() {
        let left = parse("[1].exists(x, x > 0)").unwrap();
        let right = parse("cel.bind(v, 1, v)").unwrap();
        let combined = AstMutator::default()
            .new_global_call("_&&_", vec![left, right])
            .unwrap();
        assert_ids_unique_and_positive(&combined);
        assert_eq!(combined.source_info().macro_calls().len(), 2);
        assert_eq!(
            unparse(&combined).unwrap(),
            "[1].exists(x, x > 0) && cel.bind(v, 1, v)"
        );
    }

    #[test]
    fn test_new_member_call() {
        let target = parse("[1, 2]").unwrap();
        let arg = parse("0").unwrap();
        let combined = AstMutator::default()
            .new_member_call(target, "contains", vec![arg])
            .unwrap();
        assert_eq!(unparse(&combined).unwrap(), "[1, 2].contains(0)");
    }

    #[test]
    fn test_new_bind_macro() {
        // Scenario: bind @r0 to 3 over `1 + 1`, replacing the root.
        let ast = parse("1 + 1").unwrap();
        let init = parse("3").unwrap();
        let mut f = ExprFactory::new();
        let r0_left = f.new_ident("@r0");
        let r0_right = f.new_ident("@r0");
        let result = f.new_global_call("_+_", vec![r0_left, r0_right]);

        let mutated = AstMutator::default()
            .new_bind_macro(&ast, "@r0", &init, result, ast.root().id)
            .unwrap();
        assert_ids_unique_and_positive(&mutated);
        assert!(matches!(
            mutated.root().kind,
            ExprKind::Comprehension(_)
        ));
        assert_eq!(unparse(&mutated).unwrap(), "cel.bind(@r0, 3, @r0 + @r0)");
        let tags: Vec<_> = mutated
            .source_info()
            .extensions()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(tags, vec!["bindings"]);
    }

    #[test]
    fn test_new_bind_macro_inside_expression() {
        let ast = parse("1 + 1").unwrap();
        let right_one = ast.root().children()[1].id;
        let init = parse("10").unwrap();
        let mut f = ExprFactory::new();
        let v = f.new_ident("v");
        let mutated = AstMutator::default()
            .new_bind_macro(&ast, "v", &init, v, right_one)
            .unwrap();
        assert_eq!(unparse(&mutated).unwrap(), "1 + cel.bind(v, 10, v)");
    }

    #[test]
    fn test_renumber_ids_consecutively() {
        let ast = parse("[1].exists(x, x > 0) && y").unwrap();
        let renumbered = AstMutator::default()
            .renumber_ids_consecutively(&ast)
            .unwrap();
        let mut expected: ExprId = 0;
        renumbered.root().walk(&mut |e| {
            expected += 1;
            assert_eq!(e.id, expected, "pre-order ids must be consecutive");
        });
        // Macro entries and unparse survive renumbering.
        assert_eq!(
            unparse(&renumbered).unwrap(),
            "[1].exists(x, x > 0) && y"
        );
    }

    #[test]
    fn test_renumber_normalizes_equal_shapes() {
        let a = parse("f(1, g(2))").unwrap();
        let b = {
            // Same expression parsed from noisier text.
            parse("f( 1 , g( 2 ) )").unwrap()
        };
        let mutator = AstMutator::default();
        let a = mutator.renumber_ids_consecutively(&a).unwrap();
        let b = mutator.renumber_ids_consecutively(&b).unwrap();
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_iteration_limit() {
        let ast = parse("[1, 2, 3, 4, 5, 6, 7, 8]").unwrap();
        let mut f = ExprFactory::new();
        let replacement = f.new_const(Constant::Int(0));
        let tight = AstMutator::new(4);
        assert!(matches!(
            tight.replace_subtree(&ast, replacement, ast.root().children()[0].id),
            Err(CelError::IterationLimit { limit: 4 })
        ));
    }

    #[test]
    fn test_mutation_does_not_touch_input() {
        let ast = parse("[1].map(x, x + 1)").unwrap();
        let before = ast.clone();
        let mut f = ExprFactory::new();
        let replacement = f.new_const(Constant::Int(5));
        let comp_range_id = match &ast.root().kind {
            ExprKind::Comprehension(comp) => comp.iter_range.children()[0].id,
            other => panic!("expected comprehension, got {:?}", other),
        };
        let _ = AstMutator::default()
            .replace_subtree(&ast, replacement, comp_range_id)
            .unwrap();
        assert_eq!(ast, before);
    }

    #[test]
    fn test_replaced_subtree_variant() {
        let ast = parse("a.b.c").unwrap();
        let replacement = parse("x[0]").unwrap();
        let target = ast.root().children()[0].id;
        let mutated = AstMutator::default()
            .replace_subtree_with_ast(&ast, &replacement, target)
            .unwrap();
        assert_eq!(mutated.root().variant(), ExprVariant::Select);
        assert_eq!(unparse(&mutated).unwrap(), "x[0].c");
    }
}
