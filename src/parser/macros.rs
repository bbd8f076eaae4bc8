//! Macro Expansion
//!
//! CEL macros are syntactic shortcuts expanded at parse time. The
//! looping macros desugar into [`ComprehensionExpr`] nodes; `has`
//! becomes a test-only select. For each expansion the call as the user
//! wrote it is recorded in the macro-call map so the unparser can
//! reconstruct the surface syntax.
//!
//! In the recorded call, interior nodes carry id 0 and arguments that
//! survive in the expansion are id-only `NotSet` placeholders pointing
//! at the surviving node. Iteration-variable arguments do not survive
//! (only their names do), so they are stored inline with id 0.

use crate::ast::{Constant, Expr, ExprFactory, ExprId, ExprKind, Extension, SourceInfo};
use crate::operators;

/// Accumulator variable name used by the looping macros.
pub const ACCU_VAR: &str = "@result";

/// Iteration variable name used by the `cel.bind` expansion, which
/// iterates nothing.
pub const BIND_UNUSED_ITER_VAR: &str = "#unused";

/// Extension tag registered when `cel.bind` is expanded.
pub const BINDINGS_EXTENSION: (&str, u64) = ("bindings", 1);
/// Extension tag registered for the two-variable transform macros.
pub const COMPREHENSIONS_EXTENSION: (&str, u64) = ("comprehensions", 2);

/// Shared state the expander needs from the parser.
pub(crate) struct MacroContext<'a> {
    pub factory: &'a mut ExprFactory,
    pub source_info: &'a mut SourceInfo,
    pub populate_macro_calls: bool,
}

/// Outcome of a macro check on a freshly parsed call.
pub(crate) enum MacroExpansion {
    /// The call was a macro; here is its expansion.
    Expanded(Expr),
    /// Not a macro; ownership of the pieces flows back to the parser.
    NotAMacro {
        target: Option<Expr>,
        args: Vec<Expr>,
    },
    /// A macro with malformed arguments.
    Error { message: String },
}

/// Check a parsed call against the macro registry and expand it if it
/// matches. Global macros: `has/1`. Member macros: `all/2`, `exists/2`,
/// `exists_one/2`, `map/2`, `map/3`, `filter/2`, `transformList/3..4`,
/// `transformMap/3..4`, and receiver-style `cel.bind/3`.
pub(crate) fn maybe_expand_macro(
    ctx: &mut MacroContext<'_>,
    target: Option<Expr>,
    function: &str,
    args: Vec<Expr>,
) -> MacroExpansion {
    match (target, function, args.len()) {
        (None, "has", 1) => expand_has(ctx, args),
        (Some(target), "all" | "exists" | "exists_one" | "filter", 2)
        | (Some(target), "map", 2 | 3) => expand_quantifier(ctx, target, function, args),
        (Some(target), "bind", 3) if is_cel_namespace(&target) => {
            expand_bind(ctx, target, args)
        }
        (Some(target), "transformList" | "transformMap", 3 | 4) => {
            expand_transform(ctx, target, function, args)
        }
        (target, _, _) => MacroExpansion::NotAMacro { target, args },
    }
}

fn is_cel_namespace(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Ident { name } if name == "cel")
}

fn ident_name(expr: &Expr) -> Option<&str> {
    match &expr.kind {
        ExprKind::Ident { name } => Some(name),
        _ => None,
    }
}

/// An id-only reference into the main tree, for macro-call recording.
fn not_set_ref(id: ExprId) -> Expr {
    Expr::new(id, ExprKind::NotSet)
}

/// An interior macro-call node; id 0 marks it as outside the main
/// tree's id space.
fn raw_ident(name: &str) -> Expr {
    Expr::new(
        0,
        ExprKind::Ident {
            name: name.to_string(),
        },
    )
}

fn raw_call(target: Option<Expr>, function: &str, args: Vec<Expr>) -> Expr {
    Expr::new(
        0,
        ExprKind::Call {
            target: target.map(Box::new),
            function: function.to_string(),
            args,
        },
    )
}

/// `has(e.f)` becomes a test-only select over the same operand. The
/// parsed select keeps its id, which becomes the macro-call key.
fn expand_has(ctx: &mut MacroContext<'_>, mut args: Vec<Expr>) -> MacroExpansion {
    let arg = args.remove(0);
    let Expr {
        id,
        kind:
            ExprKind::Select {
                operand,
                field,
                test_only: false,
            },
    } = arg
    else {
        return MacroExpansion::Error {
            message: "invalid argument to has() macro: must be a field selection".to_string(),
        };
    };
    if ctx.populate_macro_calls {
        let recorded = raw_call(
            None,
            "has",
            vec![Expr::new(
                0,
                ExprKind::Select {
                    operand: Box::new(not_set_ref(operand.id)),
                    field: field.clone(),
                    test_only: false,
                },
            )],
        );
        ctx.source_info.add_macro_call(id, recorded);
    }
    MacroExpansion::Expanded(Expr::new(
        id,
        ExprKind::Select {
            operand,
            field,
            test_only: true,
        },
    ))
}

/// The single-variable looping macros: `all`, `exists`, `exists_one`,
/// `map` (2- and 3-argument forms), and `filter`.
fn expand_quantifier(
    ctx: &mut MacroContext<'_>,
    target: Expr,
    function: &str,
    mut args: Vec<Expr>,
) -> MacroExpansion {
    let iter_arg = args.remove(0);
    let Some(iter_var) = ident_name(&iter_arg).map(str::to_string) else {
        return MacroExpansion::Error {
            message: format!(
                "argument 1 of {}() must be a simple identifier",
                function
            ),
        };
    };
    // The identifier node itself does not survive the expansion.
    ctx.source_info.remove_position(iter_arg.id);

    let range_id = target.id;
    let f = &mut *ctx.factory;
    let accu = |f: &mut ExprFactory| f.new_ident(ACCU_VAR);

    let (accu_init, loop_condition, loop_step, result, recorded_args) = match (function, args.len())
    {
        ("all", 1) => {
            let pred = args.remove(0);
            let pred_id = pred.id;
            let init = f.new_const(Constant::Bool(true));
            let not_accu = accu(f);
            let cond = f.new_global_call(operators::NOT_STRICTLY_FALSE, vec![not_accu]);
            let step_accu = accu(f);
            let step = f.new_global_call(operators::LOGICAL_AND, vec![step_accu, pred]);
            let result = accu(f);
            (
                init,
                cond,
                step,
                result,
                vec![raw_ident(&iter_var), not_set_ref(pred_id)],
            )
        }
        ("exists", 1) => {
            let pred = args.remove(0);
            let pred_id = pred.id;
            let init = f.new_const(Constant::Bool(false));
            let cond_accu = accu(f);
            let negated = f.new_global_call(operators::LOGICAL_NOT, vec![cond_accu]);
            let cond = f.new_global_call(operators::NOT_STRICTLY_FALSE, vec![negated]);
            let step_accu = accu(f);
            let step = f.new_global_call(operators::LOGICAL_OR, vec![step_accu, pred]);
            let result = accu(f);
            (
                init,
                cond,
                step,
                result,
                vec![raw_ident(&iter_var), not_set_ref(pred_id)],
            )
        }
        ("exists_one", 1) => {
            let pred = args.remove(0);
            let pred_id = pred.id;
            let init = f.new_const(Constant::Int(0));
            let cond = f.new_const(Constant::Bool(true));
            let step_accu = accu(f);
            let one = f.new_const(Constant::Int(1));
            let incremented = f.new_global_call(operators::ADD, vec![step_accu, one]);
            let unchanged = accu(f);
            let step = f.new_global_call(
                operators::CONDITIONAL,
                vec![pred, incremented, unchanged],
            );
            let result_accu = accu(f);
            let one_again = f.new_const(Constant::Int(1));
            let result = f.new_global_call(operators::EQUALS, vec![result_accu, one_again]);
            (
                init,
                cond,
                step,
                result,
                vec![raw_ident(&iter_var), not_set_ref(pred_id)],
            )
        }
        ("map", 1) => {
            let transform = args.remove(0);
            let transform_id = transform.id;
            let init = f.new_list(vec![], vec![]);
            let cond = f.new_const(Constant::Bool(true));
            let step_accu = accu(f);
            let singleton = f.new_list(vec![transform], vec![]);
            let step = f.new_global_call(operators::ADD, vec![step_accu, singleton]);
            let result = accu(f);
            (
                init,
                cond,
                step,
                result,
                vec![raw_ident(&iter_var), not_set_ref(transform_id)],
            )
        }
        ("map", 2) => {
            let pred = args.remove(0);
            let transform = args.remove(0);
            let (pred_id, transform_id) = (pred.id, transform.id);
            let init = f.new_list(vec![], vec![]);
            let cond = f.new_const(Constant::Bool(true));
            let step_accu = accu(f);
            let singleton = f.new_list(vec![transform], vec![]);
            let appended = f.new_global_call(operators::ADD, vec![step_accu, singleton]);
            let unchanged = accu(f);
            let step =
                f.new_global_call(operators::CONDITIONAL, vec![pred, appended, unchanged]);
            let result = accu(f);
            (
                init,
                cond,
                step,
                result,
                vec![
                    raw_ident(&iter_var),
                    not_set_ref(pred_id),
                    not_set_ref(transform_id),
                ],
            )
        }
        ("filter", 1) => {
            let pred = args.remove(0);
            let pred_id = pred.id;
            let init = f.new_list(vec![], vec![]);
            let cond = f.new_const(Constant::Bool(true));
            let step_accu = accu(f);
            let element = f.new_ident(&iter_var);
            let singleton = f.new_list(vec![element], vec![]);
            let appended = f.new_global_call(operators::ADD, vec![step_accu, singleton]);
            let unchanged = accu(f);
            let step =
                f.new_global_call(operators::CONDITIONAL, vec![pred, appended, unchanged]);
            let result = accu(f);
            (
                init,
                cond,
                step,
                result,
                vec![raw_ident(&iter_var), not_set_ref(pred_id)],
            )
        }
        _ => {
            return MacroExpansion::Error {
                message: format!("wrong number of arguments to {}() macro", function),
            }
        }
    };

    let comprehension = ctx.factory.new_comprehension(
        iter_var.clone(),
        None,
        target,
        ACCU_VAR,
        accu_init,
        loop_condition,
        loop_step,
        result,
    );
    if ctx.populate_macro_calls {
        let recorded = raw_call(Some(not_set_ref(range_id)), function, recorded_args);
        ctx.source_info.add_macro_call(comprehension.id, recorded);
    }
    MacroExpansion::Expanded(comprehension)
}

/// `cel.bind(v, init, result)`: a comprehension over an empty range
/// whose accumulator carries the bound value.
fn expand_bind(ctx: &mut MacroContext<'_>, target: Expr, mut args: Vec<Expr>) -> MacroExpansion {
    let var_arg = args.remove(0);
    let Some(var_name) = ident_name(&var_arg).map(str::to_string) else {
        return MacroExpansion::Error {
            message: "argument 1 of cel.bind() must be a simple identifier".to_string(),
        };
    };
    let init = args.remove(0);
    let result = args.remove(0);
    let (init_id, result_id) = (init.id, result.id);
    // Neither the namespace target nor the variable identifier survive.
    ctx.source_info.remove_position(target.id);
    ctx.source_info.remove_position(var_arg.id);

    let f = &mut *ctx.factory;
    let iter_range = f.new_list(vec![], vec![]);
    let loop_condition = f.new_const(Constant::Bool(false));
    let loop_step = f.new_ident(&var_name);
    let comprehension = ctx.factory.new_comprehension(
        BIND_UNUSED_ITER_VAR,
        None,
        iter_range,
        var_name.clone(),
        init,
        loop_condition,
        loop_step,
        result,
    );
    if ctx.populate_macro_calls {
        let recorded = raw_call(
            Some(raw_ident("cel")),
            "bind",
            vec![
                raw_ident(&var_name),
                not_set_ref(init_id),
                not_set_ref(result_id),
            ],
        );
        ctx.source_info.add_macro_call(comprehension.id, recorded);
    }
    let (name, version) = BINDINGS_EXTENSION;
    ctx.source_info.add_extension(Extension::new(name, version));
    MacroExpansion::Expanded(comprehension)
}

/// The two-variable transform macros `transformList` and
/// `transformMap`, with an optional filter predicate.
fn expand_transform(
    ctx: &mut MacroContext<'_>,
    target: Expr,
    function: &str,
    mut args: Vec<Expr>,
) -> MacroExpansion {
    let first = args.remove(0);
    let second = args.remove(0);
    let (Some(iter_var), Some(iter_var2)) = (
        ident_name(&first).map(str::to_string),
        ident_name(&second).map(str::to_string),
    ) else {
        return MacroExpansion::Error {
            message: format!(
                "arguments 1 and 2 of {}() must be simple identifiers",
                function
            ),
        };
    };
    ctx.source_info.remove_position(first.id);
    ctx.source_info.remove_position(second.id);

    let filter = if args.len() == 2 { Some(args.remove(0)) } else { None };
    let transform = args.remove(0);
    let (filter_id, transform_id) = (filter.as_ref().map(|e| e.id), transform.id);
    let range_id = target.id;

    let f = &mut *ctx.factory;
    let (accu_init, body) = if function == "transformList" {
        let init = f.new_list(vec![], vec![]);
        let step_accu = f.new_ident(ACCU_VAR);
        let singleton = f.new_list(vec![transform], vec![]);
        (
            init,
            f.new_global_call(operators::ADD, vec![step_accu, singleton]),
        )
    } else {
        let init = f.new_map(vec![]);
        let step_accu = f.new_ident(ACCU_VAR);
        let key = f.new_ident(&iter_var);
        (
            init,
            f.new_global_call(operators::MAP_INSERT, vec![step_accu, key, transform]),
        )
    };
    let loop_step = match filter {
        Some(pred) => {
            let unchanged = f.new_ident(ACCU_VAR);
            f.new_global_call(operators::CONDITIONAL, vec![pred, body, unchanged])
        }
        None => body,
    };
    let loop_condition = f.new_const(Constant::Bool(true));
    let result = f.new_ident(ACCU_VAR);
    let comprehension = ctx.factory.new_comprehension(
        iter_var.clone(),
        Some(iter_var2.clone()),
        target,
        ACCU_VAR,
        accu_init,
        loop_condition,
        loop_step,
        result,
    );
    if ctx.populate_macro_calls {
        let mut recorded_args = vec![raw_ident(&iter_var), raw_ident(&iter_var2)];
        if let Some(filter_id) = filter_id {
            recorded_args.push(not_set_ref(filter_id));
        }
        recorded_args.push(not_set_ref(transform_id));
        let recorded = raw_call(Some(not_set_ref(range_id)), function, recorded_args);
        ctx.source_info.add_macro_call(comprehension.id, recorded);
    }
    let (name, version) = COMPREHENSIONS_EXTENSION;
    ctx.source_info.add_extension(Extension::new(name, version));
    MacroExpansion::Expanded(comprehension)
}
