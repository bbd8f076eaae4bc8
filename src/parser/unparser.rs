//! Unparser
//!
//! Re-materializes an AST into expression text that parses back to a
//! structurally equal tree (modulo ids). Macro expansions are rendered
//! in their surface form using the macro-call map: when a node's id
//! has an entry, the recorded call is rendered instead, and `NotSet`
//! placeholders inside it are resolved by id into the main tree.

use crate::ast::printer::format_constant;
use crate::ast::{Ast, Expr, ExprId, ExprKind};
use crate::error::CelError;
use crate::operators;

use std::collections::HashMap;

/// Unparse an AST, rendering macros in their original surface form.
pub fn unparse(ast: &Ast) -> Result<String, CelError> {
    let unparser = Unparser {
        root: ast.root(),
        macro_calls: Some(ast.source_info().macro_calls()),
    };
    unparser.render(ast.root(), 0)
}

/// Unparse a bare expression without source info. Comprehensions
/// cannot be rendered this way; they need their macro-call entries.
pub fn unparse_expr(expr: &Expr) -> Result<String, CelError> {
    let unparser = Unparser {
        root: expr,
        macro_calls: None,
    };
    unparser.render(expr, 0)
}

struct Unparser<'a> {
    root: &'a Expr,
    macro_calls: Option<&'a HashMap<ExprId, Expr>>,
}

impl<'a> Unparser<'a> {
    fn macro_call(&self, id: ExprId) -> Option<&'a Expr> {
        self.macro_calls.and_then(|calls| calls.get(&id))
    }

    /// Resolve a `NotSet` placeholder into the main tree.
    fn resolve(&self, id: ExprId) -> Result<&'a Expr, CelError> {
        self.root.find(id).ok_or_else(|| {
            CelError::invalid_state(format!(
                "macro call references id {} which is not in the tree",
                id
            ))
        })
    }

    fn render(&self, expr: &Expr, parent_precedence: u8) -> Result<String, CelError> {
        // Surface form first: a macro expansion renders as the call the
        // user wrote. Interior macro nodes carry id 0 and never match.
        if expr.id != 0 {
            if let Some(call) = self.macro_call(expr.id) {
                return self.render_plain(call, parent_precedence);
            }
        }
        self.render_plain(expr, parent_precedence)
    }

    fn render_plain(&self, expr: &Expr, parent_precedence: u8) -> Result<String, CelError> {
        match &expr.kind {
            ExprKind::NotSet => {
                let resolved = self.resolve(expr.id)?;
                self.render(resolved, parent_precedence)
            }
            ExprKind::Constant(value) => Ok(format_constant(value)),
            ExprKind::Ident { name } => Ok(name.clone()),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => {
                if *test_only {
                    let operand = self.render(operand, 1)?;
                    return Ok(format!("has({}.{})", operand, field));
                }
                let operand = self.render(operand, operators::precedence(operators::INDEX))?;
                Ok(format!("{}.{}", operand, field))
            }
            ExprKind::Call {
                target,
                function,
                args,
            } => self.render_call(expr, target.as_deref(), function, args, parent_precedence),
            ExprKind::List {
                elements,
                optional_indices,
            } => {
                let mut parts = Vec::with_capacity(elements.len());
                for (i, element) in elements.iter().enumerate() {
                    let rendered = self.render(element, 1)?;
                    if optional_indices.contains(&(i as u32)) {
                        parts.push(format!("?{}", rendered));
                    } else {
                        parts.push(rendered);
                    }
                }
                Ok(format!("[{}]", parts.join(", ")))
            }
            ExprKind::Struct {
                message_type,
                entries,
            } => {
                let mut parts = Vec::with_capacity(entries.len());
                for entry in entries {
                    let value = self.render(&entry.value, 1)?;
                    let prefix = if entry.optional { "?" } else { "" };
                    parts.push(format!("{}{}: {}", prefix, entry.field, value));
                }
                Ok(format!("{}{{{}}}", message_type, parts.join(", ")))
            }
            ExprKind::Map { entries } => {
                let mut parts = Vec::with_capacity(entries.len());
                for entry in entries {
                    let key = self.render(&entry.key, 1)?;
                    let value = self.render(&entry.value, 1)?;
                    let prefix = if entry.optional { "?" } else { "" };
                    parts.push(format!("{}{}: {}", prefix, key, value));
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            ExprKind::Comprehension(_) => Err(CelError::invalid_state(
                "comprehension has no surface form without its macro-call entry",
            )),
        }
    }

    fn render_call(
        &self,
        _expr: &Expr,
        target: Option<&Expr>,
        function: &str,
        args: &[Expr],
        parent_precedence: u8,
    ) -> Result<String, CelError> {
        let precedence = operators::precedence(function);

        if function == operators::CONDITIONAL && args.len() == 3 {
            let condition = self.render(&args[0], precedence + 1)?;
            let truthy = self.render(&args[1], precedence + 1)?;
            let falsy = self.render(&args[2], precedence)?;
            let rendered = format!("{} ? {} : {}", condition, truthy, falsy);
            return Ok(maybe_parenthesize(rendered, precedence, parent_precedence));
        }
        if let Some(text) = operators::binary_display_text(function) {
            if args.len() == 2 {
                let left = self.render(&args[0], precedence)?;
                let right = self.render(&args[1], precedence + 1)?;
                let rendered = format!("{} {} {}", left, text, right);
                return Ok(maybe_parenthesize(rendered, precedence, parent_precedence));
            }
        }
        if let Some(text) = operators::unary_display_text(function) {
            if args.len() == 1 {
                let operand = self.render(&args[0], precedence)?;
                let rendered = format!("{}{}", text, operand);
                return Ok(maybe_parenthesize(rendered, precedence, parent_precedence));
            }
        }
        if (function == operators::INDEX || function == operators::OPTIONAL_INDEX)
            && args.len() == 2
        {
            let operand = self.render(&args[0], precedence)?;
            let index = self.render(&args[1], 1)?;
            let marker = if function == operators::OPTIONAL_INDEX {
                "?"
            } else {
                ""
            };
            let rendered = format!("{}[{}{}]", operand, marker, index);
            return Ok(maybe_parenthesize(rendered, precedence, parent_precedence));
        }

        let mut rendered_args = Vec::with_capacity(args.len());
        for arg in args {
            rendered_args.push(self.render(arg, 1)?);
        }
        let call = match target {
            Some(target) => {
                let operand = self.render(target, operators::precedence(operators::INDEX))?;
                format!("{}.{}({})", operand, function, rendered_args.join(", "))
            }
            None => format!("{}({})", function, rendered_args.join(", ")),
        };
        Ok(call)
    }
}

fn maybe_parenthesize(rendered: String, own: u8, parent: u8) -> String {
    if own < parent {
        format!("({})", rendered)
    } else {
        rendered
    }
}
