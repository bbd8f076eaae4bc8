//! AST Literal-Form Printer
//!
//! Renders expression trees in the debugging form used throughout the
//! test suite: each node as `<VARIANT> [<id>] { <field>: ... }`, with
//! nested nodes inlined when they fit on one line and indented
//! otherwise.
//!
//! ```text
//! CALL [3] {
//!   function: _+_
//!   args: {
//!     CONSTANT [1] { value: 1 }
//!     CONSTANT [2] { value: 2 }
//!   }
//! }
//! ```

use super::{Constant, Expr, ExprKind};

const INDENT: usize = 2;
const INLINE_LIMIT: usize = 80;

/// Printer for the AST literal form.
#[derive(Debug, Clone)]
pub struct AstPrinter {
    /// Maximum rendered width before a node breaks across lines.
    inline_limit: usize,
}

impl Default for AstPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl AstPrinter {
    pub fn new() -> Self {
        Self {
            inline_limit: INLINE_LIMIT,
        }
    }

    /// Render an expression tree.
    pub fn print(&self, expr: &Expr) -> String {
        self.render(expr, 0)
    }

    fn render(&self, expr: &Expr, indent: usize) -> String {
        let fields = self.fields_of(expr, indent);
        let header = format!("{} [{}]", expr.variant().display_name(), expr.id);
        if fields.is_empty() {
            return format!("{} {{}}", header);
        }

        // Prefer a single line when every field is itself single-line
        // and the whole node stays narrow.
        let inline_fields: Vec<String> = fields
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect();
        let inline = format!("{} {{ {} }}", header, inline_fields.join(", "));
        if !inline.contains('\n') && indent + inline.len() <= self.inline_limit {
            return inline;
        }

        let pad = " ".repeat(indent + INDENT);
        let mut out = format!("{} {{\n", header);
        for (name, value) in &fields {
            out.push_str(&format!("{}{}: {}\n", pad, name, value));
        }
        out.push_str(&format!("{}}}", " ".repeat(indent)));
        out
    }

    /// Render a child node wrapped in braces, inline when it fits.
    fn child(&self, expr: &Expr, indent: usize) -> String {
        let rendered = self.render(expr, indent + INDENT);
        if !rendered.contains('\n') {
            let inline = format!("{{ {} }}", rendered);
            if indent + inline.len() <= self.inline_limit {
                return inline;
            }
        }
        let rendered = self.render(expr, indent + INDENT);
        format!(
            "{{\n{}{}\n{}}}",
            " ".repeat(indent + INDENT),
            rendered,
            " ".repeat(indent)
        )
    }

    /// Render a list of child nodes as a brace block.
    fn child_list(&self, exprs: &[&Expr], indent: usize) -> String {
        if exprs.is_empty() {
            return "{}".to_string();
        }
        let rendered: Vec<String> = exprs
            .iter()
            .map(|e| self.render(e, indent + INDENT))
            .collect();
        let inline = format!("{{ {} }}", rendered.join(" "));
        if !inline.contains('\n') && indent + inline.len() <= self.inline_limit {
            return inline;
        }
        let pad = " ".repeat(indent + INDENT);
        let rendered: Vec<String> = exprs
            .iter()
            .map(|e| format!("{}{}", pad, self.render(e, indent + INDENT)))
            .collect();
        format!("{{\n{}\n{}}}", rendered.join("\n"), " ".repeat(indent))
    }

    fn fields_of(&self, expr: &Expr, indent: usize) -> Vec<(&'static str, String)> {
        let field_indent = indent + INDENT;
        match &expr.kind {
            ExprKind::NotSet => vec![],
            ExprKind::Constant(value) => vec![("value", format_constant(value))],
            ExprKind::Ident { name } => vec![("name", name.clone())],
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => {
                let mut fields = vec![
                    ("operand", self.child(operand, field_indent)),
                    ("field", field.clone()),
                ];
                if *test_only {
                    fields.push(("test_only", "true".to_string()));
                }
                fields
            }
            ExprKind::Call {
                target,
                function,
                args,
            } => {
                let mut fields = vec![("function", function.clone())];
                if let Some(target) = target {
                    fields.push(("target", self.child(target, field_indent)));
                }
                if !args.is_empty() {
                    let args: Vec<&Expr> = args.iter().collect();
                    fields.push(("args", self.child_list(&args, field_indent)));
                }
                fields
            }
            ExprKind::List {
                elements,
                optional_indices,
            } => {
                let mut fields = Vec::new();
                let elements: Vec<&Expr> = elements.iter().collect();
                fields.push(("elements", self.child_list(&elements, field_indent)));
                if !optional_indices.is_empty() {
                    let indices: Vec<String> =
                        optional_indices.iter().map(u32::to_string).collect();
                    fields.push(("optional_indices", format!("[{}]", indices.join(", "))));
                }
                fields
            }
            ExprKind::Struct {
                message_type,
                entries,
            } => {
                let mut fields = vec![("message_type", message_type.clone())];
                for entry in entries {
                    let rendered = if entry.optional {
                        format!("?{}: {}", entry.field, self.child(&entry.value, field_indent))
                    } else {
                        format!("{}: {}", entry.field, self.child(&entry.value, field_indent))
                    };
                    fields.push(("entry", rendered));
                }
                fields
            }
            ExprKind::Map { entries } => {
                let mut fields = Vec::new();
                for entry in entries {
                    let rendered = format!(
                        "{}{} -> {}",
                        if entry.optional { "?" } else { "" },
                        self.child(&entry.key, field_indent),
                        self.child(&entry.value, field_indent)
                    );
                    fields.push(("entry", rendered));
                }
                fields
            }
            ExprKind::Comprehension(comp) => {
                let mut fields = vec![("iter_var", comp.iter_var.clone())];
                if let Some(iter_var2) = &comp.iter_var2 {
                    fields.push(("iter_var2", iter_var2.clone()));
                }
                fields.push(("iter_range", self.child(&comp.iter_range, field_indent)));
                fields.push(("accu_var", comp.accu_var.clone()));
                fields.push(("accu_init", self.child(&comp.accu_init, field_indent)));
                fields.push((
                    "loop_condition",
                    self.child(&comp.loop_condition, field_indent),
                ));
                fields.push(("loop_step", self.child(&comp.loop_step, field_indent)));
                fields.push(("result", self.child(&comp.result, field_indent)));
                fields
            }
        }
    }
}

/// Render an expression in the literal form with default settings.
pub fn print_expr(expr: &Expr) -> String {
    AstPrinter::new().print(expr)
}

/// Render a constant as CEL literal text. Shared with the unparser so
/// printed constants re-parse to themselves.
pub fn format_constant(value: &Constant) -> String {
    match value {
        Constant::Null => "null".to_string(),
        Constant::Bool(b) => b.to_string(),
        Constant::Int(i) => i.to_string(),
        Constant::Uint(u) => format!("{}u", u),
        Constant::Double(d) => format_double(*d),
        Constant::String(s) => quote_string(s),
        Constant::Bytes(b) => quote_bytes(b),
        Constant::Error(message) => format!("error({})", quote_string(message)),
    }
}

/// Render a double so it re-parses as a double: always with a decimal
/// point or exponent.
pub fn format_double(value: f64) -> String {
    let rendered = format!("{}", value);
    if rendered.contains('.')
        || rendered.contains('e')
        || rendered.contains('E')
        || rendered.contains("inf")
        || rendered.contains("NaN")
    {
        rendered
    } else {
        format!("{}.0", rendered)
    }
}

/// Double-quote and escape a string as a CEL string literal.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0B' => out.push_str("\\v"),
            '\x0C' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || c as u32 == 0x7F => {
                out.push_str(&format!("\\x{:02x}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Double-quote and escape a byte string as a CEL bytes literal.
pub fn quote_bytes(value: &[u8]) -> String {
    let mut out = String::with_capacity(value.len() + 3);
    out.push_str("b\"");
    for &b in value {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(b as char),
            b => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('"');
    out
}
