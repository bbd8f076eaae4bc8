//! Operator Table
//!
//! Internal function names for the CEL operators, shared by the parser
//! (which emits them), the unparser (which maps them back to surface
//! syntax), and the evaluator (which dispatches on them).

/// Logical.
pub const LOGICAL_AND: &str = "_&&_";
pub const LOGICAL_OR: &str = "_||_";
pub const LOGICAL_NOT: &str = "!_";

/// Arithmetic.
pub const ADD: &str = "_+_";
pub const SUBTRACT: &str = "_-_";
pub const MULTIPLY: &str = "_*_";
pub const DIVIDE: &str = "_/_";
pub const MODULO: &str = "_%_";
pub const NEGATE: &str = "-_";

/// Relations.
pub const EQUALS: &str = "_==_";
pub const NOT_EQUALS: &str = "_!=_";
pub const LESS: &str = "_<_";
pub const LESS_EQUALS: &str = "_<=_";
pub const GREATER: &str = "_>_";
pub const GREATER_EQUALS: &str = "_>=_";
pub const IN: &str = "@in";

/// Ternary and indexing.
pub const CONDITIONAL: &str = "_?_:_";
pub const INDEX: &str = "_[_]";
pub const OPTIONAL_INDEX: &str = "_[?_]";

/// Internal functions emitted by macro expansion.
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";
pub const MAP_INSERT: &str = "@mapInsert";

/// Surface text of a binary operator, if `function` is one.
pub fn binary_display_text(function: &str) -> Option<&'static str> {
    Some(match function {
        LOGICAL_AND => "&&",
        LOGICAL_OR => "||",
        ADD => "+",
        SUBTRACT => "-",
        MULTIPLY => "*",
        DIVIDE => "/",
        MODULO => "%",
        EQUALS => "==",
        NOT_EQUALS => "!=",
        LESS => "<",
        LESS_EQUALS => "<=",
        GREATER => ">",
        GREATER_EQUALS => ">=",
        IN => "in",
        _ => return None,
    })
}

/// Surface text of a unary operator, if `function` is one.
pub fn unary_display_text(function: &str) -> Option<&'static str> {
    Some(match function {
        LOGICAL_NOT => "!",
        NEGATE => "-",
        _ => return None,
    })
}

/// Binding strength used for unparser parenthesization. Higher binds
/// tighter; primaries are [`PRECEDENCE_PRIMARY`].
pub fn precedence(function: &str) -> u8 {
    match function {
        CONDITIONAL => 1,
        LOGICAL_OR => 2,
        LOGICAL_AND => 3,
        EQUALS | NOT_EQUALS | LESS | LESS_EQUALS | GREATER | GREATER_EQUALS | IN => 4,
        ADD | SUBTRACT => 5,
        MULTIPLY | DIVIDE | MODULO => 6,
        LOGICAL_NOT | NEGATE => 7,
        INDEX | OPTIONAL_INDEX => 8,
        _ => PRECEDENCE_PRIMARY,
    }
}

/// Precedence of primaries, member access, and ordinary calls.
pub const PRECEDENCE_PRIMARY: u8 = 9;

/// Whether the function name denotes an operator rather than an
/// ordinary callable.
pub fn is_operator(function: &str) -> bool {
    binary_display_text(function).is_some()
        || unary_display_text(function).is_some()
        || matches!(function, CONDITIONAL | INDEX | OPTIONAL_INDEX)
}
