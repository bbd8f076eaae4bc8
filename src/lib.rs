//! CEL Core
//!
//! The front-end core of a Common Expression Language (CEL)
//! implementation: everything needed to turn expression text into an
//! abstract syntax tree, inspect and rewrite that tree, and evaluate
//! it against variable bindings.
//!
//! # Architecture
//!
//! Processing is staged; each stage is usable on its own:
//!
//! 1. **Source model** ([`source`]) - a code-point addressable view of
//!    the expression text with a line-offset index. All offsets in
//!    this crate are code-point offsets, never bytes.
//! 2. **Lexing and literal decoding** ([`parser::lexer`],
//!    [`literal`]) - tokens carry their exact text; the literal
//!    decoder owns the meaning of int/uint/double/string/bytes tokens
//!    including raw and triple-quoted forms and the full escape table.
//! 3. **Parsing and macro expansion** ([`parser`],
//!    [`parser::macros`]) - precedence climbing over the CEL grammar;
//!    macros (`has`, `exists`, `all`, `map`, `filter`, `exists_one`,
//!    `cel.bind`, `transformList`, `transformMap`) expand into
//!    comprehension nodes, with the original call preserved in the
//!    macro-call map.
//! 4. **AST and source info** ([`ast`]) - immutable expression trees
//!    with stable ids, per-node positions, a navigable view
//!    ([`ast::navigation`]), and a debugging printer
//!    ([`ast::printer`]).
//! 5. **Mutation** ([`mutation`]) - subtree replacement, call and
//!    bind-macro synthesis, consecutive renumbering, and
//!    comprehension-variable mangling, all without touching the input
//!    AST.
//! 6. **Unparsing** ([`parser::unparser`]) - re-materializes an AST
//!    into text that parses back to a structurally equal tree, with
//!    macros in their surface form.
//! 7. **Evaluation** ([`interp`]) - a tree-walking evaluator with
//!    CEL's cross-type numeric semantics ([`numeric`]) and message
//!    construction through a descriptor registry ([`registry`]).
//!
//! # Example
//!
//! ```rust
//! use cel_core::interp::{Activation, Evaluator, Value};
//! use cel_core::parser::{parse, unparser::unparse};
//!
//! let ast = parse("[1, 2, 3].exists(x, x > n)").unwrap();
//! assert_eq!(unparse(&ast).unwrap(), "[1, 2, 3].exists(x, x > n)");
//!
//! let activation = Activation::new().bind("n", Value::Int(2));
//! let result = Evaluator::new().eval(&ast, &activation).unwrap();
//! assert!(matches!(result, Value::Bool(true)));
//! ```

pub mod ast;
pub mod error;
pub mod interp;
pub mod literal;
pub mod mutation;
pub mod numeric;
pub mod operators;
pub mod parser;
pub mod registry;
pub mod source;

pub use ast::{Ast, Constant, Expr, ExprFactory, ExprId, ExprKind, Extension, SourceInfo};
pub use error::{CelError, ErrorReporter};
pub use mutation::AstMutator;
pub use parser::{parse, ParseErrors, ParserOptions};
pub use source::{SourceBuffer, SourceLocation, SourceSpan};
