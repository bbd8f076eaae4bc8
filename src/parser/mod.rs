//! Parser
//!
//! This module implements the front-end pipeline for CEL expression
//! text:
//!
//! 1. [`lexer`] - code-point cursor producing the token stream
//! 2. parsing (this module) - precedence climbing over the CEL grammar
//! 3. [`macros`] - parse-time macro expansion into comprehensions
//! 4. [`unparser`] - re-materialization of ASTs into surface text
//!
//! Parsing produces an [`Ast`]: the expression tree plus source info
//! (per-node start offsets, macro-call map, extension tags). Errors
//! are collected through the [`ErrorReporter`] and returned together
//! as a [`ParseErrors`] value whose rendering includes source snippets
//! and caret indicators.

pub mod lexer;
pub mod macros;
pub mod tokens;
pub mod unparser;

use crate::ast::{Ast, Constant, Expr, ExprFactory, ExprKind, MapEntry, SourceInfo, StructEntry};
use crate::error::{ErrorReporter, ReportedError};
use crate::literal;
use crate::operators;
use crate::source::SourceBuffer;

use macros::{MacroContext, MacroExpansion};
use tokens::{Token, TokenKind};

/// Knobs for the parser.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Maximum expression nesting before parsing gives up.
    pub max_recursion_depth: usize,
    /// Record unexpanded macro calls in the source info. Disabling
    /// this loses the ability to unparse macros.
    pub populate_macro_calls: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_recursion_depth: 200,
            populate_macro_calls: true,
        }
    }
}

/// All diagnostics from one failed parse, in report order.
#[derive(Debug, Clone)]
pub struct ParseErrors {
    errors: Vec<ReportedError>,
}

impl ParseErrors {
    pub fn errors(&self) -> &[ReportedError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.errors.iter().map(ReportedError::render).collect();
        f.write_str(&rendered.join("\n\n"))
    }
}

impl std::error::Error for ParseErrors {}

/// Parse expression text with default options and the `<input>`
/// description.
pub fn parse(text: &str) -> Result<Ast, ParseErrors> {
    parse_with_description(text, "<input>", &ParserOptions::default())
}

/// Parse expression text, labelling diagnostics with `description`.
pub fn parse_with_description(
    text: &str,
    description: &str,
    options: &ParserOptions,
) -> Result<Ast, ParseErrors> {
    let source = SourceBuffer::from_text(text);
    let mut reporter = ErrorReporter::new();
    reporter.enter_context(description, Some(source.clone()));

    let tokens = lexer::tokenize(&source, &mut reporter);
    let source_info = SourceInfo::new(description, source.line_offsets().to_vec());
    let mut parser = Parser {
        tokens,
        pos: 0,
        factory: ExprFactory::new(),
        source_info,
        reporter: &mut reporter,
        options,
        depth: 0,
    };
    let root = parser.parse_expr();
    parser.expect_eof();
    let source_info = parser.source_info;
    reporter.exit_context();

    if reporter.has_errors() {
        Err(ParseErrors {
            errors: reporter.all_errors().to_vec(),
        })
    } else {
        Ok(Ast::new(root, source_info))
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    factory: ExprFactory,
    source_info: SourceInfo,
    reporter: &'a mut ErrorReporter,
    options: &'a ParserOptions,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn offset(&self) -> u32 {
        self.current().offset()
    }

    fn bump(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.kind() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            let found = self.describe_current();
            self.error_here(format!("expected {}, found {}", what, found));
            false
        }
    }

    fn describe_current(&self) -> String {
        match self.kind() {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.current().text),
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let offset = self.offset() as usize;
        self.reporter.report(None, offset, message);
    }

    fn error_expr(&mut self, message: impl Into<String>) -> Expr {
        self.error_here(message);
        // Keep a well-formed node so parsing can continue; the overall
        // parse still fails because the error was reported.
        self.factory
            .new_const(Constant::Error("<parse error>".to_string()))
    }

    fn expect_eof(&mut self) {
        if self.kind() != TokenKind::Eof {
            let found = self.describe_current();
            self.error_here(format!("unexpected {} after expression", found));
        }
    }

    /// Record a node's start offset in the source info.
    fn register(&mut self, start: u32, expr: Expr) -> Expr {
        self.source_info.set_position(expr.id, start);
        expr
    }

    // Expr = ConditionalOr ["?" ConditionalOr ":" Expr]
    fn parse_expr(&mut self) -> Expr {
        if self.depth >= self.options.max_recursion_depth {
            return self.error_expr("expression nesting too deep");
        }
        self.depth += 1;
        let start = self.offset();
        let condition = self.parse_or();
        let expr = if self.eat(TokenKind::Question) {
            let truthy = self.parse_or();
            self.expect(TokenKind::Colon, "':' in conditional");
            let falsy = self.parse_expr();
            let call = self
                .factory
                .new_global_call(operators::CONDITIONAL, vec![condition, truthy, falsy]);
            self.register(start, call)
        } else {
            condition
        };
        self.depth -= 1;
        expr
    }

    fn parse_or(&mut self) -> Expr {
        let start = self.offset();
        let mut expr = self.parse_and();
        while self.eat(TokenKind::Or) {
            let rhs = self.parse_and();
            let call = self
                .factory
                .new_global_call(operators::LOGICAL_OR, vec![expr, rhs]);
            expr = self.register(start, call);
        }
        expr
    }

    fn parse_and(&mut self) -> Expr {
        let start = self.offset();
        let mut expr = self.parse_relation();
        while self.eat(TokenKind::And) {
            let rhs = self.parse_relation();
            let call = self
                .factory
                .new_global_call(operators::LOGICAL_AND, vec![expr, rhs]);
            expr = self.register(start, call);
        }
        expr
    }

    fn parse_relation(&mut self) -> Expr {
        let start = self.offset();
        let mut expr = self.parse_addition();
        loop {
            let function = match self.kind() {
                TokenKind::Less => operators::LESS,
                TokenKind::LessEquals => operators::LESS_EQUALS,
                TokenKind::Greater => operators::GREATER,
                TokenKind::GreaterEquals => operators::GREATER_EQUALS,
                TokenKind::Equals => operators::EQUALS,
                TokenKind::NotEquals => operators::NOT_EQUALS,
                TokenKind::In => operators::IN,
                TokenKind::Assign => {
                    self.error_here("unexpected '='; did you mean '=='?");
                    self.bump();
                    continue;
                }
                _ => break,
            };
            self.bump();
            let rhs = self.parse_addition();
            let call = self.factory.new_global_call(function, vec![expr, rhs]);
            expr = self.register(start, call);
        }
        expr
    }

    fn parse_addition(&mut self) -> Expr {
        let start = self.offset();
        let mut expr = self.parse_multiplication();
        loop {
            let function = match self.kind() {
                TokenKind::Plus => operators::ADD,
                TokenKind::Minus => operators::SUBTRACT,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplication();
            let call = self.factory.new_global_call(function, vec![expr, rhs]);
            expr = self.register(start, call);
        }
        expr
    }

    fn parse_multiplication(&mut self) -> Expr {
        let start = self.offset();
        let mut expr = self.parse_unary();
        loop {
            let function = match self.kind() {
                TokenKind::Star => operators::MULTIPLY,
                TokenKind::Slash => operators::DIVIDE,
                TokenKind::Percent => operators::MODULO,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary();
            let call = self.factory.new_global_call(function, vec![expr, rhs]);
            expr = self.register(start, call);
        }
        expr
    }

    // Unary = Member | "!" {"!"} Member | "-" {"-"} Member
    fn parse_unary(&mut self) -> Expr {
        let start = self.offset();
        match self.kind() {
            TokenKind::Not => {
                let mut count = 0;
                while self.eat(TokenKind::Not) {
                    count += 1;
                }
                let mut expr = self.parse_member();
                for _ in 0..count {
                    let call = self
                        .factory
                        .new_global_call(operators::LOGICAL_NOT, vec![expr]);
                    expr = self.register(start, call);
                }
                expr
            }
            TokenKind::Minus => {
                let mut count = 0;
                while self.eat(TokenKind::Minus) {
                    count += 1;
                }
                // A single minus directly before a numeric literal is
                // part of the literal, so i64::MIN round-trips.
                let mut expr = match self.kind() {
                    TokenKind::IntLit | TokenKind::DoubleLit => {
                        count -= 1;
                        self.parse_numeric_literal(start, true)
                    }
                    _ => self.parse_member(),
                };
                for _ in 0..count {
                    let call = self.factory.new_global_call(operators::NEGATE, vec![expr]);
                    expr = self.register(start, call);
                }
                expr
            }
            _ => self.parse_member(),
        }
    }

    // Member = Primary {"." IDENT ["(" args ")"] | "[" ["?"] Expr "]"}
    fn parse_member(&mut self) -> Expr {
        let start = self.offset();
        let mut expr = self.parse_primary();
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    self.bump();
                    let field = match self.kind() {
                        TokenKind::Identifier => self.bump().text,
                        _ => {
                            let found = self.describe_current();
                            return self
                                .error_expr(format!("expected field name, found {}", found));
                        }
                    };
                    if self.kind() == TokenKind::LeftParen {
                        self.bump();
                        let args = self.parse_call_args();
                        expr = self.finish_call(start, Some(expr), &field, args);
                    } else {
                        let select = self.factory.new_select(expr, field);
                        expr = self.register(start, select);
                    }
                }
                TokenKind::LeftBracket => {
                    self.bump();
                    let optional = self.eat(TokenKind::Question);
                    let index = self.parse_expr();
                    self.expect(TokenKind::RightBracket, "']' after index");
                    let function = if optional {
                        operators::OPTIONAL_INDEX
                    } else {
                        operators::INDEX
                    };
                    let call = self.factory.new_global_call(function, vec![expr, index]);
                    expr = self.register(start, call);
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Expr {
        let start = self.offset();
        match self.kind() {
            TokenKind::Identifier | TokenKind::Dot => {
                if let Some(expr) = self.try_parse_struct(start) {
                    return expr;
                }
                let leading_dot = self.eat(TokenKind::Dot);
                let name = match self.kind() {
                    TokenKind::Identifier => self.bump().text,
                    _ => {
                        let found = self.describe_current();
                        return self.error_expr(format!("expected identifier, found {}", found));
                    }
                };
                let name = if leading_dot {
                    format!(".{}", name)
                } else {
                    name
                };
                if self.kind() == TokenKind::LeftParen {
                    self.bump();
                    let args = self.parse_call_args();
                    self.finish_call(start, None, &name, args)
                } else {
                    let ident = self.factory.new_ident(name);
                    self.register(start, ident)
                }
            }
            TokenKind::LeftParen => {
                self.bump();
                let expr = self.parse_expr();
                self.expect(TokenKind::RightParen, "')' after expression");
                expr
            }
            TokenKind::LeftBracket => self.parse_list(start),
            TokenKind::LeftBrace => self.parse_map(start),
            TokenKind::IntLit | TokenKind::UintLit | TokenKind::DoubleLit => {
                self.parse_numeric_literal(start, false)
            }
            TokenKind::StringLit => {
                let token = self.bump();
                match literal::parse_string(&token.text) {
                    Ok(value) => {
                        let expr = self.factory.new_const(value);
                        self.register(start, expr)
                    }
                    Err(error) => self.literal_error(&token, error),
                }
            }
            TokenKind::BytesLit => {
                let token = self.bump();
                match literal::parse_bytes(&token.text) {
                    Ok(value) => {
                        let expr = self.factory.new_const(value);
                        self.register(start, expr)
                    }
                    Err(error) => self.literal_error(&token, error),
                }
            }
            TokenKind::BoolLit => {
                let token = self.bump();
                let expr = self
                    .factory
                    .new_const(Constant::Bool(token.text == "true"));
                self.register(start, expr)
            }
            TokenKind::NullLit => {
                self.bump();
                let expr = self.factory.new_const(Constant::Null);
                self.register(start, expr)
            }
            TokenKind::Reserved => {
                let token = self.bump();
                self.reporter.report(
                    None,
                    token.offset() as usize,
                    format!(
                        "reserved word '{}' may not be used as an identifier",
                        token.text
                    ),
                );
                self.factory
                    .new_const(Constant::Error("<parse error>".to_string()))
            }
            _ => {
                let found = self.describe_current();
                let expr = self.error_expr(format!("unexpected {}", found));
                // Guarantee progress past the offending token.
                if self.kind() != TokenKind::Eof {
                    self.bump();
                }
                expr
            }
        }
    }

    /// Message construction: `["."] IDENT {"." IDENT} "{" entries "}"`.
    /// Backtracks when the brace never shows up.
    fn try_parse_struct(&mut self, start: u32) -> Option<Expr> {
        let saved = self.pos;
        let mut name = String::new();
        if self.eat(TokenKind::Dot) {
            name.push('.');
        }
        loop {
            match self.kind() {
                TokenKind::Identifier => {
                    name.push_str(&self.bump().text);
                    if self.eat(TokenKind::Dot) {
                        name.push('.');
                    } else {
                        break;
                    }
                }
                _ => {
                    self.pos = saved;
                    return None;
                }
            }
        }
        if self.kind() != TokenKind::LeftBrace {
            self.pos = saved;
            return None;
        }
        self.bump();
        let mut entries = Vec::new();
        while self.kind() != TokenKind::RightBrace && self.kind() != TokenKind::Eof {
            let optional = self.eat(TokenKind::Question);
            let field = match self.kind() {
                TokenKind::Identifier => self.bump().text,
                _ => {
                    let found = self.describe_current();
                    self.error_here(format!("expected field name, found {}", found));
                    break;
                }
            };
            self.expect(TokenKind::Colon, "':' after field name");
            let value = self.parse_expr();
            entries.push(StructEntry {
                field,
                value,
                optional,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}' after message fields");
        let expr = self.factory.new_struct(name, entries);
        Some(self.register(start, expr))
    }

    fn parse_list(&mut self, start: u32) -> Expr {
        self.bump();
        let mut elements = Vec::new();
        let mut optional_indices = Vec::new();
        while self.kind() != TokenKind::RightBracket && self.kind() != TokenKind::Eof {
            if self.eat(TokenKind::Question) {
                optional_indices.push(elements.len() as u32);
            }
            elements.push(self.parse_expr());
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBracket, "']' after list elements");
        let expr = self.factory.new_list(elements, optional_indices);
        self.register(start, expr)
    }

    fn parse_map(&mut self, start: u32) -> Expr {
        self.bump();
        let mut entries = Vec::new();
        while self.kind() != TokenKind::RightBrace && self.kind() != TokenKind::Eof {
            let optional = self.eat(TokenKind::Question);
            let key = self.parse_expr();
            self.expect(TokenKind::Colon, "':' after map key");
            let value = self.parse_expr();
            entries.push(MapEntry {
                key,
                value,
                optional,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}' after map entries");
        let expr = self.factory.new_map(entries);
        self.register(start, expr)
    }

    /// Decode an int, uint, or double token, optionally negated.
    fn parse_numeric_literal(&mut self, start: u32, negative: bool) -> Expr {
        let token = self.bump();
        let text = if negative {
            format!("-{}", token.text)
        } else {
            token.text.clone()
        };
        let decoded = match token.kind {
            TokenKind::IntLit => literal::parse_int(&text),
            TokenKind::UintLit => literal::parse_uint(&text),
            TokenKind::DoubleLit => literal::parse_double(&text),
            _ => Err(crate::error::CelError::invalid_state(
                "numeric literal token expected",
            )),
        };
        match decoded {
            Ok(value) => {
                let expr = self.factory.new_const(value);
                self.register(start, expr)
            }
            Err(error) => self.literal_error(&token, error),
        }
    }

    fn literal_error(&mut self, token: &Token, error: crate::error::CelError) -> Expr {
        let offset = match &error {
            crate::error::CelError::MalformedLiteral { offset, .. } => {
                token.offset() as usize + offset
            }
            _ => token.offset() as usize,
        };
        self.reporter.report(None, offset, error.to_string());
        self.factory
            .new_const(Constant::Error("<bad literal>".to_string()))
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        while self.kind() != TokenKind::RightParen && self.kind() != TokenKind::Eof {
            args.push(self.parse_expr());
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightParen, "')' after call arguments");
        args
    }

    /// Build a call node, going through the macro registry first.
    fn finish_call(
        &mut self,
        start: u32,
        target: Option<Expr>,
        function: &str,
        args: Vec<Expr>,
    ) -> Expr {
        let mut ctx = MacroContext {
            factory: &mut self.factory,
            source_info: &mut self.source_info,
            populate_macro_calls: self.options.populate_macro_calls,
        };
        match macros::maybe_expand_macro(&mut ctx, target, function, args) {
            MacroExpansion::Expanded(expr) => self.register(start, expr),
            MacroExpansion::NotAMacro { target, args } => {
                let call = match target {
                    Some(target) => self.factory.new_member_call(target, function, args),
                    None => self.factory.new_global_call(function, args),
                };
                self.register(start, call)
            }
            MacroExpansion::Error { message } => {
                self.reporter.report(None, start as usize, message);
                self.factory
                    .new_const(Constant::Error("<parse error>".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::printer::print_expr;
    use crate::ast::ExprVariant;

    fn parse_ok(text: &str) -> Ast {
        match parse(text) {
            Ok(ast) => ast,
            Err(errors) => panic!("parse of {:?} failed:\n{}", text, errors),
        }
    }

    #[test]
    fn test_parse_simple_addition() {
        let ast = parse_ok("1 + 2");
        assert_eq!(
            print_expr(ast.root()),
            "CALL [3] {\n  function: _+_\n  args: { CONSTANT [1] { value: 1 } CONSTANT [2] { value: 2 } }\n}"
        );
    }

    #[test]
    fn test_parse_precedence() {
        let ast = parse_ok("1 + 2 * 3");
        let root = ast.root();
        match &root.kind {
            ExprKind::Call { function, args, .. } => {
                assert_eq!(function, operators::ADD);
                assert_eq!(args[1].variant(), ExprVariant::Call);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ternary_right_associative() {
        let ast = parse_ok("a ? b : c ? d : e");
        match &ast.root().kind {
            ExprKind::Call { function, args, .. } => {
                assert_eq!(function, operators::CONDITIONAL);
                assert_eq!(args[2].variant(), ExprVariant::Call);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_member_chain() {
        let ast = parse_ok("a.b.c(1)[0]");
        match &ast.root().kind {
            ExprKind::Call { function, .. } => assert_eq!(function, operators::INDEX),
            other => panic!("expected index call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_negative_literals() {
        let ast = parse_ok("-9223372036854775808");
        match &ast.root().kind {
            ExprKind::Constant(Constant::Int(i)) => assert_eq!(*i, i64::MIN),
            other => panic!("expected int constant, got {:?}", other),
        }
        let ast = parse_ok("-x");
        match &ast.root().kind {
            ExprKind::Call { function, .. } => assert_eq!(function, operators::NEGATE),
            other => panic!("expected negate call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_with_optional_elements() {
        let ast = parse_ok("[1, ?x, 3]");
        match &ast.root().kind {
            ExprKind::List {
                elements,
                optional_indices,
            } => {
                assert_eq!(elements.len(), 3);
                assert_eq!(optional_indices, &[1]);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_map_and_struct() {
        let ast = parse_ok("{'a': 1, ?'b': 2}");
        match &ast.root().kind {
            ExprKind::Map { entries } => {
                assert_eq!(entries.len(), 2);
                assert!(!entries[0].optional);
                assert!(entries[1].optional);
            }
            other => panic!("expected map, got {:?}", other),
        }

        let ast = parse_ok("google.type.Money{currency_code: 'USD', units: 3}");
        match &ast.root().kind {
            ExprKind::Struct {
                message_type,
                entries,
            } => {
                assert_eq!(message_type, "google.type.Money");
                assert_eq!(entries.len(), 2);
            }
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_leading_dot_ident() {
        let ast = parse_ok(".a.b");
        match &ast.root().kind {
            ExprKind::Select { operand, field, .. } => {
                assert_eq!(field, "b");
                match &operand.kind {
                    ExprKind::Ident { name } => assert_eq!(name, ".a"),
                    other => panic!("expected ident, got {:?}", other),
                }
            }
            other => panic!("expected select, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ids_unique_and_positive() {
        let ast = parse_ok("[1, 2].exists(x, x > 1) && has(a.b)");
        let mut seen = std::collections::HashSet::new();
        ast.root().walk(&mut |e| {
            assert!(e.id > 0, "non-positive id {}", e.id);
            assert!(seen.insert(e.id), "duplicate id {}", e.id);
        });
    }

    #[test]
    fn test_parse_positions_recorded() {
        let ast = parse_ok("ab + cd");
        let root = ast.root();
        assert_eq!(ast.source_info().position_of(root.id), Some(0));
        let args: Vec<_> = root.children();
        assert_eq!(ast.source_info().position_of(args[0].id), Some(0));
        assert_eq!(ast.source_info().position_of(args[1].id), Some(5));
    }

    #[test]
    fn test_parse_has_macro() {
        let ast = parse_ok("has(a.b)");
        match &ast.root().kind {
            ExprKind::Select { test_only, .. } => assert!(test_only),
            other => panic!("expected test-only select, got {:?}", other),
        }
        let entry = ast.source_info().macro_call(ast.root().id).unwrap();
        match &entry.kind {
            ExprKind::Call { function, .. } => assert_eq!(function, "has"),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_exists_macro() {
        let ast = parse_ok("[false].exists(i, i)");
        let root = ast.root();
        let comp = match &root.kind {
            ExprKind::Comprehension(comp) => comp,
            other => panic!("expected comprehension, got {:?}", other),
        };
        assert_eq!(comp.iter_var, "i");
        assert_eq!(comp.accu_var, macros::ACCU_VAR);
        assert_eq!(comp.iter_range.variant(), ExprVariant::List);
        // The unexpanded call is recorded under the comprehension id.
        let recorded = ast.source_info().macro_call(root.id).unwrap();
        match &recorded.kind {
            ExprKind::Call {
                target, function, ..
            } => {
                assert_eq!(function, "exists");
                assert!(matches!(
                    target.as_deref(),
                    Some(Expr {
                        kind: ExprKind::NotSet,
                        ..
                    })
                ));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bind_macro_registers_extension() {
        let ast = parse_ok("cel.bind(x, 1, x + x)");
        assert!(matches!(ast.root().kind, ExprKind::Comprehension(_)));
        let tags: Vec<_> = ast
            .source_info()
            .extensions()
            .iter()
            .map(|e| (e.name.as_str(), e.version))
            .collect();
        assert_eq!(tags, vec![("bindings", 1)]);
    }

    #[test]
    fn test_parse_transform_list_two_variables() {
        let ast = parse_ok("[1, 2].transformList(i, v, v * v)");
        match &ast.root().kind {
            ExprKind::Comprehension(comp) => {
                assert_eq!(comp.iter_var, "i");
                assert_eq!(comp.iter_var2.as_deref(), Some("v"));
            }
            other => panic!("expected comprehension, got {:?}", other),
        }
        let tags: Vec<_> = ast
            .source_info()
            .extensions()
            .iter()
            .map(|e| (e.name.as_str(), e.version))
            .collect();
        assert_eq!(tags, vec![("comprehensions", 2)]);
    }

    #[test]
    fn test_parse_errors_render_with_caret() {
        let errors = parse("a + + b").unwrap_err();
        assert!(!errors.is_empty());
        let rendered = errors.to_string();
        assert!(rendered.contains("<input>:1:5"), "got: {}", rendered);
        assert!(rendered.contains("| a + + b"), "got: {}", rendered);
    }

    #[test]
    fn test_parse_reserved_word_rejected() {
        assert!(parse("while").is_err());
        assert!(parse("a.exists(loop, loop > 1)").is_err());
    }

    #[test]
    fn test_parse_deep_nesting_fails_cleanly() {
        let text = format!("{}x{}", "(".repeat(300), ")".repeat(300));
        assert!(parse(&text).is_err());
    }

    #[test]
    fn test_macro_arguments_must_be_identifiers() {
        assert!(parse("[1].exists(1 + 1, true)").is_err());
        assert!(parse("has(a)").is_err());
    }
}
