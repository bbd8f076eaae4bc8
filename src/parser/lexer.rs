//! Lexer
//!
//! Converts a [`SourceBuffer`] into a flat token stream. The lexer is
//! a hand-written cursor over code points: it classifies identifiers,
//! captures numeric and quoted literal text verbatim (decoding is the
//! literal decoder's job), recognizes the operator set, and skips
//! whitespace and `//` comments.
//!
//! Lexical errors (unterminated literals, stray characters) go through
//! the shared [`ErrorReporter`]; the returned token stream always ends
//! with an `Eof` token.

use crate::error::ErrorReporter;
use crate::source::{SourceBuffer, SourceSpan};

use super::tokens::{is_reserved_word, Token, TokenKind};

/// Tokenize a source buffer, reporting lexical errors to `reporter`.
pub fn tokenize(source: &SourceBuffer, reporter: &mut ErrorReporter) -> Vec<Token> {
    Lexer::new(source, reporter).run()
}

struct Lexer<'a> {
    source: &'a SourceBuffer,
    reporter: &'a mut ErrorReporter,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a SourceBuffer, reporter: &'a mut ErrorReporter) -> Self {
        Self {
            source,
            reporter,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.source.char_at(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.source.char_at(self.pos + ahead)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn text_from(&self, start: usize) -> String {
        (start..self.pos)
            .filter_map(|i| self.source.char_at(i))
            .collect()
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let text = self.text_from(start);
        self.tokens.push(Token::new(
            kind,
            text,
            SourceSpan::new(start as u32, self.pos as u32),
        ));
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\n' | '\r' | '\u{0b}' | '\u{0c}' => {
                    self.pos += 1;
                }
                '/' if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                c if is_ident_start(c) => self.lex_word_or_quoted(),
                c if c.is_ascii_digit() => self.lex_number(),
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(),
                '\'' | '"' => self.lex_quoted(),
                _ => self.lex_operator(),
            }
        }
        let end = self.pos as u32;
        self.tokens
            .push(Token::new(TokenKind::Eof, "", SourceSpan::new(end, end)));
        self.tokens
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// An identifier-start character opens either a plain word or a
    /// prefixed quoted literal (`r"..."`, `b'...'`, `rb"..."`).
    fn lex_word_or_quoted(&mut self) {
        if self.quoted_prefix_len().is_some() {
            self.lex_quoted();
            return;
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word = self.text_from(start);
        let kind = match word.as_str() {
            "true" | "false" => TokenKind::BoolLit,
            "null" => TokenKind::NullLit,
            "in" => TokenKind::In,
            w if is_reserved_word(w) => TokenKind::Reserved,
            _ => TokenKind::Identifier,
        };
        self.push(kind, start);
    }

    /// Length of a raw/bytes prefix directly followed by a quote, when
    /// the cursor sits on one (`r`, `b`, `rb`, `br`, any case).
    fn quoted_prefix_len(&self) -> Option<usize> {
        let mut raw = false;
        let mut bytes = false;
        for len in 0..=2 {
            match self.peek_at(len) {
                Some('\'' | '"') if len > 0 => return Some(len),
                Some('r' | 'R') if !raw => raw = true,
                Some('b' | 'B') if !bytes => bytes = true,
                _ => return None,
            }
        }
        None
    }

    fn lex_quoted(&mut self) {
        let start = self.pos;
        let mut raw = false;
        let mut bytes = false;
        while let Some(c) = self.peek() {
            match c {
                'r' | 'R' => raw = true,
                'b' | 'B' => bytes = true,
                _ => break,
            }
            self.pos += 1;
        }
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => {
                self.reporter.report(None, start, "malformed quoted literal");
                return;
            }
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }
        let closer_len = if triple { 3 } else { 1 };

        loop {
            let at_closer = self.peek() == Some(quote)
                && (!triple || (self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote)));
            if at_closer {
                self.pos += closer_len;
                let kind = if bytes {
                    TokenKind::BytesLit
                } else {
                    TokenKind::StringLit
                };
                self.push(kind, start);
                return;
            }
            match self.peek() {
                None => {
                    self.reporter
                        .report(None, start, "unterminated quoted literal");
                    self.push(if bytes { TokenKind::BytesLit } else { TokenKind::StringLit }, start);
                    return;
                }
                Some('\n' | '\r') if !triple => {
                    self.reporter.report(
                        None,
                        start,
                        "quoted literal may not span lines; use a triple-quoted literal",
                    );
                    self.push(if bytes { TokenKind::BytesLit } else { TokenKind::StringLit }, start);
                    return;
                }
                Some('\\') if !raw => {
                    self.pos += 1;
                    if self.peek().is_some() {
                        self.pos += 1;
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let mut is_double = false;

        if self.peek() == Some('.') {
            // Leading-dot double: `.5`.
            is_double = true;
            self.pos += 1;
            self.eat_digits();
        } else if self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X'))
            && self.peek_at(2).is_some_and(|c| c.is_ascii_hexdigit())
        {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            if matches!(self.peek(), Some('u' | 'U')) {
                self.pos += 1;
                self.push(TokenKind::UintLit, start);
            } else {
                self.push(TokenKind::IntLit, start);
            }
            return;
        } else {
            self.eat_digits();
            if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                self.pos += 1;
                self.eat_digits();
            }
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let mut ahead = 1;
            if matches!(self.peek_at(1), Some('+' | '-')) {
                ahead = 2;
            }
            if self.peek_at(ahead).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                self.pos += ahead;
                self.eat_digits();
            }
        }

        if is_double {
            self.push(TokenKind::DoubleLit, start);
        } else if matches!(self.peek(), Some('u' | 'U')) {
            self.pos += 1;
            self.push(TokenKind::UintLit, start);
        } else {
            self.push(TokenKind::IntLit, start);
        }
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn lex_operator(&mut self) {
        let start = self.pos;
        let c = match self.bump() {
            Some(c) => c,
            None => return,
        };
        let kind = match c {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '!' => {
                if self.peek() == Some('=') {
                    self.pos += 1;
                    TokenKind::NotEquals
                } else {
                    TokenKind::Not
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.pos += 1;
                    TokenKind::Equals
                } else {
                    TokenKind::Assign
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.pos += 1;
                    TokenKind::LessEquals
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.pos += 1;
                    TokenKind::GreaterEquals
                } else {
                    TokenKind::Greater
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.pos += 1;
                    TokenKind::And
                } else {
                    self.reporter
                        .report(None, start, "unexpected '&'; did you mean '&&'?");
                    return;
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.pos += 1;
                    TokenKind::Or
                } else {
                    self.reporter
                        .report(None, start, "unexpected '|'; did you mean '||'?");
                    return;
                }
            }
            other => {
                self.reporter
                    .report(None, start, format!("unexpected character '{}'", other));
                return;
            }
        };
        self.push(kind, start);
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Vec<Token> {
        let source = SourceBuffer::from_text(text);
        let mut reporter = ErrorReporter::new();
        reporter.enter_context("<test>", Some(source.clone()));
        let tokens = tokenize(&source, &mut reporter);
        assert!(
            !reporter.has_errors(),
            "unexpected lex errors: {}",
            reporter.render_all()
        );
        tokens
    }

    fn kinds(text: &str) -> Vec<TokenKind> {
        lex(text).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_identifiers_and_keywords() {
        assert_eq!(
            kinds("foo true null in loop"),
            vec![
                TokenKind::Identifier,
                TokenKind::BoolLit,
                TokenKind::NullLit,
                TokenKind::In,
                TokenKind::Reserved,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        let tokens = lex("12 0x1A 3u 0xFFu 1.5 .5 1e3 2.5e-2");
        let got: Vec<_> = tokens
            .iter()
            .map(|t| (t.kind, t.text.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (TokenKind::IntLit, "12"),
                (TokenKind::IntLit, "0x1A"),
                (TokenKind::UintLit, "3u"),
                (TokenKind::UintLit, "0xFFu"),
                (TokenKind::DoubleLit, "1.5"),
                (TokenKind::DoubleLit, ".5"),
                (TokenKind::DoubleLit, "1e3"),
                (TokenKind::DoubleLit, "2.5e-2"),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_lex_select_is_not_a_double() {
        assert_eq!(
            kinds("a.b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_strings_keep_exact_text() {
        let tokens = lex(r#""abc" r'a\nb' b"xy" rb'z'"#);
        let got: Vec<_> = tokens
            .iter()
            .map(|t| (t.kind, t.text.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (TokenKind::StringLit, r#""abc""#),
                (TokenKind::StringLit, r"r'a\nb'"),
                (TokenKind::BytesLit, r#"b"xy""#),
                (TokenKind::BytesLit, "rb'z'"),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_lex_triple_quoted() {
        let tokens = lex("'''a\nb''' x");
        assert_eq!(tokens[0].kind, TokenKind::StringLit);
        assert_eq!(tokens[0].text, "'''a\nb'''");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_lex_escaped_quote_does_not_close() {
        let tokens = lex(r#""a\"b""#);
        assert_eq!(tokens[0].text, r#""a\"b""#);
    }

    #[test]
    fn test_lex_operators() {
        assert_eq!(
            kinds("a && b || !c == d != e <= f < g >= h > i"),
            vec![
                TokenKind::Identifier,
                TokenKind::And,
                TokenKind::Identifier,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::Identifier,
                TokenKind::NotEquals,
                TokenKind::Identifier,
                TokenKind::LessEquals,
                TokenKind::Identifier,
                TokenKind::Less,
                TokenKind::Identifier,
                TokenKind::GreaterEquals,
                TokenKind::Identifier,
                TokenKind::Greater,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_comments_and_spans() {
        let tokens = lex("a // trailing comment\n+ b");
        let got: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            got,
            vec![
                TokenKind::Identifier,
                TokenKind::Plus,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[1].span, SourceSpan::new(22, 23));
    }

    #[test]
    fn test_lex_unterminated_string_reports() {
        let source = SourceBuffer::from_text(r#""abc"#);
        let mut reporter = ErrorReporter::new();
        reporter.enter_context("<test>", Some(source.clone()));
        let _ = tokenize(&source, &mut reporter);
        assert!(reporter.has_errors());
    }

    #[test]
    fn test_lex_stray_character_reports() {
        let source = SourceBuffer::from_text("a # b");
        let mut reporter = ErrorReporter::new();
        reporter.enter_context("<test>", Some(source.clone()));
        let tokens = tokenize(&source, &mut reporter);
        assert!(reporter.has_errors());
        // Lexing continues past the stray character.
        assert_eq!(tokens.len(), 3);
    }
}
