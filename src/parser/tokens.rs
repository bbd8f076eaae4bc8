//! Token Definitions
//!
//! Tokens carry their kind, the exact source text, and a code-point
//! span. Literal tokens keep quotes and prefixes verbatim; the literal
//! decoder owns their value semantics.

use serde::{Deserialize, Serialize};

use crate::source::SourceSpan;

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Identifier,
    /// A reserved word that may not be used as an identifier.
    Reserved,
    IntLit,
    UintLit,
    DoubleLit,
    StringLit,
    BytesLit,
    BoolLit,
    NullLit,

    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Dot,
    Comma,
    Colon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    And,
    Or,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    /// Lone `=`; always a parse error, kept as a token for a better
    /// message.
    Assign,
    In,

    Eof,
}

/// One lexed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text of the token.
    pub text: String,
    /// Code-point span within the source buffer.
    pub span: SourceSpan,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    /// Start offset, in code points.
    pub fn offset(&self) -> u32 {
        self.span.start
    }
}

/// Words that may not be used as identifiers. `in` is an operator and
/// `true`/`false`/`null` are literals; both are classified separately.
pub const RESERVED_WORDS: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "let", "loop",
    "package", "namespace", "return", "var", "void", "while",
];

pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_words() {
        assert!(is_reserved_word("loop"));
        assert!(is_reserved_word("namespace"));
        assert!(!is_reserved_word("in"));
        assert!(!is_reserved_word("true"));
        assert!(!is_reserved_word("exists"));
    }

    #[test]
    fn test_token_offset() {
        let token = Token::new(TokenKind::Identifier, "abc", SourceSpan::new(4, 7));
        assert_eq!(token.offset(), 4);
        assert_eq!(token.span.len(), 3);
    }
}
