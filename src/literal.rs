//! Literal Decoder
//!
//! Decodes the exact text of literal tokens (including quotes and
//! prefixes) into typed [`Constant`] values. The lexer captures token
//! text verbatim; everything about a literal's meaning lives here.
//!
//! Failures are [`CelError::MalformedLiteral`] carrying a code-point
//! offset into the token text.

use crate::ast::Constant;
use crate::error::CelError;

/// Decode an integer literal: optional leading `-`, then base 10 or a
/// `0x` hex body. `-0x1A` is negative hex; `0x-1A` is rejected.
pub fn parse_int(text: &str) -> Result<Constant, CelError> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (radix, digits) = match body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        Some(rest) => (16, rest),
        None => (10, body),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(CelError::malformed(0, format!("invalid integer literal '{}'", text)));
    }
    let signed = if negative {
        format!("-{}", digits)
    } else {
        digits.to_string()
    };
    i64::from_str_radix(&signed, radix)
        .map(Constant::Int)
        .map_err(|_| CelError::malformed(0, format!("integer literal '{}' out of range", text)))
}

/// Decode an unsigned integer literal. The token must end in `u` or
/// `U`; the body is base 10 or `0x` hex, parsed as unsigned 64-bit.
pub fn parse_uint(text: &str) -> Result<Constant, CelError> {
    let body = text
        .strip_suffix('u')
        .or_else(|| text.strip_suffix('U'))
        .ok_or_else(|| {
            CelError::malformed(0, format!("uint literal '{}' missing 'u' suffix", text))
        })?;
    let (radix, digits) = match body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        Some(rest) => (16, rest),
        None => (10, body),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(CelError::malformed(0, format!("invalid uint literal '{}'", text)));
    }
    u64::from_str_radix(digits, radix)
        .map(Constant::Uint)
        .map_err(|_| CelError::malformed(0, format!("uint literal '{}' out of range", text)))
}

/// Decode a floating-point literal. NaN and infinities parse through.
pub fn parse_double(text: &str) -> Result<Constant, CelError> {
    text.parse::<f64>()
        .map(Constant::Double)
        .map_err(|_| CelError::malformed(0, format!("invalid double literal '{}'", text)))
}

/// Decode a string literal into a Unicode string constant.
pub fn parse_string(text: &str) -> Result<Constant, CelError> {
    let scanner = QuotedScanner::open(text, LiteralMode::Text)?;
    scanner.decode_text().map(Constant::String)
}

/// Decode a bytes literal (`b`-prefixed) into a byte-string constant.
pub fn parse_bytes(text: &str) -> Result<Constant, CelError> {
    let scanner = QuotedScanner::open(text, LiteralMode::Bytes)?;
    scanner.decode_bytes().map(Constant::Bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteralMode {
    Text,
    Bytes,
}

/// Parsed shape of a quoted literal: prefix flags, quote style, and the
/// code-point range of the body within the token.
struct QuotedScanner {
    chars: Vec<char>,
    raw: bool,
    /// Start of the body (just past the opening quote).
    body_start: usize,
    /// End of the body (the index of the closing quote sequence).
    body_end: usize,
}

impl QuotedScanner {
    /// Validate prefixes and quotes and locate the closing quote,
    /// rejecting tokens with trailing garbage after the closer.
    fn open(text: &str, mode: LiteralMode) -> Result<Self, CelError> {
        let chars: Vec<char> = text.chars().collect();
        let mut pos = 0;
        let mut raw = false;
        let mut bytes_prefix = false;

        // Up to two prefix letters, `r`/`R` and `b`/`B`, in either order.
        while pos < chars.len() {
            match chars[pos] {
                'r' | 'R' if !raw => raw = true,
                'b' | 'B' if !bytes_prefix => bytes_prefix = true,
                '\'' | '"' => break,
                c => {
                    return Err(CelError::malformed(
                        pos,
                        format!("unexpected character '{}' in literal prefix", c),
                    ))
                }
            }
            pos += 1;
        }
        match mode {
            LiteralMode::Bytes if !bytes_prefix => {
                return Err(CelError::malformed(0, "bytes literal missing 'b' prefix"));
            }
            LiteralMode::Text if bytes_prefix => {
                return Err(CelError::malformed(0, "unexpected 'b' prefix on string literal"));
            }
            _ => {}
        }

        let quote = match chars.get(pos) {
            Some(&q @ ('\'' | '"')) => q,
            _ => return Err(CelError::malformed(pos, "missing opening quote")),
        };
        let triple = chars[pos..].len() >= 3 && chars[pos + 1] == quote && chars[pos + 2] == quote;
        let quote_len = if triple { 3 } else { 1 };
        let body_start = pos + quote_len;

        // Find the first unescaped closing quote sequence. In raw
        // literals the backslash has no escaping power.
        let mut i = body_start;
        let body_end = loop {
            if i + quote_len > chars.len() {
                return Err(CelError::malformed(
                    chars.len(),
                    "unterminated quoted literal",
                ));
            }
            if chars[i..].len() >= quote_len && chars[i..i + quote_len].iter().all(|&c| c == quote)
            {
                break i;
            }
            if !raw && chars[i] == '\\' {
                if i + 1 >= chars.len() {
                    return Err(CelError::malformed(i, "trailing backslash"));
                }
                i += 2;
            } else {
                i += 1;
            }
        };
        if body_end + quote_len != chars.len() {
            return Err(CelError::malformed(
                body_end + quote_len,
                "unexpected characters after closing quote",
            ));
        }

        Ok(Self {
            chars,
            raw,
            body_start,
            body_end,
        })
    }

    fn decode_text(&self) -> Result<String, CelError> {
        let mut out = String::new();
        let mut cursor = BodyCursor::new(self);
        if self.raw {
            while let Some((_, c)) = cursor.next() {
                out.push(c);
            }
            return Ok(out);
        }
        while let Some((offset, c)) = cursor.next() {
            if c == '\\' {
                match decode_escape(&mut cursor, offset, LiteralMode::Text)? {
                    Escaped::Char(c) => out.push(c),
                    Escaped::Byte(b) => {
                        // `\xHH` and octal escapes extend to U+0000..U+00FF
                        // in strings; they are code points, not raw bytes.
                        out.push(b as char)
                    }
                }
            } else {
                out.push(c);
            }
        }
        Ok(out)
    }

    fn decode_bytes(&self) -> Result<Vec<u8>, CelError> {
        let mut out = Vec::new();
        let mut cursor = BodyCursor::new(self);
        if self.raw {
            while let Some((_, c)) = cursor.next() {
                push_utf8(&mut out, c);
            }
            return Ok(out);
        }
        while let Some((offset, c)) = cursor.next() {
            if c == '\\' {
                match decode_escape(&mut cursor, offset, LiteralMode::Bytes)? {
                    Escaped::Byte(b) => out.push(b),
                    Escaped::Char(c) => push_utf8(&mut out, c),
                }
            } else {
                push_utf8(&mut out, c);
            }
        }
        Ok(out)
    }
}

fn push_utf8(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Walks a literal body, rewriting `\r\n` and lone `\r` to `\n` as it
/// goes. Yields `(offset, code point)` pairs where the offset indexes
/// the original token text.
struct BodyCursor<'a> {
    chars: &'a [char],
    pos: usize,
    end: usize,
}

impl<'a> BodyCursor<'a> {
    fn new(scanner: &'a QuotedScanner) -> Self {
        Self {
            chars: &scanner.chars,
            pos: scanner.body_start,
            end: scanner.body_end,
        }
    }

    fn next(&mut self) -> Option<(usize, char)> {
        if self.pos >= self.end {
            return None;
        }
        let offset = self.pos;
        let c = self.chars[self.pos];
        self.pos += 1;
        if c == '\r' {
            if self.pos < self.end && self.chars[self.pos] == '\n' {
                self.pos += 1;
            }
            return Some((offset, '\n'));
        }
        Some((offset, c))
    }
}

enum Escaped {
    Char(char),
    Byte(u8),
}

/// Decode one escape sequence. The leading backslash has already been
/// consumed; `start` is its offset for error reporting.
fn decode_escape(
    cursor: &mut BodyCursor<'_>,
    start: usize,
    mode: LiteralMode,
) -> Result<Escaped, CelError> {
    let (offset, c) = cursor
        .next()
        .ok_or_else(|| CelError::malformed(start, "trailing backslash"))?;
    let escaped = match c {
        'a' => Escaped::Byte(0x07),
        'b' => Escaped::Byte(0x08),
        'f' => Escaped::Byte(0x0C),
        'n' => Escaped::Byte(0x0A),
        'r' => Escaped::Byte(0x0D),
        't' => Escaped::Byte(0x09),
        'v' => Escaped::Byte(0x0B),
        '"' => Escaped::Byte(b'"'),
        '\'' => Escaped::Byte(b'\''),
        '\\' => Escaped::Byte(b'\\'),
        '?' => Escaped::Byte(b'?'),
        '`' => Escaped::Byte(b'`'),
        '0'..='3' => {
            let mut value = c as u32 - '0' as u32;
            for _ in 0..2 {
                let (o, d) = cursor
                    .next()
                    .ok_or_else(|| CelError::malformed(offset, "truncated octal escape"))?;
                let digit = d
                    .to_digit(8)
                    .ok_or_else(|| CelError::malformed(o, "invalid octal escape digit"))?;
                value = value * 8 + digit;
            }
            Escaped::Byte(value as u8)
        }
        '4'..='9' => {
            return Err(CelError::malformed(
                offset,
                "octal escape must start with a digit in 0-3",
            ))
        }
        'x' | 'X' => {
            let value = read_hex(cursor, offset, 2)?;
            Escaped::Byte(value as u8)
        }
        'u' => {
            if mode == LiteralMode::Bytes {
                return Err(CelError::malformed(
                    offset,
                    "\\u escapes are not allowed in bytes literals",
                ));
            }
            let value = read_hex(cursor, offset, 4)?;
            Escaped::Char(scalar_value(value, offset)?)
        }
        'U' => {
            if mode == LiteralMode::Bytes {
                return Err(CelError::malformed(
                    offset,
                    "\\U escapes are not allowed in bytes literals",
                ));
            }
            let value = read_hex(cursor, offset, 8)?;
            Escaped::Char(scalar_value(value, offset)?)
        }
        other => {
            return Err(CelError::malformed(
                offset,
                format!("unknown escape sequence '\\{}'", other),
            ))
        }
    };
    Ok(escaped)
}

fn read_hex(cursor: &mut BodyCursor<'_>, start: usize, count: usize) -> Result<u32, CelError> {
    let mut value: u32 = 0;
    for _ in 0..count {
        let (o, d) = cursor
            .next()
            .ok_or_else(|| CelError::malformed(start, "truncated hex escape"))?;
        let digit = d
            .to_digit(16)
            .ok_or_else(|| CelError::malformed(o, "invalid hex escape digit"))?;
        value = value * 16 + digit;
    }
    Ok(value)
}

/// Check that a decoded value is a Unicode scalar value: in range and
/// not a surrogate.
fn scalar_value(value: u32, offset: usize) -> Result<char, CelError> {
    if (0xD800..=0xDFFF).contains(&value) {
        return Err(CelError::malformed(offset, "surrogate code point in escape"));
    }
    char::from_u32(value)
        .ok_or_else(|| CelError::malformed(offset, "code point out of range in escape"))
}
