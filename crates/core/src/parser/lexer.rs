//! Byte-level tokenizer for PDF object syntax.
//!
//! Produces a flat token stream; object structure (arrays, dicts, indirect
//! references) is assembled one layer up in `parser::parser`.

use crate::error::{PdfError, Result};

/// Structural keywords the object layer dispatches on. Anything else is
/// carried through as raw bytes (content-stream operators, `obj`-header
/// noise, damaged input).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    ArrayStart, // [
    ArrayEnd,   // ]
    DictStart,  // <<
    DictEnd,    // >>
    BraceOpen,  // {
    BraceClose, // }
    Null,
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,
    Other(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"[" => Keyword::ArrayStart,
            b"]" => Keyword::ArrayEnd,
            b"<<" => Keyword::DictStart,
            b">>" => Keyword::DictEnd,
            b"{" => Keyword::BraceOpen,
            b"}" => Keyword::BraceClose,
            b"null" => Keyword::Null,
            b"obj" => Keyword::Obj,
            b"endobj" => Keyword::EndObj,
            b"R" => Keyword::R,
            b"stream" => Keyword::Stream,
            b"endstream" => Keyword::EndStream,
            b"xref" => Keyword::Xref,
            b"trailer" => Keyword::Trailer,
            b"startxref" => Keyword::StartXref,
            _ => Keyword::Other(b.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Keyword::ArrayStart => b"[",
            Keyword::ArrayEnd => b"]",
            Keyword::DictStart => b"<<",
            Keyword::DictEnd => b">>",
            Keyword::BraceOpen => b"{",
            Keyword::BraceClose => b"}",
            Keyword::Null => b"null",
            Keyword::Obj => b"obj",
            Keyword::EndObj => b"endobj",
            Keyword::R => b"R",
            Keyword::Stream => b"stream",
            Keyword::EndStream => b"endstream",
            Keyword::Xref => b"xref",
            Keyword::Trailer => b"trailer",
            Keyword::StartXref => b"startxref",
            Keyword::Other(bytes) => bytes.as_slice(),
        }
    }
}

/// Lexical token types.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer value
    Int(i64),
    /// Floating point value
    Real(f64),
    /// Boolean value
    Bool(bool),
    /// Name (e.g., /Type), decoded and `#XX`-unescaped
    Name(String),
    /// String bytes (literal or hex; classification happens upstream)
    String(Vec<u8>),
    /// Keyword/operator
    Keyword(Keyword),
}

/// Tokenizer over a byte slice.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    /// Start position of the most recent token
    token_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            token_pos: 0,
        }
    }

    /// Current position in the input.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Set current position in the input.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
        self.token_pos = pos;
    }

    /// Remaining unparsed input.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// The whole underlying input.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Check if byte is PDF whitespace
    pub fn is_whitespace(b: u8) -> bool {
        matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
    }

    /// Check if byte is a PDF delimiter
    pub fn is_delimiter(b: u8) -> bool {
        matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
        )
    }

    fn is_keyword_end(b: u8) -> bool {
        Self::is_whitespace(b) || Self::is_delimiter(b)
    }

    /// Skip whitespace and `%` comments.
    fn skip_whitespace(&mut self) {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            if b == b'%' {
                self.pos += 1;
                match find_line_end(&self.data[self.pos..]) {
                    Some(offset) => self.pos += offset + 1,
                    None => self.pos = self.data.len(),
                }
                continue;
            }
            if !Self::is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    /// Parse a name (/Name), unescaping `#XX` triplets.
    fn parse_name(&mut self) -> Result<Token> {
        self.advance(); // skip '/'
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if Self::is_whitespace(b) || Self::is_delimiter(b) {
                break;
            }
            if b == b'#' {
                let h1 = self.peek_at(1).and_then(hex_value);
                let h2 = self.peek_at(2).and_then(hex_value);
                if let (Some(h1), Some(h2)) = (h1, h2) {
                    self.pos += 3;
                    name.push((h1 << 4) | h2);
                    continue;
                }
                // `#` not followed by two hex digits: drop it, keep the
                // rest, matching common-reader tolerance.
                self.advance();
                continue;
            }
            name.push(self.advance().unwrap_or_default());
        }

        Ok(Token::Name(name_from_bytes(&name, self.token_pos)))
    }

    /// Parse a number (integer or real).
    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.advance();
        }
        if self.peek() == Some(b'.') {
            has_dot = true;
            self.advance();
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let s = std::str::from_utf8(&self.data[start..self.pos]).map_err(|_| {
            PdfError::TokenError {
                pos: start,
                msg: "invalid number".into(),
            }
        })?;

        if has_dot {
            let val: f64 = s.parse().map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid real: {s}"),
            })?;
            Ok(Token::Real(val))
        } else {
            let val: i64 = s.parse().map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid int: {s}"),
            })?;
            Ok(Token::Int(val))
        }
    }

    /// Parse a literal string `(...)` with balance counting and escapes.
    fn parse_string(&mut self) -> Result<Token> {
        self.advance(); // skip '('
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'(') => result.push(b'('),
                    Some(b')') => result.push(b')'),
                    Some(b'\\') => result.push(b'\\'),
                    Some(b'\r') => {
                        // Line continuation: swallow \r and an optional \n.
                        if self.peek() == Some(b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'\n') => {}
                    Some(c) if c.is_ascii_digit() && c < b'8' => {
                        // Octal escape, up to 3 digits.
                        let mut octal = u32::from(c - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d) if d.is_ascii_digit() && d < b'8' => {
                                    self.advance();
                                    octal = octal * 8 + u32::from(d - b'0');
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    Some(c) => result.push(c),
                    None => return Err(PdfError::UnexpectedEof),
                },
                Some(c) => result.push(c),
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        Ok(Token::String(result))
    }

    /// Parse a hex string `<...>`, pairing nibbles; odd length pads low.
    fn parse_hex_string(&mut self) -> Result<Token> {
        self.advance(); // skip '<'
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(c) if c.is_ascii_hexdigit() => {
                    self.pos += 1;
                    let nibble = hex_value(c).unwrap_or_default();
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
                Some(c) if Self::is_whitespace(c) => {
                    self.pos += 1;
                }
                Some(_) => break, // junk byte terminates the string
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        if let Some(nibble) = pending {
            result.push(nibble << 4);
        }

        Ok(Token::String(result))
    }

    fn parse_keyword(&mut self) -> Result<Token> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if Self::is_keyword_end(b) {
                break;
            }
            self.advance();
        }

        let bytes = &self.data[start..self.pos];
        if bytes == b"true" {
            return Ok(Token::Bool(true));
        }
        if bytes == b"false" {
            return Ok(Token::Bool(false));
        }
        Ok(Token::Keyword(Keyword::from_bytes(bytes)))
    }

    /// Get next token with its start position.
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();
        if self.at_end() {
            return None;
        }

        self.token_pos = self.pos;
        let b = self.peek()?;

        let result = match b {
            b'/' => self.parse_name(),
            b'(' => self.parse_string(),
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.pos += 2;
                    Ok(Token::Keyword(Keyword::DictStart))
                } else {
                    self.parse_hex_string()
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    Ok(Token::Keyword(Keyword::DictEnd))
                } else {
                    self.pos += 1;
                    Ok(Token::Keyword(Keyword::Other(b">".to_vec())))
                }
            }
            b'[' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::ArrayStart))
            }
            b']' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::ArrayEnd))
            }
            b'{' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::BraceOpen))
            }
            b'}' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::BraceClose))
            }
            b'+' | b'-' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') {
                    self.parse_number()
                } else {
                    self.parse_keyword()
                }
            }
            b'.' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
                    self.parse_number()
                } else {
                    self.parse_keyword()
                }
            }
            c if c.is_ascii_digit() => self.parse_number(),
            _ => self.parse_keyword(),
        };

        Some(result.map(|token| (self.token_pos, token)))
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn find_line_end(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == b'\r' || b == b'\n')
}

/// Decode name bytes: UTF-8 when valid, then GBK (common in CJK producers),
/// then latin-1 as the lossless last resort.
pub(crate) fn name_from_bytes(bytes: &[u8], pos: usize) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    if let Some(s) = encoding_rs::GBK.decode_without_bom_handling_and_without_replacement(bytes) {
        log::warn!("name at {pos} is not UTF-8, decoded as GBK");
        return s.into_owned();
    }
    log::warn!("name at {pos} is not UTF-8, decoding as latin-1");
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(data: &[u8]) -> Vec<Token> {
        let mut lexer = Lexer::new(data);
        let mut out = Vec::new();
        while let Some(tok) = lexer.next_token() {
            out.push(tok.unwrap().1);
        }
        out
    }

    #[test]
    fn name_hex_escapes_unescape() {
        assert_eq!(tokens(b"/A#20B"), vec![Token::Name("A B".into())]);
        assert_eq!(tokens(b"/paren#28"), vec![Token::Name("paren(".into())]);
    }

    #[test]
    fn non_utf8_names_try_gbk_before_latin1() {
        // GBK 0xD6 0xD0 is U+4E2D; invalid as UTF-8.
        assert_eq!(tokens(b"/\xD6\xD0"), vec![Token::Name("\u{4E2D}".into())]);
        // A lone GBK lead byte is not decodable, so latin-1 wins.
        assert_eq!(tokens(b"/\xE9"), vec![Token::Name("\u{E9}".into())]);
    }

    #[test]
    fn numbers_and_signs() {
        assert_eq!(
            tokens(b"42 -17 +3 0.5 -.25 4."),
            vec![
                Token::Int(42),
                Token::Int(-17),
                Token::Int(3),
                Token::Real(0.5),
                Token::Real(-0.25),
                Token::Real(4.0),
            ]
        );
    }

    #[test]
    fn literal_string_escapes() {
        assert_eq!(
            tokens(b"(a\\(b\\)c \\101 \\n)"),
            vec![Token::String(b"a(b)c A \n".to_vec())]
        );
        // nested unescaped parens balance
        assert_eq!(tokens(b"((x))"), vec![Token::String(b"(x)".to_vec())]);
    }

    #[test]
    fn hex_string_odd_length_pads() {
        assert_eq!(tokens(b"<414>"), vec![Token::String(b"A\x40".to_vec())]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            tokens(b"1 % a comment\n2"),
            vec![Token::Int(1), Token::Int(2)]
        );
    }
}
