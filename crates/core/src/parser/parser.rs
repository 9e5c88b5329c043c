//! Object parser - assembles tokens into primitive objects.
//!
//! Handles indirect references (`num num R`) with bounded lookahead, and
//! tolerates generators that omit a value before `endobj`/`endstream` by
//! substituting Null.

use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObjRef, PDFObject, PDFString};
use crate::parser::lexer::{Keyword, Lexer, Token};

/// Parses PDF object syntax from a byte slice.
pub struct PDFParser<'a> {
    base: Lexer<'a>,
    /// Lookahead buffer for pushed-back tokens
    lookahead: Vec<Token>,
}

impl<'a> PDFParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            base: Lexer::new(data),
            lookahead: Vec::new(),
        }
    }

    /// Current position in the input (past any pushed-back tokens).
    pub fn tell(&self) -> usize {
        self.base.tell()
    }

    /// Reposition the parser, discarding lookahead.
    pub fn set_pos(&mut self, pos: usize) {
        self.lookahead.clear();
        self.base.set_pos(pos);
    }

    /// Remaining unparsed input.
    pub fn remaining(&self) -> &'a [u8] {
        self.base.remaining()
    }

    /// Get next token (from lookahead or the lexer).
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        match self.base.next_token() {
            Some(Ok((_, tok))) => Ok(Some(tok)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Push a token back for re-reading.
    fn push_back(&mut self, tok: Token) {
        self.lookahead.push(tok);
    }

    /// Expect a specific keyword as the next token.
    pub fn expect_keyword(&mut self, kw: &Keyword) -> Result<()> {
        match self.next_token()? {
            Some(Token::Keyword(k)) if k == *kw => Ok(()),
            Some(tok) => Err(PdfError::TokenError {
                pos: self.base.tell(),
                msg: format!(
                    "expected {:?}, got {:?}",
                    String::from_utf8_lossy(kw.as_bytes()),
                    tok
                ),
            }),
            None => Err(PdfError::UnexpectedEof),
        }
    }

    /// Parse the next PDF object.
    pub fn parse_object(&mut self) -> Result<PDFObject> {
        let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
        self.token_to_object(token)
    }

    /// Convert a token to a PDF object, consuming more tokens as needed.
    fn token_to_object(&mut self, token: Token) -> Result<PDFObject> {
        match token {
            Token::Int(n) => {
                // Could be the start of an indirect reference: objid genno R
                if let Ok(Some(tok2)) = self.next_token() {
                    if let Token::Int(m) = tok2 {
                        if let Ok(Some(tok3)) = self.next_token() {
                            if tok3 == Token::Keyword(Keyword::R) && n >= 0 && m >= 0 {
                                return Ok(PDFObject::Ref(PDFObjRef::new(n as u32, m as u32)));
                            }
                            self.push_back(tok3);
                        }
                        self.push_back(Token::Int(m));
                    } else {
                        self.push_back(tok2);
                    }
                }
                Ok(PDFObject::Int(n))
            }
            Token::Real(n) => Ok(PDFObject::Real(n)),
            Token::Bool(b) => Ok(PDFObject::Bool(b)),
            Token::Name(s) => Ok(PDFObject::Name(s)),
            Token::String(s) => Ok(PDFObject::String(PDFString::from_raw(s))),
            Token::Keyword(kw) => match kw {
                Keyword::Null => Ok(PDFObject::Null),
                Keyword::ArrayStart => self.parse_array(),
                Keyword::DictStart => self.parse_dict(),
                // A value slot filled by a closing keyword: the generator
                // omitted the value. Substitute Null and leave the keyword
                // for the caller.
                Keyword::EndObj | Keyword::EndStream => {
                    self.push_back(Token::Keyword(kw));
                    Ok(PDFObject::Null)
                }
                other => Err(PdfError::TokenError {
                    pos: self.base.tell(),
                    msg: format!(
                        "unexpected keyword: {}",
                        String::from_utf8_lossy(other.as_bytes())
                    ),
                }),
            },
        }
    }

    /// Parse array contents until `]`.
    fn parse_array(&mut self) -> Result<PDFObject> {
        let mut arr = Vec::new();
        loop {
            let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token == Token::Keyword(Keyword::ArrayEnd) {
                break;
            }
            arr.push(self.token_to_object(token)?);
        }
        Ok(PDFObject::Array(arr))
    }

    /// Parse dict contents until `>>`.
    fn parse_dict(&mut self) -> Result<PDFObject> {
        let mut dict = Dict::new();
        loop {
            let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token == Token::Keyword(Keyword::DictEnd) {
                break;
            }

            let key = match token {
                Token::Name(name) => name,
                _ => {
                    return Err(PdfError::TokenError {
                        pos: self.base.tell(),
                        msg: "expected name as dict key".into(),
                    });
                }
            };

            let value = self.parse_object()?;
            dict.insert(key, value);
        }
        Ok(PDFObject::Dict(dict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirect_ref_lookahead() {
        let mut p = PDFParser::new(b"12 0 R");
        assert_eq!(
            p.parse_object().unwrap(),
            PDFObject::Ref(PDFObjRef::new(12, 0))
        );
    }

    #[test]
    fn two_ints_are_not_a_ref() {
        let mut p = PDFParser::new(b"12 0 obj");
        assert_eq!(p.parse_object().unwrap(), PDFObject::Int(12));
        assert_eq!(p.parse_object().unwrap(), PDFObject::Int(0));
    }

    #[test]
    fn implicit_null_before_endobj() {
        let mut p = PDFParser::new(b"endobj");
        assert_eq!(p.parse_object().unwrap(), PDFObject::Null);
        // the endobj keyword is still available
        assert_eq!(
            p.next_token().unwrap(),
            Some(Token::Keyword(Keyword::EndObj))
        );
    }
}
