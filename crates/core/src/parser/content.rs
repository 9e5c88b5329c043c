//! Content-stream parser.
//!
//! A content stream is a sequence of operations: operands followed by an
//! operator. Inline images (`BI ... ID <raw bytes> EI`) need a raw byte
//! scan because the image data can contain byte pairs that look like
//! operators; the `EI` terminator only counts when bordered by whitespace.

use crate::error::Result;
use crate::model::objects::{Dict, PDFObject, PDFString};
use crate::parser::lexer::{Keyword, Lexer, Token};
use crate::parser::parser::PDFParser;

/// One content-stream operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// The operator bytes (e.g., "BT", "Tf", "Do")
    pub operator: Vec<u8>,
    /// Operands preceding the operator
    pub operands: Vec<PDFObject>,
}

/// Parses a content stream into a sequence of operations.
pub struct PDFContentParser;

impl PDFContentParser {
    /// Parse a content stream into operations.
    pub fn parse(data: &[u8]) -> Result<Vec<Operation>> {
        let mut lexer = Lexer::new(data);
        let mut ops = Vec::new();
        let mut operands: Vec<PDFObject> = Vec::new();
        let mut context_stack: Vec<Vec<PDFObject>> = Vec::new();

        while let Some(result) = lexer.next_token() {
            let (_, token) = result?;

            match token {
                Token::Keyword(Keyword::ArrayStart) => {
                    context_stack.push(std::mem::take(&mut operands));
                }
                Token::Keyword(Keyword::ArrayEnd) => {
                    let array_contents = std::mem::take(&mut operands);
                    operands = context_stack.pop().unwrap_or_default();
                    operands.push(PDFObject::Array(array_contents));
                }
                Token::Keyword(Keyword::DictStart) => {
                    context_stack.push(std::mem::take(&mut operands));
                }
                Token::Keyword(Keyword::DictEnd) => {
                    let dict_contents = std::mem::take(&mut operands);
                    operands = context_stack.pop().unwrap_or_default();
                    operands.push(PDFObject::Dict(pairs_to_dict(dict_contents)));
                }
                Token::Keyword(Keyword::Other(ref kw)) if kw == b"BI" => {
                    let (params, image_data) = Self::parse_inline_image(&mut lexer)?;
                    ops.push(Operation {
                        operator: b"BI".to_vec(),
                        operands: vec![PDFObject::Dict(params)],
                    });
                    ops.push(Operation {
                        operator: b"EI".to_vec(),
                        operands: vec![PDFObject::String(PDFString::Bytes(image_data))],
                    });
                }
                Token::Keyword(kw) => {
                    ops.push(Operation {
                        operator: kw.as_bytes().to_vec(),
                        operands: std::mem::take(&mut operands),
                    });
                }
                other => operands.push(token_to_operand(other)),
            }
        }

        Ok(ops)
    }

    /// Parse the parameter dict after `BI`, then pull the raw data between
    /// `ID` and a whitespace-bordered `EI`.
    fn parse_inline_image(lexer: &mut Lexer<'_>) -> Result<(Dict, Vec<u8>)> {
        // Parameter values can be arrays or dicts, so hand this stretch to
        // the object parser.
        let mut params = Dict::new();
        let mut parser = PDFParser::new(lexer.data());
        parser.set_pos(lexer.tell());
        loop {
            match parser.next_token()? {
                Some(Token::Keyword(Keyword::Other(ref kw))) if kw == b"ID" => break,
                Some(Token::Name(key)) => {
                    let value = parser.parse_object()?;
                    params.insert(key, value);
                }
                Some(_) => continue, // stray operand in the parameter list
                None => break,
            }
        }
        lexer.set_pos(parser.tell());

        // One whitespace byte separates ID from the data.
        let data = lexer.data();
        let mut start = lexer.tell();
        if start < data.len() && Lexer::is_whitespace(data[start]) {
            start += 1;
        }

        let (image_data, end) = scan_inline_data(data, start);
        lexer.set_pos(end);
        Ok((params, image_data))
    }
}

/// Scan for the `EI` terminator. Binary image data can contain the bytes
/// `EI`, so a match only counts when preceded by whitespace (or at the data
/// start) and followed by whitespace, a delimiter, or end of input.
fn scan_inline_data(data: &[u8], start: usize) -> (Vec<u8>, usize) {
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == b'E' && data[i + 1] == b'I' {
            let before_ok = i == start || Lexer::is_whitespace(data[i - 1]);
            let after_ok = i + 2 >= data.len()
                || Lexer::is_whitespace(data[i + 2])
                || Lexer::is_delimiter(data[i + 2]);
            if before_ok && after_ok {
                let mut end = i;
                // the whitespace before EI belongs to the terminator
                if end > start && Lexer::is_whitespace(data[end - 1]) {
                    end -= 1;
                }
                return (data[start..end].to_vec(), i + 2);
            }
        }
        i += 1;
    }
    // No terminator: treat the rest as image data.
    (data[start..].to_vec(), data.len())
}

fn pairs_to_dict(items: Vec<PDFObject>) -> Dict {
    let mut dict = Dict::new();
    let mut iter = items.into_iter();
    while let Some(key) = iter.next() {
        if let PDFObject::Name(name) = key {
            if let Some(value) = iter.next() {
                dict.insert(name, value);
            }
        }
    }
    dict
}

fn token_to_operand(token: Token) -> PDFObject {
    match token {
        Token::Int(n) => PDFObject::Int(n),
        Token::Real(n) => PDFObject::Real(n),
        Token::Bool(b) => PDFObject::Bool(b),
        Token::Name(s) => PDFObject::Name(s),
        Token::String(s) => PDFObject::String(PDFString::from_raw(s)),
        Token::Keyword(Keyword::Null) => PDFObject::Null,
        // Stray structural keywords in operand position degrade to Null.
        Token::Keyword(_) => PDFObject::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_group_operands() {
        let ops = PDFContentParser::parse(b"BT /F1 12 Tf (Hi) Tj ET").unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[1].operator, b"Tf");
        assert_eq!(ops[1].operands.len(), 2);
        assert_eq!(ops[2].operator, b"Tj");
    }

    #[test]
    fn inline_image_with_embedded_ei_bytes() {
        // "xEIx" inside the data must not terminate the scan.
        let mut stream = b"BI /W 2 /H 2 ID ".to_vec();
        stream.extend_from_slice(b"xEIx\x00\xff");
        stream.extend_from_slice(b" EI Q");
        let ops = PDFContentParser::parse(&stream).unwrap();
        assert_eq!(ops[0].operator, b"BI");
        assert_eq!(ops[1].operator, b"EI");
        let data = ops[1].operands[0].as_string().unwrap().to_raw();
        assert_eq!(data, b"xEIx\x00\xff");
        assert_eq!(ops[2].operator, b"Q");
    }
}
