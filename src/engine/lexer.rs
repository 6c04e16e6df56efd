//! Tokenizer for the field-program expression language.

use crate::error::{bail, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    If,
    Else,
    // punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Amp,
    Pipe,
    Caret,
    AmpAmp,
    PipePipe,
    Bang,
    Tilde,
    Eq,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Question,
    Colon,
    Semi,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eof,
}

pub fn lex(src: &str) -> Result<Vec<Tok>> {
    let bytes = src.as_bytes();
    let mut i = 0;
    let mut out = Vec::new();

    macro_rules! two {
        ($c2:expr, $two:expr, $one:expr) => {{
            if i + 1 < bytes.len() && bytes[i + 1] == $c2 {
                i += 2;
                out.push($two);
            } else {
                i += 1;
                out.push($one);
            }
        }};
    }

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '+' => {
                i += 1;
                out.push(Tok::Plus);
            }
            '-' => {
                i += 1;
                out.push(Tok::Minus);
            }
            '*' => {
                i += 1;
                out.push(Tok::Star);
            }
            '/' => {
                i += 1;
                out.push(Tok::Slash);
            }
            '%' => {
                i += 1;
                out.push(Tok::Percent);
            }
            '~' => {
                i += 1;
                out.push(Tok::Tilde);
            }
            '?' => {
                i += 1;
                out.push(Tok::Question);
            }
            ':' => {
                i += 1;
                out.push(Tok::Colon);
            }
            ';' => {
                i += 1;
                out.push(Tok::Semi);
            }
            ',' => {
                i += 1;
                out.push(Tok::Comma);
            }
            '.' => {
                i += 1;
                out.push(Tok::Dot);
            }
            '(' => {
                i += 1;
                out.push(Tok::LParen);
            }
            ')' => {
                i += 1;
                out.push(Tok::RParen);
            }
            '[' => {
                i += 1;
                out.push(Tok::LBracket);
            }
            ']' => {
                i += 1;
                out.push(Tok::RBracket);
            }
            '{' => {
                i += 1;
                out.push(Tok::LBrace);
            }
            '}' => {
                i += 1;
                out.push(Tok::RBrace);
            }
            '^' => {
                i += 1;
                out.push(Tok::Caret);
            }
            '<' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'<' {
                    i += 2;
                    out.push(Tok::Shl);
                } else {
                    two!(b'=', Tok::Le, Tok::Lt);
                }
            }
            '>' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'>' {
                    i += 2;
                    out.push(Tok::Shr);
                } else {
                    two!(b'=', Tok::Ge, Tok::Gt);
                }
            }
            '=' => two!(b'=', Tok::EqEq, Tok::Eq),
            '!' => two!(b'=', Tok::Ne, Tok::Bang),
            '&' => two!(b'&', Tok::AmpAmp, Tok::Amp),
            '|' => two!(b'|', Tok::PipePipe, Tok::Pipe),
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i] as char != quote {
                    i += 1;
                }
                if i >= bytes.len() {
                    bail!(compile, "unterminated string literal");
                }
                out.push(Tok::Str(src[start..i].to_string()));
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut is_float = false;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_ascii_digit() {
                        i += 1;
                    } else if c == '.' && !is_float {
                        is_float = true;
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text = &src[start..i];
                if is_float {
                    out.push(Tok::Float(text.parse().map_err(|_| {
                        crate::error::CodecError::program_compile(format!("bad float literal {text:?}"))
                    })?));
                } else {
                    out.push(Tok::Int(text.parse().map_err(|_| {
                        crate::error::CodecError::program_compile(format!("bad int literal {text:?}"))
                    })?));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_ascii_alphanumeric() || c == '_' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text = &src[start..i];
                out.push(match text {
                    "true" => Tok::True,
                    "false" => Tok::False,
                    "if" => Tok::If,
                    "else" => Tok::Else,
                    _ => Tok::Ident(text.to_string()),
                });
            }
            _ => bail!(compile, "unexpected character {c:?}"),
        }
    }
    out.push(Tok::Eof);
    Ok(out)
}
