//! Recursive-descent, precedence-climbing parser over the token stream
//! produced by [`super::lexer`].

use super::ast::{BinOp, Expr, UnOp};
use super::lexer::{lex, Tok};
use crate::error::{bail, Result};

pub fn parse(src: &str) -> Result<Expr> {
    let toks = lex(src)?;
    let mut p = Parser { toks, pos: 0 };
    let expr = p.parse_seq()?;
    p.expect(&Tok::Eof)?;
    Ok(expr)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn advance(&mut self) -> Tok {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: &Tok) -> bool {
        if self.peek() == t {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: &Tok) -> Result<()> {
        if self.eat(t) {
            Ok(())
        } else {
            bail!(compile, "expected {t:?}, found {:?}", self.peek());
        }
    }

    /// `expr (';' expr)*` — a program body is a `;`-separated sequence,
    /// evaluating to its last expression.
    fn parse_seq(&mut self) -> Result<Expr> {
        let mut exprs = vec![self.parse_assign()?];
        while self.eat(&Tok::Semi) {
            if matches!(self.peek(), Tok::Eof | Tok::RBrace) {
                break;
            }
            exprs.push(self.parse_assign()?);
        }
        if exprs.len() == 1 {
            Ok(exprs.pop().unwrap())
        } else {
            Ok(Expr::Seq(exprs))
        }
    }

    /// Right-associative `lvalue = expr`.
    fn parse_assign(&mut self) -> Result<Expr> {
        let lhs = self.parse_ternary()?;
        if self.eat(&Tok::Eq) {
            let rhs = self.parse_assign()?;
            Ok(Expr::Assign(Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    /// `cond ? a : b`, and the `if (cond) a else b` statement form.
    fn parse_ternary(&mut self) -> Result<Expr> {
        if self.eat(&Tok::If) {
            self.expect(&Tok::LParen)?;
            let cond = self.parse_assign()?;
            self.expect(&Tok::RParen)?;
            let then = self.parse_block_or_expr()?;
            let els = if self.eat(&Tok::Else) {
                Some(Box::new(self.parse_block_or_expr()?))
            } else {
                None
            };
            return Ok(Expr::If(Box::new(cond), Box::new(then), els));
        }
        let cond = self.parse_or()?;
        if self.eat(&Tok::Question) {
            let then = self.parse_assign()?;
            self.expect(&Tok::Colon)?;
            let els = self.parse_assign()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(els)))
        } else {
            Ok(cond)
        }
    }

    fn parse_block_or_expr(&mut self) -> Result<Expr> {
        if self.eat(&Tok::LBrace) {
            let body = self.parse_seq()?;
            self.expect(&Tok::RBrace)?;
            Ok(body)
        } else {
            self.parse_assign()
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Tok::PipePipe) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitor()?;
        while self.eat(&Tok::AmpAmp) {
            let rhs = self.parse_bitor()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat(&Tok::Pipe) {
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary(BinOp::BOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitand()?;
        while self.eat(&Tok::Caret) {
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary(BinOp::BXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_eq()?;
        while self.eat(&Tok::Amp) {
            let rhs = self.parse_eq()?;
            lhs = Expr::Binary(BinOp::BAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_eq(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_rel()?;
        loop {
            let op = match self.peek() {
                Tok::EqEq => BinOp::Eq,
                Tok::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_rel()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                Tok::Lt => BinOp::Lt,
                Tok::Le => BinOp::Le,
                Tok::Gt => BinOp::Gt,
                Tok::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Tok::Shl => BinOp::Shl,
                Tok::Shr => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_add()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Tok::Minus => Some(UnOp::Neg),
            Tok::Bang => Some(UnOp::Not),
            Tok::Tilde => Some(UnOp::BNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.parse_unary()?;
            Ok(Expr::Unary(op, Box::new(rhs)))
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Tok::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Tok::Ident(s) => s,
                        other => bail!(compile, "expected field name after '.', found {other:?}"),
                    };
                    expr = Expr::Field(Box::new(expr), name);
                }
                Tok::LBracket => {
                    self.advance();
                    let idx = self.parse_assign()?;
                    self.expect(&Tok::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(idx));
                }
                Tok::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != &Tok::RParen {
                        args.push(self.parse_assign()?);
                        while self.eat(&Tok::Comma) {
                            args.push(self.parse_assign()?);
                        }
                    }
                    self.expect(&Tok::RParen)?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Tok::Int(n) => Ok(Expr::Int(n)),
            Tok::Float(n) => Ok(Expr::Float(n)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::True => Ok(Expr::Bool(true)),
            Tok::False => Ok(Expr::Bool(false)),
            Tok::Ident(s) => match s.as_str() {
                "root" => Ok(Expr::Root),
                "current" => Ok(Expr::Current),
                "k" => Ok(Expr::K),
                _ => Ok(Expr::Ident(s)),
            },
            Tok::LParen => {
                let inner = self.parse_assign()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            other => bail!(compile, "unexpected token {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_chain_on_root() {
        let e = parse("root.header.len").unwrap();
        match e {
            Expr::Field(inner, name) => {
                assert_eq!(name, "len");
                match *inner {
                    Expr::Field(inner2, name2) => {
                        assert_eq!(name2, "header");
                        assert!(matches!(*inner2, Expr::Root));
                    }
                    _ => panic!("expected nested field"),
                }
            }
            _ => panic!("expected field expr"),
        }
    }

    #[test]
    fn parses_index_and_call() {
        let e = parse("current[k] + f(1, 2)").unwrap();
        assert!(matches!(e, Expr::Binary(BinOp::Add, ..)));
    }

    #[test]
    fn respects_precedence() {
        let e = parse("1 + 2 * 3").unwrap();
        match e {
            Expr::Binary(BinOp::Add, lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Int(1)));
                assert!(matches!(*rhs, Expr::Binary(BinOp::Mul, ..)));
            }
            _ => panic!("expected add at top level"),
        }
    }

    #[test]
    fn parses_ternary_and_assign() {
        let e = parse("current.x = a > 0 ? 1 : -1").unwrap();
        assert!(matches!(e, Expr::Assign(..)));
    }

    #[test]
    fn parses_if_else_statement() {
        let e = parse("if (root.flag) { 1 } else { 2 }").unwrap();
        assert!(matches!(e, Expr::If(_, _, Some(_))));
    }
}
