//! Lowers a parsed [`Expr`] into [`Instr`]s.
//!
//! The one thing worth spending compile time on is `.field`/`[i]` chains
//! rooted at `root` or `current`: because the schema is known up front, a
//! chain like `root.header.length` can be resolved to a fixed struct
//! position (`Instr::Field(idx)`) instead of a runtime name lookup. Any
//! chain whose base isn't staticaly traceable back to `root`/`current`
//! (for instance, indexing through a call result) falls back to
//! `Instr::FieldByName`, which walks the live record's struct vector by
//! name instead.

use super::ast::Expr;
use super::bytecode::{ConstValue, Instr};
use crate::error::{bail, Result};
use crate::schema::Type;

pub struct Compiled {
    pub instrs: Vec<Instr>,
    pub consts: Vec<ConstValue>,
}

/// Compile `expr` against the struct types of the `root` and `current`
/// registers this program will run with. Either may be absent for programs
/// that never reference that register (e.g. a top-level `type` program
/// always has a `root`, but a bare `pre_read` on a scalar field may not need
/// `current`'s shape resolved).
pub fn compile(expr: &Expr, root_ty: Option<&Type>, current_ty: Option<&Type>) -> Result<Compiled> {
    let mut c = Compiler { instrs: Vec::new(), consts: Vec::new(), root_ty: root_ty.cloned(), current_ty: current_ty.cloned() };
    c.compile_expr(expr)?;
    Ok(Compiled { instrs: c.instrs, consts: c.consts })
}

struct Compiler {
    instrs: Vec<Instr>,
    consts: Vec<ConstValue>,
    root_ty: Option<Type>,
    current_ty: Option<Type>,
}

impl Compiler {
    fn push_const(&mut self, c: ConstValue) {
        let idx = self.consts.len();
        self.consts.push(c);
        self.instrs.push(Instr::PushConst(idx));
    }

    /// If `expr`'s value is statically known to be a particular struct type
    /// (because it's `root`, `current`, or a `.field` chain off one of
    /// those), return that type so the caller can resolve the next
    /// `.field` step to a positional index.
    fn static_type(&self, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::Root => self.root_ty.clone(),
            Expr::Current => self.current_ty.clone(),
            Expr::Field(base, name) => {
                let base_ty = self.static_type(base)?;
                if base_ty.kind != crate::schema::Kind::Struct {
                    return None;
                }
                let (_, field) = base_ty.field_by_name(name)?;
                Some(field.rtype.clone())
            }
            _ => None,
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Int(n) => self.push_const(ConstValue::Int(*n)),
            Expr::Float(n) => self.push_const(ConstValue::Float(*n)),
            Expr::Str(s) => self.push_const(ConstValue::Str(s.clone())),
            Expr::Bool(b) => self.push_const(ConstValue::Bool(*b)),
            Expr::Root => self.instrs.push(Instr::PushRoot),
            Expr::Current => self.instrs.push(Instr::PushCurrent),
            Expr::K => self.instrs.push(Instr::PushK),
            Expr::Ident(name) => bail!(compile, "bare identifier {name:?} is not a known register or function call"),
            Expr::Unary(op, rhs) => {
                self.compile_expr(rhs)?;
                self.instrs.push(Instr::UnOp(*op));
            }
            Expr::Binary(op, lhs, rhs) => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.instrs.push(Instr::BinOp(*op));
            }
            Expr::Assign(lhs, rhs) => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.instrs.push(Instr::Assign);
            }
            Expr::Ternary(cond, then, els) => {
                self.compile_expr(cond)?;
                let jf = self.emit_placeholder_jump_if_false();
                self.compile_expr(then)?;
                let j = self.emit_placeholder_jump();
                self.patch_jump_if_false(jf);
                self.compile_expr(els)?;
                self.patch_jump(j);
            }
            Expr::If(cond, then, els) => {
                self.compile_expr(cond)?;
                let jf = self.emit_placeholder_jump_if_false();
                self.compile_expr(then)?;
                match els {
                    Some(els) => {
                        let j = self.emit_placeholder_jump();
                        self.patch_jump_if_false(jf);
                        self.compile_expr(els)?;
                        self.patch_jump(j);
                    }
                    None => {
                        // no-else `if` still must leave a value on the
                        // stack for both branches; the taken branch's
                        // value is discarded and a unit-ish 0 substituted
                        // when the condition is false.
                        let j = self.emit_placeholder_jump();
                        self.patch_jump_if_false(jf);
                        self.push_const(ConstValue::Int(0));
                        self.patch_jump(j);
                    }
                }
            }
            Expr::Field(base, name) => {
                if let Some(base_ty) = self.static_type(base) {
                    if let Some(idx) = base_ty.value_index_by_name(name) {
                        self.compile_expr(base)?;
                        self.instrs.push(Instr::Field(idx));
                        return Ok(());
                    }
                }
                self.compile_expr(base)?;
                self.instrs.push(Instr::FieldByName(name.clone()));
            }
            Expr::Index(base, idx) => {
                self.compile_expr(base)?;
                self.compile_expr(idx)?;
                self.instrs.push(Instr::Index);
            }
            Expr::Call(callee, args) => {
                let name = match callee.as_ref() {
                    Expr::Ident(name) => name.clone(),
                    _ => bail!(compile, "call target must be a plain function name"),
                };
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.instrs.push(Instr::Call(name, args.len()));
            }
            Expr::Seq(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    self.compile_expr(e)?;
                    if i + 1 != exprs.len() {
                        self.instrs.push(Instr::Pop);
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_placeholder_jump_if_false(&mut self) -> usize {
        self.instrs.push(Instr::JumpIfFalse(usize::MAX));
        self.instrs.len() - 1
    }

    fn emit_placeholder_jump(&mut self) -> usize {
        self.instrs.push(Instr::Jump(usize::MAX));
        self.instrs.len() - 1
    }

    fn patch_jump_if_false(&mut self, at: usize) {
        let target = self.instrs.len();
        if let Instr::JumpIfFalse(t) = &mut self.instrs[at] {
            *t = target;
        }
    }

    fn patch_jump(&mut self, at: usize) {
        let target = self.instrs.len();
        if let Instr::Jump(t) = &mut self.instrs[at] {
            *t = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::parse;
    use crate::schema::{Field, Kind, Type};

    #[test]
    fn resolves_root_field_chain_statically() {
        let root_ty = Type::struct_(vec![Field::new("len", Type::basic(Kind::Uint32)).unwrap()]).unwrap();
        let expr = parse("root.len").unwrap();
        let compiled = compile(&expr, Some(&root_ty), None).unwrap();
        assert!(matches!(compiled.instrs[1], Instr::Field(0)));
    }

    #[test]
    fn unresolvable_field_falls_back_to_dynamic() {
        let expr = parse("current.mystery").unwrap();
        let compiled = compile(&expr, None, None).unwrap();
        assert!(matches!(compiled.instrs.last().unwrap(), Instr::FieldByName(name) if name == "mystery"));
    }

    #[test]
    fn ternary_compiles_with_two_jumps() {
        let expr = parse("k > 0 ? 1 : -1").unwrap();
        let compiled = compile(&expr, None, None).unwrap();
        assert!(compiled.instrs.iter().any(|i| matches!(i, Instr::JumpIfFalse(_))));
        assert!(compiled.instrs.iter().any(|i| matches!(i, Instr::Jump(_))));
    }
}
