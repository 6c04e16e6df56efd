//! The field-program expression engine: lexer, parser, AST, bytecode
//! compiler, and stack VM that together evaluate the five program hooks a
//! schema [`crate::schema::Field`] may carry (`type`, `pre_read`,
//! `post_read`, `pre_write`, `post_write`).

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod env;
pub mod lexer;
pub mod parser;
pub mod value;
pub mod vm;

use std::sync::Arc;

pub use env::Runner;
pub use value::StackValue;

use bytecode::{ConstValue, Instr};
use crate::error::Result;
use crate::schema::Type;
use crate::value::Value;
pub use value::PathSeg;

/// A compiled field program. Cheap to clone — the instruction and constant
/// tables are `Arc`-shared, the same posture as [`crate::schema::Schema`].
#[derive(Clone)]
pub struct Program {
    source: Arc<str>,
    instrs: Arc<[Instr]>,
    consts: Arc<[ConstValue]>,
}

impl Program {
    /// Parse and compile `source` against the struct shapes of `root` and
    /// `current` (whichever are known at schema-construction time), so that
    /// `.field` chains rooted at either register resolve to positional
    /// indices wherever possible.
    pub fn compile(source: &str, root_ty: Option<&Type>, current_ty: Option<&Type>) -> Result<Program> {
        let ast = parser::parse(source)?;
        let compiled = compiler::compile(&ast, root_ty, current_ty)?;
        Ok(Program {
            source: Arc::from(source),
            instrs: Arc::from(compiled.instrs),
            consts: Arc::from(compiled.consts),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run the program against `root`, with `current_path` locating the
    /// innermost enclosing struct inside it and `k` the slice-index
    /// variable, returning the value the program evaluates to.
    pub fn exec(&self, root: &mut Value, current_path: &[PathSeg], k: i64, runner: &Runner) -> Result<StackValue> {
        vm::exec(&self.instrs, &self.consts, root, current_path, k, runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Kind, Type};

    #[test]
    fn compiles_and_runs_arithmetic() {
        let prog = Program::compile("1 + 2 * 3", None, None).unwrap();
        let mut root = Value::Struct(vec![]);
        let runner = Runner::with_builtins();
        let out = prog.exec(&mut root, &[], 0, &runner).unwrap();
        assert_eq!(out.as_i64().unwrap(), 7);
    }

    #[test]
    fn reads_and_writes_current_field() {
        let current_ty = Type::struct_(vec![Field::new("n", Type::basic(Kind::Int32)).unwrap()]).unwrap();
        let prog = Program::compile("current.n = current.n + 1", None, Some(&current_ty)).unwrap();
        // `current` is the root itself here, so current_path is empty.
        let mut root = Value::Struct(vec![("n".to_string(), Value::I32(41))]);
        let runner = Runner::new();
        let out = prog.exec(&mut root, &[], 0, &runner).unwrap();
        assert_eq!(out.as_i64().unwrap(), 42);
        assert_eq!(root.field("n"), Some(&Value::I32(42)));
    }

    #[test]
    fn ternary_picks_branch() {
        let prog = Program::compile("k > 0 ? 10 : -10", None, None).unwrap();
        let runner = Runner::new();
        let mut root = Value::Struct(vec![]);
        assert_eq!(prog.exec(&mut root, &[], 5, &runner).unwrap().as_i64().unwrap(), 10);
        assert_eq!(prog.exec(&mut root, &[], -5, &runner).unwrap().as_i64().unwrap(), -10);
    }

    #[test]
    fn calls_registered_function() {
        let prog = Program::compile("max(3, k)", None, None).unwrap();
        let runner = Runner::with_builtins();
        let mut root = Value::Struct(vec![]);
        assert_eq!(prog.exec(&mut root, &[], 9, &runner).unwrap().as_i64().unwrap(), 9);
    }
}
