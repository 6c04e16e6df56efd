//! Stack machine executing a compiled [`super::Program`] against a live
//! [`crate::value::Value`] tree.

use super::ast::{BinOp, UnOp};
use super::bytecode::{ConstValue, Instr};
use super::env::Runner;
use super::value::{PathSeg, RefPath, StackValue};
use crate::error::{bail, Result};
use crate::value::Value;

/// Run `instrs`/`consts` against `root`. `current_path` locates the
/// innermost enclosing struct as a path from `root` — `current` is never a
/// second borrow into the tree, only a description of where to find it, so
/// `root.x = current.y` is an ordinary single-tree mutation rather than an
/// aliasing problem. `k` is the slice/array index variable, meaningless but
/// harmlessly present outside a sequence program.
pub fn exec(
    instrs: &[Instr],
    consts: &[ConstValue],
    root: &mut Value,
    current_path: &[PathSeg],
    k: i64,
    runner: &Runner,
) -> Result<StackValue> {
    let mut stack: Vec<StackValue> = Vec::new();
    let mut pc = 0usize;

    while pc < instrs.len() {
        match &instrs[pc] {
            Instr::PushConst(idx) => stack.push(match &consts[*idx] {
                ConstValue::Int(n) => StackValue::Int(*n),
                ConstValue::Float(n) => StackValue::Float(*n),
                ConstValue::Str(s) => StackValue::Str(s.clone()),
                ConstValue::Bool(b) => StackValue::Bool(*b),
            }),
            Instr::PushRoot => stack.push(StackValue::Ref(RefPath::root())),
            Instr::PushCurrent => stack.push(StackValue::Ref(RefPath::current())),
            Instr::PushK => stack.push(StackValue::Int(k)),
            Instr::Field(idx) => {
                let base = pop(&mut stack)?;
                stack.push(StackValue::Ref(as_ref(base)?.field(*idx)));
            }
            Instr::FieldByName(name) => {
                let base = pop(&mut stack)?;
                let path = as_ref(base)?;
                let v = path.load_struct(root, current_path)?;
                let idx = v
                    .as_struct()
                    .and_then(|fields| fields.iter().position(|(n, _)| n == name))
                    .ok_or_else(|| crate::error::CodecError::program_runtime(format!("no field named {name:?}")))?;
                stack.push(StackValue::Ref(path.field(idx)));
            }
            Instr::Index => {
                let idx = pop(&mut stack)?;
                let idx = deref(root, current_path, idx)?.as_i64()? as usize;
                let base = pop(&mut stack)?;
                stack.push(StackValue::Ref(as_ref(base)?.index(idx)));
            }
            Instr::UnOp(op) => {
                let v = pop(&mut stack)?;
                let v = deref(root, current_path, v)?;
                stack.push(eval_unop(*op, v)?);
            }
            Instr::BinOp(op) => {
                let rhs = pop(&mut stack)?;
                let lhs = pop(&mut stack)?;
                let rhs = deref(root, current_path, rhs)?;
                let lhs = deref(root, current_path, lhs)?;
                stack.push(eval_binop(*op, lhs, rhs)?);
            }
            Instr::Assign => {
                let rhs = pop(&mut stack)?;
                let rhs = deref(root, current_path, rhs)?;
                let lhs = pop(&mut stack)?;
                let path = as_ref(lhs)?;
                path.store(root, current_path, rhs.clone())?;
                stack.push(rhs);
            }
            Instr::Pop => {
                pop(&mut stack)?;
            }
            Instr::Dup => {
                let top = stack.last().ok_or_else(stack_underflow)?.clone();
                stack.push(top);
            }
            Instr::JumpIfFalse(target) => {
                let cond = pop(&mut stack)?;
                let cond = deref(root, current_path, cond)?;
                if !cond.as_bool()? {
                    pc = *target;
                    continue;
                }
            }
            Instr::Jump(target) => {
                pc = *target;
                continue;
            }
            Instr::Call(name, argc) => {
                let mut args = Vec::with_capacity(*argc);
                for _ in 0..*argc {
                    let v = pop(&mut stack)?;
                    args.push(deref(root, current_path, v)?);
                }
                args.reverse();
                stack.push(runner.call(name, &args)?);
            }
        }
        pc += 1;
    }

    let result = pop(&mut stack)?;
    deref(root, current_path, result)
}

fn pop(stack: &mut Vec<StackValue>) -> Result<StackValue> {
    stack.pop().ok_or_else(stack_underflow)
}

fn stack_underflow() -> crate::error::CodecError {
    crate::error::CodecError::program_runtime("operand stack underflow")
}

fn as_ref(v: StackValue) -> Result<RefPath> {
    match v {
        StackValue::Ref(p) => Ok(p),
        _ => bail!(runtime, "expected an addressable reference (root/current/.field/[index]), found a scalar"),
    }
}

fn deref(root: &Value, current_path: &[PathSeg], v: StackValue) -> Result<StackValue> {
    match v {
        StackValue::Ref(p) => p.load(root, current_path),
        other => Ok(other),
    }
}

fn eval_unop(op: UnOp, v: StackValue) -> Result<StackValue> {
    Ok(match op {
        UnOp::Neg => match v {
            StackValue::Int(n) => StackValue::Int(-n),
            StackValue::Float(n) => StackValue::Float(-n),
            _ => bail!(runtime, "unary - requires a number"),
        },
        UnOp::Not => StackValue::Bool(!v.as_bool()?),
        UnOp::BNot => StackValue::Int(!v.as_i64()?),
    })
}

fn eval_binop(op: BinOp, lhs: StackValue, rhs: StackValue) -> Result<StackValue> {
    use BinOp::*;
    Ok(match op {
        Add if matches!((&lhs, &rhs), (StackValue::Str(_), StackValue::Str(_))) => {
            let (a, b) = match (lhs, rhs) {
                (StackValue::Str(a), StackValue::Str(b)) => (a, b),
                _ => unreachable!(),
            };
            StackValue::Str(a + &b)
        }
        Add | Sub | Mul | Div | Mod => {
            if StackValue::is_float_op(&lhs, &rhs) {
                let a = lhs.as_f64()?;
                let b = rhs.as_f64()?;
                StackValue::Float(match op {
                    Add => a + b,
                    Sub => a - b,
                    Mul => a * b,
                    Div => a / b,
                    Mod => a % b,
                    _ => unreachable!(),
                })
            } else {
                let a = lhs.as_i64()?;
                let b = rhs.as_i64()?;
                StackValue::Int(match op {
                    Add => a.wrapping_add(b),
                    Sub => a.wrapping_sub(b),
                    Mul => a.wrapping_mul(b),
                    Div => {
                        if b == 0 {
                            bail!(runtime, "division by zero");
                        }
                        a.wrapping_div(b)
                    }
                    Mod => {
                        if b == 0 {
                            bail!(runtime, "division by zero");
                        }
                        a.wrapping_rem(b)
                    }
                    _ => unreachable!(),
                })
            }
        }
        Shl => StackValue::Int(lhs.as_i64()?.wrapping_shl(rhs.as_i64()? as u32)),
        Shr => StackValue::Int(lhs.as_i64()?.wrapping_shr(rhs.as_i64()? as u32)),
        BAnd => StackValue::Int(lhs.as_i64()? & rhs.as_i64()?),
        BOr => StackValue::Int(lhs.as_i64()? | rhs.as_i64()?),
        BXor => StackValue::Int(lhs.as_i64()? ^ rhs.as_i64()?),
        And => StackValue::Bool(lhs.as_bool()? && rhs.as_bool()?),
        Or => StackValue::Bool(lhs.as_bool()? || rhs.as_bool()?),
        Eq => StackValue::Bool(values_eq(&lhs, &rhs)?),
        Ne => StackValue::Bool(!values_eq(&lhs, &rhs)?),
        Lt => StackValue::Bool(lhs.as_f64()? < rhs.as_f64()?),
        Le => StackValue::Bool(lhs.as_f64()? <= rhs.as_f64()?),
        Gt => StackValue::Bool(lhs.as_f64()? > rhs.as_f64()?),
        Ge => StackValue::Bool(lhs.as_f64()? >= rhs.as_f64()?),
    })
}

fn values_eq(lhs: &StackValue, rhs: &StackValue) -> Result<bool> {
    Ok(match (lhs, rhs) {
        (StackValue::Str(a), StackValue::Str(b)) => a == b,
        (StackValue::Bool(a), StackValue::Bool(b)) => a == b,
        _ => lhs.as_f64()? == rhs.as_f64()?,
    })
}
