//! VM operand representation.
//!
//! A `current`/`root` aliasing problem falls out of this engine's design:
//! a program can read through one record while writing through the other,
//! and both point into the same live [`crate::value::Value`] tree. Modeling
//! `current` as a second `&mut` borrow would need `unsafe` to alias it with
//! `root`. Instead both registers are *paths from the root* — descriptions
//! of where to go, resolved against `root` fresh on every dereference — so
//! the VM never holds two live borrows at once.

use crate::error::{bail, CodecError, Result};
use crate::value::Value;

/// One step of a path from the root record down to some nested value.
#[derive(Debug, Clone)]
pub enum PathSeg {
    Field(usize),
    Index(usize),
}

/// Which register a [`RefPath`] is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefBase {
    Root,
    Current,
}

/// A lazily-resolved reference into the live record: a base register plus a
/// chain of field/index steps. Cheap to copy around the stack; resolved
/// against the actual tree only when read or written.
#[derive(Debug, Clone)]
pub struct RefPath {
    pub base: RefBase,
    pub path: Vec<PathSeg>,
}

impl RefPath {
    pub fn root() -> Self {
        RefPath { base: RefBase::Root, path: Vec::new() }
    }

    pub fn current() -> Self {
        RefPath { base: RefBase::Current, path: Vec::new() }
    }

    pub fn field(&self, idx: usize) -> Self {
        let mut p = self.clone();
        p.path.push(PathSeg::Field(idx));
        p
    }

    pub fn index(&self, idx: usize) -> Self {
        let mut p = self.clone();
        p.path.push(PathSeg::Index(idx));
        p
    }

    /// The full chain of steps from `root` down to this reference: `current`
    /// is itself just a path from `root` (`current_path`), so a reference
    /// anchored on `current` is resolved by walking `current_path` first and
    /// this ref's own `path` after.
    fn full_path<'a>(&'a self, current_path: &'a [PathSeg]) -> Box<dyn Iterator<Item = &'a PathSeg> + 'a> {
        match self.base {
            RefBase::Root => Box::new(self.path.iter()),
            RefBase::Current => Box::new(current_path.iter().chain(self.path.iter())),
        }
    }

    fn resolve<'a>(&self, root: &'a Value, current_path: &[PathSeg]) -> Result<&'a Value> {
        let mut v = root;
        for seg in self.full_path(current_path) {
            v = match (seg, v) {
                (PathSeg::Field(i), Value::Struct(fields)) => fields
                    .get(*i)
                    .map(|(_, v)| v)
                    .ok_or_else(|| CodecError::program_runtime(format!("field index {i} out of range")))?,
                (PathSeg::Index(i), Value::Seq(items)) => items
                    .get(*i)
                    .ok_or_else(|| CodecError::program_runtime(format!("index {i} out of range")))?,
                _ => bail!(runtime, "path segment does not match value shape"),
            };
        }
        Ok(v)
    }

    fn resolve_mut<'a>(&self, root: &'a mut Value, current_path: &[PathSeg]) -> Result<&'a mut Value> {
        let mut v = root;
        for seg in self.full_path(current_path) {
            v = match (seg, v) {
                (PathSeg::Field(i), Value::Struct(fields)) => fields
                    .get_mut(*i)
                    .map(|(_, v)| v)
                    .ok_or_else(|| CodecError::program_runtime(format!("field index {i} out of range")))?,
                (PathSeg::Index(i), Value::Seq(items)) => items
                    .get_mut(*i)
                    .ok_or_else(|| CodecError::program_runtime(format!("index {i} out of range")))?,
                _ => bail!(runtime, "path segment does not match value shape"),
            };
        }
        Ok(v)
    }

    /// Read the scalar this path addresses, converting to a [`StackValue`].
    pub fn load(&self, root: &Value, current_path: &[PathSeg]) -> Result<StackValue> {
        StackValue::from_value(self.resolve(root, current_path)?)
    }

    /// Read the raw `Value` this path addresses, without requiring it to be
    /// a scalar. Used to inspect a struct's field names for `FieldByName`.
    pub fn load_struct<'a>(&self, root: &'a Value, current_path: &[PathSeg]) -> Result<&'a Value> {
        self.resolve(root, current_path)
    }

    /// Write a scalar through this path into the live record.
    pub fn store(&self, root: &mut Value, current_path: &[PathSeg], v: StackValue) -> Result<()> {
        let slot = self.resolve_mut(root, current_path)?;
        v.write_into(slot)
    }
}

/// Values the VM's operand stack holds: either a scalar produced by
/// evaluating an expression, or a not-yet-dereferenced reference produced by
/// `root`, `current`, `.field`, or `[index]`.
#[derive(Debug, Clone)]
pub enum StackValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Ref(RefPath),
}

impl StackValue {
    pub fn from_value(v: &Value) -> Result<Self> {
        Ok(match v {
            Value::Bool(b) => StackValue::Bool(*b),
            Value::I8(n) => StackValue::Int(*n as i64),
            Value::I16(n) => StackValue::Int(*n as i64),
            Value::I32(n) => StackValue::Int(*n as i64),
            Value::I64(n) => StackValue::Int(*n),
            Value::U8(n) => StackValue::Int(*n as i64),
            Value::U16(n) => StackValue::Int(*n as i64),
            Value::U32(n) => StackValue::Int(*n as i64),
            Value::U64(n) => StackValue::Int(*n as i64),
            Value::F32(n) => StackValue::Float(*n as f64),
            Value::F64(n) => StackValue::Float(*n),
            Value::Str(s) => StackValue::Str(s.clone()),
            _ => bail!(runtime, "value of this shape cannot be loaded onto the program stack"),
        })
    }

    /// Write this stack value into an existing live-record slot, coercing
    /// to the slot's current scalar kind.
    pub fn write_into(self, slot: &mut Value) -> Result<()> {
        match (slot, self) {
            (Value::Bool(s), StackValue::Bool(b)) => *s = b,
            (Value::I8(s), StackValue::Int(n)) => *s = n as i8,
            (Value::I16(s), StackValue::Int(n)) => *s = n as i16,
            (Value::I32(s), StackValue::Int(n)) => *s = n as i32,
            (Value::I64(s), StackValue::Int(n)) => *s = n,
            (Value::U8(s), StackValue::Int(n)) => *s = n as u8,
            (Value::U16(s), StackValue::Int(n)) => *s = n as u16,
            (Value::U32(s), StackValue::Int(n)) => *s = n as u32,
            (Value::U64(s), StackValue::Int(n)) => *s = n as u64,
            (Value::F32(s), StackValue::Float(n)) => *s = n as f32,
            (Value::F64(s), StackValue::Float(n)) => *s = n,
            (Value::Str(s), StackValue::Str(n)) => *s = n,
            _ => bail!(runtime, "cannot assign this value into the target field's kind"),
        }
        Ok(())
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            StackValue::Int(n) => Ok(*n),
            StackValue::Bool(b) => Ok(*b as i64),
            StackValue::Float(f) => Ok(*f as i64),
            _ => bail!(runtime, "expected a number, found {self:?}"),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            StackValue::Float(f) => Ok(*f),
            StackValue::Int(n) => Ok(*n as f64),
            _ => bail!(runtime, "expected a number, found {self:?}"),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            StackValue::Bool(b) => Ok(*b),
            StackValue::Int(n) => Ok(*n != 0),
            _ => bail!(runtime, "expected a bool, found {self:?}"),
        }
    }

    /// True if both operands are floats or either is a float — binary
    /// arithmetic promotes to float in that case, otherwise stays integer.
    pub fn is_float_op(a: &StackValue, b: &StackValue) -> bool {
        matches!(a, StackValue::Float(_)) || matches!(b, StackValue::Float(_))
    }
}
