//! Navigation helpers over the live [`crate::value::Value`] tree, addressed
//! by the same [`crate::engine::value::PathSeg`] chains the VM uses for
//! `root`/`current`. Keeping the decoder/encoder on this one addressing
//! scheme means a field program's view of the tree and the codec's own
//! writes never disagree about where a value lives.

use crate::engine::value::PathSeg;
use crate::error::{bail, Result};
use crate::value::Value;

pub fn get_mut<'a>(root: &'a mut Value, at: &[PathSeg]) -> Result<&'a mut Value> {
    let mut v = root;
    for seg in at {
        v = match (seg, v) {
            (PathSeg::Field(i), Value::Struct(fields)) => {
                fields.get_mut(*i).map(|(_, v)| v).ok_or_else(|| crate::error::CodecError::schema_invariant(format!("field index {i} out of range")))?
            }
            (PathSeg::Index(i), Value::Seq(items)) => {
                items.get_mut(*i).ok_or_else(|| crate::error::CodecError::schema_invariant(format!("index {i} out of range")))?
            }
            _ => bail!(schema, "path segment does not match value shape"),
        };
    }
    Ok(v)
}

pub fn push_field(root: &mut Value, at: &[PathSeg], name: String, value: Value) -> Result<usize> {
    match get_mut(root, at)? {
        Value::Struct(fields) => {
            let idx = fields.len();
            fields.push((name, value));
            Ok(idx)
        }
        _ => bail!(schema, "expected a struct at this path"),
    }
}

pub fn push_elem(root: &mut Value, at: &[PathSeg], value: Value) -> Result<usize> {
    match get_mut(root, at)? {
        Value::Seq(items) => {
            let idx = items.len();
            items.push(value);
            Ok(idx)
        }
        _ => bail!(schema, "expected a sequence at this path"),
    }
}

pub fn pop_elem(root: &mut Value, at: &[PathSeg]) -> Result<()> {
    match get_mut(root, at)? {
        Value::Seq(items) => {
            items.pop();
            Ok(())
        }
        _ => bail!(schema, "expected a sequence at this path"),
    }
}

pub fn extend_path(at: &[PathSeg], seg: PathSeg) -> Vec<PathSeg> {
    let mut p = at.to_vec();
    p.push(seg);
    p
}
