//! Walks a `Schema` against a live `Value` tree, writing its bytes to an
//! output stream. Mirrors [`super::decoder::Decoder`]; slice/array length is
//! always taken from the in-memory record, never from a `length`/`size`
//! program — those only drive decoding (see `Length-prefix independence`).

use std::io::Write;

use super::tree::{extend_path, get_mut};
use super::CodecConfig;
use crate::byteorder::{self, Endian};
use crate::do_if_err::DoIfErr;
use crate::engine::value::PathSeg;
use crate::engine::{Runner, StackValue};
use crate::error::{bail, ctx, ensure, CodecError, Result};
use crate::schema::{Kind, Schema, Type, Types};
use crate::value::Value;

/// Encodes a live record into a byte stream, per a `Schema`. Once a call
/// fails the encoder is left `broken`, mirroring `Decoder`'s poisoning on
/// the first error rather than risking a half-written stream being added to.
pub struct Encoder<W> {
    writer: W,
    endian: Endian,
    runner: Runner,
    scratch: Vec<u8>,
    slice_accel_threshold: usize,
    broken: bool,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W, config: CodecConfig) -> Self {
        Encoder {
            writer,
            endian: config.endian,
            runner: config.runner,
            scratch: Vec::new(),
            slice_accel_threshold: config.slice_accel_threshold,
            broken: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Encode `record` per `schema`, writing to the stream. `record` is
    /// mutated in place because field programs (`pre_write`/`post_write`)
    /// may write through `root`/`current` the same way they do on decode.
    pub fn encode(&mut self, schema: &Schema, record: &mut Value) -> Result<()> {
        ensure!(!self.broken, runtime, "encoder is broken from a previous error");
        let align = schema.root.kind.basic_size().max(1) as u8;
        self.encode_value(&schema.root, record, &[], align, self.endian).do_if_err(|| self.broken = true)
    }

    fn encode_value(&mut self, ty: &Type, root: &mut Value, at: &[PathSeg], align: u8, endian: Endian) -> Result<()> {
        match ty.kind {
            Kind::Bool => {
                let v = get_mut(root, at)?.clone();
                let b = match v {
                    Value::Bool(b) => b,
                    _ => bail!(schema, "expected a bool value"),
                };
                write_padded(&mut self.writer, endian, align, |w, e| e.write_bool(w, b))?;
            }
            Kind::Int8 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_i8(w, expect_i8(v)?))?,
            Kind::Int16 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_i16(w, expect_i16(v)?))?,
            Kind::Int32 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_i32(w, expect_i32(v)?))?,
            Kind::Int64 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_i64(w, expect_i64(v)?))?,
            Kind::Uint8 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_u8(w, expect_u8(v)?))?,
            Kind::Uint16 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_u16(w, expect_u16(v)?))?,
            Kind::Uint32 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_u32(w, expect_u32(v)?))?,
            Kind::Uint64 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_u64(w, expect_u64(v)?))?,
            Kind::Float32 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_f32(w, expect_f32(v)?))?,
            Kind::Float64 => self.encode_basic(root, at, align, endian, |w, e, v| e.write_f64(w, expect_f64(v)?))?,
            Kind::UVarint => {
                let n = expect_u64(get_mut(root, at)?.clone())?;
                byteorder::write_uvarint(&mut self.writer, n, endian)?;
            }
            Kind::Varint => {
                let n = expect_i64(get_mut(root, at)?.clone())?;
                byteorder::write_varint(&mut self.writer, n, endian)?;
            }
            Kind::String => {
                let s = match get_mut(root, at)? {
                    Value::Str(s) => s.clone(),
                    _ => bail!(schema, "expected a string value"),
                };
                self.writer.write_all(s.as_bytes())?;
            }
            Kind::Array | Kind::Slice => {
                let elem = ty.elem().expect("array/slice has elem");
                let len = match get_mut(root, at)? {
                    Value::Seq(items) => items.len(),
                    _ => bail!(schema, "expected a sequence value"),
                };
                if elem.kind.is_basic() && len > self.slice_accel_threshold {
                    self.encode_seq_bulk(elem, len, root, at, endian)?;
                } else {
                    let elem_align = elem.kind.basic_size().max(1) as u8;
                    for i in 0..len {
                        let elem_path = extend_path(at, PathSeg::Index(i));
                        ctx!(self.encode_value(elem, root, &elem_path, elem_align, endian), crate::error::PathElem::Index(i))?;
                    }
                }
            }
            Kind::Struct => {
                let current_path = at.to_vec();
                for field in ty.fields() {
                    if field.is_hole() {
                        continue;
                    }
                    log::trace!("encoding field {:?}", field.name);
                    let (field_idx, mut eff_type) = {
                        let idx = match get_mut(root, at)? {
                            Value::Struct(fields) => fields.iter().position(|(n, _)| n == &field.name).ok_or_else(|| {
                                CodecError::schema_invariant(format!("record is missing field {:?}", field.name))
                            })?,
                            _ => bail!(schema, "expected a struct value"),
                        };
                        (idx, field.rtype.clone())
                    };
                    if let Some(prog) = &field.programs.r#type {
                        log::debug!("running type program for field {:?}", field.name);
                        let result = prog.exec(root, &current_path, 0, &self.runner).map_err(|e| e.with_context(crate::error::PathElem::Program("type")))?;
                        let name = stringify(result);
                        eff_type = Types::get(&name).ok_or_else(|| CodecError::type_resolution(name))?;
                    }
                    if let Some(prog) = &field.programs.pre_write {
                        log::debug!("running pre_write program for field {:?}", field.name);
                        prog.exec(root, &current_path, 0, &self.runner).map_err(|e| e.with_context(crate::error::PathElem::Program("pre_write")))?;
                    }
                    if !field.skip_write() {
                        let field_endian = field.custom_endian().unwrap_or(endian);
                        let field_path = extend_path(at, PathSeg::Field(field_idx));
                        ctx!(self.encode_value(&eff_type, root, &field_path, field.align, field_endian), crate::error::PathElem::Field(field.name.clone()))?;
                    }
                    if let Some(prog) = &field.programs.post_write {
                        log::debug!("running post_write program for field {:?}", field.name);
                        prog.exec(root, &current_path, 0, &self.runner).map_err(|e| e.with_context(crate::error::PathElem::Program("post_write")))?;
                    }
                }
            }
            Kind::Invalid => bail!(unsupported, "cannot encode a field left at kind Invalid with no resolved type"),
        }
        Ok(())
    }

    fn encode_basic(&mut self, root: &mut Value, at: &[PathSeg], align: u8, endian: Endian, write: impl Fn(&mut W, Endian, Value) -> Result<()>) -> Result<()> {
        let v = get_mut(root, at)?.clone();
        let basic = value_basic_size(&v);
        write(&mut self.writer, endian, v)?;
        let pad = align as usize - basic;
        if pad > 0 {
            self.writer.write_all(&[0u8; 64][..pad])?;
        }
        Ok(())
    }

    fn encode_seq_bulk(&mut self, elem: &Type, len: usize, root: &mut Value, at: &[PathSeg], endian: Endian) -> Result<()> {
        log::debug!("bulk-encoding {len} elements of {:?}", elem.kind);
        let size = elem.kind.basic_size();
        self.scratch.clear();
        self.scratch.reserve(len * size);
        let items = match get_mut(root, at)? {
            Value::Seq(items) => items,
            _ => bail!(schema, "expected a sequence value"),
        };
        for v in items.iter() {
            encode_host_endian_scalar(v, &mut self.scratch)?;
        }
        if endian != Endian::HOST {
            byteorder::reverse_buf(&mut self.scratch, size);
        }
        self.writer.write_all(&self.scratch)?;
        Ok(())
    }
}

fn stringify(v: StackValue) -> String {
    match v {
        StackValue::Str(s) => s,
        StackValue::Int(n) => n.to_string(),
        StackValue::Float(n) => n.to_string(),
        StackValue::Bool(b) => b.to_string(),
        StackValue::Ref(_) => String::new(),
    }
}

fn write_padded<W: Write>(w: &mut W, endian: Endian, align: u8, write: impl Fn(&mut W, Endian) -> Result<()>) -> Result<()> {
    write(w, endian)?;
    let pad = align as usize - 1;
    if pad > 0 {
        w.write_all(&[0u8; 64][..pad])?;
    }
    Ok(())
}

fn value_basic_size(v: &Value) -> usize {
    match v {
        Value::Bool(_) | Value::I8(_) | Value::U8(_) => 1,
        Value::I16(_) | Value::U16(_) => 2,
        Value::I32(_) | Value::U32(_) | Value::F32(_) => 4,
        Value::I64(_) | Value::U64(_) | Value::F64(_) => 8,
        _ => 0,
    }
}

fn encode_host_endian_scalar(v: &Value, out: &mut Vec<u8>) -> Result<()> {
    match v {
        Value::Bool(b) => out.push(*b as u8),
        Value::I8(n) => out.push(*n as u8),
        Value::U8(n) => out.push(*n),
        Value::I16(n) => out.extend_from_slice(&n.to_ne_bytes()),
        Value::U16(n) => out.extend_from_slice(&n.to_ne_bytes()),
        Value::I32(n) => out.extend_from_slice(&n.to_ne_bytes()),
        Value::U32(n) => out.extend_from_slice(&n.to_ne_bytes()),
        Value::F32(n) => out.extend_from_slice(&n.to_ne_bytes()),
        Value::I64(n) => out.extend_from_slice(&n.to_ne_bytes()),
        Value::U64(n) => out.extend_from_slice(&n.to_ne_bytes()),
        Value::F64(n) => out.extend_from_slice(&n.to_ne_bytes()),
        _ => bail!(schema, "bulk path is only used for basic kinds"),
    }
    Ok(())
}

fn expect_i8(v: Value) -> Result<i8> {
    match v {
        Value::I8(n) => Ok(n),
        _ => bail!(schema, "expected an Int8 value"),
    }
}
fn expect_i16(v: Value) -> Result<i16> {
    match v {
        Value::I16(n) => Ok(n),
        _ => bail!(schema, "expected an Int16 value"),
    }
}
fn expect_i32(v: Value) -> Result<i32> {
    match v {
        Value::I32(n) => Ok(n),
        _ => bail!(schema, "expected an Int32 value"),
    }
}
fn expect_i64(v: Value) -> Result<i64> {
    match v {
        Value::I64(n) => Ok(n),
        _ => bail!(schema, "expected an Int64 value"),
    }
}
fn expect_u8(v: Value) -> Result<u8> {
    match v {
        Value::U8(n) => Ok(n),
        _ => bail!(schema, "expected a Uint8 value"),
    }
}
fn expect_u16(v: Value) -> Result<u16> {
    match v {
        Value::U16(n) => Ok(n),
        _ => bail!(schema, "expected a Uint16 value"),
    }
}
fn expect_u32(v: Value) -> Result<u32> {
    match v {
        Value::U32(n) => Ok(n),
        _ => bail!(schema, "expected a Uint32 value"),
    }
}
fn expect_u64(v: Value) -> Result<u64> {
    match v {
        Value::U64(n) => Ok(n),
        _ => bail!(schema, "expected a Uint64 value"),
    }
}
fn expect_f32(v: Value) -> Result<f32> {
    match v {
        Value::F32(n) => Ok(n),
        _ => bail!(schema, "expected a Float32 value"),
    }
}
fn expect_f64(v: Value) -> Result<f64> {
    match v {
        Value::F64(n) => Ok(n),
        _ => bail!(schema, "expected a Float64 value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, SliceMode};

    #[test]
    fn encodes_small_fixed_struct() {
        let schema = Schema::new(
            Type::struct_(vec![
                Field::new("a", Type::basic(Kind::Uint32)).unwrap(),
                Field::new("b", Type::basic(Kind::Uint16)).unwrap(),
            ])
            .unwrap(),
        );
        let mut record = Value::Struct(vec![("a".to_string(), Value::U32(0x01020304)), ("b".to_string(), Value::U16(5))]);
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf, CodecConfig::default().with_endian(Endian::Big));
        enc.encode(&schema, &mut record).unwrap();
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04, 0x00, 0x05]);
    }

    #[test]
    fn slice_length_ignores_length_program_on_encode() {
        let elem = Type::basic(Kind::Uint8);
        let prog = crate::engine::Program::compile("999", None, None).unwrap();
        let slice_ty = Type::slice(SliceMode::Len, elem, Some(prog)).unwrap();
        let schema = Schema::new(slice_ty);
        let mut record = Value::Seq(vec![Value::U8(1), Value::U8(2), Value::U8(3)]);
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf, CodecConfig::default());
        enc.encode(&schema, &mut record).unwrap();
        assert_eq!(buf, vec![1, 2, 3]);
    }
}
