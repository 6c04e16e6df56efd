//! Walks a `Schema` against an input stream, filling a live `Value` tree.

use std::io::Read;

use super::tree::{extend_path, get_mut, push_elem, push_field};
use super::CodecConfig;
use crate::byteorder::{self, Endian};
use crate::do_if_err::DoIfErr;
use crate::engine::value::PathSeg;
use crate::engine::{Runner, StackValue};
use crate::error::{bail, ctx, ensure, CodecError, Result};
use crate::schema::{Kind, Schema, SliceMode, Type, Types};
use crate::value::Value;

/// Decodes a byte stream into a live record, per a `Schema`. Not safe to
/// invoke concurrently on the same `Decoder`; internal scratch buffers are
/// reused across calls on one instance. Once a call fails the decoder is
/// left `broken` and refuses further use, since a partially consumed
/// stream has no well-defined resume point.
pub struct Decoder<R> {
    reader: R,
    endian: Endian,
    runner: Runner,
    scratch: Vec<u8>,
    slice_accel_threshold: usize,
    slice_init_len: usize,
    broken: bool,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R, config: CodecConfig) -> Self {
        Decoder {
            reader,
            endian: config.endian,
            runner: config.runner,
            scratch: Vec::new(),
            slice_accel_threshold: config.slice_accel_threshold,
            slice_init_len: config.slice_init_len,
            broken: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Decode `schema` from the stream, returning the filled record.
    pub fn decode(&mut self, schema: &Schema) -> Result<Value> {
        ensure!(!self.broken, runtime, "decoder is broken from a previous error");
        let mut root = Value::default_for(schema.root.kind);
        let align = schema.root.kind.basic_size().max(1) as u8;
        self.decode_value(&schema.root, &mut root, &[], &[], align, self.endian).do_if_err(|| self.broken = true)?;
        Ok(root)
    }

    /// `at` is this node's own position, used to address the live tree.
    /// `ctx_path` is the nearest enclosing struct's position, used to bind
    /// `current` for any program this node runs directly (a `Slice`/
    /// `String`'s `length`/`size` program) — these are the same path only
    /// when `at` itself names a struct.
    fn decode_value(&mut self, ty: &Type, root: &mut Value, at: &[PathSeg], ctx_path: &[PathSeg], align: u8, endian: Endian) -> Result<()> {
        match ty.kind {
            Kind::Bool => {
                let v = read_padded(&mut self.reader, endian, align, |r, e| e.read_bool(r).map(Value::Bool))?;
                *get_mut(root, at)? = v;
            }
            Kind::Int8 => self.decode_basic(at, root, align, endian, |r, e| e.read_i8(r).map(Value::I8))?,
            Kind::Int16 => self.decode_basic(at, root, align, endian, |r, e| e.read_i16(r).map(Value::I16))?,
            Kind::Int32 => self.decode_basic(at, root, align, endian, |r, e| e.read_i32(r).map(Value::I32))?,
            Kind::Int64 => self.decode_basic(at, root, align, endian, |r, e| e.read_i64(r).map(Value::I64))?,
            Kind::Uint8 => self.decode_basic(at, root, align, endian, |r, e| e.read_u8(r).map(Value::U8))?,
            Kind::Uint16 => self.decode_basic(at, root, align, endian, |r, e| e.read_u16(r).map(Value::U16))?,
            Kind::Uint32 => self.decode_basic(at, root, align, endian, |r, e| e.read_u32(r).map(Value::U32))?,
            Kind::Uint64 => self.decode_basic(at, root, align, endian, |r, e| e.read_u64(r).map(Value::U64))?,
            Kind::Float32 => self.decode_basic(at, root, align, endian, |r, e| e.read_f32(r).map(Value::F32))?,
            Kind::Float64 => self.decode_basic(at, root, align, endian, |r, e| e.read_f64(r).map(Value::F64))?,
            Kind::UVarint => {
                let v = byteorder::read_uvarint(&mut self.reader, endian)?;
                *get_mut(root, at)? = Value::U64(v);
            }
            Kind::Varint => {
                let v = byteorder::read_varint(&mut self.reader, endian)?;
                *get_mut(root, at)? = Value::I64(v);
            }
            Kind::String => {
                let n = self.resolve_byte_count(ty, root, ctx_path, endian)?;
                match n {
                    Count::Exact(n) => {
                        self.scratch.resize(n, 0);
                        self.reader.read_exact(&mut self.scratch)?;
                        let s = String::from_utf8(self.scratch.clone())
                            .map_err(|e| CodecError::program_runtime(format!("invalid utf-8 in String field: {e}")))?;
                        *get_mut(root, at)? = Value::Str(s);
                    }
                    Count::Eof => {
                        let mut buf = Vec::with_capacity(self.slice_init_len);
                        self.reader.read_to_end(&mut buf)?;
                        let s = String::from_utf8(buf)
                            .map_err(|e| CodecError::program_runtime(format!("invalid utf-8 in String field: {e}")))?;
                        *get_mut(root, at)? = Value::Str(s);
                    }
                }
            }
            Kind::Array => {
                let elem = ty.elem().expect("array has elem");
                let n = ty.array_len().expect("array has static len");
                self.decode_seq(elem, n, root, at, ctx_path, endian)?;
            }
            Kind::Slice => {
                let elem = ty.elem().expect("slice has elem");
                match self.resolve_byte_count(ty, root, ctx_path, endian)? {
                    Count::Exact(n_or_bytes) => {
                        let basic = elem.kind.basic_size();
                        let count = match ty.slice_mode().unwrap() {
                            SliceMode::Len => n_or_bytes,
                            SliceMode::Size if basic > 0 => n_or_bytes / basic,
                            SliceMode::Size => {
                                // non-basic element: bound the stream to
                                // `n_or_bytes` bytes and decode elementwise
                                // until that limit is exhausted.
                                let runner = self.runner.clone();
                                let mut limited = (&mut self.reader).take(n_or_bytes as u64);
                                return decode_seq_limited(&runner, elem, root, at, ctx_path, endian, &mut limited);
                            }
                            SliceMode::Eof => unreachable!("Eof handled by Count::Eof"),
                        };
                        self.decode_seq(elem, count, root, at, ctx_path, endian)?;
                    }
                    Count::Eof => {
                        self.decode_seq_growing(elem, root, at, ctx_path, endian)?;
                    }
                }
            }
            Kind::Struct => {
                let current_path = at.to_vec();
                for field in ty.fields() {
                    if field.is_hole() {
                        continue;
                    }
                    log::trace!("decoding field {:?}", field.name);
                    let mut eff_type = field.rtype.clone();
                    if let Some(prog) = &field.programs.r#type {
                        log::debug!("running type program for field {:?}", field.name);
                        let result = prog.exec(root, &current_path, 0, &self.runner).map_err(|e| e.with_context(crate::error::PathElem::Program("type")))?;
                        let name = stringify(result);
                        eff_type = Types::get(&name).ok_or_else(|| CodecError::type_resolution(name))?;
                    }
                    if let Some(prog) = &field.programs.pre_read {
                        log::debug!("running pre_read program for field {:?}", field.name);
                        prog.exec(root, &current_path, 0, &self.runner).map_err(|e| e.with_context(crate::error::PathElem::Program("pre_read")))?;
                    }
                    let field_endian = field.custom_endian().unwrap_or(endian);
                    let idx = push_field(root, at, field.name.clone(), Value::default_for(eff_type.kind))?;
                    let field_path = extend_path(at, PathSeg::Field(idx));
                    if !field.skip_read() {
                        ctx!(
                            self.decode_value(&eff_type, root, &field_path, &current_path, field.align, field_endian),
                            crate::error::PathElem::Field(field.name.clone())
                        )?;
                    }
                    if let Some(prog) = &field.programs.post_read {
                        log::debug!("running post_read program for field {:?}", field.name);
                        prog.exec(root, &current_path, 0, &self.runner).map_err(|e| e.with_context(crate::error::PathElem::Program("post_read")))?;
                    }
                }
            }
            Kind::Invalid => bail!(unsupported, "cannot decode a field left at kind Invalid with no resolved type"),
        }
        Ok(())
    }

    fn decode_basic(
        &mut self,
        at: &[PathSeg],
        root: &mut Value,
        align: u8,
        endian: Endian,
        read: impl Fn(&mut R, Endian) -> Result<Value>,
    ) -> Result<()> {
        let v = read_padded(&mut self.reader, endian, align, read)?;
        *get_mut(root, at)? = v;
        Ok(())
    }

    /// Resolve a `Slice`/`String` field's byte/element count per its
    /// `slice_mode`. `Len` yields an element count; `Size` yields a byte
    /// count (the caller divides by element size, or limits the stream, as
    /// appropriate); `Eof` yields [`Count::Eof`]. `ctx_path` binds `current`
    /// for `slice_extra` the same way it's bound for the enclosing struct's
    /// other program hooks.
    fn resolve_byte_count(&mut self, ty: &Type, root: &mut Value, ctx_path: &[PathSeg], _endian: Endian) -> Result<Count> {
        match ty.slice_mode().unwrap() {
            SliceMode::Eof => Ok(Count::Eof),
            mode @ (SliceMode::Len | SliceMode::Size) => {
                let prog = ty.slice_extra().ok_or_else(|| CodecError::schema_invariant("slice_extra missing for Len/Size slice_mode"))?;
                let result = prog.exec(root, ctx_path, 0, &self.runner).map_err(|e| e.with_context(crate::error::PathElem::Program(if mode == SliceMode::Len { "length" } else { "size" })))?;
                let n = result.as_i64()?;
                if n < 0 {
                    // Len requires a non-negative result; Size is silent on
                    // a negative result, so fall back to Eof (grow until the
                    // stream ends) instead of erroring.
                    if mode == SliceMode::Size {
                        return Ok(Count::Eof);
                    }
                    bail!(runtime, "length program returned a negative value: {n}");
                }
                Ok(Count::Exact(n as usize))
            }
        }
    }

    fn decode_seq(&mut self, elem: &Type, count: usize, root: &mut Value, at: &[PathSeg], ctx_path: &[PathSeg], endian: Endian) -> Result<()> {
        if elem.kind.is_basic() && count > self.slice_accel_threshold {
            return self.decode_seq_bulk(elem, count, root, at, endian);
        }
        let elem_align = elem.kind.basic_size().max(1) as u8;
        for i in 0..count {
            let idx = push_elem(root, at, Value::default_for(elem.kind))?;
            let elem_path = extend_path(at, PathSeg::Index(idx));
            ctx!(self.decode_value(elem, root, &elem_path, ctx_path, elem_align, endian), crate::error::PathElem::Index(i))?;
        }
        Ok(())
    }

    fn decode_seq_bulk(&mut self, elem: &Type, count: usize, root: &mut Value, at: &[PathSeg], endian: Endian) -> Result<()> {
        log::debug!("bulk-decoding {count} elements of {:?}", elem.kind);
        let size = elem.kind.basic_size();
        self.scratch.resize(count * size, 0);
        self.reader.read_exact(&mut self.scratch)?;
        if endian != Endian::HOST {
            byteorder::reverse_buf(&mut self.scratch, size);
        }
        let seq = match get_mut(root, at)? {
            Value::Seq(items) => items,
            _ => bail!(schema, "expected a sequence at this path"),
        };
        for chunk in self.scratch.chunks_exact(size) {
            let v = decode_host_endian_scalar(elem.kind, chunk);
            seq.push(v);
        }
        Ok(())
    }

    fn decode_seq_growing(&mut self, elem: &Type, root: &mut Value, at: &[PathSeg], ctx_path: &[PathSeg], endian: Endian) -> Result<()> {
        let elem_align = elem.kind.basic_size().max(1) as u8;
        let mut i = 0usize;
        loop {
            let idx = push_elem(root, at, Value::default_for(elem.kind))?;
            let elem_path = extend_path(at, PathSeg::Index(idx));
            match self.decode_value(elem, root, &elem_path, ctx_path, elem_align, endian) {
                Ok(()) => {}
                Err(e) if e.is_eof() => {
                    super::tree::pop_elem(root, at)?;
                    break;
                }
                Err(e) => return Err(e.with_context(crate::error::PathElem::Index(i))),
            }
            i += 1;
        }
        Ok(())
    }

}

fn decode_seq_limited(runner: &Runner, elem: &Type, root: &mut Value, at: &[PathSeg], ctx_path: &[PathSeg], endian: Endian, limited: &mut dyn Read) -> Result<()> {
    let elem_align = elem.kind.basic_size().max(1) as u8;
    let mut i = 0usize;
    loop {
        let idx = push_elem(root, at, Value::default_for(elem.kind))?;
        let elem_path = extend_path(at, PathSeg::Index(idx));
        match decode_value_with_reader(limited, runner, elem, root, &elem_path, ctx_path, elem_align, endian) {
            Ok(()) => {}
            Err(e) if e.is_eof() => {
                super::tree::pop_elem(root, at)?;
                break;
            }
            Err(e) => return Err(e.with_context(crate::error::PathElem::Index(i))),
        }
        i += 1;
    }
    Ok(())
}

enum Count {
    Exact(usize),
    Eof,
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

fn read_padded<R: Read>(r: &mut R, endian: Endian, align: u8, read: impl Fn(&mut R, Endian) -> Result<Value>) -> Result<Value> {
    let v = read(r, endian)?;
    let basic = value_basic_size(&v);
    let pad = align as usize - basic;
    if pad > 0 {
        let mut buf = [0u8; 64];
        r.read_exact(&mut buf[..pad])?;
    }
    Ok(v)
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

fn decode_host_endian_scalar(kind: Kind, bytes: &[u8]) -> Value {
    macro_rules! arr {
        ($t:ty) => {{
            let mut a = [0u8; std::mem::size_of::<$t>()];
            a.copy_from_slice(bytes);
            a
        }};
    }
    match kind {
        Kind::Bool => Value::Bool(bytes[0] != 0),
        Kind::Int8 => Value::I8(bytes[0] as i8),
        Kind::Uint8 => Value::U8(bytes[0]),
        Kind::Int16 => Value::I16(i16::from_ne_bytes(arr!(i16))),
        Kind::Uint16 => Value::U16(u16::from_ne_bytes(arr!(u16))),
        Kind::Int32 => Value::I32(i32::from_ne_bytes(arr!(i32))),
        Kind::Uint32 => Value::U32(u32::from_ne_bytes(arr!(u32))),
        Kind::Float32 => Value::F32(f32::from_ne_bytes(arr!(f32))),
        Kind::Int64 => Value::I64(i64::from_ne_bytes(arr!(i64))),
        Kind::Uint64 => Value::U64(u64::from_ne_bytes(arr!(u64))),
        Kind::Float64 => Value::F64(f64::from_ne_bytes(arr!(f64))),
        _ => unreachable!("bulk path is only used for basic kinds"),
    }
}

/// A standalone entry point mirroring `Decoder::decode_value`, used only to
/// decode into a `Take`-bounded reader for `Size`-mode slices of non-basic
/// elements, where the bound belongs to a throwaway wrapper rather than
/// `self.reader`.
fn decode_value_with_reader(reader: &mut dyn Read, runner: &Runner, ty: &Type, root: &mut Value, at: &[PathSeg], ctx_path: &[PathSeg], align: u8, endian: Endian) -> Result<()> {
    let mut d = Decoder { reader, endian, runner: runner.clone(), scratch: Vec::new(), slice_accel_threshold: usize::MAX, slice_init_len: 0, broken: false };
    d.decode_value(ty, root, at, ctx_path, align, endian)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Type};

    #[test]
    fn decodes_small_fixed_struct() {
        let schema = Schema::new(
            Type::struct_(vec![
                Field::new("a", Type::basic(Kind::Uint32)).unwrap(),
                Field::new("b", Type::basic(Kind::Uint16)).unwrap(),
            ])
            .unwrap(),
        );
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x00, 0x05];
        let mut dec = Decoder::new(&bytes[..], CodecConfig::default().with_endian(Endian::Big));
        let v = dec.decode(&schema).unwrap();
        assert_eq!(v.field("a"), Some(&Value::U32(0x01020304)));
        assert_eq!(v.field("b"), Some(&Value::U16(0x0005)));
    }

    #[test]
    fn decodes_eof_slice() {
        let schema = Schema::new(Type::slice(SliceMode::Eof, Type::basic(Kind::Uint8), None).unwrap());
        let bytes = [1u8, 2, 3];
        let mut dec = Decoder::new(&bytes[..], CodecConfig::default());
        let v = dec.decode(&schema).unwrap();
        assert_eq!(v.as_seq().unwrap().len(), 3);
    }

    #[test]
    fn rejects_invalid_kind_without_type_program() {
        // Constructing such a field is itself rejected by the schema layer;
        // this documents that guarantee from the decoder's perspective.
        let res = Field::new("x", Type::invalid());
        // Type::invalid has kind Invalid and basic_size 0, so Field::new
        // (which picks align from basic_size.max(1)) succeeds structurally,
        // but Type::struct_ rejects it for lacking a `type` program.
        assert!(res.is_ok());
        let err = Type::struct_(vec![res.unwrap()]);
        assert!(err.is_err());
    }
}
