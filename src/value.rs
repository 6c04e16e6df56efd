//! The live record: an in-memory tree shaped by a [`crate::schema::Schema`],
//! read and written by the decoder, encoder, and field programs alike.
//!
//! This stands in for host-language reflection into a real struct. Nothing
//! here knows about any particular Rust type; a `Schema` describes the shape
//! and a `Value` tree holds the data, the same way the wire format does.

use crate::schema::Kind;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    /// `Array`/`Slice` elements, in order.
    Seq(Vec<Value>),
    /// `Struct` fields, in declaration order. Holes (empty field names, see
    /// [`crate::schema::Field::is_hole`]) are omitted — this vec only ever
    /// holds named fields, one per non-hole schema field, same order.
    Struct(Vec<(String, Value)>),
}

impl Value {
    /// A zero/empty value matching `kind`, used to seed a freshly-decoded
    /// scalar slot before a read fills it in.
    pub fn default_for(kind: Kind) -> Value {
        match kind {
            Kind::Bool => Value::Bool(false),
            Kind::Int8 => Value::I8(0),
            Kind::Int16 => Value::I16(0),
            Kind::Int32 | Kind::Varint => Value::I32(0),
            Kind::Int64 => Value::I64(0),
            Kind::Uint8 => Value::U8(0),
            Kind::Uint16 => Value::U16(0),
            Kind::Uint32 | Kind::UVarint => Value::U32(0),
            Kind::Uint64 => Value::U64(0),
            Kind::Float32 => Value::F32(0.0),
            Kind::Float64 => Value::F64(0.0),
            Kind::String => Value::Str(String::new()),
            Kind::Array | Kind::Slice => Value::Seq(Vec::new()),
            Kind::Struct => Value::Struct(Vec::new()),
            Kind::Invalid => Value::Bool(false),
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_seq_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Seq(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut Vec<(String, Value)>> {
        match self {
            Value::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_struct()?.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}
