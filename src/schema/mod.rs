//! Immutable tree of `Type`/`Field` nodes describing a record's binary
//! layout, plus the process-wide `Types` registry.

mod types_registry;

pub use types_registry::Types;

use std::sync::Arc;

use crate::engine::Program;
use crate::error::{ensure, Result};

/// Closed enumeration of the kinds a `Type` node can take.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Kind {
    Invalid,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
    UVarint,
    Varint,
    Array,
    Slice,
    Struct,
}

impl Kind {
    /// Byte width for fixed-width primitives, 0 otherwise.
    pub fn basic_size(self) -> usize {
        match self {
            Kind::Bool | Kind::Int8 | Kind::Uint8 => 1,
            Kind::Int16 | Kind::Uint16 => 2,
            Kind::Int32 | Kind::Uint32 | Kind::Float32 => 4,
            Kind::Int64 | Kind::Uint64 | Kind::Float64 => 8,
            _ => 0,
        }
    }

    /// True for booleans, fixed-width integers, and floats.
    pub fn is_basic(self) -> bool {
        self.basic_size() > 0
    }
}

/// How a `Slice`'s (or `Array`'s) element count is determined.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SliceMode {
    /// Element count comes from evaluating `slice_extra`.
    Len,
    /// Byte span comes from evaluating `slice_extra`; for fixed-width
    /// elements this is divided down to a count, otherwise it bounds a
    /// limited sub-read.
    Size,
    /// Grow until the stream reports end-of-data (decode), or use the
    /// in-memory length (encode).
    Eof,
}

/// A node in the schema tree.
#[derive(Clone)]
pub struct Type {
    pub kind: Kind,
    inner: Option<Arc<TypeInner>>,
}

enum TypeInner {
    Seq {
        mode: SliceMode,
        elem: Type,
        extra: Option<Arc<Program>>,
        /// Static length, only meaningful for `Kind::Array`.
        len: Option<usize>,
    },
    Struct { fields: Vec<Field> },
}

impl Type {
    pub fn basic(kind: Kind) -> Self {
        debug_assert!(kind.is_basic() || matches!(kind, Kind::UVarint | Kind::Varint | Kind::Invalid));
        if kind == Kind::String {
            // String is never bare-basic: it needs Seq-shaped inner data for
            // slice_mode()/slice_extra() to work. Defaults to Eof mode, same
            // as a type program resolving to "string" via the Types registry.
            return Type::string(SliceMode::Eof, None).expect("Eof needs no slice_extra");
        }
        Type { kind, inner: None }
    }

    pub fn invalid() -> Self {
        Type { kind: Kind::Invalid, inner: None }
    }

    pub fn array(len: usize, elem: Type) -> Result<Self> {
        validate_seq_elem(&elem)?;
        Ok(Type {
            kind: Kind::Array,
            inner: Some(Arc::new(TypeInner::Seq { mode: SliceMode::Len, elem, extra: None, len: Some(len) })),
        })
    }

    /// A `String` field: decoded/encoded as raw UTF-8 bytes whose span is
    /// resolved exactly like a `Slice<Uint8>` (reusing `slice_mode`/
    /// `slice_extra`), since `String` carries no intrinsic length of its
    /// own — see the per-field `length`/`size` annotations in the external
    /// interface.
    pub fn string(mode: SliceMode, extra: Option<Program>) -> Result<Self> {
        ensure!(
            mode == SliceMode::Eof || extra.is_some(),
            schema,
            "slice_extra is required for slice_mode Len/Size on a String field"
        );
        Ok(Type {
            kind: Kind::String,
            inner: Some(Arc::new(TypeInner::Seq {
                mode,
                elem: Type::basic(Kind::Uint8),
                extra: extra.map(Arc::new),
                len: None,
            })),
        })
    }

    pub fn slice(mode: SliceMode, elem: Type, extra: Option<Program>) -> Result<Self> {
        validate_seq_elem(&elem)?;
        ensure!(
            mode == SliceMode::Eof || extra.is_some(),
            schema,
            "slice_extra is required for slice_mode Len/Size"
        );
        Ok(Type {
            kind: Kind::Slice,
            inner: Some(Arc::new(TypeInner::Seq { mode, elem, extra: extra.map(Arc::new), len: None })),
        })
    }

    pub fn struct_(fields: Vec<Field>) -> Result<Self> {
        for field in &fields {
            if field.name.is_empty() {
                continue;
            }
            ensure!(
                field.rtype.kind != Kind::Invalid || field.programs.r#type.is_some(),
                schema,
                "field {:?} has Invalid kind without a type program",
                field.name
            );
        }
        Ok(Type { kind: Kind::Struct, inner: Some(Arc::new(TypeInner::Struct { fields })) })
    }

    pub fn slice_mode(&self) -> Option<SliceMode> {
        match self.inner.as_deref() {
            Some(TypeInner::Seq { mode, .. }) => Some(*mode),
            _ => None,
        }
    }

    pub fn elem(&self) -> Option<&Type> {
        match self.inner.as_deref() {
            Some(TypeInner::Seq { elem, .. }) => Some(elem),
            _ => None,
        }
    }

    pub fn slice_extra(&self) -> Option<&Program> {
        match self.inner.as_deref() {
            Some(TypeInner::Seq { extra, .. }) => extra.as_deref(),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<usize> {
        match self.inner.as_deref() {
            Some(TypeInner::Seq { len, .. }) => *len,
            _ => None,
        }
    }

    pub fn num_fields(&self) -> usize {
        match self.inner.as_deref() {
            Some(TypeInner::Struct { fields }) => fields.len(),
            _ => 0,
        }
    }

    pub fn field_by_index(&self, i: usize) -> Option<&Field> {
        match self.inner.as_deref() {
            Some(TypeInner::Struct { fields }) => fields.get(i),
            _ => None,
        }
    }

    pub fn field_by_name(&self, name: &str) -> Option<(usize, &Field)> {
        match self.inner.as_deref() {
            Some(TypeInner::Struct { fields }) => {
                fields.iter().enumerate().find(|(_, f)| f.name == name)
            }
            _ => None,
        }
    }

    /// Position `name` would occupy in the live `Value::Struct` vector,
    /// which (unlike the schema field list) omits holes. Used by the
    /// program compiler to turn a `.field` chain into the positional index
    /// [`crate::engine::value::RefPath`] resolves at run time.
    pub fn value_index_by_name(&self, name: &str) -> Option<usize> {
        match self.inner.as_deref() {
            Some(TypeInner::Struct { fields }) => {
                let mut idx = 0;
                for f in fields {
                    if f.is_hole() {
                        continue;
                    }
                    if f.name == name {
                        return Some(idx);
                    }
                    idx += 1;
                }
                None
            }
            _ => None,
        }
    }

    pub fn fields(&self) -> &[Field] {
        match self.inner.as_deref() {
            Some(TypeInner::Struct { fields }) => fields,
            _ => &[],
        }
    }

    /// Recursive static size: basic kinds return `basic_size`, `Array`
    /// returns `elem.size * length`, `Struct` returns the sum of field
    /// sizes if every field is fixed, else 0 (meaning runtime-variable).
    pub fn size(&self) -> usize {
        match self.kind {
            Kind::Array => {
                let elem = self.elem().expect("array has elem");
                let elem_size = elem.size();
                if elem_size == 0 {
                    0
                } else {
                    elem_size * self.array_len().unwrap_or(0)
                }
            }
            Kind::Struct => {
                let mut total = 0usize;
                for field in self.fields() {
                    if field.name.is_empty() {
                        continue;
                    }
                    let s = field.rtype.size();
                    if s == 0 {
                        return 0;
                    }
                    total += field.align.max(s as u8) as usize;
                }
                total
            }
            _ => self.kind.basic_size(),
        }
    }
}

fn validate_seq_elem(elem: &Type) -> Result<()> {
    ensure!(
        !matches!(elem.kind, Kind::String | Kind::Slice),
        schema,
        "a sequence element may not itself be String or Slice; wrap it in a struct field"
    );
    Ok(())
}

/// Per-field policy bits.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct FieldFlags(u8);

impl FieldFlags {
    pub const SKIP_R: FieldFlags = FieldFlags(0b0001);
    pub const SKIP_W: FieldFlags = FieldFlags(0b0010);
    pub const CUSTOM_ENDIAN: FieldFlags = FieldFlags(0b0100);
    pub const BIG_ENDIAN: FieldFlags = FieldFlags(0b1000);

    pub fn contains(self, other: FieldFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FieldFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for FieldFlags {
    type Output = FieldFlags;
    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | rhs.0)
    }
}

/// The five named program hook slots a `Field` may carry.
#[derive(Clone, Default)]
pub struct FieldPrograms {
    pub r#type: Option<Program>,
    pub pre_read: Option<Program>,
    pub post_read: Option<Program>,
    pub pre_write: Option<Program>,
    pub post_write: Option<Program>,
}

/// A field inside a `Struct` type. An empty `name` marks a hole: the field
/// is skipped entirely (not even present in the live `Value`).
#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub rtype: Type,
    pub flags: FieldFlags,
    pub align: u8,
    pub programs: FieldPrograms,
}

impl Field {
    pub fn new(name: impl Into<String>, rtype: Type) -> Result<Self> {
        let align = rtype.kind.basic_size().max(1) as u8;
        Field::with_align(name, rtype, align)
    }

    pub fn with_align(name: impl Into<String>, rtype: Type, align: u8) -> Result<Self> {
        ensure!(
            align as usize <= crate::MAX_ALIGN,
            schema,
            "align {align} exceeds MaxAlign {}",
            crate::MAX_ALIGN
        );
        let basic = rtype.kind.basic_size();
        ensure!(
            basic == 0 || align as usize >= basic,
            schema,
            "align {align} is smaller than basic_size {basic} for kind {:?}",
            rtype.kind
        );
        Ok(Field {
            name: name.into(),
            rtype,
            flags: FieldFlags::default(),
            align,
            programs: FieldPrograms::default(),
        })
    }

    pub fn is_hole(&self) -> bool {
        self.name.is_empty()
    }

    pub fn skip_read(&self) -> bool {
        self.flags.contains(FieldFlags::SKIP_R)
    }

    pub fn skip_write(&self) -> bool {
        self.flags.contains(FieldFlags::SKIP_W)
    }

    pub fn custom_endian(&self) -> Option<crate::byteorder::Endian> {
        if self.flags.contains(FieldFlags::CUSTOM_ENDIAN) {
            Some(if self.flags.contains(FieldFlags::BIG_ENDIAN) {
                crate::byteorder::Endian::Big
            } else {
                crate::byteorder::Endian::Little
            })
        } else {
            None
        }
    }
}

/// An immutable, shareable schema: the top-level `Type` a `Decoder`/`Encoder`
/// walks. Cheap to clone (an `Arc`-backed tree).
#[derive(Clone)]
pub struct Schema {
    pub root: Type,
}

impl Schema {
    pub fn new(root: Type) -> Self {
        Schema { root }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_size_sums_aligned_fields() {
        let s = Type::struct_(vec![
            Field::new("a", Type::basic(Kind::Uint32)).unwrap(),
            Field::new("b", Type::basic(Kind::Uint16)).unwrap(),
        ])
        .unwrap();
        assert_eq!(s.size(), 6);
    }

    #[test]
    fn struct_with_variable_field_has_size_zero() {
        let inner = Type::basic(Kind::Uint8);
        let slice = Type::slice(SliceMode::Eof, inner, None).unwrap();
        let s = Type::struct_(vec![Field::new("a", slice).unwrap()]).unwrap();
        assert_eq!(s.size(), 0);
    }

    #[test]
    fn nested_slice_of_string_is_rejected() {
        let inner = Type::basic(Kind::String);
        let err = Type::slice(SliceMode::Eof, inner, None);
        assert!(err.is_err());
    }
}
