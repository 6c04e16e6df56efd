//! A schema-driven binary (de)serializer with an embedded field-program
//! expression engine: a `Schema` describes a record's wire layout, field
//! "programs" written in a small expression language compute dynamic
//! lengths/types/derived values, and a `Decoder`/`Encoder` pair walks the
//! schema against a byte stream.

pub mod byteorder;
pub mod codec;
pub mod do_if_err;
pub mod engine;
pub mod error;
pub mod schema;
pub mod value;

pub use codec::{Decoder, Encoder};
pub use error::{CodecError, Result};
pub use schema::{Field, Kind, Schema, SliceMode, Type};
pub use value::Value;

/// Largest alignment a `Field` may request.
pub const MAX_ALIGN: usize = 64;

/// Minimum element count a basic-kind slice must reach before the bulk
/// fast path (scratch-buffer read/write plus grouped byte reversal) is
/// used instead of one VM-mediated element at a time.
pub const SLICE_ACCEL_THRESHOLD: usize = 4;

/// Initial capacity reserved for a growing `Eof`-mode slice, so the common
/// case doesn't reallocate on every element.
pub const SLICE_INIT_LEN: usize = 256;
