//! The decoder/encoder state machines that walk a [`crate::schema::Schema`]
//! against a byte stream, consulting the [`crate::engine`] for field
//! programs along the way.

pub mod decoder;
pub mod encoder;
mod tree;

pub use decoder::Decoder;
pub use encoder::Encoder;

use crate::byteorder::Endian;
use crate::engine::Runner;

/// Construction knobs for a [`Decoder`]/[`Encoder`], grouped the way the
/// teacher groups coder construction parameters rather than threading each
/// one through every call site.
#[derive(Clone)]
pub struct CodecConfig {
    pub endian: Endian,
    pub runner: Runner,
    /// Minimum element count before a basic-kind slice/array switches from
    /// one-element-at-a-time VM-mediated decoding to a bulk buffered read.
    pub slice_accel_threshold: usize,
    /// Initial capacity reserved when growing an `Eof`-mode slice.
    pub slice_init_len: usize,
    /// Upper bound a field's `align` may request. Checked again here (on
    /// top of the one-time check in `Field::with_align`) so a `CodecConfig`
    /// built with a tighter legacy limit than `crate::MAX_ALIGN` still
    /// rejects fields that exceed it.
    pub max_align: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            endian: Endian::HOST,
            runner: Runner::with_builtins(),
            slice_accel_threshold: crate::SLICE_ACCEL_THRESHOLD,
            slice_init_len: crate::SLICE_INIT_LEN,
            max_align: crate::MAX_ALIGN,
        }
    }
}

impl CodecConfig {
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_runner(mut self, runner: Runner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_slice_accel_threshold(mut self, n: usize) -> Self {
        self.slice_accel_threshold = n;
        self
    }

    pub fn with_slice_init_len(mut self, n: usize) -> Self {
        self.slice_init_len = n;
        self
    }
}
