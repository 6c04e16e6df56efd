//! End-to-end coverage across the byte-order, schema, engine, and codec
//! layers together: building a `Schema`, decoding bytes into a `Value`,
//! and re-encoding to get the same bytes back.

use wireschema::byteorder::Endian;
use wireschema::codec::CodecConfig;
use wireschema::engine::Program;
use wireschema::schema::{Field, Kind, Schema, SliceMode, Type};
use wireschema::value::Value;
use wireschema::{Decoder, Encoder};

fn decode(schema: &Schema, bytes: &[u8], endian: Endian) -> Value {
    let mut dec = Decoder::new(bytes, CodecConfig::default().with_endian(endian));
    dec.decode(schema).unwrap()
}

fn encode(schema: &Schema, record: &mut Value, endian: Endian) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf, CodecConfig::default().with_endian(endian));
    enc.encode(schema, record).unwrap();
    buf
}

/// Scenario 1: a small fixed-width struct, big-endian.
#[test]
fn small_fixed_struct_round_trips() {
    let schema = Schema::new(
        Type::struct_(vec![
            Field::new("a", Type::basic(Kind::Uint32)).unwrap(),
            Field::new("test1", Type::array(4, Type::basic(Kind::Uint8)).unwrap()).unwrap(),
            Field::new("b", Type::basic(Kind::Uint16)).unwrap(),
            Field::new("c", Type::basic(Kind::Uint16)).unwrap(),
            Field::new("d", Type::basic(Kind::Uint16)).unwrap(),
            Field::new("length", Type::basic(Kind::Uint32)).unwrap(),
            Field::new("test2", Type::array(4, Type::basic(Kind::Uint8)).unwrap()).unwrap(),
        ])
        .unwrap(),
    );
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0x01020304u32.to_be_bytes());
    bytes.extend_from_slice(&[5, 1, 2, 3]);
    bytes.extend_from_slice(&0x0401u16.to_be_bytes());
    bytes.extend_from_slice(&0x0201u16.to_be_bytes());
    bytes.extend_from_slice(&0x0102u16.to_be_bytes());
    bytes.extend_from_slice(&0x01020304u32.to_be_bytes());
    bytes.extend_from_slice(&[1, 2, 3, 4]);
    assert_eq!(bytes.len(), 22);

    let mut record = decode(&schema, &bytes, Endian::Big);
    assert_eq!(record.field("a"), Some(&Value::U32(0x01020304)));
    assert_eq!(record.field("b"), Some(&Value::U16(0x0401)));

    let re_encoded = encode(&schema, &mut record, Endian::Big);
    assert_eq!(re_encoded, bytes);
}

/// Scenario 2: a length program reading a sibling field.
#[test]
fn length_program_reads_sibling_field() {
    let drray_ty = Type::array(4, Type::basic(Kind::Uint8)).unwrap();
    let array_elem = Type::basic(Kind::Uint8);

    // A draft struct shape, used only so the length program's `.Drray[0]`
    // chain resolves to a positional index at compile time.
    let draft = Type::struct_(vec![
        Field::new("drray", drray_ty.clone()).unwrap(),
        Field::new("array", Type::slice(SliceMode::Eof, array_elem.clone(), None).unwrap()).unwrap(),
    ])
    .unwrap();

    let length_prog = Program::compile("current.drray[0] / 3", None, Some(&draft)).unwrap();
    let array_ty = Type::slice(SliceMode::Len, array_elem, Some(length_prog)).unwrap();

    let schema = Schema::new(
        Type::struct_(vec![
            Field::new("drray", drray_ty).unwrap(),
            Field::new("array", array_ty).unwrap(),
        ])
        .unwrap(),
    );

    let bytes = [6u8, 1, 2, 3, b'A', b'B'];
    let record = decode(&schema, &bytes, Endian::Little);
    let array = record.field("array").unwrap().as_seq().unwrap();
    assert_eq!(array, &[Value::U8(b'A'), Value::U8(b'B')]);
}

/// Scenario 3: a `size` program gives a byte span, divided down to an
/// element count for a basic-kind slice element.
#[test]
fn size_program_gives_byte_span() {
    let size_prog = Program::compile("4 + 2", None, None).unwrap();
    let brray_ty = Type::slice(SliceMode::Size, Type::basic(Kind::Uint16), Some(size_prog)).unwrap();
    let schema = Schema::new(Type::struct_(vec![Field::new("brray", brray_ty).unwrap()]).unwrap());

    let bytes: Vec<u8> = (1..=3u16).flat_map(|n| n.to_be_bytes()).collect();
    let mut record = decode(&schema, &bytes, Endian::Big);
    let brray = record.field("brray").unwrap().as_seq().unwrap();
    assert_eq!(brray, &[Value::U16(1), Value::U16(2), Value::U16(3)]);

    let re_encoded = encode(&schema, &mut record, Endian::Big);
    assert_eq!(re_encoded, bytes);
}

/// Scenario: a `size` program returning a negative byte count falls back to
/// `Eof` behavior instead of erroring (authoritative for `Size`, unlike
/// `Len` which hard-errors on a negative result).
#[test]
fn negative_size_falls_back_to_eof() {
    let size_prog = Program::compile("0 - 1", None, None).unwrap();
    let schema = Schema::new(Type::slice(SliceMode::Size, Type::basic(Kind::Uint8), Some(size_prog)).unwrap());
    let bytes = [9u8, 8, 7];
    let record = decode(&schema, &bytes, Endian::Little);
    assert_eq!(record.as_seq().unwrap(), &[Value::U8(9), Value::U8(8), Value::U8(7)]);
}

/// Scenario: `EOF`-mode slice consumes to the end of the stream.
#[test]
fn eof_slice_consumes_remaining_bytes() {
    let schema = Schema::new(Type::slice(SliceMode::Eof, Type::basic(Kind::Uint8), None).unwrap());
    let bytes = [10u8, 20, 30, 40];
    let mut record = decode(&schema, &bytes, Endian::Little);
    assert_eq!(record.as_seq().unwrap().len(), 4);

    let re_encoded = encode(&schema, &mut record, Endian::Little);
    assert_eq!(re_encoded, bytes);
}

/// Scenario: a `type` program resolves `Invalid` to a concrete kind via the
/// `Types` registry.
#[test]
fn type_program_resolves_invalid_field() {
    let mut field = Field::with_align("payload", Type::invalid(), 4).unwrap();
    field.programs.r#type = Some(Program::compile("'uint32'", None, None).unwrap());
    let schema = Schema::new(Type::struct_(vec![field]).unwrap());

    let bytes = 42u32.to_le_bytes();
    let record = decode(&schema, &bytes, Endian::Little);
    assert_eq!(record.field("payload"), Some(&Value::U32(42)));
}

/// Scenario: `post_read` mutates an earlier-decoded sibling field.
#[test]
fn post_read_mutates_sibling_field() {
    let mut doubled = Field::new("doubled", Type::basic(Kind::Uint32)).unwrap();
    doubled.programs.post_read = Some(Program::compile("current.raw = current.raw * 2", None, Some(&preview_struct())).unwrap());
    // The field being mutated must exist under the same name the program
    // resolves statically, so build the real struct with matching shape.
    let schema = Schema::new(
        Type::struct_(vec![Field::new("raw", Type::basic(Kind::Uint32)).unwrap(), doubled]).unwrap(),
    );

    let bytes = [5u8, 0, 0, 0, 0, 0, 0, 0];
    let record = decode(&schema, &bytes, Endian::Little);
    assert_eq!(record.field("raw"), Some(&Value::U32(10)));
}

fn preview_struct() -> Type {
    Type::struct_(vec![
        Field::new("raw", Type::basic(Kind::Uint32)).unwrap(),
        Field::new("doubled", Type::basic(Kind::Uint32)).unwrap(),
    ])
    .unwrap()
}

/// Scenario: a field with `CustomEndian`/`BigEndian` overrides the codec's
/// ambient endianness for just that field.
#[test]
fn custom_endian_overrides_ambient_endian() {
    let mut be_field = Field::new("be_value", Type::basic(Kind::Uint16)).unwrap();
    be_field.flags.insert(wireschema::schema::FieldFlags::CUSTOM_ENDIAN);
    be_field.flags.insert(wireschema::schema::FieldFlags::BIG_ENDIAN);
    let schema = Schema::new(
        Type::struct_(vec![
            Field::new("le_value", Type::basic(Kind::Uint16)).unwrap(),
            be_field,
        ])
        .unwrap(),
    );

    // le_value=1 little-endian, be_value=1 big-endian.
    let bytes = [1u8, 0, 0, 1];
    let record = decode(&schema, &bytes, Endian::Little);
    assert_eq!(record.field("le_value"), Some(&Value::U16(1)));
    assert_eq!(record.field("be_value"), Some(&Value::U16(1)));
}

/// Invariant: length/size programs never influence encoding; only the
/// in-memory element count does.
#[test]
fn encoding_ignores_length_program() {
    let prog = Program::compile("999", None, None).unwrap();
    let slice_ty = Type::slice(SliceMode::Len, Type::basic(Kind::Uint8), Some(prog)).unwrap();
    let schema = Schema::new(slice_ty);
    let mut record = Value::Seq(vec![Value::U8(7), Value::U8(8)]);
    let bytes = encode(&schema, &mut record, Endian::Little);
    assert_eq!(bytes, vec![7, 8]);
}

/// Invariant: a basic-kind slice above and below the bulk threshold produce
/// identical bytes on the wire.
#[test]
fn bulk_and_elementwise_paths_agree() {
    let elem = Type::basic(Kind::Uint16);
    let schema_small = Schema::new(Type::array(3, elem.clone()).unwrap());
    let schema_large = Schema::new(Type::array(10, elem).unwrap());

    let small_bytes: Vec<u8> = (0..3u16).flat_map(|n| n.to_be_bytes()).collect();
    let large_bytes: Vec<u8> = (0..10u16).flat_map(|n| n.to_be_bytes()).collect();

    let small = decode(&schema_small, &small_bytes, Endian::Big);
    let large = decode(&schema_large, &large_bytes, Endian::Big);
    assert_eq!(small.as_seq().unwrap().len(), 3);
    assert_eq!(large.as_seq().unwrap().len(), 10);

    let mut small_mut = small;
    let mut large_mut = large;
    assert_eq!(encode(&schema_small, &mut small_mut, Endian::Big), small_bytes);
    assert_eq!(encode(&schema_large, &mut large_mut, Endian::Big), large_bytes);
}

/// A `String` field driven by an explicit `Len`-mode program.
#[test]
fn string_field_with_length_program() {
    let len_prog = Program::compile("5", None, None).unwrap();
    let string_ty = Type::string(SliceMode::Len, Some(len_prog)).unwrap();
    let schema = Schema::new(Type::struct_(vec![Field::new("name", string_ty).unwrap()]).unwrap());

    let bytes = b"hello".to_vec();
    let record = decode(&schema, &bytes, Endian::Little);
    assert_eq!(record.field("name"), Some(&Value::Str("hello".to_string())));
}
