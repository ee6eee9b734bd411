//! Write-flip-read behavior shared by every buffer implementation.

use codec_buffer::{
    CodecBuffer, Error, GrowableBuffer, MAX_VAR_I32_LEN, MAX_VAR_I64_LEN, PageSize, PagedBuffer,
    StorageKind,
};
use testing::{VAR_I32_BOUNDARIES, VAR_I64_BOUNDARIES, patterned_bytes};

/// Writes every kind of value the contract supports, then reads them back in the same order.
fn roundtrip_all_value_kinds(buffer: &mut impl CodecBuffer) {
    let payload = patterned_bytes(300, 7);

    for value in VAR_I32_BOUNDARIES {
        buffer.write_var_i32(value).unwrap();
        buffer.write_i32(value).unwrap();
    }

    for value in VAR_I64_BOUNDARIES {
        buffer.write_var_i64(value).unwrap();
        buffer.write_i64(value).unwrap();
    }

    for value in [0_i8, 1, -1, i8::MIN, i8::MAX] {
        buffer.write_i8(value).unwrap();
    }

    buffer.write_buffer(&payload).unwrap();
    buffer.write_bytes(b"tail").unwrap();

    let written = buffer.size();
    buffer.flip();
    assert_eq!(buffer.position(), 0);
    assert_eq!(buffer.size(), written);

    for value in VAR_I32_BOUNDARIES {
        assert_eq!(buffer.read_var_i32().unwrap(), value);
        assert_eq!(buffer.read_i32().unwrap(), value);
    }

    for value in VAR_I64_BOUNDARIES {
        assert_eq!(buffer.read_var_i64().unwrap(), value);
        assert_eq!(buffer.read_i64().unwrap(), value);
    }

    for value in [0_i8, 1, -1, i8::MIN, i8::MAX] {
        assert_eq!(buffer.read_i8().unwrap(), value);
    }

    assert_eq!(buffer.read_buffer(payload.len()).unwrap(), payload);

    let mut tail = [0_u8; 4];
    buffer.read_bytes(&mut tail).unwrap();
    assert_eq!(&tail, b"tail");

    assert_eq!(buffer.remaining(), 0);
    assert!(matches!(
        buffer.read_i8(),
        Err(Error::OutOfBounds { requested: 1, .. })
    ));
}

#[test]
fn growable_heap_roundtrip() {
    // A tiny start forces many growth events in between values.
    let mut buffer = GrowableBuffer::builder().initial_capacity(1).build();

    roundtrip_all_value_kinds(&mut buffer);
}

#[test]
fn growable_direct_roundtrip() {
    let mut buffer = GrowableBuffer::builder()
        .kind(StorageKind::Direct)
        .initial_capacity(0)
        .build();

    roundtrip_all_value_kinds(&mut buffer);
}

#[test]
#[cfg_attr(miri, ignore)] // Miri cannot map files.
fn paged_roundtrip_across_page_sizes() {
    // From one-byte pages to 64 MiB pages.
    for shift in 0..=26 {
        let page_size = PageSize::from_shift(shift).unwrap();
        let file = tempfile::tempfile().unwrap();
        let mut buffer = PagedBuffer::create(file, page_size).unwrap();

        roundtrip_all_value_kinds(&mut buffer);
    }
}

#[test]
fn scenario_varint_group_boundaries() {
    let values = [0, 10, 127, 128, 255, 16_383, 16_384, 2_147_483_647];
    let mut buffer = GrowableBuffer::new();

    for value in values {
        buffer.write_var_i32(value).unwrap();
    }

    // 1 + 1 + 1 + 2 + 2 + 2 + 3 + 5 bytes.
    assert_eq!(buffer.size(), 17);

    buffer.flip();

    let read: Vec<i32> = (0..values.len())
        .map(|_| buffer.read_var_i32().unwrap())
        .collect();
    assert_eq!(read, values);
}

#[test]
fn negative_varints_take_maximum_length() {
    let mut buffer = GrowableBuffer::new();

    buffer.write_var_i32(-1).unwrap();
    assert_eq!(buffer.size(), MAX_VAR_I32_LEN as u64);

    buffer.clear();
    buffer.write_var_i64(i64::MIN).unwrap();
    assert_eq!(buffer.size(), MAX_VAR_I64_LEN as u64);
}

#[test]
fn fixed_width_integers_are_big_endian() {
    let mut buffer = GrowableBuffer::new();

    buffer.write_i32(0x0102_0304).unwrap();
    buffer.write_i64(-2).unwrap();

    assert_eq!(
        buffer.as_bytes(),
        &[1, 2, 3, 4, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]
    );
}

#[test]
fn malformed_varint_is_rejected() {
    let mut buffer = GrowableBuffer::read_only(vec![0x80_u8; 12]);

    assert!(matches!(
        buffer.read_var_i32(),
        Err(Error::MalformedVarInt { max_bytes: 5 })
    ));

    buffer.set_position(0).unwrap();
    assert!(matches!(
        buffer.read_var_i64(),
        Err(Error::MalformedVarInt { max_bytes: 10 })
    ));
}

#[test]
fn truncated_varint_is_out_of_bounds() {
    let mut buffer = GrowableBuffer::read_only(vec![0x80_u8, 0x80]);

    assert!(matches!(
        buffer.read_var_i64(),
        Err(Error::OutOfBounds { .. })
    ));
}

#[test]
fn read_only_buffer_decodes_but_rejects_writes() {
    let mut encoder = GrowableBuffer::new();
    encoder.write_var_i64(1 << 40).unwrap();

    let mut decoder = GrowableBuffer::read_only(encoder.into_bytes());

    assert!(!decoder.is_writable());
    assert_eq!(decoder.read_var_i64().unwrap(), 1 << 40);
    assert!(matches!(decoder.write_i8(1), Err(Error::NotWritable)));
}

#[test]
fn read_buffer_past_end_leaves_position() {
    let mut buffer = GrowableBuffer::new();
    buffer.write_bytes(&[1, 2, 3]).unwrap();
    buffer.flip();

    assert!(matches!(
        buffer.read_buffer(4),
        Err(Error::OutOfBounds {
            position: 0,
            requested: 4,
            size: 3
        })
    ));
    assert_eq!(buffer.position(), 0);
    assert_eq!(buffer.read_buffer(3).unwrap(), [1, 2, 3]);
}
