//! Loose-object zlib framing: warm-tier objects are stored deflate-compressed
//! (§4.2, SPEC_FULL supplement), hot/cache/wire payloads stay raw.

use std::io::{self, BufRead, Write};

use flate2::{Decompress, FlushDecompress, Status, write::ZlibEncoder};

use crate::codec::object_type::ObjectType;
use crate::utils::HashAlgorithm;

/// Inflates a zlib stream while simultaneously accumulating a hash over the
/// Git object header (`"<type> <len>\0"`) plus the decompressed payload, so
/// the caller gets both the bytes and the content-address hash from one pass.
pub struct ReadBoxed<R> {
    pub inner: R,
    pub decompressor: Box<Decompress>,
    count_hash: bool,
    pub hash: HashAlgorithm,
}

impl<R> ReadBoxed<R>
where
    R: BufRead,
{
    pub fn new(inner: R, obj_type: ObjectType, size: usize) -> Self {
        let mut hash = HashAlgorithm::new();
        hash.update(obj_type.to_bytes());
        hash.update(b" ");
        hash.update(size.to_string().as_bytes());
        hash.update(b"\0");
        ReadBoxed {
            inner,
            hash,
            count_hash: true,
            decompressor: Box::new(Decompress::new(true)),
        }
    }

    /// For delta entries, which have no standalone object header to hash.
    pub fn new_for_delta(inner: R) -> Self {
        ReadBoxed {
            inner,
            hash: HashAlgorithm::new(),
            count_hash: false,
            decompressor: Box::new(Decompress::new(true)),
        }
    }
}

impl<R> io::Read for ReadBoxed<R>
where
    R: BufRead,
{
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        let o = inflate(&mut self.inner, &mut self.decompressor, into)?;
        if self.count_hash {
            self.hash.update(&into[..o]);
        }
        Ok(o)
    }
}

fn inflate(rd: &mut impl BufRead, state: &mut Decompress, mut dst: &mut [u8]) -> io::Result<usize> {
    let mut total_written = 0;
    loop {
        let (written, consumed, ret, eof);
        {
            let input = rd.fill_buf()?;
            eof = input.is_empty();
            let before_out = state.total_out();
            let before_in = state.total_in();
            let flush = if eof {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            ret = state.decompress(input, dst, flush);
            written = (state.total_out() - before_out) as usize;
            total_written += written;
            dst = &mut dst[written..];
            consumed = (state.total_in() - before_in) as usize;
        }
        rd.consume(consumed);

        match ret {
            Ok(Status::StreamEnd) => return Ok(total_written),
            Ok(Status::Ok | Status::BufError) if eof || dst.is_empty() => return Ok(total_written),
            Ok(Status::Ok | Status::BufError) if consumed != 0 || written != 0 => continue,
            Ok(Status::Ok | Status::BufError) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "inflate made no progress",
                ));
            }
            Err(..) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "corrupt deflate stream",
                ));
            }
        }
    }
}

/// Deflate a loose object's full header+payload bytes for warm-tier storage.
pub fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data)?;
    enc.finish()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::hash::{HashKind, ObjectHash, set_hash_kind_for_test};

    #[test]
    fn inflate_object_counts_hash() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let body = b"hello\n";
        let compressed = deflate(body).unwrap();
        let mut reader = ReadBoxed::new(io::Cursor::new(compressed), ObjectType::Blob, body.len());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, body);

        let expected = ObjectHash::from_type_and_data(ObjectType::Blob, body);
        let got = ObjectHash::from_bytes(&reader.hash.finalize()).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn inflate_delta_skips_hash() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let body = b"delta bytes";
        let compressed = deflate(body).unwrap();
        let mut reader = ReadBoxed::new_for_delta(io::Cursor::new(compressed));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn corrupt_stream_returns_error() {
        let data = b"not a valid zlib stream";
        let mut reader = ReadBoxed::new(io::Cursor::new(data), ObjectType::Blob, data.len());
        let mut out = [0u8; 16];
        let err = reader.read(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
