//! Common interface shared by the four base Git object kinds (§4.1).

use std::fmt::Display;
use std::io::{BufRead, Read};

use crate::codec::object_type::ObjectType;
use crate::codec::zlib::ReadBoxed;
use crate::errors::CellError;
use crate::hash::ObjectHash;

/// Defines the common interface for blob, tree, commit, and tag objects:
/// parse from raw payload bytes, serialize back to the canonical payload,
/// and derive the content-address hash from that payload (§3, §4.1).
pub trait ObjectTrait: Send + Sync + Display {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, CellError>
    where
        Self: Sized;

    /// Build from an inflating reader that also accumulates the object hash,
    /// used by the loose-object and pack decoders.
    fn from_buf_read<R: BufRead>(read: &mut ReadBoxed<R>, size: usize) -> Result<Self, CellError>
    where
        Self: Sized,
    {
        let mut content: Vec<u8> = Vec::with_capacity(size);
        read.read_to_end(&mut content)
            .map_err(|e| CellError::Io(e.to_string()))?;
        let digest = read.hash.clone().finalize();
        let hash = ObjectHash::from_bytes(&digest).map_err(CellError::Invalid)?;
        Self::from_bytes(&content, hash)
    }

    fn get_type(&self) -> ObjectType;

    fn get_size(&self) -> usize;

    fn to_data(&self) -> Result<Vec<u8>, CellError>;

    /// Content-address hash, recomputed from the canonical payload.
    fn object_hash(&self) -> Result<ObjectHash, CellError> {
        let data = self.to_data()?;
        Ok(ObjectHash::from_type_and_data(self.get_type(), &data))
    }
}
