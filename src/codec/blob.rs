//! Blob object: an opaque byte payload, no internal structure (§3, §4.1).

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::codec::object::ObjectTrait;
use crate::codec::object_type::ObjectType;
use crate::errors::CellError;
use crate::hash::ObjectHash;

#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    pub id: ObjectHash,
    pub data: Vec<u8>,
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Blob({}, {} bytes)", self.id, self.data.len())
    }
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Blob {
        let id = ObjectHash::from_type_and_data(ObjectType::Blob, &data);
        Blob { id, data }
    }
}

impl ObjectTrait for Blob {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, CellError> {
        Ok(Blob {
            id: hash,
            data: data.to_vec(),
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn get_size(&self) -> usize {
        self.data.len()
    }

    fn to_data(&self) -> Result<Vec<u8>, CellError> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    #[test]
    fn content_address_matches_known_sha() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let blob = Blob::new(b"hello\n".to_vec());
        assert_eq!(blob.id.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn from_bytes_preserves_hash() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let blob = Blob::new(b"some content".to_vec());
        let roundtrip = Blob::from_bytes(&blob.data, blob.id).unwrap();
        assert_eq!(blob, roundtrip);
        assert_eq!(roundtrip.object_hash().unwrap(), blob.id);
    }
}
