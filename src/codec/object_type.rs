//! Git object type enumeration (§3: `type` is one of `{blob, tree, commit, tag}`).

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::CellError;

/// In Git, each object type is assigned a unique integer value, used to
/// identify the type of object both in the loose-object header and in a
/// pack entry's 3-bit type field.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit = 1,
    Tree,
    Blob,
    Tag,
    OffsetDelta,
    HashDelta,
}

const COMMIT_OBJECT_TYPE: &[u8] = b"commit";
const TREE_OBJECT_TYPE: &[u8] = b"tree";
const BLOB_OBJECT_TYPE: &[u8] = b"blob";
const TAG_OBJECT_TYPE: &[u8] = b"tag";

impl Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Commit => write!(f, "commit"),
            ObjectType::Tag => write!(f, "tag"),
            ObjectType::OffsetDelta => write!(f, "ofs-delta"),
            ObjectType::HashDelta => write!(f, "ref-delta"),
        }
    }
}

impl ObjectType {
    /// Convert to the 3-bit pack header type id (git pack-format §2).
    pub fn to_pack_type_u8(self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
            ObjectType::OffsetDelta => 6,
            ObjectType::HashDelta => 7,
        }
    }

    /// Decode a 3-bit pack header type id.
    pub fn from_pack_type_u8(number: u8) -> Result<ObjectType, CellError> {
        match number {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            6 => Ok(ObjectType::OffsetDelta),
            7 => Ok(ObjectType::HashDelta),
            _ => Err(CellError::Invalid(format!(
                "invalid pack object type number: {number}"
            ))),
        }
    }

    /// The loose-object header name, e.g. `"blob"` in `"blob <len>\0<payload>"`.
    pub fn to_bytes(self) -> &'static [u8] {
        match self {
            ObjectType::Commit => COMMIT_OBJECT_TYPE,
            ObjectType::Tree => TREE_OBJECT_TYPE,
            ObjectType::Blob => BLOB_OBJECT_TYPE,
            ObjectType::Tag => TAG_OBJECT_TYPE,
            ObjectType::OffsetDelta | ObjectType::HashDelta => {
                panic!("delta entries have no loose-object header")
            }
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<ObjectType, CellError> {
        match data {
            COMMIT_OBJECT_TYPE => Ok(ObjectType::Commit),
            TREE_OBJECT_TYPE => Ok(ObjectType::Tree),
            BLOB_OBJECT_TYPE => Ok(ObjectType::Blob),
            TAG_OBJECT_TYPE => Ok(ObjectType::Tag),
            other => Err(CellError::Invalid(format!(
                "`{}` is not a valid git object type",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    pub fn is_base_object(self) -> bool {
        matches!(
            self,
            ObjectType::Commit | ObjectType::Tree | ObjectType::Blob | ObjectType::Tag
        )
    }
}
