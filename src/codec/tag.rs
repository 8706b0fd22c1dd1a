//! Annotated tag object: points at another object (usually a commit) with a
//! tagger signature and message (§3, §4.1).

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::codec::object::ObjectTrait;
use crate::codec::object_type::ObjectType;
use crate::codec::signature::Signature;
use crate::errors::CellError;
use crate::hash::ObjectHash;

#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: ObjectHash,
    pub object_id: ObjectHash,
    pub object_type: ObjectType,
    pub tag_name: String,
    pub tagger: Signature,
    pub message: String,
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "object {}", self.object_id)?;
        writeln!(f, "type {}", self.object_type)?;
        writeln!(f, "tag {}", self.tag_name)?;
        writeln!(f, "tagger {}", self.tagger)?;
        writeln!(f, "{}", self.message)
    }
}

impl Tag {
    pub fn new(
        object_id: ObjectHash,
        object_type: ObjectType,
        tag_name: impl Into<String>,
        tagger: Signature,
        message: &str,
    ) -> Tag {
        let mut tag = Tag {
            id: ObjectHash::default(),
            object_id,
            object_type,
            tag_name: tag_name.into(),
            tagger,
            message: message.to_string(),
        };
        let data = tag.to_data().expect("tag serialization never fails");
        tag.id = ObjectHash::from_type_and_data(ObjectType::Tag, &data);
        tag
    }
}

impl ObjectTrait for Tag {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, CellError> {
        let mut rest = data;

        if !rest.starts_with(b"object ") {
            return Err(CellError::malformed(0, "tag does not start with `object `"));
        }
        let object_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| CellError::malformed(0, "missing object line"))?;
        let object_id = ObjectHash::from_str(
            std::str::from_utf8(&rest[7..object_end])
                .map_err(|_| CellError::malformed(7, "non-utf8 object sha"))?,
        )
        .map_err(|e| CellError::malformed(7, e))?;
        rest = &rest[object_end + 1..];

        if !rest.starts_with(b"type ") {
            return Err(CellError::malformed(0, "missing `type ` line"));
        }
        let type_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| CellError::malformed(0, "missing type line"))?;
        let object_type = ObjectType::from_bytes(&rest[5..type_end])?;
        rest = &rest[type_end + 1..];

        if !rest.starts_with(b"tag ") {
            return Err(CellError::malformed(0, "missing `tag ` line"));
        }
        let tag_line_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| CellError::malformed(0, "missing tag name line"))?;
        let tag_name = String::from_utf8(rest[4..tag_line_end].to_vec())
            .map_err(|_| CellError::malformed(4, "non-utf8 tag name"))?;
        rest = &rest[tag_line_end + 1..];

        let tagger_line_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| CellError::malformed(0, "missing tagger line"))?;
        let tagger = Signature::from_data(rest[..tagger_line_end].to_vec())?;
        rest = &rest[tagger_line_end + 1..];

        let message = String::from_utf8(rest.to_vec())
            .map_err(|_| CellError::malformed(0, "non-utf8 tag message"))?;

        Ok(Tag {
            id: hash,
            object_id,
            object_type,
            tag_name,
            tagger,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn get_size(&self) -> usize {
        0
    }

    fn to_data(&self) -> Result<Vec<u8>, CellError> {
        let mut data = Vec::new();
        data.extend(b"object ");
        data.extend(self.object_id.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"type ");
        data.extend(self.object_type.to_bytes());
        data.push(0x0a);
        data.extend(b"tag ");
        data.extend(self.tag_name.as_bytes());
        data.push(0x0a);
        data.extend(self.tagger.to_data()?);
        data.push(0x0a);
        data.extend(self.message.as_bytes());
        Ok(data)
    }
}
