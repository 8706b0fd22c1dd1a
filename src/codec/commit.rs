//! Commit object: tree pointer, parent pointers, author/committer
//! signatures, and a free-form message (§3, §4.1).

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
pub struct Commit {
    pub id: ObjectHash,
    pub tree_id: ObjectHash,
    pub parent_commit_ids: Vec<ObjectHash>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "tree: {}", self.tree_id)?;
        for parent in &self.parent_commit_ids {
            writeln!(f, "parent: {parent}")?;
        }
        writeln!(f, "author {}", self.author)?;
        writeln!(f, "committer {}", self.committer)?;
        writeln!(f, "{}", self.message)
    }
}

impl Commit {
    pub fn new(
        author: Signature,
        committer: Signature,
        tree_id: ObjectHash,
        parent_commit_ids: Vec<ObjectHash>,
        message: &str,
    ) -> Commit {
        let mut commit = Commit {
            id: ObjectHash::default(),
            tree_id,
            parent_commit_ids,
            author,
            committer,
            message: message.to_string(),
        };
        let data = commit.to_data().expect("commit serialization never fails");
        commit.id = ObjectHash::from_type_and_data(ObjectType::Commit, &data);
        commit
    }
}

impl ObjectTrait for Commit {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, CellError> {
        let mut rest = data;

        let tree_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| CellError::malformed(0, "missing tree line"))?;
        if !rest.starts_with(b"tree ") {
            return Err(CellError::malformed(0, "commit does not start with `tree `"));
        }
        let tree_id = ObjectHash::from_str(
            std::str::from_utf8(&rest[5..tree_end])
                .map_err(|_| CellError::malformed(5, "non-utf8 tree sha"))?,
        )
        .map_err(|e| CellError::malformed(5, e))?;
        let offset = tree_end + 1;
        rest = &rest[offset..];

        let author_begin = rest
            .find("author")
            .ok_or_else(|| CellError::malformed(offset, "missing author line"))?;
        let mut parent_commit_ids = Vec::new();
        for parent_at in rest[..author_begin].find_iter("parent") {
            let line_end = rest[parent_at..]
                .find_byte(0x0a)
                .ok_or_else(|| CellError::malformed(offset + parent_at, "unterminated parent line"))?;
            let sha_str = std::str::from_utf8(&rest[parent_at + 7..parent_at + line_end])
                .map_err(|_| CellError::malformed(offset + parent_at, "non-utf8 parent sha"))?;
            let parent_id = ObjectHash::from_str(sha_str)
                .map_err(|e| CellError::malformed(offset + parent_at, e))?;
            parent_commit_ids.push(parent_id);
        }
        rest = &rest[author_begin..];

        let author_line_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| CellError::malformed(offset + author_begin, "unterminated author line"))?;
        let author = Signature::from_data(rest[..author_line_end].to_vec())?;
        rest = &rest[author_line_end + 1..];

        let committer_line_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| CellError::malformed(0, "unterminated committer line"))?;
        let committer = Signature::from_data(rest[..committer_line_end].to_vec())?;
        rest = &rest[committer_line_end + 1..];

        let message = String::from_utf8(rest.to_vec())
            .map_err(|_| CellError::malformed(0, "non-utf8 commit message"))?;

        Ok(Commit {
            id: hash,
            tree_id,
            parent_commit_ids,
            author,
            committer,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn get_size(&self) -> usize {
        0
    }

    fn to_data(&self) -> Result<Vec<u8>, CellError> {
        let mut data = Vec::new();
        data.extend(b"tree ");
        data.extend(self.tree_id.to_string().as_bytes());
        data.push(0x0a);

        for parent in &self.parent_commit_ids {
            data.extend(b"parent ");
            data.extend(parent.to_string().as_bytes());
            data.push(0x0a);
        }

        data.extend(self.author.to_data()?);
        data.push(0x0a);
        data.extend(self.committer.to_data()?);
        data.push(0x0a);
        data.extend(self.message.as_bytes());

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::signature::SignatureType;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    #[test]
    fn round_trips_a_basic_commit() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tree_id = ObjectHash::from_type_and_data(ObjectType::Tree, b"tree contents");
        let author = Signature::new(SignatureType::Author, "alice", "alice@example.com", 100, "+0000");
        let committer = Signature::new(SignatureType::Committer, "alice", "alice@example.com", 100, "+0000");
        let commit = Commit::new(author, committer, tree_id, Vec::new(), "initial commit\n");

        let data = commit.to_data().unwrap();
        let parsed = Commit::from_bytes(&data, commit.id).unwrap();
        assert_eq!(parsed.tree_id, tree_id);
        assert_eq!(parsed.message, "initial commit\n");
        assert!(parsed.parent_commit_ids.is_empty());
    }

    #[test]
    fn parses_multiple_parents() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tree_id = ObjectHash::from_type_and_data(ObjectType::Tree, b"t");
        let p1 = ObjectHash::from_type_and_data(ObjectType::Commit, b"p1");
        let p2 = ObjectHash::from_type_and_data(ObjectType::Commit, b"p2");
        let author = Signature::new(SignatureType::Author, "bob", "bob@example.com", 5, "+0000");
        let committer = author.clone();
        let commit = Commit::new(author, committer, tree_id, vec![p1, p2], "merge\n");

        let data = commit.to_data().unwrap();
        let parsed = Commit::from_bytes(&data, commit.id).unwrap();
        assert_eq!(parsed.parent_commit_ids, vec![p1, p2]);
    }
}
