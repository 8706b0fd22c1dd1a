//! Tree object: an ordered list of (mode, name, sha) entries describing one
//! directory level (§3, §4.1). Entries must be in canonical byte-order by
//! name (trees sort as if their name carried a trailing `/`), with no
//! duplicate names, and a mode drawn from the recognized set.

use std::fmt::Display;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::codec::object::ObjectTrait;
use crate::codec::object_type::ObjectType;
use crate::errors::CellError;
use crate::hash::ObjectHash;

/// Git file modes recognized in a tree entry.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TreeEntryMode {
    Blob,
    BlobExecutable,
    Tree,
    Link,
    Commit,
}

impl TreeEntryMode {
    pub fn to_bytes(self) -> &'static [u8] {
        match self {
            TreeEntryMode::Blob => b"100644",
            TreeEntryMode::BlobExecutable => b"100755",
            TreeEntryMode::Tree => b"40000",
            TreeEntryMode::Link => b"120000",
            TreeEntryMode::Commit => b"160000",
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<TreeEntryMode, CellError> {
        match data {
            b"100644" | b"644" => Ok(TreeEntryMode::Blob),
            b"100755" | b"755" => Ok(TreeEntryMode::BlobExecutable),
            b"40000" | b"040000" => Ok(TreeEntryMode::Tree),
            b"120000" => Ok(TreeEntryMode::Link),
            b"160000" => Ok(TreeEntryMode::Commit),
            other => Err(CellError::Invalid(format!(
                "`{}` is not a recognized tree entry mode",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// Trees sort as if their name had a trailing `/`; everything else sorts
    /// on its literal name bytes.
    fn is_tree(self) -> bool {
        matches!(self, TreeEntryMode::Tree)
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: TreeEntryMode,
    pub name: String,
    pub id: ObjectHash,
}

/// Byte-order sort key: tree entries compare as `name + "/"`, others as
/// `name` (git's "tree object sort" rule).
fn sort_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.clone().into_bytes();
    if entry.mode.is_tree() {
        key.push(b'/');
    }
    key
}

fn validate_name(name: &str) -> Result<(), CellError> {
    if name.is_empty() {
        return Err(CellError::Invalid("tree entry name is empty".into()));
    }
    if name == "." || name == ".." {
        return Err(CellError::Invalid(format!(
            "tree entry name `{name}` is reserved"
        )));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(CellError::Invalid(format!(
            "tree entry name `{name}` contains a forbidden character"
        )));
    }
    Ok(())
}

#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub id: ObjectHash,
    pub tree_entries: Vec<TreeEntry>,
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for entry in &self.tree_entries {
            writeln!(
                f,
                "{} {}\t{}",
                String::from_utf8_lossy(entry.mode.to_bytes()),
                entry.id,
                entry.name
            )?;
        }
        Ok(())
    }
}

impl Tree {
    /// Build a tree from entries, validating and canonically sorting them.
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Result<Tree, CellError> {
        for entry in &entries {
            validate_name(&entry.name)?;
        }
        entries.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        for pair in entries.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(CellError::Invalid(format!(
                    "duplicate tree entry name `{}`",
                    pair[0].name
                )));
            }
        }
        let mut tree = Tree {
            id: ObjectHash::default(),
            tree_entries: entries,
        };
        let data = tree.to_data()?;
        tree.id = ObjectHash::from_type_and_data(ObjectType::Tree, &data);
        Ok(tree)
    }
}

impl ObjectTrait for Tree {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, CellError> {
        let mut entries = Vec::new();
        let mut rest = data;
        let hash_size = crate::hash::get_hash_kind().size();

        while !rest.is_empty() {
            let space = rest
                .find_byte(b' ')
                .ok_or_else(|| CellError::malformed(data.len() - rest.len(), "missing mode separator"))?;
            let mode = TreeEntryMode::from_bytes(&rest[..space])?;

            let nul = rest
                .find_byte(0x00)
                .ok_or_else(|| CellError::malformed(data.len() - rest.len(), "missing name terminator"))?;
            let name = String::from_utf8(rest[space + 1..nul].to_vec())
                .map_err(|_| CellError::malformed(data.len() - rest.len(), "non-utf8 entry name"))?;

            let sha_start = nul + 1;
            let sha_end = sha_start + hash_size;
            if rest.len() < sha_end {
                return Err(CellError::malformed(data.len() - rest.len(), "truncated entry sha"));
            }
            let id = ObjectHash::from_bytes(&rest[sha_start..sha_end])
                .map_err(|e| CellError::malformed(data.len() - rest.len(), e))?;

            entries.push(TreeEntry { mode, name, id });
            rest = &rest[sha_end..];
        }

        // Trust the caller's recorded hash; re-derive only on explicit verify.
        let _ = &entries;
        Ok(Tree {
            id: hash,
            tree_entries: entries,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn get_size(&self) -> usize {
        self.tree_entries.len()
    }

    fn to_data(&self) -> Result<Vec<u8>, CellError> {
        let mut data = Vec::new();
        for entry in &self.tree_entries {
            data.extend(entry.mode.to_bytes());
            data.push(b' ');
            data.extend(entry.name.as_bytes());
            data.push(0x00);
            data.extend(entry.id.as_ref());
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    fn entry(mode: TreeEntryMode, name: &str) -> TreeEntry {
        TreeEntry {
            mode,
            name: name.to_string(),
            id: ObjectHash::from_type_and_data(ObjectType::Blob, name.as_bytes()),
        }
    }

    #[test]
    fn sorts_entries_canonically() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tree = Tree::from_entries(vec![
            entry(TreeEntryMode::Blob, "b.txt"),
            entry(TreeEntryMode::Tree, "a"),
            entry(TreeEntryMode::Blob, "a.txt"),
        ])
        .unwrap();
        let names: Vec<_> = tree.tree_entries.iter().map(|e| e.name.as_str()).collect();
        // "a.txt" < "a/" < "b.txt" lexically, since '.' (0x2e) < '/' (0x2f)
        assert_eq!(names, vec!["a.txt", "a", "b.txt"]);
    }

    #[test]
    fn rejects_duplicate_names() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let err = Tree::from_entries(vec![
            entry(TreeEntryMode::Blob, "dup"),
            entry(TreeEntryMode::Tree, "dup"),
        ])
        .unwrap_err();
        assert!(matches!(err, CellError::Invalid(_)));
    }

    #[test]
    fn rejects_reserved_names() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let err = Tree::from_entries(vec![entry(TreeEntryMode::Blob, "..")]).unwrap_err();
        assert!(matches!(err, CellError::Invalid(_)));
    }

    #[test]
    fn round_trips_through_bytes() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tree = Tree::from_entries(vec![
            entry(TreeEntryMode::Blob, "file.txt"),
            entry(TreeEntryMode::Tree, "sub"),
        ])
        .unwrap();
        let data = tree.to_data().unwrap();
        let parsed = Tree::from_bytes(&data, tree.id).unwrap();
        assert_eq!(parsed.tree_entries, tree.tree_entries);
    }
}
