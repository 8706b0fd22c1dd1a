//! Git object model and on-disk/on-wire encodings (§4.1): the four base
//! object types, loose-object zlib framing, and packfile v2 framing.

pub mod blob;
pub mod commit;
pub mod object;
pub mod object_type;
pub mod pack;
pub mod signature;
pub mod tag;
pub mod tree;
pub mod zlib;

pub use blob::Blob;
pub use commit::Commit;
pub use object::ObjectTrait;
pub use object_type::ObjectType;
pub use signature::{Signature, SignatureType};
pub use tag::Tag;
pub use tree::{Tree, TreeEntry, TreeEntryMode};
