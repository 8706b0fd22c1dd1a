//! Author/committer signature line: `<name> <email> <timestamp> <offset>`
//! (SPEC_FULL supplement, used by `Commit` and `Tag`).

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::CellError;

/// Which role a signature plays in a commit or tag.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SignatureType {
    Author,
    Committer,
    Tagger,
}

impl Display for SignatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SignatureType::Author => write!(f, "author"),
            SignatureType::Committer => write!(f, "committer"),
            SignatureType::Tagger => write!(f, "tagger"),
        }
    }
}

impl FromStr for SignatureType {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(SignatureType::Author),
            "committer" => Ok(SignatureType::Committer),
            "tagger" => Ok(SignatureType::Tagger),
            other => Err(CellError::Invalid(format!(
                "`{other}` is not a valid signature type"
            ))),
        }
    }
}

/// Name, email, Unix-seconds timestamp, and `+HHMM`/`-HHMM` offset.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub signature_type: SignatureType,
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    /// UTC offset as `+HHMM` or `-HHMM`.
    pub offset: String,
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} {} <{}> {} {}",
            self.signature_type, self.name, self.email, self.timestamp, self.offset
        )
    }
}

impl Signature {
    pub fn new(
        signature_type: SignatureType,
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: i64,
        offset: impl Into<String>,
    ) -> Self {
        Signature {
            signature_type,
            name: name.into(),
            email: email.into(),
            timestamp,
            offset: offset.into(),
        }
    }

    /// Parse one signature line, e.g.
    /// `author benjamin <benjamin@example.com> 1757467768 +0800`.
    pub fn from_data(data: Vec<u8>) -> Result<Signature, CellError> {
        let text = data
            .to_str()
            .map_err(|_| CellError::malformed(0, "signature line is not valid utf-8"))?;

        let type_end = text
            .find(' ')
            .ok_or_else(|| CellError::malformed(0, "missing signature type"))?;
        let signature_type: SignatureType = text[..type_end].parse()?;

        let email_start = text
            .find('<')
            .ok_or_else(|| CellError::malformed(type_end, "missing email"))?;
        let email_end = text
            .find('>')
            .ok_or_else(|| CellError::malformed(type_end, "unterminated email"))?;
        if email_end < email_start {
            return Err(CellError::malformed(email_start, "malformed email bounds"));
        }

        let name = text[type_end + 1..email_start].trim().to_string();
        let email = text[email_start + 1..email_end].to_string();

        let rest = text[email_end + 1..].trim();
        let mut parts = rest.split_whitespace();
        let timestamp: i64 = parts
            .next()
            .ok_or_else(|| CellError::malformed(email_end, "missing timestamp"))?
            .parse()
            .map_err(|_| CellError::malformed(email_end, "invalid timestamp"))?;
        let offset = parts
            .next()
            .ok_or_else(|| CellError::malformed(email_end, "missing utc offset"))?
            .to_string();

        Ok(Signature {
            signature_type,
            name,
            email,
            timestamp,
            offset,
        })
    }

    pub fn to_data(&self) -> Result<Vec<u8>, CellError> {
        Ok(self.to_string().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_author_line() {
        let sig = Signature::from_data(
            b"author benjamin.747 <benjamin.747@outlook.com> 1757467768 +0800".to_vec(),
        )
        .unwrap();
        assert_eq!(sig.signature_type, SignatureType::Author);
        assert_eq!(sig.name, "benjamin.747");
        assert_eq!(sig.email, "benjamin.747@outlook.com");
        assert_eq!(sig.timestamp, 1757467768);
        assert_eq!(sig.offset, "+0800");
    }

    #[test]
    fn round_trips_through_to_data() {
        let sig = Signature::new(SignatureType::Committer, "alice", "alice@example.com", 10, "-0500");
        let data = sig.to_data().unwrap();
        let parsed = Signature::from_data(data).unwrap();
        assert_eq!(sig, parsed);
    }

    #[test]
    fn rejects_missing_email() {
        let err = Signature::from_data(b"author alice 10 +0000".to_vec()).unwrap_err();
        assert!(matches!(err, CellError::Malformed { .. }));
    }
}
