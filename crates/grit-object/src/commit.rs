use bstr::BString;
use grit_hash::ObjectId;

use crate::ObjectError;

/// A git commit, trimmed to the fields graph traversal reads.
///
/// Author identity, encoding, and signatures are skipped during parsing;
/// the raw message is retained as bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// OID of the root tree.
    pub tree: ObjectId,
    /// Parent commit OIDs (empty for a root commit).
    pub parents: Vec<ObjectId>,
    /// Committer timestamp, seconds since the epoch.
    pub committer_time: i64,
    /// Commit message (everything after the blank line separator).
    pub message: BString,
}

impl Commit {
    /// Parse commit content from raw bytes (no loose object header).
    ///
    /// Unknown headers and their continuation lines are skipped; `tree`
    /// and `committer` are required.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut committer_time: Option<i64> = None;

        let data = content;
        let mut pos = 0;

        loop {
            if pos >= data.len() {
                break;
            }
            // A blank line separates headers from the message.
            if data[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = data[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| p + pos)
                .unwrap_or(data.len());
            let line = &data[pos..line_end];

            if let Some(space_pos) = line.iter().position(|&b| b == b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];

                match key {
                    b"tree" => tree = Some(parse_oid_value(value, "tree")?),
                    b"parent" => parents.push(parse_oid_value(value, "parent")?),
                    b"committer" => committer_time = Some(parse_ident_time(value)?),
                    _ => {
                        // Skip unknown headers, including continuation
                        // lines (gpgsig, mergetag) that start with a space.
                        let mut next = line_end + 1;
                        while next < data.len() && data[next] == b' ' {
                            let cont_end = data[next..]
                                .iter()
                                .position(|&b| b == b'\n')
                                .map(|p| p + next)
                                .unwrap_or(data.len());
                            next = cont_end + 1;
                        }
                        pos = next;
                        continue;
                    }
                }
            }

            pos = line_end + 1;
        }

        let tree = tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?;
        let committer_time =
            committer_time.ok_or(ObjectError::MissingCommitField { field: "committer" })?;

        Ok(Self {
            tree,
            parents,
            committer_time,
            message: BString::from(&data[pos.min(data.len())..]),
        })
    }
}

fn parse_oid_value(value: &[u8], field: &'static str) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader(format!("non-UTF8 {field} OID")))?;
    Ok(ObjectId::from_hex(hex)?)
}

/// Extract the timestamp from an identity line:
/// `Name <email> <seconds> <zone>`.
fn parse_ident_time(value: &[u8]) -> Result<i64, ObjectError> {
    let close = value
        .iter()
        .rposition(|&b| b == b'>')
        .ok_or_else(|| ObjectError::InvalidHeader("identity missing '>'".into()))?;
    let rest = &value[close + 1..];
    let mut fields = rest.split(|&b| b == b' ').filter(|f| !f.is_empty());
    let seconds = fields
        .next()
        .ok_or_else(|| ObjectError::InvalidHeader("identity missing timestamp".into()))?;
    std::str::from_utf8(seconds)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ObjectError::InvalidHeader("invalid identity timestamp".into()))
}
