//! Thread tree data model: a submission owning an ordered forest of comments.
//!
//! The serde field names are the persisted wire format read back by the
//! analysis stage, so renaming a field is a format break.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use time::OffsetDateTime;

/// Sentinel recorded for comments whose author is gone or was never exposed.
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Comment author handle, or the explicit deleted marker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Author {
    Named(String),
    Deleted,
}

impl Author {
    /// Map a raw author field to an `Author`. Missing, empty, `[deleted]` and
    /// `[removed]` all collapse to `Deleted`.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(a) if !a.is_empty() && a != "[deleted]" && a != "[removed]" => {
                Author::Named(a.to_string())
            }
            _ => Author::Deleted,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Author::Named(name) => name,
            Author::Deleted => DELETED_AUTHOR,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Author::Deleted)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Author {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Author {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(Author::from_raw(raw.as_deref()))
    }
}

/// One comment or reply. `depth` is 0 for top-level comments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: String,
    pub body: String,
    pub author: Author,
    pub score: i64,
    #[serde(with = "rfc3339")]
    pub created_utc: OffsetDateTime,
    pub depth: u32,
    #[serde(default)]
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::subtree_len).sum::<usize>()
    }
}

/// One forum submission plus its comment forest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub url: String,
    pub subreddit: String,
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(with = "rfc3339")]
    pub created_utc: OffsetDateTime,
    pub permalink: String,
    #[serde(default)]
    pub comments: Vec<CommentNode>,
}

impl Thread {
    /// Pre-order walk over every comment in the forest.
    pub fn walk_comments(&self) -> CommentWalk<'_> {
        CommentWalk { stack: self.comments.iter().rev().collect() }
    }

    /// Count of comments actually materialized in the tree.
    pub fn materialized_comments(&self) -> usize {
        self.comments.iter().map(CommentNode::subtree_len).sum()
    }
}

/// Depth-first, pre-order iterator over a comment forest.
pub struct CommentWalk<'a> {
    stack: Vec<&'a CommentNode>,
}

impl<'a> Iterator for CommentWalk<'a> {
    type Item = &'a CommentNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.replies.iter().rev());
        Some(node)
    }
}

/// Convert a fractional unix timestamp (as the forum API reports it) to UTC.
/// Out-of-range values clamp to the epoch.
pub fn datetime_from_epoch(secs: f64) -> OffsetDateTime {
    if !secs.is_finite() {
        return OffsetDateTime::UNIX_EPOCH;
    }
    OffsetDateTime::from_unix_timestamp(secs.trunc() as i64).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// RFC 3339 string form for timestamps in persisted records.
pub(crate) mod rfc3339 {
    use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(dt: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        let text = dt.format(&Rfc3339).map_err(S::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
        let text = String::deserialize(d)?;
        OffsetDateTime::parse(&text, &Rfc3339).map_err(D::Error::custom)
    }
}
