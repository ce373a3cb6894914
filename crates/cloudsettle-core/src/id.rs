//! Composite identifiers for nested remote resources
//!
//! Sub-resources without a global ID are addressed by joining their parent
//! IDs into one opaque string. Two conventions are in use and both are
//! operator-visible, so they are kept as separate named codecs:
//!
//! - [`IdCodec::COLON`]: `record:zone:instance`
//! - [`IdCodec::SLASH`]: `cluster/pool/zone`

use crate::error::IdError;
use std::fmt;

/// Encoder/decoder for one separator convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdCodec {
    separator: char,
}

impl IdCodec {
    pub const COLON: IdCodec = IdCodec { separator: ':' };
    pub const SLASH: IdCodec = IdCodec { separator: '/' };

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Join `parts` into one identifier
    ///
    /// Fails when a part is empty or contains the separator, since such an
    /// identifier could not be decoded back into the same parts.
    pub fn encode<S: AsRef<str>>(&self, parts: &[S]) -> Result<String, IdError> {
        if parts.is_empty() {
            return Err(IdError::NoParts);
        }

        let mut id = String::new();
        for (position, part) in parts.iter().enumerate() {
            let part = part.as_ref();
            if part.is_empty() {
                return Err(IdError::EmptyPart {
                    id: self.join_lossy(parts),
                    position,
                });
            }
            if part.contains(self.separator) {
                return Err(IdError::SeparatorInPart {
                    part: part.to_string(),
                    separator: self.separator,
                });
            }
            if position > 0 {
                id.push(self.separator);
            }
            id.push_str(part);
        }
        Ok(id)
    }

    /// Split `id` into exactly `N` non-empty parts
    ///
    /// ```ignore
    /// let [cluster, pool, zone] = IdCodec::SLASH.decode(id)?;
    /// ```
    pub fn decode<const N: usize>(&self, id: &str) -> Result<[String; N], IdError> {
        let parts = self.decode_any(id)?;
        let found = parts.len();
        parts.try_into().map_err(|_| IdError::WrongArity {
            id: id.to_string(),
            separator: self.separator,
            expected: N,
            found,
        })
    }

    /// Split `id` into exactly `N` non-empty parts, the last one keeping any
    /// further separators
    ///
    /// For identifiers whose trailing part is itself separator-bearing, such
    /// as a CRN behind `record:zone:`.
    pub fn decode_tail<const N: usize>(&self, id: &str) -> Result<[String; N], IdError> {
        if N == 0 {
            return Err(IdError::NoParts);
        }
        let parts: Vec<String> = id.splitn(N, self.separator).map(str::to_string).collect();
        if let Some(position) = parts.iter().position(|p| p.is_empty()) {
            return Err(IdError::EmptyPart {
                id: id.to_string(),
                position,
            });
        }
        let found = parts.len();
        parts.try_into().map_err(|_| IdError::WrongArity {
            id: id.to_string(),
            separator: self.separator,
            expected: N,
            found,
        })
    }

    /// Join `parts` like [`encode`](Self::encode), except that the last part
    /// may contain the separator
    pub fn encode_tail<S: AsRef<str>>(&self, parts: &[S]) -> Result<String, IdError> {
        let Some((last, head)) = parts.split_last() else {
            return Err(IdError::NoParts);
        };
        let last = last.as_ref();
        if last.is_empty() {
            return Err(IdError::EmptyPart {
                id: self.join_lossy(parts),
                position: head.len(),
            });
        }
        if head.is_empty() {
            return Ok(last.to_string());
        }
        let mut id = self.encode(head)?;
        id.push(self.separator);
        id.push_str(last);
        Ok(id)
    }

    /// Split `id` into however many parts it has (at least one)
    pub fn decode_any(&self, id: &str) -> Result<Vec<String>, IdError> {
        let parts: Vec<String> = id.split(self.separator).map(str::to_string).collect();
        if let Some(position) = parts.iter().position(|p| p.is_empty()) {
            return Err(IdError::EmptyPart {
                id: id.to_string(),
                position,
            });
        }
        Ok(parts)
    }

    fn join_lossy<S: AsRef<str>>(&self, parts: &[S]) -> String {
        parts
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(&self.separator.to_string())
    }
}

/// A decoded composite identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    codec: IdCodec,
    parts: Vec<String>,
}

impl CompositeId {
    pub fn new<S: Into<String>>(
        codec: IdCodec,
        parts: impl IntoIterator<Item = S>,
    ) -> Result<Self, IdError> {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        // validates the parts
        codec.encode(&parts)?;
        Ok(Self { codec, parts })
    }

    /// Like [`new`](Self::new), but the last part may contain the separator
    pub fn with_tail<S: Into<String>>(
        codec: IdCodec,
        parts: impl IntoIterator<Item = S>,
    ) -> Result<Self, IdError> {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        codec.encode_tail(&parts)?;
        Ok(Self { codec, parts })
    }

    pub fn parse(codec: IdCodec, id: &str) -> Result<Self, IdError> {
        Ok(Self {
            codec,
            parts: codec.decode_any(id)?,
        })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn part(&self, index: usize) -> Option<&str> {
        self.parts.get(index).map(String::as_str)
    }

    /// The identifier of the parent: every part but the last
    pub fn parent(&self) -> Option<CompositeId> {
        if self.parts.len() < 2 {
            return None;
        }
        Some(Self {
            codec: self.codec,
            parts: self.parts[..self.parts.len() - 1].to_vec(),
        })
    }

    /// Append a child part, producing the identifier of a nested resource
    pub fn child(&self, part: impl Into<String>) -> Result<CompositeId, IdError> {
        let mut parts = self.parts.clone();
        parts.push(part.into());
        Self::new(self.codec, parts)
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.codec.join_lossy(&self.parts))
    }
}
