//! Strongly-typed identifiers for Quill entities.
//!
//! Following `TigerStyle`: explicit types prevent bugs from mixing up a log
//! key with a node name, or an offset with a stored value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Macro to generate strongly-typed string name wrappers.
///
/// Each name type wraps a `String` and provides:
/// - Type safety (can't pass a `NodeId` where a `LogKey` is expected)
/// - Debug/Display formatting
/// - Transparent serde encoding (a plain JSON string on the wire)
macro_rules! define_name {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new name from anything string-like.
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the name as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns the length of the name in bytes.
            #[inline]
            #[must_use]
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// Returns true if the name is empty.
            #[inline]
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name!(NodeId, "node", "Identifier of a node or client in the cluster (e.g. `n1`, `c7`).");
define_name!(LogKey, "key", "Name of one independent append-only log.");

impl NodeId {
    /// Returns true if this identifier names a client rather than a server node.
    ///
    /// Clients are named `c<N>`, servers `n<N>`, services by name (`lin-kv`).
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.0.starts_with('c')
    }
}

/// Position of one entry within a single log.
///
/// Offsets are allocated per key starting at 1; `Offset::ZERO` is the value an
/// absent counter reads as and is never handed out by the allocator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(u64);

impl Offset {
    /// The offset an absent counter reads as.
    pub const ZERO: Self = Self(0);

    /// The first offset ever allocated for a key.
    pub const FIRST: Self = Self(1);

    /// Creates an offset from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw offset value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next offset.
    ///
    /// # Panics
    /// Panics if the offset would overflow.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        assert!(self.0 < u64::MAX, "offset overflow");
        Self(self.0 + 1)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Offset> for u64 {
    fn from(offset: Offset) -> Self {
        offset.get()
    }
}

/// One immutable entry in a log.
///
/// Encoded on the wire as the two-element array `[offset, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(Offset, i64)", into = "(Offset, i64)")]
pub struct LogEntry {
    /// Position of the entry in its log.
    pub offset: Offset,
    /// The value the client sent.
    pub value: i64,
}

impl LogEntry {
    /// Creates a new entry.
    #[must_use]
    pub const fn new(offset: Offset, value: i64) -> Self {
        Self { offset, value }
    }
}

impl From<(Offset, i64)> for LogEntry {
    fn from((offset, value): (Offset, i64)) -> Self {
        Self { offset, value }
    }
}

impl From<LogEntry> for (Offset, i64) {
    fn from(entry: LogEntry) -> Self {
        (entry.offset, entry.value)
    }
}
