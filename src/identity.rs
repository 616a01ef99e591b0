// src/identity.rs

//! Identifier translation between caller composite keys and opaque identifiers
//!
//! Callers address computations by composite keys (ordered field/value maps).
//! Internally everything is keyed by an [`Identifier`]: a SHA-256 digest of
//! the canonical JSON serialization of the key. The digest is a pure,
//! order-independent function of the key's contents, so the identifier space
//! is stable across processes and never contains caller key material.
//!
//! Reverse translation only works for identifiers produced by the same
//! [`Translator`] instance earlier in its lifetime. This trades global
//! invertibility for a content-independent identifier space: the translator
//! remembers `identifier -> key` as a side effect of forward translation and
//! nothing else.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Default bound on the reverse translation map
pub const DEFAULT_REVERSE_CAPACITY: usize = 4096;

/// A single field value in a composite key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Real(f64),
    Text(String),
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            // Real values compare by bit pattern
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Int(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Self::Real(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
            Self::Text(v) => {
                2u8.hash(state);
                v.hash(state);
            }
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for KeyValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A caller-supplied composite key
///
/// The ordered map makes the canonical serialization independent of the
/// order in which the caller inserted the fields.
pub type ExternalKey = BTreeMap<String, KeyValue>;

/// Opaque identifier standing in for an external composite key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap a stored identifier value
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the identifier as a hex string
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialize an external key into its canonical JSON form
///
/// This is also the storage key used by the persistence layer.
pub fn canonical_key(key: &ExternalKey) -> Result<String> {
    Ok(serde_json::to_string(key)?)
}

/// Derive the identifier for an external key
fn derive_identifier(key: &ExternalKey) -> Result<Identifier> {
    let canonical = canonical_key(key)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(Identifier(format!("{:x}", hasher.finalize())))
}

struct ReverseMap {
    entries: HashMap<Identifier, ExternalKey>,
    order: VecDeque<Identifier>,
    capacity: usize,
}

impl ReverseMap {
    fn insert(&mut self, identifier: Identifier, key: ExternalKey) {
        if self.entries.insert(identifier.clone(), key).is_some() {
            // Re-translation of a known key; insertion order stays as is
            return;
        }
        self.order.push_back(identifier);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                debug!(identifier = %evicted, "evicting reverse translation");
                self.entries.remove(&evicted);
            }
        }
    }
}

/// Translator between external composite keys and internal identifiers
///
/// Forward translation is pure and deterministic. Reverse translation is
/// backed by an in-memory map bounded at `capacity` entries; when the bound
/// is exceeded the oldest forward translation is evicted first, after which
/// a reverse lookup for it fails like one that was never seen.
pub struct Translator {
    inner: Mutex<ReverseMap>,
}

impl Translator {
    /// Create a translator with the default reverse-map capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REVERSE_CAPACITY)
    }

    /// Create a translator with a custom reverse-map capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(ReverseMap {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity,
            }),
        }
    }

    /// Translate an external key into its identifier
    ///
    /// Records `identifier -> key` as a side effect. The stored key is a
    /// defensive copy: mutating the caller's key afterwards does not change
    /// a later reverse lookup.
    pub fn to_internal(&self, key: &ExternalKey) -> Result<Identifier> {
        let identifier = derive_identifier(key)?;
        let mut inner = self.inner.lock().expect("translator mutex poisoned");
        inner.insert(identifier.clone(), key.clone());
        Ok(identifier)
    }

    /// Translate an identifier back into its external key
    pub fn to_external(&self, identifier: &Identifier) -> Result<ExternalKey> {
        let inner = self.inner.lock().expect("translator mutex poisoned");
        inner
            .entries
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Identifier '{identifier}'")))
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Translator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().expect("translator mutex poisoned");
        f.debug_struct("Translator")
            .field("entries", &inner.entries.len())
            .field("capacity", &inner.capacity)
            .finish()
    }
}
