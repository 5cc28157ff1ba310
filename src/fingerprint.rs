//! Content fingerprints for observed runtime values
//!
//! A footprint holds heterogeneous values captured from the program under
//! observation. Deduplication and equality never look at object identity:
//! they look at a [`Fingerprint`] derived from a canonical encoding of the
//! value's contents.
//!
//! # Canonical encoding
//!
//! Any `Serialize` value is first encoded with rmp-serde (struct fields as
//! named map entries), then read back into a [`Canonical`] tree. The tree
//! keeps every distinction MessagePack keeps: integers apart from floats,
//! `f32` apart from `f64`, the sign of infinities, `nil` apart from `0`. Map
//! entries are ordered by key, so two maps with the same entries produce the
//! same tree regardless of insertion order. NaN payloads are collapsed to
//! one quiet NaN.
//!
//! The fingerprint is the SHA-256 of the Rust type name followed by the
//! MessagePack bytes of the tree. `5i32`, `5u64` and `Some(5i32)` encode to
//! the same bytes and differ only by type name.
//!
//! # Fallback
//!
//! Some values cannot be encoded ([`Opaque`] wrappers, `Serialize` impls
//! that fail). Those never abort footprint processing: their fingerprint
//! degrades to an identity token, a 64-bit FNV-1a hash of the type name and
//! the address of the shared allocation. Two distinct allocations are
//! therefore never considered equal, while the same allocation seen twice
//! still deduplicates.
//!
//! # Example
//!
//! ```
//! use huella::fingerprint::{fingerprint, observed};
//! use std::collections::HashMap;
//!
//! let mut a = HashMap::new();
//! a.insert("x".to_string(), 1);
//! a.insert("y".to_string(), 2);
//! let mut b = HashMap::new();
//! b.insert("y".to_string(), 2);
//! b.insert("x".to_string(), 1);
//!
//! assert_eq!(fingerprint(&observed(a)), fingerprint(&observed(b)));
//! ```

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while encoding a value canonically
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("value of type {type_name} cannot be encoded: {reason}")]
    Unserializable { type_name: String, reason: String },
}

/// Self-describing content tree of an encoded value
///
/// Serializes as the plain MessagePack value it describes, and reads any
/// self-describing input back into the same tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Canonical {
    Nil,
    Bool(bool),
    /// Negative integers only; non-negative ones are `UInt`
    Int(i64),
    UInt(u64),
    /// IEEE 754 bits
    F32(u32),
    /// IEEE 754 bits
    F64(u64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Canonical>),
    /// Entries ordered by key
    Map(Vec<(Canonical, Canonical)>),
}

impl Canonical {
    /// Tree of any serializable value
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Result<Self, String> {
        let bytes = rmp_serde::to_vec_named(value).map_err(|e| e.to_string())?;
        rmp_serde::from_slice(&bytes).map_err(|e| e.to_string())
    }

    fn integer(value: i64) -> Self {
        match u64::try_from(value) {
            Ok(unsigned) => Canonical::UInt(unsigned),
            Err(_) => Canonical::Int(value),
        }
    }

    fn float32(value: f32) -> Self {
        let value = if value.is_nan() { f32::NAN } else { value };
        Canonical::F32(value.to_bits())
    }

    fn float64(value: f64) -> Self {
        let value = if value.is_nan() { f64::NAN } else { value };
        Canonical::F64(value.to_bits())
    }
}

impl Serialize for Canonical {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Canonical::Nil => serializer.serialize_unit(),
            Canonical::Bool(v) => serializer.serialize_bool(*v),
            Canonical::Int(v) => serializer.serialize_i64(*v),
            Canonical::UInt(v) => serializer.serialize_u64(*v),
            Canonical::F32(bits) => serializer.serialize_f32(f32::from_bits(*bits)),
            Canonical::F64(bits) => serializer.serialize_f64(f64::from_bits(*bits)),
            Canonical::Str(v) => serializer.serialize_str(v),
            Canonical::Bytes(v) => serializer.serialize_bytes(v),
            Canonical::Seq(items) => serializer.collect_seq(items),
            Canonical::Map(entries) => serializer.collect_map(entries.iter().map(|(k, v)| (k, v))),
        }
    }
}

impl<'de> Deserialize<'de> for Canonical {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CanonicalVisitor)
    }
}

struct CanonicalVisitor;

impl<'de> Visitor<'de> for CanonicalVisitor {
    type Value = Canonical;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a self-describing value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Canonical, E> {
        Ok(Canonical::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Canonical, E> {
        Ok(Canonical::integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Canonical, E> {
        Ok(Canonical::UInt(v))
    }

    fn visit_f32<E: de::Error>(self, v: f32) -> Result<Canonical, E> {
        Ok(Canonical::float32(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Canonical, E> {
        Ok(Canonical::float64(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Canonical, E> {
        Ok(Canonical::Str(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Canonical, E> {
        Ok(Canonical::Str(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Canonical, E> {
        Ok(Canonical::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Canonical, E> {
        Ok(Canonical::Bytes(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Canonical, E> {
        Ok(Canonical::Nil)
    }

    fn visit_none<E: de::Error>(self) -> Result<Canonical, E> {
        Ok(Canonical::Nil)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Canonical, D::Error> {
        Canonical::deserialize(deserializer)
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Canonical, D::Error> {
        Canonical::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Canonical, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Canonical::Seq(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Canonical, A::Error> {
        let mut entries: Vec<(Canonical, Canonical)> =
            Vec::with_capacity(map.size_hint().unwrap_or(0).min(4096));
        while let Some(entry) = map.next_entry()? {
            entries.push(entry);
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Canonical::Map(entries))
    }
}

/// A runtime value that can be recorded in a footprint
///
/// Implemented for every `Serialize + Debug + Send + Sync + 'static` type, so
/// executors rarely implement it by hand. Values without a `Serialize` impl
/// can be recorded by wrapping them in [`Opaque`].
pub trait Observable: Any + fmt::Debug + Send + Sync {
    /// Canonical content tree of the value
    fn canonical(&self) -> Result<Canonical, FingerprintError>;

    /// Rust type name, part of the fingerprint and of identity tokens
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

impl<T> Observable for T
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn canonical(&self) -> Result<Canonical, FingerprintError> {
        Canonical::of(self).map_err(|reason| FingerprintError::Unserializable {
            type_name: std::any::type_name::<T>().to_string(),
            reason,
        })
    }

    fn type_name(&self) -> &str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared handle to a captured value
///
/// Values are captured by reference: the footprint keeps the allocation the
/// executor handed over, never a copy.
pub type ObservedValue = Arc<dyn Observable>;

/// Wrap a value into an [`ObservedValue`]
pub fn observed<T: Observable>(value: T) -> ObservedValue {
    Arc::new(value)
}

/// Wrapper for values that have no content encoding
///
/// Serializing an `Opaque` always fails, so its fingerprint is the identity
/// token of the allocation holding it.
pub struct Opaque<T>(pub T);

impl<T> fmt::Debug for Opaque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque<{}>", std::any::type_name::<T>())
    }
}

impl<T> Serialize for Opaque<T> {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom(format!(
            "{} has no content encoding",
            std::any::type_name::<T>()
        )))
    }
}

/// Stable identifier of an observed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fingerprint {
    /// SHA-256 of the canonical encoding
    Content([u8; 32]),

    /// FNV-1a token of type name and allocation address
    Identity(u64),
}

impl Fingerprint {
    /// True when the value could not be encoded
    pub fn is_identity(&self) -> bool {
        matches!(self, Fingerprint::Identity(_))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Content(digest) => write!(f, "sha256:{}", hex::encode(digest)),
            Fingerprint::Identity(token) => write!(f, "id:{:016x}", token),
        }
    }
}

/// Canonical byte encoding of a value
///
/// Layout: `type_name NUL msgpack(tree)`
pub fn canonical_bytes(value: &dyn Observable) -> Result<Vec<u8>, FingerprintError> {
    let tree = value.canonical()?;
    let encoded = rmp_serde::to_vec(&tree).map_err(|e| FingerprintError::Unserializable {
        type_name: value.type_name().to_string(),
        reason: e.to_string(),
    })?;

    let type_name = value.type_name().as_bytes();
    let mut bytes = Vec::with_capacity(type_name.len() + 1 + encoded.len());
    bytes.extend_from_slice(type_name);
    bytes.push(0);
    bytes.extend_from_slice(&encoded);
    Ok(bytes)
}

/// Compute the fingerprint of a captured value
///
/// Never fails and never mutates the value. Encoding failures are logged at
/// warn level and fall back to [`identity_token`].
pub fn fingerprint(value: &ObservedValue) -> Fingerprint {
    match canonical_bytes(&**value) {
        Ok(bytes) => Fingerprint::Content(Sha256::digest(&bytes).into()),
        Err(e) => {
            tracing::warn!("fingerprint falls back to identity token: {}", e);
            Fingerprint::Identity(identity_token(value))
        }
    }
}

/// Identity token of the allocation behind `value`
///
/// Hash format: `type_name::address`
pub fn identity_token(value: &ObservedValue) -> u64 {
    let address = Arc::as_ptr(value) as *const () as usize;

    let mut hasher = fnv::FnvHasher::default();
    hasher.write((**value).type_name().as_bytes());
    hasher.write(b"::");
    hasher.write(&address.to_le_bytes());
    hasher.finish()
}
