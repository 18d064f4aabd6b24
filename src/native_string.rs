use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Add;
use std::rc::Rc;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Shared, immutable byte string. Clones share one buffer; mutation through
/// [`NativeString::push_str`] detaches the mutated copy first.
#[derive(Clone, Default)]
pub struct NativeString {
    bytes: Option<Rc<[u8]>>,
}

impl NativeString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        Self { bytes: Some(Rc::from(bytes)) }
    }

    pub fn len(&self) -> usize {
        self.bytes.as_ref().map_or(0, |bytes| bytes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or(&[])
    }

    /// `None` when the buffer is not valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Number of live handles sharing this buffer; zero for the empty string.
    pub fn ref_count(&self) -> usize {
        self.bytes.as_ref().map_or(0, Rc::strong_count)
    }

    pub fn ptr_eq(&self, other: &NativeString) -> bool {
        match (&self.bytes, &other.bytes) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Drops the first `len` bytes.
    pub fn chop_left(&self, len: usize) -> NativeString {
        if len >= self.len() {
            return NativeString::new();
        }
        NativeString::from_bytes(&self.as_bytes()[len..])
    }

    /// Drops the last `len` bytes.
    pub fn chop_right(&self, len: usize) -> NativeString {
        if len >= self.len() {
            return NativeString::new();
        }
        NativeString::from_bytes(&self.as_bytes()[..self.len() - len])
    }

    pub fn sub(&self, offset: usize, len: usize) -> NativeString {
        if offset >= self.len() {
            return NativeString::new();
        }
        if offset.saturating_add(len) >= self.len() {
            return self.chop_left(offset);
        }
        NativeString::from_bytes(&self.as_bytes()[offset..offset + len])
    }

    pub fn push_str(&mut self, tail: &str) {
        if tail.is_empty() {
            return;
        }
        let mut joined = Vec::with_capacity(self.len() + tail.len());
        joined.extend_from_slice(self.as_bytes());
        joined.extend_from_slice(tail.as_bytes());
        self.bytes = Some(Rc::from(joined));
    }

    fn concat(&self, tail: &[u8]) -> NativeString {
        let mut joined = Vec::with_capacity(self.len() + tail.len());
        joined.extend_from_slice(self.as_bytes());
        joined.extend_from_slice(tail);
        NativeString::from_bytes(&joined)
    }
}

impl From<&str> for NativeString {
    fn from(value: &str) -> Self {
        NativeString::from_bytes(value.as_bytes())
    }
}

impl From<String> for NativeString {
    fn from(value: String) -> Self {
        NativeString::from_bytes(value.as_bytes())
    }
}

impl From<&[u8]> for NativeString {
    fn from(value: &[u8]) -> Self {
        NativeString::from_bytes(value)
    }
}

impl Add<&NativeString> for &NativeString {
    type Output = NativeString;

    fn add(self, rhs: &NativeString) -> NativeString {
        self.concat(rhs.as_bytes())
    }
}

impl Add<&str> for &NativeString {
    type Output = NativeString;

    fn add(self, rhs: &str) -> NativeString {
        self.concat(rhs.as_bytes())
    }
}

impl PartialEq for NativeString {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for NativeString {}

impl PartialEq<str> for NativeString {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for NativeString {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Hash for NativeString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Display for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

/// Text formats get a lossy UTF-8 string; binary formats keep the exact bytes.
impl Serialize for NativeString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string_lossy())
        } else {
            serializer.serialize_bytes(self.as_bytes())
        }
    }
}

struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = NativeString;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a byte string")
    }

    fn visit_bytes<E: de::Error>(self, bytes: &[u8]) -> Result<Self::Value, E> {
        Ok(NativeString::from_bytes(bytes))
    }

    fn visit_byte_buf<E: de::Error>(self, bytes: Vec<u8>) -> Result<Self::Value, E> {
        Ok(NativeString::from_bytes(&bytes))
    }

    fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
        Ok(NativeString::from(text))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(NativeString::from_bytes(&bytes))
    }
}

impl<'de> Deserialize<'de> for NativeString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if !deserializer.is_human_readable() {
            return deserializer.deserialize_byte_buf(BytesVisitor);
        }
        String::deserialize(deserializer).map(NativeString::from)
    }
}
