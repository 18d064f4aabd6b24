use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::native_string::NativeString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    None,
    Boolean,
    UnsignedInt,
    SignedInt,
    Double,
    String,
}

impl VariantKind {
    pub fn label(self) -> &'static str {
        match self {
            VariantKind::None => "none",
            VariantKind::Boolean => "boolean",
            VariantKind::UnsignedInt => "uint",
            VariantKind::SignedInt => "int",
            VariantKind::Double => "double",
            VariantKind::String => "string",
        }
    }
}

/// Primitive value crossing the host/script boundary.
///
/// Numeric payloads live inline; the string payload is a shared
/// [`NativeString`], so cloning a string variant only bumps a count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    None,
    Boolean(bool),
    UnsignedInt(u64),
    SignedInt(i64),
    Double(f64),
    String(NativeString),
}

impl Variant {
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::None => VariantKind::None,
            Variant::Boolean(_) => VariantKind::Boolean,
            Variant::UnsignedInt(_) => VariantKind::UnsignedInt,
            Variant::SignedInt(_) => VariantKind::SignedInt,
            Variant::Double(_) => VariantKind::Double,
            Variant::String(_) => VariantKind::String,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().label()
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Variant::None)
    }

    /// Replaces the payload. The previous string reference is released
    /// before the new value is adopted.
    pub fn set(&mut self, value: impl Into<Variant>) {
        self.reset();
        *self = value.into();
    }

    /// `None` mirrors a null source string and leaves the value untouched.
    pub fn set_str(&mut self, value: Option<&str>) {
        if let Some(value) = value {
            self.set(value);
        }
    }

    pub fn reset(&mut self) {
        *self = Variant::None;
    }

    /// Tag-checked read: `None` when the stored tag is not `T`'s tag.
    pub fn get<T: FromVariant>(&self) -> Option<T> {
        T::from_variant(self)
    }

    /// Writes into `out` only when the tag matches.
    pub fn get_into<T: FromVariant>(&self, out: &mut T) -> bool {
        match T::from_variant(self) {
            Some(value) => {
                *out = value;
                true
            }
            None => false,
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match *self {
            Variant::UnsignedInt(v) => Some(v as f64),
            Variant::SignedInt(v) => Some(v as f64),
            Variant::Double(v) => Some(v),
            _ => None,
        }
    }
}

pub trait FromVariant: Sized {
    fn from_variant(variant: &Variant) -> Option<Self>;
}

impl FromVariant for bool {
    fn from_variant(variant: &Variant) -> Option<Self> {
        match variant {
            Variant::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromVariant for u64 {
    fn from_variant(variant: &Variant) -> Option<Self> {
        match variant {
            Variant::UnsignedInt(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromVariant for i64 {
    fn from_variant(variant: &Variant) -> Option<Self> {
        match variant {
            Variant::SignedInt(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromVariant for f64 {
    fn from_variant(variant: &Variant) -> Option<Self> {
        match variant {
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromVariant for NativeString {
    fn from_variant(variant: &Variant) -> Option<Self> {
        match variant {
            Variant::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromVariant for String {
    fn from_variant(variant: &Variant) -> Option<Self> {
        match variant {
            Variant::String(v) => Some(v.to_string_lossy().into_owned()),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Boolean(value)
    }
}

impl From<u64> for Variant {
    fn from(value: u64) -> Self {
        Variant::UnsignedInt(value)
    }
}

impl From<u32> for Variant {
    fn from(value: u32) -> Self {
        Variant::UnsignedInt(value.into())
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::SignedInt(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::SignedInt(value.into())
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

impl From<f32> for Variant {
    fn from(value: f32) -> Self {
        Variant::Double(value.into())
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(NativeString::from(value))
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(NativeString::from(value))
    }
}

impl From<NativeString> for Variant {
    fn from(value: NativeString) -> Self {
        Variant::String(value)
    }
}

/// A named script call with its ordered arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: SmallVec<[Variant; 4]>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), args: SmallVec::new() }
    }

    pub fn arg(mut self, value: impl Into<Variant>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args(&self) -> &[Variant] {
        &self.args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_variant_is_none() {
        let value = Variant::default();
        assert_eq!(value.kind(), VariantKind::None);
        assert!(value.is_none());
    }

    #[test]
    fn typed_get_matches_only_its_own_tag() {
        let mut value = Variant::default();
        value.set(42_i64);
        assert_eq!(value.get::<i64>(), Some(42));
        assert_eq!(value.get::<u64>(), None);
        assert_eq!(value.get::<f64>(), None);
        assert_eq!(value.get::<bool>(), None);
        assert_eq!(value.get::<String>(), None);

        value.set(7_u64);
        assert_eq!(value.get::<u64>(), Some(7));
        value.set(true);
        assert_eq!(value.get::<bool>(), Some(true));
        value.set(0.25_f32);
        assert_eq!(value.get::<f64>(), Some(0.25));
        value.set("ship");
        assert_eq!(value.get::<String>().as_deref(), Some("ship"));
    }

    #[test]
    fn mismatched_get_into_leaves_output_untouched() {
        let value = Variant::from(3.5);
        let mut out: i64 = -9;
        assert!(!value.get_into(&mut out));
        assert_eq!(out, -9);

        let mut real = 0.0;
        assert!(value.get_into(&mut real));
        assert_eq!(real, 3.5);
    }

    #[test]
    fn null_string_source_is_a_no_op() {
        let mut value = Variant::from(11_i32);
        value.set_str(None);
        assert_eq!(value.get::<i64>(), Some(11));
        value.set_str(Some("player"));
        assert_eq!(value.kind(), VariantKind::String);
    }

    #[test]
    fn string_copies_release_storage_exactly_once() {
        let value = Variant::from("shared payload");
        let held = value.get::<NativeString>().expect("string payload");
        let copies: Vec<Variant> = (0..5).map(|_| value.clone()).collect();
        assert_eq!(held.ref_count(), 7, "original + five copies + held");

        drop(copies);
        drop(value);
        assert_eq!(held.ref_count(), 1, "only the held copy should remain");
    }

    #[test]
    fn reassignment_releases_previous_string() {
        let mut value = Variant::from("first");
        let held = value.get::<NativeString>().expect("string payload");
        assert_eq!(held.ref_count(), 2);
        value.set(1.0);
        assert_eq!(held.ref_count(), 1);
        assert_eq!(value.get::<f64>(), Some(1.0));
    }

    #[test]
    fn function_call_builder_keeps_argument_order() {
        let call = FunctionCall::new("spawn").arg(1_i32).arg("enemy").arg(false);
        assert_eq!(call.name, "spawn");
        let kinds: Vec<_> = call.args().iter().map(Variant::kind).collect();
        assert_eq!(kinds, vec![VariantKind::SignedInt, VariantKind::String, VariantKind::Boolean]);
    }

    #[test]
    fn variants_survive_json_and_bincode() {
        let values = vec![
            Variant::None,
            Variant::Boolean(true),
            Variant::UnsignedInt(u64::MAX),
            Variant::SignedInt(-4),
            Variant::Double(0.5),
            Variant::from("hi"),
        ];
        let json = serde_json::to_string(&values).expect("json encode");
        let from_json: Vec<Variant> = serde_json::from_str(&json).expect("json decode");
        assert_eq!(from_json, values);

        let bytes = bincode::serialize(&values).expect("bincode encode");
        let from_bincode: Vec<Variant> = bincode::deserialize(&bytes).expect("bincode decode");
        assert_eq!(from_bincode, values);
    }

    #[test]
    fn binary_formats_keep_non_utf8_string_bytes() {
        let value = Variant::String(NativeString::from_bytes(&[0x66, 0xff]));
        let bytes = bincode::serialize(&value).expect("bincode encode");
        let decoded: Variant = bincode::deserialize(&bytes).expect("bincode decode");
        let decoded = decoded.get::<NativeString>().expect("string payload");
        assert_eq!(decoded.as_bytes(), &[0x66, 0xff]);

        let json = serde_json::to_string(&value).expect("json encode");
        let lossy: Variant = serde_json::from_str(&json).expect("json decode");
        assert_eq!(lossy.get::<NativeString>().expect("string payload").as_bytes(), "f\u{fffd}".as_bytes());
    }
}

