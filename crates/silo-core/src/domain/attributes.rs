//! 型付きエンティティ → 属性マップの Serializer
//!
//! `serde_json::Value` を経由すると日時とバイナリが文字列・数値配列に
//! 潰れてしまうため、エンティティは専用の `Serializer` で直接
//! `EntityProperty` に変換します。
//!
//! # 型の対応
//! - `bool` → `Boolean`
//! - 整数 → `Int32`（収まる場合）/ `Int64`
//! - 有限の浮動小数点数 → `Double`（NaN / ±∞ はエラー）
//! - `DateTime<Utc>` が出力する RFC 3339 文字列 → `DateTime`
//! - その他の文字列・`char`・unit variant → `String`
//! - `u8` の列（`Vec<u8>`）・`serialize_bytes` → `Binary`
//! - `None` / unit → 保存しない
//! - ネストした構造 → エラー

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::ser::{self, Impossible};

use crate::domain::entity::{EntityProperty, PARTITION_KEY, ROW_KEY, TIMESTAMP};
use crate::domain::errors::{StorageError, StorageResult};

/// Serialize a caller-defined entity into its stored attributes.
///
/// Key and timestamp fields are skipped: the store owns them.
pub(crate) fn to_properties<T: Serialize + ?Sized>(entity: &T) -> StorageResult<Attributes> {
    entity
        .serialize(EntitySerializer)
        .map_err(|e| StorageError::InvalidArgument(e.0))
}

/// Canonical timestamp text, identical to what chrono's serde support writes.
pub(crate) fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Only exact canonical text is read as a timestamp, so any other string
/// round-trips unchanged.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(text).ok()?.with_timezone(&Utc);
    (format_timestamp(parsed) == text).then_some(parsed)
}

pub(crate) type Attributes = BTreeMap<String, EntityProperty>;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct AttributeError(String);

impl ser::Error for AttributeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

fn not_a_map() -> AttributeError {
    AttributeError("entity must serialize to a map of named attributes".to_string())
}

fn not_scalar() -> AttributeError {
    AttributeError("is not a scalar value".to_string())
}

macro_rules! reject {
    ($err:expr; $($method:ident($($arg:ty),*) -> $ret:ty;)*) => {
        $(
            fn $method(self, $(_: $arg),*) -> Result<$ret, Self::Error> {
                Err($err)
            }
        )*
    };
}

/// Top level: only structs and string-keyed maps are entities.
struct EntitySerializer;

impl ser::Serializer for EntitySerializer {
    type Ok = Attributes;
    type Error = AttributeError;
    type SerializeSeq = Impossible<Attributes, AttributeError>;
    type SerializeTuple = Impossible<Attributes, AttributeError>;
    type SerializeTupleStruct = Impossible<Attributes, AttributeError>;
    type SerializeTupleVariant = Impossible<Attributes, AttributeError>;
    type SerializeMap = AttributeMap;
    type SerializeStruct = AttributeMap;
    type SerializeStructVariant = Impossible<Attributes, AttributeError>;

    reject! { not_a_map();
        serialize_bool(bool) -> Self::Ok;
        serialize_i8(i8) -> Self::Ok;
        serialize_i16(i16) -> Self::Ok;
        serialize_i32(i32) -> Self::Ok;
        serialize_i64(i64) -> Self::Ok;
        serialize_u8(u8) -> Self::Ok;
        serialize_u16(u16) -> Self::Ok;
        serialize_u32(u32) -> Self::Ok;
        serialize_u64(u64) -> Self::Ok;
        serialize_f32(f32) -> Self::Ok;
        serialize_f64(f64) -> Self::Ok;
        serialize_char(char) -> Self::Ok;
        serialize_str(&str) -> Self::Ok;
        serialize_bytes(&[u8]) -> Self::Ok;
        serialize_none() -> Self::Ok;
        serialize_unit() -> Self::Ok;
        serialize_unit_struct(&'static str) -> Self::Ok;
        serialize_unit_variant(&'static str, u32, &'static str) -> Self::Ok;
        serialize_seq(Option<usize>) -> Self::SerializeSeq;
        serialize_tuple(usize) -> Self::SerializeTuple;
        serialize_tuple_struct(&'static str, usize) -> Self::SerializeTupleStruct;
        serialize_tuple_variant(&'static str, u32, &'static str, usize) -> Self::SerializeTupleVariant;
        serialize_struct_variant(&'static str, u32, &'static str, usize) -> Self::SerializeStructVariant;
    }

    fn serialize_some<T>(self, value: &T) -> Result<Self::Ok, Self::Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_struct<T>(self, _: &'static str, value: &T) -> Result<Self::Ok, Self::Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Self::Ok, Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Err(not_a_map())
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(AttributeMap::default())
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(AttributeMap::default())
    }
}

#[derive(Default)]
struct AttributeMap {
    properties: Attributes,
    pending_name: Option<String>,
}

impl AttributeMap {
    fn insert<T>(&mut self, name: &str, value: &T) -> Result<(), AttributeError>
    where
        T: ?Sized + Serialize,
    {
        if matches!(name, PARTITION_KEY | ROW_KEY | TIMESTAMP) {
            return Ok(());
        }
        let property = value
            .serialize(ScalarSerializer)
            .and_then(Scalar::into_property)
            .map_err(|e| AttributeError(format!("property {name} {e}")))?;
        if let Some(property) = property {
            self.properties.insert(name.to_string(), property);
        }
        Ok(())
    }
}

impl ser::SerializeStruct for AttributeMap {
    type Ok = Attributes;
    type Error = AttributeError;

    fn serialize_field<T>(&mut self, name: &'static str, value: &T) -> Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        self.insert(name, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(self.properties)
    }
}

impl ser::SerializeMap for AttributeMap {
    type Ok = Attributes;
    type Error = AttributeError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        match key.serialize(ScalarSerializer)? {
            Scalar::Str(name) => {
                self.pending_name = Some(name);
                Ok(())
            }
            _ => Err(AttributeError("attribute names must be strings".to_string())),
        }
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        let Some(name) = self.pending_name.take() else {
            return Err(AttributeError("attribute value without a name".to_string()));
        };
        self.insert(&name, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(self.properties)
    }
}

/// One attribute value, before its stored type is decided.
enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Byte(u8),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Scalar>),
}

impl Scalar {
    fn into_property(self) -> Result<Option<EntityProperty>, AttributeError> {
        let property = match self {
            Scalar::Null => return Ok(None),
            Scalar::Bool(b) => EntityProperty::Boolean(b),
            Scalar::Int(i) => match i32::try_from(i) {
                Ok(small) => EntityProperty::Int32(small),
                Err(_) => EntityProperty::Int64(i),
            },
            Scalar::Byte(b) => EntityProperty::Int32(i32::from(b)),
            Scalar::Float(f) => EntityProperty::Double(f),
            Scalar::Str(s) => match parse_timestamp(&s) {
                Some(t) => EntityProperty::DateTime(t),
                None => EntityProperty::String(s),
            },
            Scalar::Bytes(bytes) => EntityProperty::Binary(bytes),
            Scalar::Seq(items) => {
                let bytes = items
                    .into_iter()
                    .map(|item| match item {
                        Scalar::Byte(b) => Ok(b),
                        _ => Err(not_scalar()),
                    })
                    .collect::<Result<Vec<u8>, _>>()?;
                EntityProperty::Binary(bytes)
            }
        };
        Ok(Some(property))
    }
}

struct ScalarSerializer;

impl ser::Serializer for ScalarSerializer {
    type Ok = Scalar;
    type Error = AttributeError;
    type SerializeSeq = ScalarSeq;
    type SerializeTuple = Impossible<Scalar, AttributeError>;
    type SerializeTupleStruct = Impossible<Scalar, AttributeError>;
    type SerializeTupleVariant = Impossible<Scalar, AttributeError>;
    type SerializeMap = Impossible<Scalar, AttributeError>;
    type SerializeStruct = Impossible<Scalar, AttributeError>;
    type SerializeStructVariant = Impossible<Scalar, AttributeError>;

    reject! { not_scalar();
        serialize_tuple(usize) -> Self::SerializeTuple;
        serialize_tuple_struct(&'static str, usize) -> Self::SerializeTupleStruct;
        serialize_tuple_variant(&'static str, u32, &'static str, usize) -> Self::SerializeTupleVariant;
        serialize_map(Option<usize>) -> Self::SerializeMap;
        serialize_struct(&'static str, usize) -> Self::SerializeStruct;
        serialize_struct_variant(&'static str, u32, &'static str, usize) -> Self::SerializeStructVariant;
    }

    fn serialize_bool(self, v: bool) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Int(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Int(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Int(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Byte(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Int(i64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Int(i64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Scalar, AttributeError> {
        i64::try_from(v)
            .map(Scalar::Int)
            .map_err(|_| AttributeError("does not fit in a 64-bit signed integer".to_string()))
    }

    fn serialize_f32(self, v: f32) -> Result<Scalar, AttributeError> {
        ser::Serializer::serialize_f64(self, f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Scalar, AttributeError> {
        if !v.is_finite() {
            return Err(AttributeError(format!("is not a finite number ({v})")));
        }
        Ok(Scalar::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Str(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Bytes(v.to_vec()))
    }

    fn serialize_none(self) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Scalar, AttributeError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Null)
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Null)
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
    ) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Str(variant.to_string()))
    }

    fn serialize_newtype_struct<T>(self, _: &'static str, value: &T) -> Result<Scalar, AttributeError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Scalar, AttributeError>
    where
        T: ?Sized + Serialize,
    {
        Err(not_scalar())
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<ScalarSeq, AttributeError> {
        Ok(ScalarSeq {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }
}

/// Collects a sequence; only sequences of `u8` become attributes.
struct ScalarSeq {
    items: Vec<Scalar>,
}

impl ser::SerializeSeq for ScalarSeq {
    type Ok = Scalar;
    type Error = AttributeError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        match value.serialize(ScalarSerializer)? {
            byte @ Scalar::Byte(_) => {
                self.items.push(byte);
                Ok(())
            }
            _ => Err(not_scalar()),
        }
    }

    fn end(self) -> Result<Scalar, AttributeError> {
        Ok(Scalar::Seq(self.items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[derive(Serialize)]
    struct Row {
        #[serde(rename = "PartitionKey")]
        pk: &'static str,
        #[serde(rename = "RowKey")]
        rk: &'static str,
        at: DateTime<Utc>,
        label: &'static str,
        payload: Vec<u8>,
        small: u8,
        flag: bool,
        missing: Option<i64>,
    }

    #[test]
    fn attributes_keep_their_types() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let properties = to_properties(&Row {
            pk: "p",
            rk: "r",
            at,
            label: "2024-01-01T00:00:00+02:00",
            payload: vec![0, 1, 255],
            small: 7,
            flag: true,
            missing: None,
        })
        .unwrap();

        assert_eq!(properties["at"], EntityProperty::DateTime(at));
        assert_eq!(
            properties["label"],
            EntityProperty::String("2024-01-01T00:00:00+02:00".to_string())
        );
        assert_eq!(properties["payload"], EntityProperty::Binary(vec![0, 1, 255]));
        assert_eq!(properties["small"], EntityProperty::Int32(7));
        assert_eq!(properties["flag"], EntityProperty::Boolean(true));
        assert!(!properties.contains_key("missing"));
        assert!(!properties.contains_key(PARTITION_KEY));
        assert!(!properties.contains_key(ROW_KEY));
    }

    #[test]
    fn string_keyed_maps_are_entities() {
        let mut map = BTreeMap::new();
        map.insert("PartitionKey", 1_i64);
        map.insert("count", 1_i64 << 40);

        let properties = to_properties(&map).unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties["count"], EntityProperty::Int64(1 << 40));
    }

    #[rstest]
    #[case::nan(f64::NAN)]
    #[case::infinity(f64::INFINITY)]
    #[case::negative_infinity(f64::NEG_INFINITY)]
    fn non_finite_doubles_are_rejected(#[case] ratio: f64) {
        let mut map = BTreeMap::new();
        map.insert("ratio", ratio);

        let err = to_properties(&map).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(ref msg) if msg.contains("ratio")));
    }

    #[test]
    fn nested_attributes_are_rejected() {
        let mut map = BTreeMap::new();
        map.insert("tags", vec!["a".to_string()]);

        let err = to_properties(&map).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(ref msg) if msg.contains("tags")));
    }

    #[test]
    fn scalars_are_not_entities() {
        let err = to_properties(&42_i32).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(ref msg) if msg.contains("map")));
    }

    #[test]
    fn u64_beyond_i64_is_rejected() {
        let mut map = BTreeMap::new();
        map.insert("huge", u64::MAX);

        let err = to_properties(&map).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(ref msg) if msg.contains("64-bit")));
    }
}
