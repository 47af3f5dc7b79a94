//! Table entity model.
//!
//! # 二層構造
//! - **表層（Typed）**: `TableEntity` trait - 呼び出し元が定義する任意の型
//! - **内部（Dynamic）**: `DynamicEntity` - store が扱う属性マップ
//!
//! 型付きエンティティは専用の Serializer（`attributes`）で属性型を保ったまま
//! `DynamicEntity` に変換され、読み出しは serde_json を経由します。
//! フラットなスカラー属性のマップにならない型は、リモート呼び出しの前に
//! `StorageError::InvalidArgument` で拒否されます。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::domain::attributes::{format_timestamp, to_properties};
use crate::domain::blob::ETag;
use crate::domain::errors::{StorageError, StorageResult};

pub const PARTITION_KEY: &str = "PartitionKey";
pub const ROW_KEY: &str = "RowKey";
pub const TIMESTAMP: &str = "Timestamp";

/// Maximum key length accepted by the store.
const MAX_KEY_CHARS: usize = 1024;

/// TableEntity は table に保存できる型
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Customer {
///     #[serde(rename = "PartitionKey")]
///     region: String,
///     #[serde(rename = "RowKey")]
///     email: String,
///     name: String,
///     visits: i32,
/// }
///
/// impl TableEntity for Customer {
///     fn partition_key(&self) -> &str { &self.region }
///     fn row_key(&self) -> &str { &self.email }
/// }
/// ```
///
/// 読み出し時には `PartitionKey` / `RowKey` / `Timestamp` が属性として
/// 渡されるため、それらを受け取りたいフィールドは serde で rename します。
pub trait TableEntity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn partition_key(&self) -> &str;

    fn row_key(&self) -> &str;

    fn key(&self) -> EntityKey {
        EntityKey::new(self.partition_key(), self.row_key())
    }
}

/// The two-part key that uniquely identifies an entity within a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub partition_key: String,
    pub row_key: String,
}

impl EntityKey {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }

    /// Keys may not contain `/`, `\`, `#`, `?` or control characters.
    pub fn validate(&self) -> StorageResult<()> {
        validate_key_part(PARTITION_KEY, &self.partition_key)?;
        validate_key_part(ROW_KEY, &self.row_key)
    }
}

fn validate_key_part(label: &str, value: &str) -> StorageResult<()> {
    if value.chars().count() > MAX_KEY_CHARS {
        return Err(StorageError::InvalidArgument(format!(
            "{label} exceeds {MAX_KEY_CHARS} characters"
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control())
    {
        return Err(StorageError::InvalidArgument(format!(
            "{label} {value:?} contains disallowed character {c:?}"
        )));
    }
    Ok(())
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityProperty {
    String(String),
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    DateTime(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl EntityProperty {
    fn into_json(self) -> Value {
        match self {
            EntityProperty::String(s) => Value::String(s),
            EntityProperty::Boolean(b) => Value::Bool(b),
            EntityProperty::Int32(i) => Value::Number(i.into()),
            EntityProperty::Int64(i) => Value::Number(i.into()),
            EntityProperty::Double(d) => Number::from_f64(d).map_or(Value::Null, Value::Number),
            EntityProperty::DateTime(t) => Value::String(format_timestamp(t)),
            EntityProperty::Binary(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
        }
    }
}

/// The untyped form of an entity, as exchanged with the store.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicEntity {
    pub key: EntityKey,
    pub properties: BTreeMap<String, EntityProperty>,
    /// Assigned by the store on every write.
    pub timestamp: Option<DateTime<Utc>>,
    /// Assigned by the store on every write; `None` on entities not read back yet.
    pub etag: Option<ETag>,
}

impl DynamicEntity {
    pub fn new(key: EntityKey) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
            timestamp: None,
            etag: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: EntityProperty) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Convert a caller-defined entity into its attribute map.
    pub fn from_entity<T: TableEntity>(entity: &T) -> StorageResult<Self> {
        let key = entity.key();
        key.validate()?;

        let properties = to_properties(entity)?;

        Ok(Self {
            key,
            properties,
            timestamp: None,
            etag: None,
        })
    }

    /// Decode into a caller-defined entity type.
    pub fn into_entity<T: TableEntity>(self) -> StorageResult<T> {
        let mut fields = Map::new();
        fields.insert(PARTITION_KEY.to_string(), Value::String(self.key.partition_key.clone()));
        fields.insert(ROW_KEY.to_string(), Value::String(self.key.row_key.clone()));
        if let Some(timestamp) = self.timestamp {
            fields.insert(TIMESTAMP.to_string(), Value::String(format_timestamp(timestamp)));
        }
        for (name, property) in self.properties {
            fields.insert(name, property.into_json());
        }

        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            StorageError::InvalidArgument(format!(
                "entity ({}, {}) does not match the requested type: {e}",
                self.key.partition_key, self.key.row_key
            ))
        })
    }

    /// Merge semantics: attributes present here win, the rest are kept.
    pub fn merge_into(self, existing: &DynamicEntity) -> DynamicEntity {
        let mut properties = existing.properties.clone();
        properties.extend(self.properties);
        DynamicEntity { properties, ..self }
    }
}
