//! Resource names (strongly-typed, validated).
//!
//! # Phantom Type パターン
//! `ResourceName<K>` というジェネリック型で共通実装を提供しつつ、
//! `K` はマーカー型として、コンテナ名・キュー名・テーブル名の混同を
//! コンパイル時に防ぎます。
//!
//! 名前の検証はリモート呼び出しの前に行われ、違反は
//! `StorageError::InvalidArgument` になります。

use std::fmt;
use std::marker::PhantomData;

use crate::domain::errors::{StorageError, StorageResult};

/// NameKind は各リソース種別のマーカー trait
pub trait NameKind: Send + Sync + 'static {
    /// エラーメッセージで使うラベル（例: "container", "queue"）
    fn label() -> &'static str;

    /// 命名規則の検証。違反の理由を返す。
    fn validate(name: &str) -> Result<(), String>;
}

/// ジェネリックなリソース名
///
/// # 例
/// ```ignore
/// let queue = QueueName::parse("orders")?;
/// let table = TableName::parse("Orders2024")?;
/// // queue と table は異なる型なので、混同できない
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName<K: NameKind> {
    name: String,
    _marker: PhantomData<K>,
}

impl<K: NameKind> ResourceName<K> {
    /// 検証してから作成
    pub fn parse(name: &str) -> StorageResult<Self> {
        K::validate(name).map_err(|reason| {
            StorageError::InvalidArgument(format!("invalid {} name {name:?}: {reason}", K::label()))
        })?;
        Ok(Self {
            name: name.to_string(),
            _marker: PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl<K: NameKind> AsRef<str> for ResourceName<K> {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl<K: NameKind> TryFrom<&str> for ResourceName<K> {
    type Error = StorageError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::parse(name)
    }
}

impl<K: NameKind> fmt::Display for ResourceName<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ========================================
// 命名規則
// ========================================

/// Shared rule for containers and queues: 3-63 chars of lowercase letters,
/// digits and `-`, alphanumeric at both ends, no `--`.
fn validate_dns_style(name: &str) -> Result<(), String> {
    let len = name.len();
    if !(3..=63).contains(&len) {
        return Err(format!("length must be 3-63 characters, got {len}"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err("only lowercase letters, digits and '-' are allowed".to_string());
    }
    let bytes = name.as_bytes();
    if !bytes[0].is_ascii_alphanumeric() || !bytes[len - 1].is_ascii_alphanumeric() {
        return Err("must start and end with a letter or digit".to_string());
    }
    if name.contains("--") {
        return Err("consecutive '-' characters are not allowed".to_string());
    }
    Ok(())
}

/// Container のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Container {}

impl NameKind for Container {
    fn label() -> &'static str {
        "container"
    }

    fn validate(name: &str) -> Result<(), String> {
        if matches!(name, "$root" | "$logs" | "$web") {
            return Ok(());
        }
        validate_dns_style(name)
    }
}

/// Queue のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Queue {}

impl NameKind for Queue {
    fn label() -> &'static str {
        "queue"
    }

    fn validate(name: &str) -> Result<(), String> {
        validate_dns_style(name)
    }
}

/// Table のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {}

impl NameKind for Table {
    fn label() -> &'static str {
        "table"
    }

    fn validate(name: &str) -> Result<(), String> {
        let len = name.len();
        if !(3..=63).contains(&len) {
            return Err(format!("length must be 3-63 characters, got {len}"));
        }
        if !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err("only letters and digits are allowed".to_string());
        }
        if !name.as_bytes()[0].is_ascii_alphabetic() {
            return Err("must start with a letter".to_string());
        }
        if name.eq_ignore_ascii_case("tables") {
            return Err("\"tables\" is reserved".to_string());
        }
        Ok(())
    }
}

/// Blob のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Blob {}

impl NameKind for Blob {
    fn label() -> &'static str {
        "blob"
    }

    fn validate(name: &str) -> Result<(), String> {
        let chars = name.chars().count();
        if chars == 0 || chars > 1024 {
            return Err(format!("length must be 1-1024 characters, got {chars}"));
        }
        if name.ends_with('.') || name.ends_with('/') {
            return Err("must not end with '.' or '/'".to_string());
        }
        Ok(())
    }
}

// ========================================
// Type Alias
// ========================================

pub type ContainerName = ResourceName<Container>;

pub type QueueName = ResourceName<Queue>;

pub type TableName = ResourceName<Table>;

pub type BlobName = ResourceName<Blob>;
