//! Shared access signatures for blobs.
//!
//! Tokens are read-only and time-bounded. They are minted fresh on every
//! request and never persisted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::errors::{StorageError, StorageResult};
use crate::domain::names::{BlobName, ContainerName};

/// Default token lifetime in minutes.
pub const DEFAULT_SAS_EXPIRY_MINUTES: u32 = 30;

/// Service version the string-to-sign layout below belongs to.
pub const SAS_VERSION: &str = "2020-12-06";

const EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Permissions and lifetime of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedAccessPolicy {
    pub permissions: &'static str,
    pub expires_on: DateTime<Utc>,
}

impl SharedAccessPolicy {
    /// Read-only access that expires `minutes` after `now`.
    pub fn read_only(now: DateTime<Utc>, minutes: u32) -> StorageResult<Self> {
        if minutes == 0 {
            return Err(StorageError::InvalidArgument(
                "shared access expiry must be at least one minute".to_string(),
            ));
        }
        Ok(Self {
            permissions: "r",
            expires_on: now + Duration::minutes(i64::from(minutes)),
        })
    }
}

/// A signed query string, without the leading `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedAccessToken {
    query: String,
    expires_on: DateTime<Utc>,
}

impl SharedAccessToken {
    pub fn as_query(&self) -> &str {
        &self.query
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }
}

/// Sign a blob-scoped service SAS with the account key.
///
/// String-to-sign (one field per line, unused fields empty):
/// permissions, start, expiry, canonicalized resource, identifier, IP,
/// protocol, version, resource, snapshot time, encryption scope, then the
/// five response-header overrides.
pub fn sign_blob_token(
    account_name: &str,
    account_key: &[u8],
    container: &ContainerName,
    blob: &BlobName,
    policy: &SharedAccessPolicy,
) -> StorageResult<SharedAccessToken> {
    // Truncate to whole seconds: the signed value must match `se` exactly.
    let expiry = policy.expires_on.format(EXPIRY_FORMAT).to_string();
    let canonicalized_resource = format!("/blob/{account_name}/{container}/{blob}");

    let string_to_sign = [
        policy.permissions,
        "",
        expiry.as_str(),
        canonicalized_resource.as_str(),
        "",
        "",
        "",
        SAS_VERSION,
        "b",
        "",
        "",
        "",
        "",
        "",
        "",
        "",
    ]
    .join("\n");

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(account_key)
        .map_err(|e| StorageError::Configuration(format!("account key rejected: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("sv", SAS_VERSION)
        .append_pair("se", &expiry)
        .append_pair("sr", "b")
        .append_pair("sp", policy.permissions)
        .append_pair("sig", &signature)
        .finish();

    Ok(SharedAccessToken {
        query,
        expires_on: policy.expires_on,
    })
}
