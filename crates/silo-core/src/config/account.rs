//! StorageAccount - 接続文字列の解析
//!
//! `key=value` を `;` で区切った接続文字列から、認証情報と
//! サービスごとのエンドポイント（primary / secondary）を組み立てます。
//!
//! # 使用例
//! ```ignore
//! let account = StorageAccount::parse(
//!     "DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=...;EndpointSuffix=core.windows.net",
//! )?;
//! let url = account.blob_url(&container, &blob)?;
//! ```

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use url::Url;

use crate::domain::{BlobName, ContainerName, StorageError, StorageResult};

pub const DEVELOPMENT_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Well-known key of the local storage emulator.
pub const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Blob,
    Queue,
    Table,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Blob => "blob",
            Service::Queue => "queue",
            Service::Table => "table",
        }
    }

    fn endpoint_key(self) -> &'static str {
        match self {
            Service::Blob => "blobendpoint",
            Service::Queue => "queueendpoint",
            Service::Table => "tableendpoint",
        }
    }

    fn development_port(self) -> u16 {
        match self {
            Service::Blob => 10000,
            Service::Queue => 10001,
            Service::Table => 10002,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How requests are authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    SharedKey { account_name: String, key: Vec<u8> },
    SharedAccessSignature(String),
    Anonymous,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::SharedKey { account_name, .. } => f
                .debug_struct("SharedKey")
                .field("account_name", account_name)
                .field("key", &"<redacted>")
                .finish(),
            Credentials::SharedAccessSignature(_) => {
                f.debug_tuple("SharedAccessSignature").field(&"<redacted>").finish()
            }
            Credentials::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// Primary endpoint plus the read-replica endpoint, when the account has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub primary: Url,
    pub secondary: Option<Url>,
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAccount {
    account_name: Option<String>,
    credentials: Credentials,
    blob: Option<ServiceEndpoint>,
    queue: Option<ServiceEndpoint>,
    table: Option<ServiceEndpoint>,
}

impl StorageAccount {
    /// The local storage emulator account.
    pub fn development() -> StorageResult<Self> {
        let endpoint = |service: Service| -> StorageResult<ServiceEndpoint> {
            let port = service.development_port();
            Ok(ServiceEndpoint {
                primary: parse_url(&format!("http://127.0.0.1:{port}/{DEVELOPMENT_ACCOUNT_NAME}"))?,
                secondary: Some(parse_url(&format!(
                    "http://127.0.0.1:{port}/{DEVELOPMENT_ACCOUNT_NAME}-secondary"
                ))?),
            })
        };
        Ok(Self {
            account_name: Some(DEVELOPMENT_ACCOUNT_NAME.to_string()),
            credentials: Credentials::SharedKey {
                account_name: DEVELOPMENT_ACCOUNT_NAME.to_string(),
                key: decode_key(DEVELOPMENT_ACCOUNT_KEY)?,
            },
            blob: Some(endpoint(Service::Blob)?),
            queue: Some(endpoint(Service::Queue)?),
            table: Some(endpoint(Service::Table)?),
        })
    }

    pub fn parse(connection_string: &str) -> StorageResult<Self> {
        let settings = parse_settings(connection_string)?;

        if settings
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Self::development();
        }

        let protocol = settings
            .get("defaultendpointsprotocol")
            .map(|p| p.to_ascii_lowercase())
            .unwrap_or_else(|| "https".to_string());
        if protocol != "https" && protocol != "http" {
            return Err(StorageError::Configuration(format!(
                "DefaultEndpointsProtocol must be http or https, got {protocol:?}"
            )));
        }
        let suffix = settings
            .get("endpointsuffix")
            .map_or(DEFAULT_ENDPOINT_SUFFIX, String::as_str);
        let account_name = settings.get("accountname").cloned();

        // Without AccountName only the explicitly configured services resolve.
        let endpoint = |service: Service| -> StorageResult<Option<ServiceEndpoint>> {
            if let Some(explicit) = settings.get(service.endpoint_key()) {
                return Ok(Some(ServiceEndpoint {
                    primary: parse_url(explicit)?,
                    secondary: None,
                }));
            }
            let Some(account) = account_name.as_deref() else {
                return Ok(None);
            };
            Ok(Some(ServiceEndpoint {
                primary: parse_url(&format!("{protocol}://{account}.{service}.{suffix}"))?,
                secondary: Some(parse_url(&format!(
                    "{protocol}://{account}-secondary.{service}.{suffix}"
                ))?),
            }))
        };
        let blob = endpoint(Service::Blob)?;
        let queue = endpoint(Service::Queue)?;
        let table = endpoint(Service::Table)?;
        if blob.is_none() && queue.is_none() && table.is_none() {
            return Err(StorageError::Configuration(
                "connection string has neither AccountName nor any service endpoint".to_string(),
            ));
        }

        let credentials = match (settings.get("accountkey"), settings.get("sharedaccesssignature")) {
            (Some(key), _) => {
                let Some(account) = account_name.clone() else {
                    return Err(StorageError::Configuration(
                        "AccountKey requires AccountName".to_string(),
                    ));
                };
                Credentials::SharedKey {
                    account_name: account,
                    key: decode_key(key)?,
                }
            }
            (None, Some(sas)) => {
                Credentials::SharedAccessSignature(sas.trim_start_matches('?').to_string())
            }
            (None, None) => Credentials::Anonymous,
        };

        Ok(Self {
            account_name,
            credentials,
            blob,
            queue,
            table,
        })
    }

    pub fn account_name(&self) -> Option<&str> {
        self.account_name.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Endpoint of `service`, or a configuration error when the connection
    /// string neither names the account nor gives that service's endpoint.
    pub fn endpoint(&self, service: Service) -> StorageResult<&ServiceEndpoint> {
        let endpoint = match service {
            Service::Blob => &self.blob,
            Service::Queue => &self.queue,
            Service::Table => &self.table,
        };
        endpoint.as_ref().ok_or_else(|| {
            StorageError::Configuration(format!(
                "connection string has neither AccountName nor a {service} endpoint"
            ))
        })
    }

    /// Account name and key for signing, or a configuration error when the
    /// account was not given a key.
    pub fn shared_key(&self) -> StorageResult<(&str, &[u8])> {
        match &self.credentials {
            Credentials::SharedKey { account_name, key } => {
                Ok((account_name.as_str(), key.as_slice()))
            }
            _ => Err(StorageError::Configuration(
                "issuing shared access signatures requires an AccountKey".to_string(),
            )),
        }
    }

    /// `{blob endpoint}/{container}/{blob}`, with the blob name's virtual
    /// directories kept as path segments.
    pub fn blob_url(&self, container: &ContainerName, blob: &BlobName) -> StorageResult<Url> {
        let primary = &self.endpoint(Service::Blob)?.primary;
        let mut url = primary.clone();
        url.path_segments_mut()
            .map_err(|()| {
                StorageError::Configuration(format!("blob endpoint {primary} cannot carry a path"))
            })?
            .pop_if_empty()
            .push(container.as_str())
            .extend(blob.as_str().split('/'));
        Ok(url)
    }
}

fn parse_settings(connection_string: &str) -> StorageResult<HashMap<String, String>> {
    let mut settings = HashMap::new();
    for pair in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(StorageError::Configuration(format!(
                "connection string segment {pair:?} is not a key=value pair"
            )));
        };
        settings.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    if settings.is_empty() {
        return Err(StorageError::Configuration(
            "connection string is empty".to_string(),
        ));
    }
    Ok(settings)
}

fn parse_url(raw: &str) -> StorageResult<Url> {
    Url::parse(raw).map_err(|e| StorageError::Configuration(format!("invalid endpoint {raw:?}: {e}")))
}

fn decode_key(key: &str) -> StorageResult<Vec<u8>> {
    BASE64_STANDARD
        .decode(key)
        .map_err(|e| StorageError::Configuration(format!("AccountKey is not valid base64: {e}")))
}
