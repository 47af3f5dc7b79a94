//! Config - アカウントと接続先

pub mod account;

pub use account::{Credentials, Service, ServiceEndpoint, StorageAccount};
