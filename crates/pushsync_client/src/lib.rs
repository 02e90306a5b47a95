//! # pushsync client
//!
//! The authenticated HTTP side of pushsync: request signing, access tokens
//! and a durable queue for requests that must survive restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                 ApiClient                  │
//! │  token fetch (single-flight per identity)  │
//! │  token retry on 11003, side channels       │
//! ├──────────────────────┬─────────────────────┤
//! │    RequestSigner     │  AccessTokenStore   │
//! │  HMAC-SHA1 over the  │  per-identity cache │
//! │  canonical request   │  over KeyValueStore │
//! ├──────────────────────┴─────────────────────┤
//! │      Transport (reqwest, or a mock)        │
//! └────────────────────────────────────────────┘
//! ```
//!
//! [`RequestVault`] sits on top of [`ApiClient`] and replays queued requests,
//! backing off on network failures.
//!
//! ## Key Invariants
//!
//! - Every request carries `sdkVersion` and the `X-WonderPush-Authorization`
//!   signature over its final parameters
//! - At most one access token fetch runs per identity at a time
//! - A disabled client never touches the network
//! - Nothing in the vault runs while consent is withheld

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod consent;
mod credentials;
mod error;
mod http;
mod params;
mod query;
mod request;
mod response;
mod runner;
mod signer;
mod time_sync;
mod transport;
mod vault;

pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use consent::ConsentGate;
pub use credentials::{AccessTokenRecord, AccessTokenStore, CREDENTIALS_KEY_PREFIX};
pub use error::{ClientError, ClientResult, ERROR_INVALID_ACCESS_TOKEN, ERROR_INVALID_CREDENTIALS};
pub use http::ReqwestTransport;
pub use params::{ParamValue, Params};
pub use query::parse_query;
pub use request::{ApiRequest, HttpMethod};
pub use response::ApiResponse;
pub use runner::{ApiClient, ACCESS_TOKEN_RESOURCE};
pub use signer::{percent_encode, RequestSigner, AUTHORIZATION_HEADER};
pub use time_sync::TimeSync;
pub use transport::{HttpRequest, HttpResponse, MockTransport, Transport};
pub use reqwest::Url;
pub use vault::{RequestQueue, RequestVault, StoredRequestQueue, VaultConfig, VaultStep, VAULT_KEY_PREFIX};
