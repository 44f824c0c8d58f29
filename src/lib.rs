//! Async Rust core for an HSDP multi-service REST API client.
//!
//! Every resource-specific call in the SDK funnels through one dispatch
//! pipeline: build a request, attach a bearer token or signature headers,
//! submit it, decode the JSON (or envelope-wrapped JSON) response, and
//! classify failures into a small error taxonomy.
//!
//! # Modules
//!
//! - [`auth`]: Immutable auth context (bearer token and request signers).
//! - [`client`]: The request dispatcher and per-call [`client::AuthStrategy`].
//! - [`config`]: Per-family base URLs, credentials and timeouts (TOML).
//! - [`error`]: Typed error taxonomy (`ApiError`).
//! - [`request`]: Request descriptor and query options.
//! - [`response`]: Response envelope, bundles and data envelopes.
//! - [`service`]: Service families and their error-body shapes.
//! - [`signer`]: HMAC request signing schemes.
//!
//! # Quick Start
//!
//! ```ignore
//! use hsdp_api::client::{AuthStrategy, Client};
//! use hsdp_api::config::Config;
//! use hsdp_api::request::{Request, options};
//! use hsdp_api::service::Service;
//!
//! let config = Config::load("hsdp.toml")?;
//! let client = Client::new(config)?;
//!
//! let request = Request::get(Service::Mdm, "StandardService")
//!     .option(options(&search)?)?;
//! let services = client
//!     .dispatch_list::<StandardService>(request, AuthStrategy::Bearer)
//!     .await?;
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod service;
pub mod signer;

pub use client::{AuthStrategy, Client};
pub use error::{ApiError, Result};
