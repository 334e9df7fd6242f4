//! Typed client for the CLM backend
//!
//! `ApiClient` owns the HTTP connection pool and a handle on the session
//! (`clm_auth::Session`). Every capability method returns an `ApiResponse`
//! envelope; transport failures, expired sessions and backend errors are all
//! reported through it rather than as `Err`.
//!
//! ```no_run
//! # async fn demo() -> clm_client::Result<()> {
//! use clm_client::{ApiClient, ClientConfig, ListParams};
//!
//! let client = ApiClient::new(ClientConfig::from_env()?, clm_auth::Session::in_memory())?;
//! let contracts = client.list_contracts(&ListParams::new().status("draft")).await;
//! if let Some(list) = contracts.data {
//!     println!("{} of {} contracts", list.items.len(), list.total);
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
pub mod client;
pub mod config;
mod contracts;
pub mod envelope;
pub mod error;
pub mod generation;
pub mod metrics;
pub mod models;
mod review;
pub mod template;
mod templates;
mod workflows;
mod workspace;

pub use client::{ApiClient, Auth, ListParams, RequestDescriptor};
pub use config::ClientConfig;
pub use envelope::{ApiFailure, ApiResponse, FailureKind, ListEnvelope, normalize_list};
pub use error::{Error, Result};
pub use generation::{AiDraftSession, GenerationOutcome, GenerationRequest, GenerationSink};
pub use template::{fill_placeholders, placeholders};
pub use tokio_util::sync::CancellationToken;
