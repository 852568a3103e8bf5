//! Client core for the Prominis microjob marketplace API.
//!
//! # Overview
//! Two layers share the same request and response values:
//! - `ProminisClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network. Hosts that bring their own HTTP
//!   stack can use it directly.
//! - `ApiClient` executes those requests over a `Transport`, attaching the
//!   session's bearer token, bounding each call with a timeout and clearing
//!   the session on 401.
//!
//! On top of `ApiClient`, the `controllers` module provides stateful fetch,
//! pagination, mutation and upload controllers whose state is observable
//! through `tokio::sync::watch`, and `Authenticator` drives sign-in.
//! `validation` and `routes` are pure and need no runtime.
//!
//! # Design
//! - The session is an explicit handle passed to the facade, not a global.
//! - Every controller orders its own calls: a response superseded by a newer
//!   call of the same controller is never committed.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod controllers;
pub mod error;
pub mod http;
pub mod notify;
pub mod page;
pub mod routes;
pub mod sequence;
pub mod session;
pub mod transport;
pub mod types;
pub mod validation;

pub use api::ApiClient;
pub use auth::Authenticator;
pub use client::ProminisClient;
pub use config::ClientConfig;
pub use controllers::{Fetch, Mutation, Paginator, Uploader};
pub use error::{ApiError, ConfigError, ErrorKind};
pub use http::{FilePart, HttpMethod, HttpRequest, HttpResponse};
pub use notify::{Notifier, RecordingNotifier, TracingNotifier};
pub use page::{Page, PageParams, PageQuery, Pagination};
pub use routes::{Gate, Navigator, RouteTable};
pub use session::{FileTokenStore, MemoryTokenStore, Session, SessionState, TokenStore};
pub use transport::{ReqwestTransport, Transport};
pub use types::{Role, UserSummary};
pub use validation::{validate, Schema, ValidationResult};
