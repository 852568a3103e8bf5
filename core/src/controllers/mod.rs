//! Stateful request controllers.
//!
//! Each controller wraps one kind of server interaction and publishes its
//! state through a `tokio::sync::watch` channel, so a view can either read a
//! snapshot with `state()` or `subscribe()` and re-render on change:
//!
//! ```text
//! idle ──call──▶ loading ──ok──▶ data
//!                   │
//!                   └───err──▶ error (+ notification)
//! ```
//!
//! Controllers share three rules:
//! - only the most recently issued call of a controller may commit, so an
//!   older response arriving late never overwrites a newer one;
//! - `teardown` cancels what is in flight and suppresses any later commit
//!   or notification;
//! - failures are reported once through the injected `Notifier` and left in
//!   the state's `error` field for inline display.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::ApiError;

mod fetch;
mod mutation;
mod pagination;
mod upload;

pub use fetch::{Fetch, FetchState};
pub use mutation::{Mutation, MutationState};
pub use pagination::{PageState, Paginator};
pub use upload::{UploadPolicy, UploadState, Uploader, UPLOAD_FAILED_MESSAGE, UPLOAD_SUCCESS_MESSAGE};

/// A boxed asynchronous API operation taking `A`.
pub type Operation<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

pub(crate) fn boxed<A, T, F, Fut>(operation: F) -> Operation<A, T>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    Arc::new(move |args| operation(args).boxed())
}
