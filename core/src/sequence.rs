//! Per-controller request ordering and cancellation.
//!
//! Every call a controller issues takes a `Ticket`. A settled call may
//! commit to shared state only if its ticket is still the latest one issued
//! and has not been cancelled, so an older response arriving late never
//! overwrites a newer one. `cancel_all` aborts everything in flight, e.g.
//! when the owning view goes away.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

#[derive(Debug)]
pub struct RequestSequence {
    latest: AtomicU64,
    cancel: Mutex<CancellationToken>,
}

impl Default for RequestSequence {
    fn default() -> Self {
        Self {
            latest: AtomicU64::new(0),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ticket {
    seq: u64,
    cancel: CancellationToken,
}

impl Ticket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Ticket {
        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token();
        Ticket { seq, cancel }
    }

    /// Whether `ticket` may still commit.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        !ticket.is_cancelled() && self.latest.load(Ordering::SeqCst) == ticket.seq
    }

    /// Cancel every outstanding ticket. Tickets issued afterwards are live.
    pub fn cancel_all(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        cancel.cancel();
        *cancel = CancellationToken::new();
    }

    /// Drive `fut` unless `ticket` is cancelled first.
    pub async fn run<T, F>(&self, ticket: &Ticket, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        tokio::select! {
            biased;
            _ = ticket.cancel.cancelled() => Err(ApiError::Cancelled),
            result = fut => result,
        }
    }
}
