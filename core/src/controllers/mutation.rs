use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::{boxed, Operation};
use crate::error::ApiError;
use crate::notify::{Notifier, MUTATION_SUCCESS_MESSAGE};
use crate::sequence::RequestSequence;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationState {
    pub loading: bool,
    pub error: Option<String>,
}

/// Runs a state-changing operation and reports its outcome.
///
/// Writes are never aborted once sent. `teardown` only stops a finished
/// write from touching state or raising a notification. `loading` stays set
/// while any call is in flight.
pub struct Mutation<A, T> {
    operation: Operation<A, T>,
    state: watch::Sender<MutationState>,
    in_flight: AtomicUsize,
    sequence: RequestSequence,
    notifier: Arc<dyn Notifier>,
}

impl<A, T> Mutation<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
{
    pub fn new<F, Fut>(operation: F, notifier: Arc<dyn Notifier>) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (state, _) = watch::channel(MutationState::default());
        Self {
            operation: boxed(operation),
            state,
            in_flight: AtomicUsize::new(0),
            sequence: RequestSequence::new(),
            notifier,
        }
    }

    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }

    pub async fn mutate(&self, args: A) -> Result<T, ApiError> {
        let ticket = self.sequence.issue();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = (self.operation)(args).await;
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;

        if ticket.is_cancelled() {
            tracing::debug!(seq = ticket.seq(), "mutation settled after teardown");
            if remaining == 0 {
                self.state.send_if_modified(|state| std::mem::replace(&mut state.loading, false));
            }
            return result;
        }

        match &result {
            Ok(_) => {
                self.state.send_modify(|state| state.loading = remaining > 0);
                self.notifier.success(MUTATION_SUCCESS_MESSAGE);
            }
            Err(e) => {
                let message = e.display_message();
                tracing::debug!(error = %e, "mutation failed");
                self.state.send_modify(|state| {
                    state.loading = remaining > 0;
                    state.error = Some(message.clone());
                });
                self.notifier.error(&message);
            }
        }
        result
    }

    pub fn teardown(&self) {
        self.sequence.cancel_all();
        self.state.send_modify(|state| state.loading = false);
    }
}
