use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use super::{boxed, Operation};
use crate::error::ApiError;
use crate::notify::Notifier;
use crate::sequence::RequestSequence;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

/// Runs one read operation and keeps the last committed result.
///
/// A failed call keeps the previously fetched `data` alongside the new
/// `error`, so a view can go on showing stale content under an error banner.
pub struct Fetch<A, T> {
    operation: Operation<A, T>,
    state: watch::Sender<FetchState<T>>,
    sequence: RequestSequence,
    notifier: Arc<dyn Notifier>,
    dependencies: Mutex<Option<Vec<String>>>,
}

impl<A, T> Fetch<A, T>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(operation: F, notifier: Arc<dyn Notifier>) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (state, _) = watch::channel(FetchState::default());
        Self {
            operation: boxed(operation),
            state,
            sequence: RequestSequence::new(),
            notifier,
            dependencies: Mutex::new(None),
        }
    }

    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }

    /// Invoke the operation with `args`. The settled result is always
    /// returned to the caller, but only the latest call commits to state.
    pub async fn refetch(&self, args: A) -> Result<T, ApiError> {
        let ticket = self.sequence.issue();
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = self.sequence.run(&ticket, (self.operation)(args)).await;

        if ticket.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        if !self.sequence.is_current(&ticket) {
            tracing::debug!(seq = ticket.seq(), "discarding superseded fetch result");
            return result;
        }

        match &result {
            Ok(data) => self.state.send_modify(|state| {
                state.data = Some(data.clone());
                state.loading = false;
                state.error = None;
            }),
            Err(e) => {
                let message = e.display_message();
                tracing::debug!(error = %e, "fetch failed");
                self.state.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(message.clone());
                });
                self.notifier.error(&message);
            }
        }
        result
    }

    /// Refetch when `dependencies` differ from the previous call. An empty
    /// list never triggers; an unchanged list returns `Ok(None)`.
    pub async fn sync_dependencies(&self, dependencies: Vec<String>, args: A) -> Result<Option<T>, ApiError> {
        if dependencies.is_empty() {
            return Ok(None);
        }
        {
            let mut last = self.dependencies.lock().unwrap_or_else(PoisonError::into_inner);
            if last.as_ref() == Some(&dependencies) {
                return Ok(None);
            }
            *last = Some(dependencies);
        }
        self.refetch(args).await.map(Some)
    }

    /// Abort every call in flight; none of them will commit or notify.
    pub fn teardown(&self) {
        self.sequence.cancel_all();
        self.state.send_modify(|state| state.loading = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting() -> (Arc<AtomicUsize>, Fetch<u32, String>, Arc<RecordingNotifier>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(RecordingNotifier::default());
        let counter = calls.clone();
        let fetch = Fetch::new(
            move |n: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(format!("item-{n}")) }
            },
            notifier.clone(),
        );
        (calls, fetch, notifier)
    }

    #[tokio::test]
    async fn refetch_commits_data() {
        let (_, fetch, notifier) = counting();
        assert_eq!(fetch.state(), FetchState::default());

        let data = fetch.refetch(7).await.unwrap();
        assert_eq!(data, "item-7");
        let state = fetch.state();
        assert_eq!(state.data.as_deref(), Some("item-7"));
        assert!(!state.loading);
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn failure_sets_error_and_notifies_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fetch: Fetch<(), String> = Fetch::new(
            |_| async {
                Err(ApiError::Http {
                    status: 500,
                    message: Some("Job board unavailable".to_string()),
                    body: String::new(),
                })
            },
            notifier.clone(),
        );

        let err = fetch.refetch(()).await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 500, .. }));
        assert_eq!(fetch.state().error.as_deref(), Some("Job board unavailable"));
        assert!(!fetch.state().loading);
        assert_eq!(notifier.errors(), vec!["Job board unavailable".to_string()]);
    }

    #[tokio::test]
    async fn dependencies_gate_refetch() {
        let (calls, fetch, _) = counting();

        assert_eq!(fetch.sync_dependencies(vec![], 1).await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let first = fetch.sync_dependencies(vec!["42".into()], 1).await.unwrap();
        assert_eq!(first.as_deref(), Some("item-1"));
        assert_eq!(fetch.sync_dependencies(vec!["42".into()], 2).await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        fetch.sync_dependencies(vec!["43".into()], 3).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(fetch.state().data.as_deref(), Some("item-3"));
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_does_not_overwrite_newer_one() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fetch = Arc::new(Fetch::new(
            |delay_ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(delay_ms)
            },
            notifier,
        ));

        let slow = tokio::spawn({
            let fetch = fetch.clone();
            async move { fetch.refetch(500).await }
        });
        tokio::task::yield_now().await;
        let fast = fetch.refetch(10).await.unwrap();
        assert_eq!(fast, 10);

        // the slow caller still gets its own result back
        assert_eq!(slow.await.unwrap().unwrap(), 500);
        assert_eq!(fetch.state().data, Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_suppresses_commit_and_notification() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fetch: Arc<Fetch<(), u32>> = Arc::new(Fetch::new(
            |_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Err(ApiError::Timeout)
            },
            notifier.clone(),
        ));

        let pending = tokio::spawn({
            let fetch = fetch.clone();
            async move { fetch.refetch(()).await }
        });
        tokio::task::yield_now().await;
        assert!(fetch.state().loading);

        fetch.teardown();
        assert!(matches!(pending.await.unwrap(), Err(ApiError::Cancelled)));
        assert_eq!(fetch.state(), FetchState::default());
        assert!(notifier.notices().is_empty());
    }
}
