use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::{JoinError, JoinHandle};

/// Guard that aborts a task when dropped.
///
/// Wraps a `JoinHandle` and aborts the task if the guard is dropped before
/// the task finished. Awaiting the guard yields the task's output.
///
/// # Example
/// ```ignore
/// use sketch_tutor::AbortGuard;
/// let guard = AbortGuard::new(tokio::spawn(async { /* work */ }));
/// drop(guard); // task is aborted here
/// ```
pub struct AbortGuard<T = ()> {
    handle: Option<JoinHandle<T>>,
}

impl<T> AbortGuard<T> {
    /// Create a new guard from a [`JoinHandle`].
    pub fn new(handle: JoinHandle<T>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Abort the task now.
    pub fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether the task has stopped, or was already aborted.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl<T> Future for AbortGuard<T> {
    type Output = Option<Result<T, JoinError>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(handle) = self.handle.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(handle).poll(cx) {
            Poll::Ready(res) => {
                self.handle = None;
                Poll::Ready(Some(res))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for AbortGuard<T> {
    fn drop(&mut self) {
        self.abort();
    }
}
