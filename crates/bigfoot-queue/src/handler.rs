//! Job handler contract.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use bigfoot_models::JobPayload;

use crate::error::HandlerResult;

/// Processes one job payload.
///
/// The same payload may be delivered more than once after a stall or an
/// interrupted shutdown, so implementations must be idempotent.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &JobPayload) -> HandlerResult;
}

/// Handler built from an async closure.
pub struct FnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a [`JobHandler`].
///
/// ```
/// use bigfoot_queue::{handler_fn, HandlerResult};
///
/// let handler = handler_fn(|_payload| async { HandlerResult::Ok(()) });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(JobPayload) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    FnHandler {
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F, Fut>
where
    F: Fn(JobPayload) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, payload: &JobPayload) -> HandlerResult {
        (self.f)(payload.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bigfoot_models::EmailJob;

    use super::*;
    use crate::error::HandlerError;

    #[tokio::test]
    async fn closure_handler_receives_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = handler_fn(move |payload| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match payload {
                    JobPayload::EmailNotification(_) => Ok(()),
                    other => Err(HandlerError::failed(other.job_type())),
                }
            }
        });

        let payload = EmailJob::new("welcome", "a@example.com", "Hi", "Hello").into();
        handler.handle(&payload).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
