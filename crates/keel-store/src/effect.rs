//! Effects: named async operations with observable status.
//!
//! Effects never mutate state directly. An effect body receives an
//! [`EffectContext`] and dispatches actions through it; the owning store
//! applies them when its queue is next drained (`Store::pump`, or the tail
//! of any `dispatch`). The engine is runtime-agnostic: `execute` hands back
//! a plain future for the caller's executor of choice.
//!
//! Every `execute` call gets its own status handle. Overlapping calls to the
//! same effect never share one status slot, so a late success cannot clobber
//! another call's pending marker.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use strum::Display;

use crate::devtools::{DevtoolsEvent, DevtoolsSink};
use crate::dispatcher::Dispatcher;
use crate::error::EffectError;

/// Boxed future type used by effect bodies.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Body of a registered effect.
pub type EffectBody<P, R> =
    Arc<dyn Fn(P, EffectContext<P>) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync>;

/// Lifecycle of a single effect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EffectStatus {
    Idle,
    Pending,
    Success,
    Error,
}

impl EffectStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => EffectStatus::Pending,
            2 => EffectStatus::Success,
            3 => EffectStatus::Error,
            _ => EffectStatus::Idle,
        }
    }
}

/// Shared, observable status of one effect call.
#[derive(Debug, Clone)]
pub struct EffectStatusHandle(Arc<AtomicU8>);

impl EffectStatusHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(EffectStatus::Idle as u8)))
    }

    pub fn get(&self) -> EffectStatus {
        EffectStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, status: EffectStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }
}

/// Capabilities handed to an effect body.
///
/// Dispatches are queued, not applied inline; the store drains them after
/// the next transition or on [`Store::pump`](crate::Store::pump).
pub struct EffectContext<P> {
    dispatcher: Dispatcher<P>,
}

impl<P> Clone for EffectContext<P> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<P> EffectContext<P> {
    pub(crate) fn new(dispatcher: Dispatcher<P>) -> Self {
        Self { dispatcher }
    }

    /// Queue an action on the owning store.
    pub fn dispatch(&self, key: impl Into<String>, payload: P) {
        self.dispatcher.dispatch(key, payload);
    }
}

/// Bound handle to a registered effect, obtained via
/// [`Store::effect`](crate::Store::effect).
pub struct Effect<P, R> {
    ty: String,
    body: EffectBody<P, R>,
    dispatcher: Dispatcher<P>,
    devtools: Arc<dyn DevtoolsSink>,
}

impl<P, R> Clone for Effect<P, R> {
    fn clone(&self) -> Self {
        Self {
            ty: self.ty.clone(),
            body: self.body.clone(),
            dispatcher: self.dispatcher.clone(),
            devtools: self.devtools.clone(),
        }
    }
}

impl<P, R: Send + 'static> Effect<P, R> {
    pub(crate) fn new(
        ty: String,
        body: EffectBody<P, R>,
        dispatcher: Dispatcher<P>,
        devtools: Arc<dyn DevtoolsSink>,
    ) -> Self {
        Self {
            ty,
            body,
            dispatcher,
            devtools,
        }
    }

    /// Namespaced effect type (`"{store}/{key}"`).
    pub fn ty(&self) -> &str {
        &self.ty
    }

    /// Start the effect. The returned [`EffectRun`] resolves to the body's
    /// result; its status handle reads `Pending` until then.
    ///
    /// Failures update the status to `Error` and surface as `Err`; they are
    /// never swallowed.
    pub fn execute(&self, payload: P) -> EffectRun<R> {
        let status = EffectStatusHandle::new();
        status.set(EffectStatus::Pending);
        self.devtools
            .push(DevtoolsEvent::new(format!("{}@pending", self.ty), None));

        let ctx = EffectContext::new(self.dispatcher.clone());
        let fut = (self.body)(payload, ctx);
        let ty = self.ty.clone();
        let st = status.clone();
        let devtools = self.devtools.clone();
        let wrapped: BoxFuture<'static, Result<R, EffectError>> = Box::pin(async move {
            match fut.await {
                Ok(value) => {
                    st.set(EffectStatus::Success);
                    devtools.push(DevtoolsEvent::new(format!("{ty}@success"), None));
                    Ok(value)
                }
                Err(source) => {
                    st.set(EffectStatus::Error);
                    devtools.push(DevtoolsEvent::new(
                        format!("{ty}@error"),
                        Some(serde_json::json!({ "error": source.to_string() })),
                    ));
                    Err(EffectError { effect: ty, source })
                }
            }
        });

        EffectRun {
            status,
            future: wrapped,
        }
    }
}

/// One in-flight effect call: a future plus its independent status handle.
pub struct EffectRun<R> {
    status: EffectStatusHandle,
    future: BoxFuture<'static, Result<R, EffectError>>,
}

impl<R> EffectRun<R> {
    /// Status handle for this call only. Clone it to observe the call from
    /// elsewhere while the future runs.
    pub fn status(&self) -> EffectStatusHandle {
        self.status.clone()
    }
}

impl<R> Future for EffectRun<R> {
    type Output = Result<R, EffectError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devtools::NoopDevtools;
    use crate::dispatcher;

    fn test_effect<R: Send + 'static>(
        body: impl Fn(u32, EffectContext<u32>) -> BoxFuture<'static, anyhow::Result<R>>
            + Send
            + Sync
            + 'static,
    ) -> Effect<u32, R> {
        let (dispatcher, _rx) = dispatcher::queue::<u32>();
        Effect::new(
            "test/fetch".to_string(),
            Arc::new(body),
            dispatcher,
            Arc::new(NoopDevtools),
        )
    }

    #[tokio::test]
    async fn test_success_path() {
        let effect = test_effect(|n, _ctx| Box::pin(async move { Ok(n * 2) }));
        let run = effect.execute(21);
        let status = run.status();

        assert_eq!(status.get(), EffectStatus::Pending);
        let out = run.await.unwrap();
        assert_eq!(out, 42);
        assert_eq!(status.get(), EffectStatus::Success);
    }

    #[tokio::test]
    async fn test_error_path_rejects_with_source() {
        let effect = test_effect(|_, _ctx| {
            Box::pin(async move { Err::<u32, _>(anyhow::anyhow!("network down")) })
        });
        let run = effect.execute(0);
        let status = run.status();

        let err = run.await.unwrap_err();
        assert_eq!(err.effect, "test/fetch");
        assert_eq!(err.source.to_string(), "network down");
        assert_eq!(status.get(), EffectStatus::Error);
    }

    #[tokio::test]
    async fn test_overlapping_calls_have_independent_status() {
        let effect = test_effect(|n, _ctx| {
            Box::pin(async move {
                if n == 0 {
                    std::future::pending::<()>().await;
                }
                Ok(n)
            })
        });

        let slow = effect.execute(0);
        let fast = effect.execute(1);
        let slow_status = slow.status();
        let fast_status = fast.status();

        fast.await.unwrap();
        assert_eq!(fast_status.get(), EffectStatus::Success);
        // The hung call keeps its own pending marker.
        assert_eq!(slow_status.get(), EffectStatus::Pending);
        drop(slow);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(EffectStatus::Pending.to_string(), "pending");
        assert_eq!(EffectStatus::Error.to_string(), "error");
    }
}
