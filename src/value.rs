//! Values supplied by the host and the callables that make up tests.
//!
//! A test tree is built out of [`Value`]s: nested maps whose leaves are
//! [`Callable`]s (cases and hooks) or scalar configuration flags. A callable
//! receives a [`CaseContext`] carrying the injected bindings and returns an
//! [`Outcome`]: done, skip, or a pending [`Awaitable`] the engine waits on.
//!
//! # Asynchronous results
//!
//! Cases that finish later return [`Outcome::Pending`]. Anything implementing
//! the [`Awaitable`] capability can be returned; two implementations ship
//! with the crate:
//!
//! | Type | Settled by |
//! |------|------------|
//! | [`FutureAwaitable`] | Driving a Rust future to completion |
//! | [`Deferred`] | Some other task calling [`Resolver::resolve`] or [`Resolver::reject`] |
//!
//! ```
//! use std::time::Duration;
//! use arbor::{Outcome, Value};
//!
//! let slow = Value::func(|_| {
//!     Ok(Outcome::future(async {
//!         tokio::time::sleep(Duration::from_millis(10)).await;
//!         Ok(())
//!     }))
//! });
//! assert_eq!(slow.kind(), "function");
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::task_group::lock;

/// Named bindings injected into every case's context.
pub type Bindings = BTreeMap<String, serde_json::Value>;

/// Execution context handed to every case and hook.
///
/// Replaces ambient global state: anything a case needs from the host is
/// passed in explicitly through the bindings map.
#[derive(Debug, Clone)]
pub struct CaseContext {
    path: String,
    bindings: Arc<Bindings>,
}

impl CaseContext {
    /// Creates a context for the case at `path`.
    pub fn new(path: impl Into<String>, bindings: Arc<Bindings>) -> Self {
        Self {
            path: path.into(),
            bindings,
        }
    }

    /// Slash-separated path of the case being run (e.g. `math/adds`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Looks up a single injected binding.
    pub fn binding(&self, name: &str) -> Option<&serde_json::Value> {
        self.bindings.get(name)
    }

    /// Returns every injected binding.
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

/// Signature shared by cases and lifecycle hooks.
pub type CaseFn = dyn Fn(&CaseContext) -> Result<Outcome, String> + Send + Sync;

/// A shareable test case or hook function.
///
/// Calling it never unwinds: a panic inside the function is caught and
/// surfaced as `Err` with the panic message, the same way a returned
/// error is.
#[derive(Clone)]
pub struct Callable(Arc<CaseFn>);

impl Callable {
    /// Wraps a function as a callable.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CaseContext) -> Result<Outcome, String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invokes the function, converting a panic into an error.
    pub fn call(&self, ctx: &CaseContext) -> Result<Outcome, String> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| (self.0)(ctx))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable(..)")
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked with a non-string payload".to_string()
    }
}

/// What a case produced when it was called.
pub enum Outcome {
    /// Completed synchronously without error.
    Done,

    /// Asked to be skipped.
    Skip,

    /// Will complete later; the engine waits on it.
    Pending(Box<dyn Awaitable>),
}

impl Outcome {
    /// Wraps a future as a pending outcome.
    ///
    /// `Ok(())` resolves the case; `Err(reason)` rejects it with `reason`.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        Outcome::Pending(Box::new(FutureAwaitable::new(future)))
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => f.write_str("Done"),
            Outcome::Skip => f.write_str("Skip"),
            Outcome::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// How a pending value finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Finished successfully.
    Resolved,

    /// Finished with a failure reason.
    Rejected(String),
}

/// Callback registered through [`Awaitable::subscribe`].
pub type CompletionCallback = Box<dyn FnOnce(&Completion) + Send>;

/// The capability set of a future-like case result.
///
/// The engine only observes an awaitable: it may subscribe for completion
/// and then waits on [`await_status`](Self::await_status). The case that
/// produced the value owns it.
#[async_trait]
pub trait Awaitable: Send {
    /// Registers a callback fired once the value settles.
    ///
    /// If the value has already settled the callback fires immediately.
    fn subscribe(&mut self, callback: CompletionCallback);

    /// Waits until the value settles and returns how it finished.
    async fn await_status(&mut self) -> Completion;
}

/// An [`Awaitable`] driven by a Rust future.
pub struct FutureAwaitable {
    future: Option<BoxFuture<'static, Result<(), String>>>,
    status: Option<Completion>,
    subscribers: Vec<CompletionCallback>,
}

impl FutureAwaitable {
    /// Wraps `future`. It is not polled until [`await_status`](Awaitable::await_status).
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            future: Some(future.boxed()),
            status: None,
            subscribers: Vec::new(),
        }
    }
}

#[async_trait]
impl Awaitable for FutureAwaitable {
    fn subscribe(&mut self, callback: CompletionCallback) {
        match &self.status {
            Some(status) => callback(status),
            None => self.subscribers.push(callback),
        }
    }

    async fn await_status(&mut self) -> Completion {
        if let Some(status) = &self.status {
            return status.clone();
        }

        let completion = match self.future.take() {
            Some(future) => match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => Completion::Resolved,
                Ok(Err(reason)) => Completion::Rejected(reason),
                Err(payload) => Completion::Rejected(panic_message(payload.as_ref())),
            },
            None => Completion::Rejected("future was already consumed".to_string()),
        };

        for callback in self.subscribers.drain(..) {
            callback(&completion);
        }
        self.status = Some(completion.clone());
        completion
    }
}

struct DeferredState {
    status: Option<Completion>,
    subscribers: Vec<CompletionCallback>,
}

/// A settle-once value completed from elsewhere through its [`Resolver`].
///
/// # Example
///
/// ```
/// use arbor::{Deferred, Outcome, Value};
///
/// let case = Value::func(|_| {
///     let (deferred, resolver) = Deferred::new();
///     tokio::spawn(async move { resolver.resolve() });
///     Ok(Outcome::Pending(Box::new(deferred)))
/// });
/// # let _ = case;
/// ```
pub struct Deferred {
    state: Arc<Mutex<DeferredState>>,
    settled: watch::Receiver<bool>,
}

/// The completing half of a [`Deferred`].
///
/// Settling consumes the resolver, so a deferred settles at most once.
/// Dropping it unsettled rejects the deferred.
pub struct Resolver {
    state: Arc<Mutex<DeferredState>>,
    settled: watch::Sender<bool>,
}

impl Deferred {
    /// Creates an unsettled deferred value and its resolver.
    pub fn new() -> (Deferred, Resolver) {
        let state = Arc::new(Mutex::new(DeferredState {
            status: None,
            subscribers: Vec::new(),
        }));
        let (tx, rx) = watch::channel(false);
        (
            Deferred {
                state: state.clone(),
                settled: rx,
            },
            Resolver {
                state,
                settled: tx,
            },
        )
    }
}

impl Resolver {
    /// Settles the deferred successfully.
    pub fn resolve(self) {
        self.settle(Completion::Resolved);
    }

    /// Settles the deferred with a failure reason.
    pub fn reject(self, reason: impl Into<String>) {
        self.settle(Completion::Rejected(reason.into()));
    }

    fn settle(self, completion: Completion) {
        let subscribers = {
            let mut state = lock(&self.state);
            state.status = Some(completion.clone());
            std::mem::take(&mut state.subscribers)
        };
        for callback in subscribers {
            callback(&completion);
        }
        self.settled.send_replace(true);
    }
}

#[async_trait]
impl Awaitable for Deferred {
    fn subscribe(&mut self, callback: CompletionCallback) {
        let mut state = lock(&self.state);
        if let Some(status) = state.status.clone() {
            drop(state);
            callback(&status);
        } else {
            state.subscribers.push(callback);
        }
    }

    async fn await_status(&mut self) -> Completion {
        let settled = self.settled.wait_for(|settled| *settled).await.is_ok();
        let status = lock(&self.state).status.clone();
        match status {
            Some(status) if settled => status,
            _ => Completion::Rejected("deferred value was dropped before it settled".to_string()),
        }
    }
}

/// A dynamically shaped node of the input tree.
///
/// Maps are suites or containers, functions are cases or hooks, and scalars
/// are configuration flags (or mistakes, reported as structural errors).
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Func(Callable),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a map value from `(name, value)` pairs.
    pub fn map<I, K>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a function value.
    pub fn func<F>(f: F) -> Value
    where
        F: Fn(&CaseContext) -> Result<Outcome, String> + Send + Sync + 'static,
    {
        Value::Func(Callable::new(f))
    }

    /// Human-readable kind, used in structural error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::Text(_) => "string",
            Value::Func(_) => "function",
            Value::Map(_) => "map",
        }
    }

    /// Returns the entries if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Callable> for Value {
    fn from(f: Callable) -> Self {
        Value::Func(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> CaseContext {
        CaseContext::new("suite/case", Arc::new(Bindings::new()))
    }

    #[test]
    fn test_callable_catches_panic() {
        let f = Callable::new(|_| panic!("boom"));
        match f.call(&ctx()) {
            Err(reason) => assert_eq!(reason, "boom"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_callable_formatted_panic() {
        let f = Callable::new(|c| panic!("failed in {}", c.path()));
        assert_eq!(f.call(&ctx()).unwrap_err(), "failed in suite/case");
    }

    #[test]
    fn test_context_bindings() {
        let mut bindings = Bindings::new();
        bindings.insert("answer".to_string(), serde_json::json!(42));
        let ctx = CaseContext::new("a", Arc::new(bindings));

        assert_eq!(ctx.binding("answer"), Some(&serde_json::json!(42)));
        assert!(ctx.binding("missing").is_none());
        assert_eq!(ctx.bindings().len(), 1);
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(Value::Nil.kind(), "nil");
        assert_eq!(Value::from(true).kind(), "boolean");
        assert_eq!(Value::from(3_i64).kind(), "integer");
        assert_eq!(Value::from("x").kind(), "string");
        assert_eq!(Value::map([("a", Value::Nil)]).kind(), "map");
        assert_eq!(Value::func(|_| Ok(Outcome::Done)).kind(), "function");
    }

    #[tokio::test]
    async fn test_future_awaitable_resolves() {
        let mut pending = FutureAwaitable::new(async { Ok(()) });
        assert_eq!(pending.await_status().await, Completion::Resolved);
        // Settled values answer again without re-polling.
        assert_eq!(pending.await_status().await, Completion::Resolved);
    }

    #[tokio::test]
    async fn test_future_awaitable_rejects_with_reason() {
        let mut pending = FutureAwaitable::new(async { Err("nope".to_string()) });
        assert_eq!(
            pending.await_status().await,
            Completion::Rejected("nope".to_string())
        );
    }

    #[tokio::test]
    async fn test_future_awaitable_notifies_subscribers() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut pending = FutureAwaitable::new(async { Ok(()) });

        let before = fired.clone();
        pending.subscribe(Box::new(move |_| {
            before.fetch_add(1, Ordering::SeqCst);
        }));
        pending.await_status().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let after = fired.clone();
        pending.subscribe(Box::new(move |status| {
            assert_eq!(status, &Completion::Resolved);
            after.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deferred_resolved_from_task() {
        let (mut deferred, resolver) = Deferred::new();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            resolver.reject("late failure");
        });
        assert_eq!(
            deferred.await_status().await,
            Completion::Rejected("late failure".to_string())
        );
    }

    #[tokio::test]
    async fn test_deferred_dropped_resolver_rejects() {
        let (mut deferred, resolver) = Deferred::new();
        drop(resolver);
        assert!(matches!(
            deferred.await_status().await,
            Completion::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_deferred_subscriber_fires_on_settle() {
        let fired = Arc::new(AtomicUsize::new(0));
        let (mut deferred, resolver) = Deferred::new();
        let counter = fired.clone();
        deferred.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        resolver.resolve();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(deferred.await_status().await, Completion::Resolved);
    }
}
