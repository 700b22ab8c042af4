//! Single-assignment result cell shared by every invocation style.
//!
//! The transport completes an invocation through a [Completion]. The caller side
//! attaches one sink to it: a callback, or a channel that blocking and async callers
//! wait on. The first completion wins; any later completion is logged, counted and
//! handed back to the transport as [Error::DoubleCompletion].

use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::common::Call;
use crate::core::normalize::RemoteError;
use crate::{Error, Result};

pub(crate) type Callback = Box<dyn FnOnce(Result<Value>) + Send>;

enum Sink {
    Callback(Callback),
    Channel(flume::Sender<Result<Value>>),
}

impl Sink {
    fn deliver(self, result: Result<Value>) {
        match self {
            Sink::Callback(callback) => callback(result),
            Sink::Channel(sender) => {
                // The receiver is gone if the caller stopped waiting.
                let _ = sender.send(result);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// What was invoked, kept for diagnostics.
pub struct CallContext {
    pub service: String,
    pub action: String,
    pub args: Vec<Value>,
}

impl CallContext {
    pub(crate) fn new(service: impl Into<String>, call: &Call) -> Self {
        Self {
            service: service.into(),
            action: call.action.clone(),
            args: call.args.clone(),
        }
    }

    fn args_json(&self) -> String {
        serde_json::to_string(&self.args).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
/// Counters shared between a facility and all of its completions.
pub(crate) struct CompletionStats {
    double_completions: AtomicUsize,
}

impl CompletionStats {
    pub(crate) fn double_completions(&self) -> usize {
        self.double_completions.load(Ordering::Relaxed)
    }
}

struct Inner {
    completed: AtomicBool,
    sink: Mutex<Option<Sink>>,
    context: CallContext,
    stats: Arc<CompletionStats>,
}

#[derive(Clone)]
/// Handle a transport uses to complete one invocation.
///
/// Cloning is cheap; all clones share the same single-assignment cell.
pub struct Completion(Arc<Inner>);

impl Completion {
    fn new(context: CallContext, stats: Arc<CompletionStats>, sink: Sink) -> Self {
        Completion(Arc::new(Inner {
            completed: AtomicBool::new(false),
            sink: Mutex::new(Some(sink)),
            context,
            stats,
        }))
    }

    pub(crate) fn callback(
        context: CallContext,
        stats: Arc<CompletionStats>,
        callback: Callback,
    ) -> Self {
        Self::new(context, stats, Sink::Callback(callback))
    }

    pub(crate) fn channel(
        context: CallContext,
        stats: Arc<CompletionStats>,
    ) -> (Self, flume::Receiver<Result<Value>>) {
        let (sender, receiver) = flume::bounded(1);

        (Self::new(context, stats, Sink::Channel(sender)), receiver)
    }

    /// Complete the invocation with a raw transport result.
    ///
    /// Errors are normalized before reaching the caller. Returns
    /// [Error::DoubleCompletion] if this invocation was already completed, in which
    /// case the caller is not notified again.
    pub fn complete(&self, result: Result<Value, RemoteError>) -> Result<()> {
        self.settle(result.map_err(RemoteError::normalize))
    }

    /// Complete the invocation with an already canonical result.
    pub(crate) fn settle(&self, result: Result<Value>) -> Result<()> {
        let context = &self.0.context;

        if self.0.completed.swap(true, Ordering::AcqRel) {
            let args = context.args_json();

            error!(
                service = %context.service,
                action = %context.action,
                args = %args,
                "ERR_DOUBLE_CB"
            );
            self.0.stats.double_completions.fetch_add(1, Ordering::Relaxed);

            return Err(Error::DoubleCompletion {
                service: context.service.clone(),
                action: context.action.clone(),
                args,
            });
        }

        match &result {
            Err(Error::Timeout) => warn!(
                service = %context.service,
                action = %context.action,
                "Request timed out"
            ),
            Err(error) => debug!(
                service = %context.service,
                action = %context.action,
                args = %context.args_json(),
                ?error,
                "Request failed"
            ),
            Ok(_) => {}
        }

        let sink = self
            .0
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(sink) = sink {
            sink.deliver(result);
        }

        Ok(())
    }

    /// Returns `true` once the invocation has been completed.
    pub fn is_completed(&self) -> bool {
        self.0.completed.load(Ordering::Acquire)
    }

    pub fn context(&self) -> &CallContext {
        &self.0.context
    }
}

impl Debug for Completion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("context", &self.0.context)
            .field("completed", &self.is_completed())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn context() -> CallContext {
        CallContext::new(
            "rest:util:net",
            &Call::new("getIpInfo", json!(["8.8.8.8"])).unwrap(),
        )
    }

    #[test]
    fn channel_completes_once() {
        let stats = Arc::new(CompletionStats::default());
        let (completion, receiver) = Completion::channel(context(), stats.clone());

        completion.complete(Ok(json!("first"))).unwrap();
        let second = completion.clone().complete(Ok(json!("second")));

        assert_eq!(receiver.recv().unwrap().unwrap(), json!("first"));
        assert!(receiver.try_recv().is_err());
        assert!(matches!(
            second,
            Err(Error::DoubleCompletion { ref service, ref action, .. })
                if service == "rest:util:net" && action == "getIpInfo"
        ));
        assert_eq!(stats.double_completions(), 1);
    }

    #[test]
    fn callback_invoked_once() {
        let stats = Arc::new(CompletionStats::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let completion = Completion::callback(
            context(),
            stats.clone(),
            Box::new(move |result| {
                assert!(result.is_err());
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        completion.complete(Err("ERR_TIMEOUT".into())).unwrap();
        assert!(completion.complete(Ok(json!(1))).is_err());
        assert!(completion.complete(Err("late".into())).is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.double_completions(), 2);
        assert!(completion.is_completed());
    }

    #[test]
    fn errors_are_normalized() {
        let stats = Arc::new(CompletionStats::default());
        let (completion, receiver) = Completion::channel(context(), stats);

        completion.complete(Err("ERR_TIMEOUT".into())).unwrap();

        assert!(matches!(receiver.recv().unwrap(), Err(Error::Timeout)));
    }

    #[test]
    fn dropped_completion_disconnects() {
        let stats = Arc::new(CompletionStats::default());
        let (completion, receiver) = Completion::channel(context(), stats);

        drop(completion);

        assert!(receiver.recv().is_err());
    }
}
