//! Sandboxed JavaScript session.
//!
//! Each session owns one QuickJS interpreter confined to a dedicated worker
//! thread; everything that crosses the host/script boundary is a JSON string.
//! The session is single-threaded and cooperative: scripts run to completion,
//! interruption or interpreter error, and host callbacks execute synchronously
//! on the interpreter's thread. A deadline timer armed around each evaluation
//! flips an interrupt flag which the interpreter honors at its next safe
//! point.
//!
//! Bound host functions persist for the lifetime of the session, as do global
//! variables created by earlier scripts. A tool function that triggers a
//! nested evaluation on the same session will deadlock on the session lock;
//! re-entrant agents must use a fresh runtime.

use crate::tool::CancelHandle;
use rquickjs::function::Func;
use rquickjs::{Context, Ctx, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex as StdMutex};
use std::time::Duration;

/// A host callback reachable from script space through `__host_call`.
/// Takes the call arguments as a JSON string and returns a JSON string.
pub(crate) type HostFn = Box<dyn Fn(&str) -> String + Send>;

/// Result of one script evaluation.
///
/// Script errors are data, not host errors: they are handed back to the model
/// as a structured tool response so the next turn can self-correct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// JSON encoding of the script's final expression.
    Value(String),
    /// Guardrail, interpreter or timeout failure, described for the model.
    ScriptError(String),
}

enum Msg {
    Bind {
        name: String,
        host: HostFn,
        setup: String,
        reply: mpsc::Sender<Result<(), String>>,
    },
    Eval {
        code: String,
        reply: tokio::sync::oneshot::Sender<EvalOutcome>,
    },
}

/// One (lock, interpreter) pair. At most one script evaluates at any instant.
pub struct Session {
    tx: mpsc::Sender<Msg>,
    interrupt: Arc<AtomicBool>,
    cancel_slot: Arc<StdMutex<CancelHandle>>,
    lock: tokio::sync::Mutex<()>,
    timeout: Duration,
}

impl Session {
    pub(crate) fn spawn(timeout: Duration) -> crate::Result<Session> {
        let (tx, rx) = mpsc::channel();
        let interrupt = Arc::new(AtomicBool::new(false));
        let flag = interrupt.clone();
        std::thread::Builder::new()
            .name("skald-js-session".into())
            .spawn(move || worker(rx, flag))?;
        Ok(Session {
            tx,
            interrupt,
            cancel_slot: Arc::new(StdMutex::new(CancelHandle::new())),
            lock: tokio::sync::Mutex::new(()),
            timeout,
        })
    }

    /// The cancellation handle of the request currently evaluating, shared
    /// with the bound host callbacks.
    pub(crate) fn cancel_slot(&self) -> Arc<StdMutex<CancelHandle>> {
        self.cancel_slot.clone()
    }

    /// Install (or overwrite) a host binding and run its script-side setup.
    pub(crate) fn bind(&self, name: &str, host: HostFn, setup: String) -> crate::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Msg::Bind {
                name: name.to_string(),
                host,
                setup,
                reply: reply_tx,
            })
            .map_err(|_| crate::Error::runtime("script session terminated"))?;
        match reply_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(crate::Error::runtime(format!(
                "could not bind tool {}: {}",
                name, message
            ))),
            Err(_) => Err(crate::Error::runtime("script session terminated")),
        }
    }

    /// Run one script to completion, interruption or error.
    ///
    /// Holds the session lock for the duration; arms the deadline timer before
    /// evaluation and cancels it on return.
    pub async fn eval(&self, code: &str, cancel: &CancelHandle) -> crate::Result<EvalOutcome> {
        let _guard = self.lock.lock().await;

        if cancel.is_cancelled() {
            return Err(crate::Error::runtime("cancelled before script execution"));
        }
        if let Ok(mut slot) = self.cancel_slot.lock() {
            *slot = cancel.clone();
        }

        self.interrupt.store(false, Ordering::SeqCst);
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(Msg::Eval {
                code: code.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| crate::Error::runtime("script session terminated"))?;

        let flag = self.interrupt.clone();
        let deadline = self.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            flag.store(true, Ordering::SeqCst);
        });

        let outcome = reply_rx.await;
        timer.abort();

        match outcome {
            Ok(EvalOutcome::ScriptError(_)) if self.interrupt.load(Ordering::SeqCst) => {
                Ok(EvalOutcome::ScriptError(
                    "timeout: script execution took too long (possible infinite loop)".to_string(),
                ))
            }
            Ok(outcome) => Ok(outcome),
            Err(_) => Err(crate::Error::runtime("script session terminated")),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Wake a possibly-looping script so the worker can observe the closed
        // channel and exit.
        self.interrupt.store(true, Ordering::SeqCst);
    }
}

// Dummy logging implementations: models frequently hallucinate them, and the
// guardrails reject scripts that rely on them for output anyway.
const PRELUDE: &str = r#"
var console = {
    log: function () {},
    warn: function () {},
    error: function () {},
    info: function () {},
    debug: function () {}
};
function print() {}
"#;

fn worker(rx: mpsc::Receiver<Msg>, interrupt: Arc<AtomicBool>) {
    let runtime = match rquickjs::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => return drain(rx, format!("javascript runtime init failed: {}", e)),
    };
    let flag = interrupt;
    runtime.set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::SeqCst))));

    let context = match Context::full(&runtime) {
        Ok(context) => context,
        Err(e) => return drain(rx, format!("javascript context init failed: {}", e)),
    };

    let bindings: Rc<RefCell<HashMap<String, HostFn>>> = Rc::new(RefCell::new(HashMap::new()));

    let installed = context.with(|ctx| -> Result<(), rquickjs::Error> {
        let table = bindings.clone();
        ctx.globals().set(
            "__host_call",
            Func::from(move |name: String, args: String| -> String {
                match table.borrow().get(&name) {
                    Some(host) => host(&args),
                    None => format!(r#"{{"error": "unknown tool {}"}}"#, name),
                }
            }),
        )?;
        ctx.eval::<Value, _>(PRELUDE)?;
        Ok(())
    });
    if let Err(e) = installed {
        return drain(rx, format!("javascript session setup failed: {}", e));
    }

    for msg in rx {
        match msg {
            Msg::Bind {
                name,
                host,
                setup,
                reply,
            } => {
                bindings.borrow_mut().insert(name, host);
                let result = context.with(|ctx| {
                    ctx.eval::<Value, _>(setup.as_bytes().to_vec())
                        .map(|_| ())
                        .map_err(|e| describe_error(&ctx, e))
                });
                let _ = reply.send(result);
            }
            Msg::Eval { code, reply } => {
                let outcome = context.with(|ctx| evaluate(&ctx, &code));
                let _ = reply.send(outcome);
            }
        }
    }
}

// The session failed to come up; answer every message with the reason.
fn drain(rx: mpsc::Receiver<Msg>, message: String) {
    for msg in rx {
        match msg {
            Msg::Bind { reply, .. } => {
                let _ = reply.send(Err(message.clone()));
            }
            Msg::Eval { reply, .. } => {
                let _ = reply.send(EvalOutcome::ScriptError(message.clone()));
            }
        }
    }
}

// QuickJS evaluates a script to its completion value; that value, encoded as
// JSON, is the session's result. An undefined completion encodes to null.
fn evaluate(ctx: &Ctx<'_>, code: &str) -> EvalOutcome {
    match ctx.eval::<Value, _>(code.as_bytes().to_vec()) {
        Ok(value) => match ctx.json_stringify(value) {
            Ok(Some(json)) => match json.to_string() {
                Ok(s) => EvalOutcome::Value(s),
                Err(e) => EvalOutcome::ScriptError(e.to_string()),
            },
            Ok(None) => EvalOutcome::Value("null".to_string()),
            Err(e) => EvalOutcome::ScriptError(describe_error(ctx, e)),
        },
        Err(e) => EvalOutcome::ScriptError(describe_error(ctx, e)),
    }
}

fn describe_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if matches!(err, rquickjs::Error::Exception) {
        let caught = ctx.catch();
        if let Some(obj) = caught.as_object() {
            let name: String = obj.get("name").unwrap_or_default();
            let message: String = obj.get("message").unwrap_or_default();
            if !message.is_empty() {
                return if name.is_empty() {
                    message
                } else {
                    format!("{}: {}", name, message)
                };
            }
        }
        if let Some(s) = caught.as_string().and_then(|s| s.to_string().ok()) {
            return s;
        }
    }
    err.to_string()
}
