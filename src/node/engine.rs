//! The embedded ECMAScript engine, dedicated to one OS thread per Node
//! runtime invocation.
//!
//! `boa_engine::Context` is built on `Rc`/`Gc` internals and is neither
//! `Send` nor `Sync`, so it cannot live on a `tokio` worker thread shared
//! with the rest of the kernel. Instead each `node <script>` invocation
//! spawns its own thread running a small command loop (the same shape the
//! pack's `boa_engine`-based plugin runtime uses for its JS worker thread);
//! the async kernel talks to it exclusively through a channel plus
//! `tokio::sync::oneshot` replies.

use std::sync::mpsc;
use std::thread::JoinHandle;

use boa_engine::{Context, JsError, JsResult, JsValue, Source};
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::net::{VirtualRequest, VirtualResponse};

/// One piece of work handed to the engine thread. Processed strictly in
/// order, which is what gives the Node runtime its single-threaded
/// cooperative semantics.
pub enum EngineCommand {
    /// Evaluate `source` (already CJS-shaped, already wrapped) as a script
    /// and report whether it threw.
    Eval {
        source: String,
        reply: oneshot::Sender<std::result::Result<(), String>>,
    },
    /// Evaluate `source` and coerce the result to a JS boolean (`ToBoolean`
    /// is infallible), for polling globals like
    /// `globalThis.__lifoHasPendingTimers()` without leaking a `JsValue`
    /// off the engine thread.
    EvalBool {
        source: String,
        reply: oneshot::Sender<std::result::Result<bool, String>>,
    },
    /// Drain the microtask/macrotask queues once.
    RunJobs { reply: oneshot::Sender<()> },
    /// Invoke a previously-registered virtual HTTP handler by its internal
    /// registry key, synchronously, so the caller sees it as one call.
    DispatchHttp {
        handler_key: String,
        request: VirtualRequest,
        reply: oneshot::Sender<VirtualResponse>,
    },
    Shutdown,
}

/// A handle to the running engine thread. Cloning is cheap; every clone
/// shares the same underlying thread and command queue.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub async fn eval(&self, source: String) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::Eval { source, reply: tx })
            .map_err(|_| Error::Engine("engine thread gone".into()))?;
        rx.await
            .map_err(|_| Error::Engine("engine thread dropped reply".into()))?
            .map_err(Error::Script)
    }

    pub async fn eval_bool(&self, source: String) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::EvalBool { source, reply: tx })
            .map_err(|_| Error::Engine("engine thread gone".into()))?;
        rx.await
            .map_err(|_| Error::Engine("engine thread dropped reply".into()))?
            .map_err(Error::Script)
    }

    pub async fn run_jobs(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(EngineCommand::RunJobs { reply: tx }).is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn dispatch_http(&self, handler_key: String, request: VirtualRequest) -> VirtualResponse {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(EngineCommand::DispatchHttp { handler_key, request, reply: tx })
            .is_ok()
        {
            if let Ok(resp) = rx.await {
                return resp;
            }
        }
        VirtualResponse::text(500, "node runtime unavailable")
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(EngineCommand::Shutdown);
    }
}

/// Spawn a fresh engine on its own thread. `register` installs whatever
/// global bindings (shims, `require`, wrapper globals) the caller needs
/// before the command loop starts processing work.
pub fn spawn<F>(register: F) -> (EngineHandle, JoinHandle<()>)
where
    F: FnOnce(&mut Context, EngineHandle) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<EngineCommand>();
    let handle = EngineHandle { sender: tx };
    let handle_for_thread = handle.clone();
    let join = std::thread::Builder::new()
        .name("lifo-node-engine".into())
        .spawn(move || run_loop(rx, register, handle_for_thread))
        .expect("failed to spawn node engine thread");
    (handle, join)
}

fn run_loop<F>(receiver: mpsc::Receiver<EngineCommand>, register: F, self_handle: EngineHandle)
where
    F: FnOnce(&mut Context, EngineHandle),
{
    let mut context = Context::default();
    register(&mut context, self_handle);

    while let Ok(cmd) = receiver.recv() {
        match cmd {
            EngineCommand::Eval { source, reply } => {
                let result = eval_source(&mut context, &source);
                let _ = reply.send(result);
            }
            EngineCommand::EvalBool { source, reply } => {
                let result = eval_source_bool(&mut context, &source);
                let _ = reply.send(result);
            }
            EngineCommand::RunJobs { reply } => {
                let _ = context.run_jobs();
                let _ = reply.send(());
            }
            EngineCommand::DispatchHttp { handler_key, request, reply } => {
                let resp = dispatch_http_sync(&mut context, &handler_key, request);
                let _ = reply.send(resp);
            }
            EngineCommand::Shutdown => break,
        }
    }
}

fn eval_source(context: &mut Context, source: &str) -> std::result::Result<(), String> {
    let src = Source::from_bytes(source.as_bytes());
    match context.eval(src) {
        Ok(_) => {
            let _ = context.run_jobs();
            Ok(())
        }
        Err(e) => Err(describe_js_error(&e)),
    }
}

fn eval_source_bool(context: &mut Context, source: &str) -> std::result::Result<bool, String> {
    let src = Source::from_bytes(source.as_bytes());
    match context.eval(src) {
        Ok(v) => {
            let _ = context.run_jobs();
            Ok(v.to_boolean())
        }
        Err(e) => Err(describe_js_error(&e)),
    }
}

fn describe_js_error(e: &JsError) -> String {
    e.to_string()
}

/// Invoke the JS-side HTTP dispatcher the `http` shim installed under
/// `globalThis.__lifoHttpHandlers[handler_key]`, synchronously, matching
/// the handler synchronously, the way the real module would.
fn dispatch_http_sync(context: &mut Context, handler_key: &str, request: VirtualRequest) -> VirtualResponse {
    let headers_js = request
        .headers
        .iter()
        .map(|(k, v)| format!("{:?}:{:?}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    let body = String::from_utf8_lossy(&request.body).replace('\\', "\\\\").replace('"', "\\\"");
    let script = format!(
        "globalThis.__lifoDispatch({:?}, {{method:{:?}, url:{:?}, headers:{{{}}}, body:\"{}\"}})",
        handler_key, request.method, request.path, headers_js, body
    );
    match context.eval(Source::from_bytes(script.as_bytes())) {
        Ok(value) => {
            let _ = context.run_jobs();
            value_to_response(context, value)
        }
        Err(e) => VirtualResponse::text(500, describe_js_error(&e)),
    }
}

fn value_to_response(context: &mut Context, value: JsValue) -> VirtualResponse {
    let to_json: JsResult<String> = (|| {
        let json = boa_engine::JsValue::from(
            boa_engine::builtins::json::Json::stringify(
                &JsValue::undefined(),
                &[value.clone()],
                context,
            )?,
        );
        Ok(json.to_string(context)?.to_std_string_escaped())
    })();

    match to_json {
        Ok(text) => serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .map(response_from_json)
            .unwrap_or_else(|| VirtualResponse::text(200, text)),
        Err(_) => VirtualResponse::text(200, ""),
    }
}

fn response_from_json(value: serde_json::Value) -> VirtualResponse {
    let status = value.get("statusCode").and_then(|v| v.as_u64()).unwrap_or(200) as u16;
    let headers = value
        .get("headers")
        .and_then(|h| h.as_object())
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default();
    let body = value
        .get("body")
        .and_then(|b| b.as_str())
        .unwrap_or_default()
        .to_string()
        .into_bytes();
    VirtualResponse { status, headers, body }
}
