//! Module resolution orchestration and script execution: the part of the
//! Node-compat runtime that actually touches the VFS and drives the engine
//! thread through one `node <script>` invocation end to end.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::net::VirtualResponse;

use super::engine::{self, EngineHandle};
use super::resolver::{self, Kind, PackageJson, Resolution};
use super::shims::{self, bridge::HostBridge};
use super::{transform, ShimContext};

/// Runs one `node <script.js> [args...]` invocation to completion (or until
/// its cancellation token fires) and returns the process's exit code. The
/// module cache that makes circular `require` safe lives entirely on the
/// JS side (see `JS_REQUIRE`); Rust only resolves and reads one file at a
/// time per `require` call.
pub async fn run_script(
    kernel: Arc<Kernel>,
    ctx: ShimContext,
    entry_specifier: String,
) -> Result<i32> {
    let cwd = ctx.cwd.clone();
    let entry_path = crate::vfs::path::normalize(&entry_specifier, &cwd);
    let entry_source = kernel
        .vfs
        .read_file_string(&entry_path, &cwd)
        .await
        .map_err(|_| Error::ModuleNotFound(entry_specifier.clone()))?;

    let entry_dir = crate::vfs::path::dirname(&entry_path);
    let body = prepare_module_body(&kernel, &entry_path, &entry_source, &cwd).await;
    execute(kernel, ctx, entry_path, entry_dir, body).await
}

/// Run `source` directly as the main module, the way `node -e <source>`
/// does: no VFS read, no ESM detection -- `-e` scripts are always CJS.
pub async fn run_eval(kernel: Arc<Kernel>, ctx: ShimContext, source: String) -> Result<i32> {
    let entry_dir = ctx.cwd.clone();
    execute(kernel, ctx, "[eval]".to_string(), entry_dir, source).await
}

async fn execute(
    kernel: Arc<Kernel>,
    ctx: ShimContext,
    entry_path: String,
    entry_dir: String,
    body: String,
) -> Result<i32> {
    let (handle, join) = spawn_engine(kernel.clone(), ctx.clone());

    let wrapped = wrap_as_main(&body);
    let run_result = run_entry(&handle, &entry_path, &entry_dir, wrapped).await;

    let exit_code = match run_result {
        Ok(()) => drain_event_loop(&kernel, ctx.pid, &ctx.signal, &handle).await,
        Err(Error::ProcessExit(code)) => code,
        Err(e) => {
            let message = format!("{e}\n");
            ctx.stderr.write(&message).await;
            1
        }
    };

    kernel.ports.close_all_for_pid(ctx.pid);
    handle.shutdown();
    let _ = join.join();
    Ok(exit_code)
}

fn spawn_engine(kernel: Arc<Kernel>, ctx: ShimContext) -> (EngineHandle, std::thread::JoinHandle<()>) {
    let rt = tokio::runtime::Handle::current();
    engine::spawn(move |context, self_handle| {
        let bridge = HostBridge {
            kernel,
            ctx,
            rt,
            engine: self_handle,
        };
        shims::install_all(context, bridge);
    })
}

/// Resolve and read one module's text, rewriting it to CommonJS if it looks
/// like ESM (by `package.json` `type` or a heuristic scan).
async fn prepare_module_body(kernel: &Arc<Kernel>, path: &str, source: &str, cwd: &str) -> String {
    let dir = crate::vfs::path::dirname(path);
    let is_esm = match nearest_package_json(kernel, &dir, cwd).await {
        Some(pkg) => pkg.is_esm(),
        None => transform::looks_like_esm(source),
    };
    if is_esm || path.ends_with(".mjs") {
        transform::transform(source)
    } else {
        source.to_string()
    }
}

async fn nearest_package_json(kernel: &Arc<Kernel>, dir: &str, cwd: &str) -> Option<PackageJson> {
    for ancestor in crate::vfs::path::ancestors(dir) {
        let candidate = crate::vfs::path::join(&ancestor, "package.json");
        if let Ok(text) = kernel.vfs.read_file_string(&candidate, cwd).await {
            if let Some(pkg) = PackageJson::parse(&text) {
                return Some(pkg);
            }
        }
    }
    None
}

/// Wrap the entry script's CommonJS-shaped body as `main`: it gets its own
/// `module`/`exports`, plus `process.argv`/`__filename` already set by the
/// process shim, and is responsible for keeping the engine alive only as
/// long as a listening server or pending timer needs it.
fn wrap_as_main(body: &str) -> String {
    format!(
        "(function(exports, require, module, __filename, __dirname) {{\n{body}\n}})",
        body = body,
    )
}

async fn run_entry(
    handle: &EngineHandle,
    path: &str,
    dir: &str,
    wrapper_source: String,
) -> Result<()> {
    let script = format!(
        "globalThis.__lifoMain = {wrapper};\n\
         globalThis.__lifoMainModule = {{exports: {{}}}};\n\
         globalThis.__lifoMain(\n  \
             globalThis.__lifoMainModule.exports,\n  \
             function(spec) {{ return globalThis.__lifoRequire(spec, {dirname:?}); }},\n  \
             globalThis.__lifoMainModule,\n  \
             {filename:?},\n  \
             {dirname:?}\n\
         );",
        wrapper = wrapper_source,
        filename = path,
        dirname = dir,
    );
    handle.eval(script).await.map_err(translate_process_exit)
}

fn translate_process_exit(e: Error) -> Error {
    match &e {
        Error::Script(message) => {
            if let Some(code) = parse_exit_sentinel(message) {
                return Error::ProcessExit(code);
            }
            e
        }
        _ => e,
    }
}

fn parse_exit_sentinel(message: &str) -> Option<i32> {
    const MARKER: &str = "__LIFO_PROCESS_EXIT__:";
    let idx = message.find(MARKER)?;
    let rest = &message[idx + MARKER.len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '-').collect();
    digits.parse().ok()
}

/// After the entry script returns: pump timers and microtasks while no
/// server has registered yet, so fire-and-forget async work gets a chance
/// to call `http.createServer().listen()`; once a listening port shows up
/// for this pid, keep the process alive by racing against the abort signal
/// rather than an idle timeout, closing its servers when that signal fires.
/// Bails out on its own idle grace period if no server ever appears.
async fn drain_event_loop(kernel: &Arc<Kernel>, pid: u32, signal: &CancellationToken, handle: &EngineHandle) -> i32 {
    let mut idle_ticks = 0u32;
    loop {
        if signal.is_cancelled() {
            break;
        }

        handle.run_jobs().await;
        let still_pending = pump_timers(handle).await;

        if !kernel.ports.ports_for_pid(pid).is_empty() {
            signal.cancelled().await;
            break;
        }

        if still_pending {
            idle_ticks = 0;
        } else {
            idle_ticks += 1;
        }
        if idle_ticks > 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    0
}

async fn pump_timers(handle: &EngineHandle) -> bool {
    if handle.eval("globalThis.__lifoPumpTimers(20);".to_string()).await.is_err() {
        return false;
    }
    handle
        .eval_bool("globalThis.__lifoHasPendingTimers();".to_string())
        .await
        .unwrap_or(false)
}

/// Resolve one `require()`/import specifier relative to `from_dir` down to
/// a concrete file, builtin name, or native stub. Called both for the entry
/// module's own dependencies (via `require.rs`'s bridge handler) and could
/// be reused for static pre-resolution; the module cache that makes this
/// safe for circular requires lives on the JS side (see `JS_REQUIRE`).
pub async fn resolve_specifier(
    kernel: &Arc<Kernel>,
    specifier: &str,
    from_dir: &str,
    cwd: &str,
    search_roots: &[String],
) -> Result<Resolution> {
    match resolver::classify(specifier) {
        Kind::NodePrefixed(name) | Kind::BuiltIn(name) => Ok(Resolution::BuiltIn(name)),
        Kind::SubpathImport(key) => {
            let pkg = nearest_package_json(kernel, from_dir, cwd).await;
            resolver::resolve_subpath_import(&key, pkg.as_ref())
                .map(Resolution::File)
                .ok_or_else(|| Error::ModuleNotFound(specifier.to_string()))
        }
        Kind::RelativeOrAbsolute => {
            for candidate in resolver::relative_candidates(specifier, from_dir) {
                if kernel.vfs.exists(&candidate, cwd).await {
                    return Ok(Resolution::File(candidate));
                }
            }
            Err(Error::ModuleNotFound(specifier.to_string()))
        }
        Kind::Bare { package, subpath } => {
            if resolver::is_native_stub_specifier(&package) {
                return Ok(Resolution::NativeStub(package));
            }
            for node_modules_dir in resolver::node_modules_candidates(from_dir, &package) {
                if let Some(resolved) = try_package_dir(kernel, &node_modules_dir, subpath.as_deref(), cwd).await {
                    return Ok(Resolution::File(resolved));
                }
            }
            for root_dir in resolver::global_candidates(&package, search_roots) {
                if let Some(resolved) = try_package_dir(kernel, &root_dir, subpath.as_deref(), cwd).await {
                    return Ok(Resolution::File(resolved));
                }
            }
            Err(Error::ModuleNotFound(specifier.to_string()))
        }
    }
}

async fn try_package_dir(kernel: &Arc<Kernel>, dir: &str, subpath: Option<&str>, cwd: &str) -> Option<String> {
    if !kernel.vfs.exists(dir, cwd).await {
        return None;
    }
    let pkg_json_path = crate::vfs::path::join(dir, "package.json");
    let pkg = kernel
        .vfs
        .read_file_string(&pkg_json_path, cwd)
        .await
        .ok()
        .and_then(|t| PackageJson::parse(&t))
        .unwrap_or_default();
    let entry = resolver::entry_for_package(&pkg, subpath)?;
    let candidate = crate::vfs::path::join(dir, &entry);
    if kernel.vfs.exists(&candidate, cwd).await {
        Some(candidate)
    } else {
        None
    }
}

pub fn response_from_virtual(resp: VirtualResponse) -> serde_json::Value {
    shims::bridge::response_to_json(&resp)
}
