//! Default command catalog: thin glue proving the shell/kernel contracts are
//! exercisable end to end. Not a general-purpose coreutils reimplementation --
//! each command covers the common case and nothing more.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::kernel::Kernel;
use crate::node::{executor, ShimContext};
use crate::shell::{CommandContext, CommandRegistry};
use crate::vfs::path;

/// Register every built-in catalog command (§1's `ls, cat, echo, pwd, cp,
/// mv, rm, mkdir, grep, curl, node`) into `registry`.
pub fn register_default(registry: &mut CommandRegistry) {
    registry.register("ls", ls);
    registry.register("cat", cat);
    registry.register("echo", echo);
    registry.register("pwd", pwd);
    registry.register("cp", cp);
    registry.register("mv", mv);
    registry.register("rm", rm);
    registry.register("mkdir", mkdir);
    registry.register("grep", grep);
    registry.register("curl", curl);
    registry.register("node", node);
}

async fn echo(ctx: CommandContext) -> i32 {
    ctx.writeln_stdout(&ctx.args.join(" ")).await;
    0
}

async fn pwd(ctx: CommandContext) -> i32 {
    ctx.writeln_stdout(&ctx.cwd).await;
    0
}

async fn ls(ctx: CommandContext) -> i32 {
    let target = ctx.args.first().map(String::as_str).unwrap_or(".");
    let norm = path::normalize(target, &ctx.cwd);
    match ctx.kernel.vfs.readdir(&norm, &ctx.cwd).await {
        Ok(mut entries) => {
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
            ctx.writeln_stdout(&names.join("  ")).await;
            0
        }
        Err(e) => {
            ctx.writeln_stderr(&format!("ls: {target}: {e}")).await;
            1
        }
    }
}

async fn cat(ctx: CommandContext) -> i32 {
    if ctx.args.is_empty() {
        let data = ctx.stdin.read_all().await;
        ctx.stdout.write(&data).await;
        return 0;
    }
    let mut status = 0;
    for arg in &ctx.args {
        let norm = path::normalize(arg, &ctx.cwd);
        match ctx.kernel.vfs.read_file_string(&norm, &ctx.cwd).await {
            Ok(text) => ctx.stdout.write(&text).await,
            Err(e) => {
                ctx.writeln_stderr(&format!("cat: {arg}: {e}")).await;
                status = 1;
            }
        }
    }
    status
}

async fn mkdir(ctx: CommandContext) -> i32 {
    let recursive = ctx.args.iter().any(|a| a == "-p");
    let mut status = 0;
    for arg in ctx.args.iter().filter(|a| a.as_str() != "-p") {
        let norm = path::normalize(arg, &ctx.cwd);
        if let Err(e) = ctx.kernel.vfs.mkdir(&norm, recursive, &ctx.cwd).await {
            ctx.writeln_stderr(&format!("mkdir: {arg}: {e}")).await;
            status = 1;
        }
    }
    status
}

async fn rm(ctx: CommandContext) -> i32 {
    let recursive = ctx.args.iter().any(|a| a == "-r" || a == "-rf" || a == "-fr");
    let mut status = 0;
    for arg in ctx.args.iter().filter(|a| !a.starts_with('-')) {
        let norm = path::normalize(arg, &ctx.cwd);
        let result = match ctx.kernel.vfs.stat(&norm, &ctx.cwd).await {
            Ok(stat) if stat.is_dir() && recursive => ctx.kernel.vfs.rmdir_recursive(&norm, &ctx.cwd).await,
            Ok(stat) if stat.is_dir() => ctx.kernel.vfs.rmdir(&norm, &ctx.cwd).await,
            Ok(_) => ctx.kernel.vfs.unlink(&norm, &ctx.cwd).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            ctx.writeln_stderr(&format!("rm: {arg}: {e}")).await;
            status = 1;
        }
    }
    status
}

async fn cp(ctx: CommandContext) -> i32 {
    let Some((from, to)) = two_paths(&ctx.args) else {
        ctx.writeln_stderr("cp: usage: cp <source> <dest>").await;
        return 1;
    };
    match ctx.kernel.vfs.copy_file(&from, &to, &ctx.cwd).await {
        Ok(()) => 0,
        Err(e) => {
            ctx.writeln_stderr(&format!("cp: {e}")).await;
            1
        }
    }
}

async fn mv(ctx: CommandContext) -> i32 {
    let Some((from, to)) = two_paths(&ctx.args) else {
        ctx.writeln_stderr("mv: usage: mv <source> <dest>").await;
        return 1;
    };
    match ctx.kernel.vfs.rename(&from, &to, &ctx.cwd).await {
        Ok(()) => 0,
        Err(e) => {
            ctx.writeln_stderr(&format!("mv: {e}")).await;
            1
        }
    }
}

fn two_paths(args: &[String]) -> Option<(String, String)> {
    match args {
        [a, b] => Some((a.clone(), b.clone())),
        _ => None,
    }
}

/// Fixed-string substring match against stdin or the named files, one line
/// per match, no regex flags -- real pattern support lives in the teacher's
/// idiom for a future command, not this glue layer.
async fn grep(ctx: CommandContext) -> i32 {
    let Some(pattern) = ctx.args.first().cloned() else {
        ctx.writeln_stderr("grep: usage: grep <pattern> [file...]").await;
        return 1;
    };
    let files = &ctx.args[1..];
    let mut found = false;

    if files.is_empty() {
        let data = ctx.stdin.read_all().await;
        for line in data.lines() {
            if line.contains(&pattern) {
                found = true;
                ctx.writeln_stdout(line).await;
            }
        }
    } else {
        for file in files {
            let norm = path::normalize(file, &ctx.cwd);
            match ctx.kernel.vfs.read_file_string(&norm, &ctx.cwd).await {
                Ok(text) => {
                    for line in text.lines() {
                        if line.contains(&pattern) {
                            found = true;
                            let prefix = if files.len() > 1 { format!("{file}:") } else { String::new() };
                            ctx.writeln_stdout(&format!("{prefix}{line}")).await;
                        }
                    }
                }
                Err(e) => ctx.writeln_stderr(&format!("grep: {file}: {e}")).await,
            }
        }
    }
    if found { 0 } else { 1 }
}

/// Virtual-first HTTP client: `localhost`/`127.0.0.1` URLs dispatch straight
/// into [`crate::net::PortRegistry`]; anything else requires the kernel's
/// `network_egress` escape hatch, matching the `dns` shim's posture.
async fn curl(ctx: CommandContext) -> i32 {
    let Some(url) = ctx.args.iter().find(|a| !a.starts_with('-')) else {
        ctx.writeln_stderr("curl: usage: curl <url>").await;
        return 1;
    };
    match fetch(&ctx.kernel, url).await {
        Ok(body) => {
            ctx.stdout.write(&body).await;
            0
        }
        Err(e) => {
            ctx.writeln_stderr(&format!("curl: {e}")).await;
            1
        }
    }
}

async fn fetch(kernel: &Arc<Kernel>, url: &str) -> Result<String, String> {
    let parsed = url::Url::parse(url).map_err(|e| e.to_string())?;
    let host = parsed.host_str().unwrap_or_default();
    if host == "localhost" || host == "127.0.0.1" {
        let port = parsed.port().unwrap_or(80);
        let req = crate::net::VirtualRequest {
            method: "GET".to_string(),
            path: parsed.path().to_string(),
            query: parsed.query().map(ToString::to_string),
            headers: vec![],
            body: vec![],
        };
        return match kernel.ports.dispatch(port, req).await {
            Some(resp) => Ok(String::from_utf8_lossy(&resp.body).into_owned()),
            None => Err(format!("(7) Failed to connect to {host} port {port}: Connection refused")),
        };
    }

    if !kernel.config.network_egress {
        return Err(format!("(6) Could not resolve host: {host}"));
    }

    let resp = reqwest::get(url).await.map_err(|e| e.to_string())?;
    resp.text().await.map_err(|e| e.to_string())
}

enum NodeInvocation {
    /// `node -e <source>` / `node --eval <source>`: run `source` directly.
    Eval(String),
    /// `node <script.js> [args...]`: read and run a VFS file.
    Script(String),
    Usage,
}

fn parse_node_args(args: &[String]) -> NodeInvocation {
    match args.first().map(String::as_str) {
        Some("-e") | Some("--eval") => match args.get(1) {
            Some(src) => NodeInvocation::Eval(src.clone()),
            None => NodeInvocation::Usage,
        },
        Some(entry) => NodeInvocation::Script(entry.to_string()),
        None => NodeInvocation::Usage,
    }
}

/// Run `node <script> [args...]` (or `node -e <source>`) against the
/// kernel's VFS, wiring the invocation's stdout/stderr/cwd/env straight
/// through from `ctx`.
async fn node(ctx: CommandContext) -> i32 {
    match parse_node_args(&ctx.args) {
        NodeInvocation::Usage => {
            ctx.writeln_stderr("node: usage: node [-e <script>] <script.js> [args...]").await;
            1
        }
        NodeInvocation::Eval(source) => {
            let shim_ctx = ShimContext {
                kernel: ctx.kernel.clone(),
                cwd: ctx.cwd.clone(),
                env: ctx.env.clone(),
                argv: ctx.args.clone(),
                filename: "[eval]".to_string(),
                dirname: ctx.cwd.clone(),
                signal: ctx.signal.clone(),
                pid: ctx.pid,
                stdout: ctx.stdout.clone(),
                stderr: ctx.stderr.clone(),
            };
            match executor::run_eval(ctx.kernel.clone(), shim_ctx, source).await {
                Ok(code) => code,
                Err(e) => {
                    ctx.writeln_stderr(&format!("node: {e}")).await;
                    1
                }
            }
        }
        NodeInvocation::Script(entry) => {
            let shim_ctx = ShimContext {
                kernel: ctx.kernel.clone(),
                cwd: ctx.cwd.clone(),
                env: ctx.env.clone(),
                argv: ctx.args.clone(),
                filename: path::normalize(&entry, &ctx.cwd),
                dirname: path::dirname(&path::normalize(&entry, &ctx.cwd)),
                signal: ctx.signal.clone(),
                pid: ctx.pid,
                stdout: ctx.stdout.clone(),
                stderr: ctx.stderr.clone(),
            };
            match executor::run_script(ctx.kernel.clone(), shim_ctx, entry).await {
                Ok(code) => code,
                Err(e) => {
                    ctx.writeln_stderr(&format!("node: {e}")).await;
                    1
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{InputStream, OutputStream};

    fn ctx(kernel: Arc<Kernel>, args: Vec<&str>) -> CommandContext {
        CommandContext {
            kernel,
            args: args.into_iter().map(String::from).collect(),
            env: Default::default(),
            cwd: "/".to_string(),
            stdin: InputStream::empty(),
            stdout: OutputStream::buffered(),
            stderr: OutputStream::buffered(),
            signal: CancellationToken::new(),
            pid: 2,
        }
    }

    #[tokio::test]
    async fn cat_reads_vfs_file() {
        let kernel = Kernel::mock();
        kernel.vfs.write_file("/greeting.txt", b"hi", "/").await.unwrap();
        let c = ctx(kernel, vec!["/greeting.txt"]);
        let stdout = c.stdout.clone();
        assert_eq!(cat(c).await, 0);
        assert_eq!(stdout.snapshot().await, b"hi".to_vec());
    }

    #[tokio::test]
    async fn cat_missing_file_fails() {
        let kernel = Kernel::mock();
        let c = ctx(kernel, vec!["/nope.txt"]);
        assert_eq!(cat(c).await, 1);
    }

    #[tokio::test]
    async fn ls_lists_seeded_directories() {
        let kernel = Kernel::mock();
        let c = ctx(kernel, vec!["/"]);
        let stdout = c.stdout.clone();
        assert_eq!(ls(c).await, 0);
        let out = String::from_utf8_lossy(&stdout.snapshot().await).into_owned();
        assert!(out.contains("tmp"));
    }

    #[tokio::test]
    async fn grep_filters_matching_lines() {
        let kernel = Kernel::mock();
        kernel.vfs.write_file("/log.txt", b"alpha\nbeta\ngamma", "/").await.unwrap();
        let c = ctx(kernel, vec!["beta", "/log.txt"]);
        let stdout = c.stdout.clone();
        assert_eq!(grep(c).await, 0);
        assert_eq!(stdout.snapshot().await, b"beta\n".to_vec());
    }

    #[tokio::test]
    async fn grep_no_match_returns_one() {
        let kernel = Kernel::mock();
        kernel.vfs.write_file("/log.txt", b"alpha", "/").await.unwrap();
        let c = ctx(kernel, vec!["zzz", "/log.txt"]);
        assert_eq!(grep(c).await, 1);
    }

    #[tokio::test]
    async fn node_eval_runs_inline_source() {
        let kernel = Kernel::mock();
        let c = ctx(kernel, vec!["-e", "console.log(require('path').join('/a','b'))"]);
        let stdout = c.stdout.clone();
        assert_eq!(node(c).await, 0);
        assert_eq!(stdout.snapshot().await, b"/a/b\n".to_vec());
    }

    #[tokio::test]
    async fn node_eval_process_exit_propagates_code() {
        let kernel = Kernel::mock();
        let c = ctx(kernel, vec!["--eval", "process.exit(42)"]);
        assert_eq!(node(c).await, 42);
    }

    #[tokio::test]
    async fn node_eval_without_source_is_usage_error() {
        let kernel = Kernel::mock();
        let c = ctx(kernel, vec!["-e"]);
        assert_eq!(node(c).await, 1);
    }

    #[tokio::test]
    async fn curl_without_listener_fails_cleanly() {
        let kernel = Kernel::mock();
        let c = ctx(kernel, vec!["http://localhost:4000/"]);
        assert_eq!(curl(c).await, 1);
    }

    #[tokio::test]
    async fn mkdir_then_rm_round_trips() {
        let kernel = Kernel::mock();
        let c = ctx(kernel.clone(), vec!["/scratch"]);
        assert_eq!(mkdir(c).await, 0);
        assert!(kernel.vfs.exists("/scratch", "/").await);
        let c = ctx(kernel.clone(), vec!["/scratch"]);
        assert_eq!(rm(c).await, 0);
        assert!(!kernel.vfs.exists("/scratch", "/").await);
    }
}
