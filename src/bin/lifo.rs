//! `lifo`: the stdio harness binary.
//!
//! Proves the library's contracts end to end with two modes: `--repl` drives
//! an interactive shell over a raw-mode TTY, `--serve <addr>` runs the
//! dev-server proxy that is the one real TCP listener in the system (see
//! [`lifo_sh::net::proxy`]). Neither is part of the spec'd POSIX-facing
//! surface -- that surface is the in-shell prompt itself.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lifo_sh::kernel::KernelConfig;
use lifo_sh::shell::context::OutputStream;
use lifo_sh::shell::editor::{LineEditor, Terminal};
use lifo_sh::shell::CommandRegistry;
use lifo_sh::{Kernel, Shell};

#[derive(Parser, Debug)]
#[command(name = "lifo", version, about = "Virtual POSIX shell and Node-compatible script runtime")]
struct Cli {
    /// Run an interactive shell against a raw-mode TTY.
    #[arg(long)]
    repl: bool,

    /// Run the dev-server proxy on `addr` (e.g. 127.0.0.1:8787).
    #[arg(long, value_name = "ADDR")]
    serve: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let kernel = Kernel::boot(KernelConfig::from_env());

    match (cli.serve, cli.repl) {
        (Some(addr), _) => {
            if let Err(e) = serve(kernel, addr).await {
                eprintln!("lifo: serve error: {e}");
                std::process::exit(1);
            }
        }
        _ => {
            let code = repl(kernel).await;
            std::process::exit(code);
        }
    }
}

/// The dev-server proxy: the only real socket in the system, translating
/// inbound HTTP into dispatches against the kernel's virtual port registry.
async fn serve(kernel: Arc<Kernel>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    println!("lifo: dev-server proxy listening on http://{addr}");
    loop {
        let (stream, _) = listener.accept().await?;
        let kernel = kernel.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_proxy_connection(stream, kernel).await {
                tracing::warn!(error = %e, "proxy connection error");
            }
        });
    }
}

async fn handle_proxy_connection(mut stream: TcpStream, kernel: Arc<Kernel>) -> std::io::Result<()> {
    let mut buf = vec![0u8; 64 * 1024];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }
    let request_text = String::from_utf8_lossy(&buf[..n]);
    let mut lines = request_text.lines();
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("GET");
    let raw_path = parts.next().unwrap_or("/");
    let (path, query) = raw_path.split_once('?').map_or((raw_path, None), |(p, q)| (p, Some(q)));

    let mut headers = Vec::new();
    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_lowercase(), v.trim().to_string()));
        }
    }
    let body = request_text.split("\r\n\r\n").nth(1).unwrap_or("").as_bytes().to_vec();

    let resp = lifo_sh::net::proxy::route(&kernel.ports, method, path, query, headers, body).await;
    let header_lines: String = resp
        .headers
        .iter()
        .map(|(k, v)| format!("{k}: {v}\r\n"))
        .collect();
    let response = format!(
        "HTTP/1.1 {} {}\r\n{header_lines}Content-Length: {}\r\nConnection: close\r\n\r\n",
        resp.status,
        status_text(resp.status),
        resp.body.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    stream.write_all(&resp.body).await?;
    Ok(())
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

/// Bridges the [`Terminal`] contract to real stdio, driving raw mode through
/// `rustix`'s termios bindings.
struct StdioTerminal {
    cols: usize,
}

impl Terminal for StdioTerminal {
    fn cols(&self) -> usize {
        self.cols
    }

    fn write(&self, s: &str) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(s.as_bytes());
        let _ = stdout.flush();
    }

    fn clear(&self) {
        self.write("\x1b[2J\x1b[H");
    }
}

fn terminal_cols() -> usize {
    rustix::termios::tcgetwinsize(std::io::stdout())
        .map(|size| size.ws_col as usize)
        .unwrap_or(80)
        .max(1)
}

struct RawModeGuard {
    original: rustix::termios::Termios,
}

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        use rustix::termios::{InputModes, LocalModes, OptionalActions};

        let stdin = std::io::stdin();
        let original = rustix::termios::tcgetattr(&stdin)?;
        let mut raw = original.clone();
        raw.local_modes.remove(LocalModes::ICANON | LocalModes::ECHO | LocalModes::ISIG);
        raw.input_modes.remove(InputModes::IXON | InputModes::ICRNL);
        rustix::termios::tcsetattr(&stdin, OptionalActions::Flush, &raw)?;
        Ok(Self { original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let stdin = std::io::stdin();
        let _ = rustix::termios::tcsetattr(&stdin, rustix::termios::OptionalActions::Flush, &self.original);
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

async fn repl(kernel: Arc<Kernel>) -> i32 {
    unsafe {
        let _ = signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            INTERRUPTED.store(true, Ordering::SeqCst);
        });
    }

    let mut registry = CommandRegistry::new();
    lifo_sh::commands::register_default(&mut registry);

    let mut shell = Shell::new(kernel, lifo_sh::process::INIT_PID, Arc::new(registry));
    let stdout = OutputStream::terminal(Arc::new(|s: &str| print!("{s}")));
    let stderr = OutputStream::terminal(Arc::new(|s: &str| eprint!("{s}")));

    shell.load_history().await;
    shell.source_profile(&stdout, &stderr).await;

    let terminal = StdioTerminal { cols: terminal_cols() };
    let mut editor = LineEditor::new();
    let _raw_guard = RawModeGuard::enable().ok();
    if _raw_guard.is_some() {
        editor.enter_raw_mode();
    }

    let mut stdin = std::io::stdin();
    let mut byte = [0u8; 1];

    loop {
        if let Some(code) = shell.exit_requested {
            shell.save_history().await;
            return code;
        }

        for (pid, code) in shell.kernel.processes.collect_zombies() {
            if let Some(job) = shell.jobs.get_by_pid(pid) {
                if let Some(line) = shell.jobs.complete(job.id, code) {
                    terminal.write(&format!("\r\n{line}\r\n"));
                }
            }
        }

        let prompt = format!("{}$ ", shell.cwd);
        terminal.write(&format!("\r\n{prompt}"));

        let line = loop {
            if INTERRUPTED.swap(false, Ordering::SeqCst) {
                editor.reset();
                terminal.write("^C\r\n");
                terminal.write(&prompt);
                continue;
            }
            match stdin.read(&mut byte) {
                Ok(0) => return 0,
                Ok(_) => {
                    let ch = byte[0] as char;
                    match ch {
                        '\r' | '\n' => break editor.buffer.clone(),
                        '\u{7f}' | '\u{8}' => {
                            editor.backspace();
                        }
                        '\u{3}' => return 130,
                        '\u{4}' if editor.buffer.is_empty() => return 0,
                        c if !c.is_control() => editor.insert(&c.to_string()),
                        _ => {}
                    }
                    terminal.write(&editor.redraw_sequence(&prompt, terminal.cols()));
                }
                Err(_) => return 1,
            }
        };

        terminal.write("\r\n");
        editor.reset();
        shell.execute_line(&line, stdout.clone(), stderr.clone()).await;
    }
}
