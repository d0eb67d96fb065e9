//! Shell interpreter: ties the lexer, parser, word expansion, command
//! registry, and builtins together into one executable shell session.
//!
//! One [`Shell`] owns the mutable per-session state (§3.6): `cwd`, `env`,
//! `aliases`, `history`, and the job table. The kernel's VFS, port
//! registry, and process registry are shared singletons reached through
//! `Arc<Kernel>`, matching the rest of the crate.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::kernel::Kernel;
use crate::process::job::JobTable;
use crate::process::{ProcessStatus, Spawn};

use super::builtins;
use super::context::{CommandContext, InputStream, OutputStream};
use super::expand;
use super::history::History;
use super::lexer::{self, LexError};
use super::parser::{self, AndOr, ParseError, Pipeline, RedirectKind, SimpleCommand, Word};
use super::registry::CommandRegistry;

/// One interactive (or scripted) shell session.
pub struct Shell {
    pub kernel: Arc<Kernel>,
    pub pid: u32,
    pub cwd: String,
    pub env: HashMap<String, String>,
    pub aliases: HashMap<String, String>,
    pub history: History,
    pub registry: Arc<CommandRegistry>,
    pub jobs: Arc<JobTable>,
    pub last_status: i32,
    /// Set by the `exit` builtin; the driving REPL loop checks this after
    /// every line and stops reading further input once it is `Some`.
    pub exit_requested: Option<i32>,
}

impl Shell {
    pub fn new(kernel: Arc<Kernel>, pid: u32, registry: Arc<CommandRegistry>) -> Self {
        let mut env = kernel.config.env_defaults.clone();
        env.entry("PWD".to_string())
            .or_insert_with(|| env.get("HOME").cloned().unwrap_or_else(|| "/".to_string()));
        let cwd = env.get("HOME").cloned().unwrap_or_else(|| "/".to_string());
        let capacity = kernel.config.history_capacity;
        Self {
            kernel,
            pid,
            cwd,
            env,
            aliases: HashMap::new(),
            history: History::new(capacity),
            registry,
            jobs: Arc::new(JobTable::new()),
            last_status: 0,
            exit_requested: None,
        }
    }

    /// Load `~/.lifo_history` into this session's history, best-effort.
    pub async fn load_history(&mut self) {
        let path = self.kernel.config.history_path.clone();
        if let Ok(h) = History::load(&self.kernel, &path, self.history.len().max(1)).await {
            self.history = History::new(self.kernel.config.history_capacity);
            for line in h.iter() {
                self.history.push(line.clone());
            }
        }
    }

    pub async fn save_history(&self) {
        let path = self.kernel.config.history_path.clone();
        let _ = self.history.save(&self.kernel, &path).await;
    }

    /// Source one of the startup files in priority order, first found wins,
    /// matching §6's "Persisted state" ordering.
    pub async fn source_profile(&mut self, stdout: &OutputStream, stderr: &OutputStream) {
        let home = self.env.get("HOME").cloned().unwrap_or_else(|| "/home/user".to_string());
        let candidates = [
            "/etc/profile".to_string(),
            format!("{home}/.bashrc"),
            format!("{home}/.liforc"),
            format!("{home}/.profile"),
        ];
        for path in candidates {
            if self.kernel.vfs.exists(&path, &self.cwd).await {
                self.run_file(&path, stdout, stderr).await;
                break;
            }
        }
    }

    pub(crate) async fn run_file(&mut self, path: &str, stdout: &OutputStream, stderr: &OutputStream) {
        if let Ok(text) = self.kernel.vfs.read_file_string(path, &self.cwd).await {
            for line in text.lines() {
                if line.trim().is_empty() || line.trim_start().starts_with('#') {
                    continue;
                }
                self.execute_line(line, stdout.clone(), stderr.clone()).await;
            }
        }
    }

    /// Run one input line to completion, honoring history expansion before
    /// alias expansion (the source's documented, if unconventional, order --
    /// see §9 Open Questions) and `;`/`&&`/`||` sequencing.
    pub async fn execute_line(&mut self, line: &str, stdout: OutputStream, stderr: OutputStream) -> i32 {
        let expanded = match self.history.expand(line) {
            Ok(s) => s,
            Err(e) => {
                stderr.write(&format!("shell: {e}\n")).await;
                self.set_status(2);
                return 2;
            }
        };
        self.history.push(expanded.clone());

        let sequence = match self.parse_line(&expanded) {
            Ok(seq) => seq,
            Err(message) => {
                stderr.write(&format!("shell: {message}\n")).await;
                self.set_status(2);
                return 2;
            }
        };

        let mut code = 0;
        for item in sequence {
            code = Box::pin(self.run_and_or(item, stdout.clone(), stderr.clone())).await;
            self.set_status(code);
        }
        code
    }

    fn parse_line(&self, line: &str) -> Result<Vec<AndOr>, String> {
        let tokens = lexer::tokenize(line).map_err(|LexError(m)| m)?;
        parser::parse(&tokens).map_err(|ParseError(m)| m)
    }

    fn set_status(&mut self, code: i32) {
        self.last_status = code;
        self.env.insert("?".to_string(), code.to_string());
    }

    async fn run_and_or(&mut self, item: AndOr, stdout: OutputStream, stderr: OutputStream) -> i32 {
        match item {
            AndOr::Pipeline(p) => self.run_pipeline(p, stdout, stderr).await,
            AndOr::And(lhs, rhs) => {
                let left = Box::pin(self.run_and_or(*lhs, stdout.clone(), stderr.clone())).await;
                if left == 0 {
                    self.run_pipeline(rhs, stdout, stderr).await
                } else {
                    left
                }
            }
            AndOr::Or(lhs, rhs) => {
                let left = Box::pin(self.run_and_or(*lhs, stdout.clone(), stderr.clone())).await;
                if left != 0 {
                    self.run_pipeline(rhs, stdout, stderr).await
                } else {
                    left
                }
            }
        }
    }

    /// Expand alias, words, and redirections for every stage of `pipeline`,
    /// then either run it in the foreground or detach it as a background job.
    async fn run_pipeline(&mut self, pipeline: Pipeline, stdout: OutputStream, stderr: OutputStream) -> i32 {
        if pipeline.background {
            return self.run_background(pipeline, stderr).await;
        }
        self.run_foreground(&pipeline.commands, stdout, stderr, CancellationToken::new()).await
    }

    async fn run_background(&mut self, pipeline: Pipeline, stderr: OutputStream) -> i32 {
        let command_line: String = pipeline
            .commands
            .iter()
            .map(|c| c.name.text.clone())
            .collect::<Vec<_>>()
            .join(" | ");
        let signal = CancellationToken::new();
        let job_pid = self.kernel.processes.spawn(Spawn {
            ppid: self.pid,
            command: command_line.clone(),
            args: Vec::new(),
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            is_foreground: false,
            job_id: None,
        }).pid;
        let job = self.jobs.add(job_pid, command_line.clone());
        self.kernel.processes.update_status(job_pid, ProcessStatus::Running);

        stderr.write(&format!("[{}] {}\n", job.id, job_pid)).await;

        let commands = pipeline.commands;
        let kernel = self.kernel.clone();
        let registry = self.registry.clone();
        let cwd = self.cwd.clone();
        let env = self.env.clone();
        let aliases = self.aliases.clone();
        let jobs = self.jobs.clone();
        let job_for_task = job.clone();
        let signal_for_task = signal.clone();

        tokio::spawn(async move {
            let mut detached = Shell {
                kernel: kernel.clone(),
                pid: job_pid,
                cwd,
                env,
                aliases,
                history: History::new(1),
                registry,
                jobs,
                last_status: 0,
                exit_requested: None,
            };
            let sink = OutputStream::buffered();
            let code = detached
                .run_foreground(&commands, sink, OutputStream::buffered(), signal_for_task)
                .await;
            kernel.processes.mark_exited(job_pid, code);
            if let Some(line) = detached.jobs.complete(job_for_task.id, code) {
                let _ = line;
            }
        });

        0
    }

    /// Runs every stage of a pipeline, chaining each stage's captured
    /// stdout into the next stage's stdin. The in-memory stream types have
    /// no true byte-level streaming (see [`super::context`]), so a stage's
    /// entire output is buffered before the next stage starts; this still
    /// satisfies "a pipeline where the first stage exits before the second
    /// reads still delivers buffered bytes" since nothing is dropped.
    async fn run_foreground(
        &mut self,
        commands: &[SimpleCommand],
        final_stdout: OutputStream,
        final_stderr: OutputStream,
        signal: CancellationToken,
    ) -> i32 {
        let mut upstream = InputStream::empty();
        let mut status = 0;
        let last = commands.len().saturating_sub(1);

        for (i, command) in commands.iter().enumerate() {
            let stage_stdout = if i == last { final_stdout.clone() } else { OutputStream::buffered() };
            status = self
                .run_simple_command(command, upstream.clone(), stage_stdout.clone(), final_stderr.clone(), signal.clone())
                .await;
            if i != last {
                upstream = InputStream::from_bytes(stage_stdout.take().await);
            }
            if signal.is_cancelled() {
                status = 130;
                break;
            }
        }
        status
    }

    /// Expands one simple command's words and redirections, then dispatches
    /// to an alias, a builtin, or a registered command. Builtins run inline
    /// against `self`'s mutable state; registered commands run against a
    /// snapshot [`CommandContext`].
    async fn run_simple_command(
        &mut self,
        command: &SimpleCommand,
        stdin: InputStream,
        stdout: OutputStream,
        stderr: OutputStream,
        signal: CancellationToken,
    ) -> i32 {
        let (name, mut words) = self.expand_alias(command).await;
        let mut args = Vec::new();
        for w in &words {
            args.extend(self.expand_word(w).await);
        }
        words.clear();

        let redirected = match self.resolve_redirects(command, stdin).await {
            Ok(v) => v,
            Err(message) => {
                stderr.write(&format!("shell: {message}\n")).await;
                return 1;
            }
        };
        let stdin = redirected.stdin;
        let run_stdout = redirected.stdout_file.is_some().then(OutputStream::buffered).unwrap_or(stdout);
        let run_stderr = redirected.stderr_file.is_some().then(OutputStream::buffered).unwrap_or(stderr);

        let code = if name.is_empty() {
            0
        } else if let Some(code) = builtins::dispatch(self, &name, &args, &stdin, &run_stdout, &run_stderr).await {
            code
        } else if let Some(command_fn) = self.registry.get(&name) {
            let pid = self
                .kernel
                .processes
                .spawn(Spawn {
                    ppid: self.pid,
                    command: name.clone(),
                    args: args.clone(),
                    cwd: self.cwd.clone(),
                    env: self.env.clone(),
                    is_foreground: true,
                    job_id: None,
                })
                .pid;
            let ctx = CommandContext {
                kernel: self.kernel.clone(),
                args,
                env: self.env.clone(),
                cwd: self.cwd.clone(),
                stdin,
                stdout: run_stdout.clone(),
                stderr: run_stderr.clone(),
                signal,
                pid,
            };
            let code = command_fn(ctx).await;
            self.kernel.processes.mark_exited(pid, code);
            code
        } else {
            run_stderr.write(&format!("{name}: command not found\n")).await;
            127
        };

        if let Some((path, append)) = redirected.stdout_file {
            self.flush_redirect(&path, append, run_stdout.take().await).await;
        }
        if let Some((path, append)) = redirected.stderr_file {
            self.flush_redirect(&path, append, run_stderr.take().await).await;
        }
        code
    }

    async fn flush_redirect(&self, path: &str, append: bool, data: Vec<u8>) {
        let result = if append {
            self.kernel.vfs.append_file(path, &data, &self.cwd).await
        } else {
            self.kernel.vfs.write_file(path, &data, &self.cwd).await
        };
        if result.is_err() {
            tracing::warn!(path, "redirect target could not be written");
        }
    }

    /// Expand the command name through the alias table exactly once (not
    /// recursively, to avoid `alias ls=ls` style loops), splicing any extra
    /// words the alias introduces ahead of the command's own arguments.
    async fn expand_alias(&self, command: &SimpleCommand) -> (String, Vec<Word>) {
        let head = &command.name.text;
        match self.aliases.get(head) {
            Some(expansion) if !command.name.quoted => {
                let tokens = lexer::tokenize(expansion).unwrap_or_default();
                let mut words: Vec<Word> = tokens
                    .into_iter()
                    .filter_map(|t| match t {
                        lexer::Token::Word { text, quoted } => Some(Word { text, quoted }),
                        _ => None,
                    })
                    .collect();
                if words.is_empty() {
                    return (head.clone(), command.args.clone());
                }
                let name = words.remove(0).text;
                words.extend(command.args.clone());
                (name, words)
            }
            _ => (head.clone(), command.args.clone()),
        }
    }

    /// Variable, command-substitution, tilde, and glob expansion for one
    /// word. A word may expand to more than one field via glob matching.
    async fn expand_word(&mut self, word: &Word) -> Vec<String> {
        let substituted = Box::pin(self.expand_command_substitution(&word.text)).await;
        let varied = expand::expand_variables(&substituted, &self.env);
        if word.quoted {
            return vec![varied];
        }
        let home = self.env.get("HOME").cloned().unwrap_or_else(|| "/".to_string());
        let tilde_expanded = expand::expand_tilde(&varied, &home);
        expand::expand_glob(&tilde_expanded, &self.cwd, &self.kernel.vfs).await
    }

    /// Replace every balanced `$(...)` in `text` with the captured stdout of
    /// running its contents as a nested command line.
    async fn expand_command_substitution(&mut self, text: &str) -> String {
        if !text.contains("$(") {
            return text.to_string();
        }
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '$' && chars.get(i + 1) == Some(&'(') {
                let mut depth = 1;
                let start = i + 2;
                let mut j = start;
                while j < chars.len() && depth > 0 {
                    match chars[j] {
                        '(' => depth += 1,
                        ')' => depth -= 1,
                        _ => {}
                    }
                    if depth == 0 {
                        break;
                    }
                    j += 1;
                }
                let inner: String = chars[start..j.min(chars.len())].iter().collect();
                let sink = OutputStream::buffered();
                Box::pin(self.execute_line(&inner, sink.clone(), OutputStream::buffered())).await;
                let captured = String::from_utf8_lossy(&sink.snapshot().await).trim_end_matches('\n').to_string();
                out.push_str(&captured);
                i = j + 1;
            } else {
                out.push(chars[i]);
                i += 1;
            }
        }
        out
    }

    /// Resolve redirections for one simple command. Input redirects read
    /// the file immediately; output redirects are reported as `(path,
    /// append)` targets so the caller can run the stage against a buffered
    /// stream and flush it to the VFS synchronously once the stage
    /// completes, avoiding a write-after-read race against later commands
    /// in the same script.
    async fn resolve_redirects(
        &self,
        command: &SimpleCommand,
        mut stdin: InputStream,
    ) -> Result<ResolvedRedirects, String> {
        let mut stdout_file = None;
        let mut stderr_file = None;
        for redirect in &command.redirects {
            let target = expand::expand_variables(&redirect.target.text, &self.env);
            let path = crate::vfs::path::normalize(&target, &self.cwd);
            match redirect.kind {
                RedirectKind::In => {
                    let data = self
                        .kernel
                        .vfs
                        .read_file(&path, &self.cwd)
                        .await
                        .map_err(|e| format!("{target}: {e}"))?;
                    stdin = InputStream::from_bytes(data);
                }
                RedirectKind::Out => stdout_file = Some((path, false)),
                RedirectKind::Append => stdout_file = Some((path, true)),
                RedirectKind::Err => stderr_file = Some((path, false)),
                RedirectKind::ErrAppend => stderr_file = Some((path, true)),
                RedirectKind::Both => {
                    // Both stdout and stderr land in the same file; stdout
                    // truncates first, stderr appends after, since the two
                    // streams aren't interleavable once buffered separately.
                    stdout_file = Some((path.clone(), false));
                    stderr_file = Some((path, true));
                }
            }
        }
        Ok(ResolvedRedirects { stdin, stdout_file, stderr_file })
    }
}

struct ResolvedRedirects {
    stdin: InputStream,
    stdout_file: Option<(String, bool)>,
    stderr_file: Option<(String, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::registry::CommandRegistry;

    fn test_shell() -> Shell {
        let kernel = Kernel::mock();
        Shell::new(kernel, 1, Arc::new(CommandRegistry::new()))
    }

    #[tokio::test]
    async fn echo_pipes_into_tr() {
        let mut shell = test_shell();
        shell.registry = Arc::new({
            let mut r = CommandRegistry::new();
            r.register("echo", |ctx: CommandContext| async move {
                ctx.stdout.write(&format!("{}\n", ctx.args.join(" "))).await;
                0
            });
            r.register("tr", |ctx: CommandContext| async move {
                let input = ctx.stdin.read_all().await;
                ctx.stdout.write(&input.to_uppercase()).await;
                0
            });
            r
        });
        let stdout = OutputStream::buffered();
        let stderr = OutputStream::buffered();
        let code = shell.execute_line("echo hi | tr", stdout.clone(), stderr).await;
        assert_eq!(code, 0);
        assert_eq!(stdout.snapshot().await, b"HI\n".to_vec());
    }

    #[tokio::test]
    async fn and_or_short_circuits() {
        let mut shell = test_shell();
        shell.registry = Arc::new({
            let mut r = CommandRegistry::new();
            r.register("true", |_ctx| async { 0 });
            r.register("false", |_ctx| async { 1 });
            r.register("echo", |ctx: CommandContext| async move {
                ctx.stdout.write("ran\n").await;
                0
            });
            r
        });
        let stdout = OutputStream::buffered();
        shell.execute_line("false && echo ran", stdout.clone(), OutputStream::buffered()).await;
        assert_eq!(stdout.snapshot().await, Vec::<u8>::new());

        let stdout2 = OutputStream::buffered();
        shell.execute_line("true && echo ran", stdout2.clone(), OutputStream::buffered()).await;
        assert_eq!(stdout2.snapshot().await, b"ran\n".to_vec());
    }

    #[tokio::test]
    async fn command_not_found_returns_127() {
        let mut shell = test_shell();
        let stderr = OutputStream::buffered();
        let code = shell.execute_line("nope", OutputStream::buffered(), stderr.clone()).await;
        assert_eq!(code, 127);
        assert!(String::from_utf8_lossy(&stderr.snapshot().await).contains("command not found"));
    }

    #[tokio::test]
    async fn redirect_out_writes_to_vfs() {
        let mut shell = test_shell();
        shell.registry = Arc::new({
            let mut r = CommandRegistry::new();
            r.register("echo", |ctx: CommandContext| async move {
                ctx.stdout.write(&format!("{}\n", ctx.args.join(" "))).await;
                0
            });
            r
        });
        shell.kernel.vfs.mkdir("/tmp", true, "/").await.unwrap();
        shell
            .execute_line("echo hi > /tmp/out.txt", OutputStream::buffered(), OutputStream::buffered())
            .await;
        let data = shell.kernel.vfs.read_file_string("/tmp/out.txt", "/").await.unwrap();
        assert_eq!(data, "hi\n");
    }

    #[tokio::test]
    async fn alias_expands_once() {
        let mut shell = test_shell();
        shell.registry = Arc::new({
            let mut r = CommandRegistry::new();
            r.register("echo", |ctx: CommandContext| async move {
                ctx.stdout.write(&format!("{}\n", ctx.args.join(" "))).await;
                0
            });
            r
        });
        shell.aliases.insert("ll".to_string(), "echo -l".to_string());
        let stdout = OutputStream::buffered();
        shell.execute_line("ll extra", stdout.clone(), OutputStream::buffered()).await;
        assert_eq!(stdout.snapshot().await, b"-l extra\n".to_vec());
    }
}
