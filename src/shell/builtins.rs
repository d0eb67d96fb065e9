//! Shell builtins (§4.7): implemented directly against [`Shell`]'s mutable
//! state rather than registered in the [`super::registry::CommandRegistry`],
//! since several of them (`cd`, `export`, `alias`, `jobs`) need to mutate
//! session state a stateless `CommandContext` doesn't carry.

use super::context::{InputStream, OutputStream};
use super::interpreter::Shell;

/// Dispatch `name` to a builtin if one matches, running it against `shell`.
/// Returns `None` for anything that isn't a builtin, so the caller falls
/// through to the command registry.
pub async fn dispatch(
    shell: &mut Shell,
    name: &str,
    args: &[String],
    stdin: &InputStream,
    stdout: &OutputStream,
    stderr: &OutputStream,
) -> Option<i32> {
    let code = match name {
        "cd" => cd(shell, args, stderr).await,
        "pwd" => pwd(shell, stdout).await,
        "echo" => echo(args, stdout).await,
        "clear" => {
            stdout.write("\x1b[2J\x1b[H").await;
            0
        }
        "export" => export(shell, args).await,
        "unset" => unset(shell, args).await,
        "exit" => exit(shell, args),
        "true" => 0,
        "false" => 1,
        "jobs" => jobs(shell, stdout).await,
        "fg" => fg(shell, args, stderr).await,
        "bg" => bg(shell, args, stderr).await,
        "history" => history(shell, stdout).await,
        "source" | "." => source(shell, args, stdout, stderr).await,
        "alias" => alias(shell, args, stdout).await,
        "unalias" => unalias(shell, args),
        "test" => test_expr(&resolve_file_tests(shell, strip_trailing_bracket(name, args)).await),
        "[" => test_expr(&resolve_file_tests(shell, strip_trailing_bracket(name, args)).await),
        "read" => read(shell, args, stdin).await,
        _ => return None,
    };
    Some(code)
}

fn strip_trailing_bracket<'a>(name: &str, args: &'a [String]) -> &'a [String] {
    if name == "[" {
        match args.last() {
            Some(last) if last == "]" => &args[..args.len() - 1],
            _ => args,
        }
    } else {
        args
    }
}

async fn cd(shell: &mut Shell, args: &[String], stderr: &OutputStream) -> i32 {
    let home = shell.env.get("HOME").cloned().unwrap_or_else(|| "/".to_string());
    let target = match args.first().map(String::as_str) {
        None | Some("~") => home,
        Some("-") => match shell.env.get("OLDPWD").cloned() {
            Some(old) => old,
            None => {
                stderr.write("cd: OLDPWD not set\n").await;
                return 1;
            }
        },
        Some(other) if other == "~" => home,
        Some(other) if other.starts_with("~/") => format!("{home}/{}", &other[2..]),
        Some(other) => other.to_string(),
    };
    let normalized = crate::vfs::path::normalize(&target, &shell.cwd);
    match shell.kernel.vfs.stat(&normalized, &shell.cwd).await {
        Ok(stat) if stat.is_dir() => {
            shell.env.insert("OLDPWD".to_string(), shell.cwd.clone());
            shell.cwd = normalized.clone();
            shell.env.insert("PWD".to_string(), normalized);
            0
        }
        Ok(_) => {
            stderr.write(&format!("cd: {target}: Not a directory\n")).await;
            1
        }
        Err(_) => {
            stderr.write(&format!("cd: {target}: No such file or directory\n")).await;
            1
        }
    }
}

async fn pwd(shell: &Shell, stdout: &OutputStream) -> i32 {
    stdout.write(&format!("{}\n", shell.cwd)).await;
    0
}

async fn echo(args: &[String], stdout: &OutputStream) -> i32 {
    stdout.write(&format!("{}\n", args.join(" "))).await;
    0
}

async fn export(shell: &mut Shell, args: &[String]) -> i32 {
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            shell.env.insert(key.to_string(), value.to_string());
        }
    }
    0
}

async fn unset(shell: &mut Shell, args: &[String]) -> i32 {
    for key in args {
        shell.env.remove(key);
    }
    0
}

fn exit(shell: &mut Shell, args: &[String]) -> i32 {
    let code = args
        .first()
        .and_then(|s| s.parse::<i32>().ok())
        .unwrap_or(shell.last_status);
    shell.exit_requested = Some(code);
    code
}

async fn jobs(shell: &Shell, stdout: &OutputStream) -> i32 {
    for job in shell.jobs.all() {
        stdout.write(&format!("{}\n", job.report_line(true))).await;
    }
    0
}

fn parse_job_id(args: &[String]) -> Option<u32> {
    args.first()?.trim_start_matches('%').parse().ok()
}

async fn fg(shell: &mut Shell, args: &[String], stderr: &OutputStream) -> i32 {
    let Some(id) = parse_job_id(args).or_else(|| shell.jobs.all().last().map(|j| j.id)) else {
        stderr.write("fg: no current job\n").await;
        return 1;
    };
    let Some(job) = shell.jobs.get(id) else {
        stderr.write(&format!("fg: %{id}: no such job\n")).await;
        return 1;
    };
    job.wait().await.unwrap_or(0)
}

async fn bg(shell: &mut Shell, args: &[String], stderr: &OutputStream) -> i32 {
    let Some(id) = parse_job_id(args).or_else(|| shell.jobs.all().last().map(|j| j.id)) else {
        stderr.write("bg: no current job\n").await;
        return 1;
    };
    if shell.jobs.get(id).is_none() {
        stderr.write(&format!("bg: %{id}: no such job\n")).await;
        return 1;
    }
    0
}

async fn history(shell: &Shell, stdout: &OutputStream) -> i32 {
    for (i, line) in shell.history.iter().enumerate() {
        stdout.write(&format!("{:5}  {}\n", i + 1, line)).await;
    }
    0
}

async fn source(shell: &mut Shell, args: &[String], stdout: &OutputStream, stderr: &OutputStream) -> i32 {
    let Some(path_arg) = args.first() else {
        stderr.write("source: filename argument required\n").await;
        return 1;
    };
    let path = crate::vfs::path::normalize(path_arg, &shell.cwd);
    if !shell.kernel.vfs.exists(&path, &shell.cwd).await {
        stderr.write(&format!("source: {path_arg}: No such file or directory\n")).await;
        return 1;
    }
    shell.run_file(&path, stdout, stderr).await;
    shell.last_status
}

async fn alias(shell: &mut Shell, args: &[String], stdout: &OutputStream) -> i32 {
    if args.is_empty() {
        let mut names: Vec<_> = shell.aliases.keys().cloned().collect();
        names.sort();
        for name in names {
            stdout.write(&format!("alias {}='{}'\n", name, shell.aliases[&name])).await;
        }
        return 0;
    }
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                let value = value.trim_matches(|c| c == '\'' || c == '"');
                shell.aliases.insert(name.to_string(), value.to_string());
            }
            None => {
                if let Some(value) = shell.aliases.get(arg) {
                    stdout.write(&format!("alias {arg}='{value}'\n")).await;
                }
            }
        }
    }
    0
}

fn unalias(shell: &mut Shell, args: &[String]) -> i32 {
    for name in args {
        shell.aliases.remove(name);
    }
    0
}

async fn read(shell: &mut Shell, args: &[String], stdin: &InputStream) -> i32 {
    let line = stdin.read_all().await;
    let line = line.lines().next().unwrap_or_default();
    if let Some(var) = args.first() {
        shell.env.insert(var.clone(), line.to_string());
    }
    0
}

/// POSIX `test`/`[` grammar: unary file/string tests, binary string and
/// numeric comparators, `!` negation, and `-a`/`-o` conjunction at the top
/// level (left-associative, no operator precedence beyond that -- matching
/// what real `test` implementations support without a full grammar).
fn test_expr(args: &[String]) -> i32 {
    if eval_test(args) { 0 } else { 1 }
}

fn eval_test(args: &[String]) -> bool {
    if args.is_empty() {
        return false;
    }
    // Split on top-level -a/-o, left to right.
    let mut groups: Vec<Vec<String>> = vec![Vec::new()];
    let mut ops: Vec<&str> = Vec::new();
    for arg in args {
        if arg == "-a" || arg == "-o" {
            ops.push(if arg == "-a" { "-a" } else { "-o" });
            groups.push(Vec::new());
        } else {
            groups.last_mut().unwrap().push(arg.clone());
        }
    }
    let mut result = eval_test_clause(&groups[0]);
    for (op, group) in ops.iter().zip(groups.iter().skip(1)) {
        let rhs = eval_test_clause(group);
        result = if *op == "-a" { result && rhs } else { result || rhs };
    }
    result
}

fn eval_test_clause(args: &[String]) -> bool {
    let mut args = args;
    let mut negate = false;
    while args.first().map(String::as_str) == Some("!") {
        negate = true;
        args = &args[1..];
    }
    let value = match args {
        [] => false,
        [single] => !single.is_empty(),
        [flag, operand] if flag == "-z" => operand.is_empty(),
        [flag, operand] if flag == "-n" => !operand.is_empty(),
        [flag, path] if flag == "-e" || flag == "-f" || flag == "-d" => file_test(flag, path),
        [lhs, op, rhs] if op == "=" || op == "==" => lhs == rhs,
        [lhs, op, rhs] if op == "!=" => lhs != rhs,
        [lhs, op, rhs] => numeric_compare(lhs, op, rhs).unwrap_or(false),
        _ => false,
    };
    if negate {
        !value
    } else {
        value
    }
}

/// The conjunction walker in `eval_test`/`eval_test_clause` has no `await`
/// points, so `-e`/`-f`/`-d` operands are resolved against the VFS in an
/// async pre-pass (`resolve_file_tests`, called from `dispatch`) that
/// rewrites the path operand to one of these sentinels before the
/// synchronous evaluator ever sees it.
const FILE_TEST_TRUE: &str = "__lifo_test_true__";
const FILE_TEST_FALSE: &str = "__lifo_test_false__";

fn file_test(_flag: &str, path: &str) -> bool {
    path == FILE_TEST_TRUE
}

/// Walk `args` once, replacing the path operand of every `-e`/`-f`/`-d`
/// unary test with a resolved sentinel so the rest of the (synchronous)
/// `test`/`[` grammar doesn't need VFS access.
async fn resolve_file_tests(shell: &Shell, args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        if (flag == "-e" || flag == "-f" || flag == "-d") && i + 1 < args.len() {
            let path = &args[i + 1];
            let normalized = crate::vfs::path::normalize(path, &shell.cwd);
            let exists = match flag {
                "-f" => matches!(
                    shell.kernel.vfs.stat(&normalized, &shell.cwd).await,
                    Ok(stat) if stat.is_file()
                ),
                "-d" => matches!(
                    shell.kernel.vfs.stat(&normalized, &shell.cwd).await,
                    Ok(stat) if stat.is_dir()
                ),
                _ => shell.kernel.vfs.exists(&normalized, &shell.cwd).await,
            };
            out.push(flag.to_string());
            out.push(if exists { FILE_TEST_TRUE } else { FILE_TEST_FALSE }.to_string());
            i += 2;
        } else {
            out.push(args[i].clone());
            i += 1;
        }
    }
    out
}

fn numeric_compare(lhs: &str, op: &str, rhs: &str) -> Option<bool> {
    let a: i64 = lhs.parse().ok()?;
    let b: i64 = rhs.parse().ok()?;
    Some(match op {
        "-eq" => a == b,
        "-ne" => a != b,
        "-lt" => a < b,
        "-le" => a <= b,
        "-gt" => a > b,
        "-ge" => a >= b,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use crate::shell::registry::CommandRegistry;
    use std::sync::Arc;

    fn test_shell() -> Shell {
        Shell::new(Kernel::mock(), 1, Arc::new(CommandRegistry::new()))
    }

    #[tokio::test]
    async fn cd_updates_cwd_and_oldpwd() {
        let mut shell = test_shell();
        shell.kernel.vfs.mkdir("/tmp/sub", true, "/").await.unwrap();
        let stderr = OutputStream::buffered();
        let code = cd(&mut shell, &["/tmp/sub".to_string()], &stderr).await;
        assert_eq!(code, 0);
        assert_eq!(shell.cwd, "/tmp/sub");
        assert_eq!(shell.env.get("OLDPWD").map(String::as_str), Some(shell.env.get("HOME").unwrap().as_str()));
    }

    #[tokio::test]
    async fn cd_missing_dir_fails() {
        let mut shell = test_shell();
        let stderr = OutputStream::buffered();
        let code = cd(&mut shell, &["/nope".to_string()], &stderr).await;
        assert_eq!(code, 1);
    }

    #[test]
    fn exit_sets_request_and_returns_code() {
        let mut shell = test_shell();
        let code = exit(&mut shell, &["7".to_string()]);
        assert_eq!(code, 7);
        assert_eq!(shell.exit_requested, Some(7));
    }

    #[test]
    fn test_eq_and_negation() {
        let args = vec!["a".to_string(), "=".to_string(), "a".to_string()];
        assert_eq!(test_expr(&args), 0);
        let args = vec!["!".to_string(), "a".to_string(), "=".to_string(), "a".to_string()];
        assert_eq!(test_expr(&args), 1);
    }

    #[test]
    fn test_numeric_comparators() {
        let args = vec!["3".to_string(), "-lt".to_string(), "5".to_string()];
        assert_eq!(test_expr(&args), 0);
        let args = vec!["3".to_string(), "-gt".to_string(), "5".to_string()];
        assert_eq!(test_expr(&args), 1);
    }

    #[test]
    fn test_conjunction_and_disjunction() {
        let args: Vec<String> = "-n a -a -n b".split_whitespace().map(String::from).collect();
        assert_eq!(test_expr(&args), 0);
        let args: Vec<String> = "-z a -o -n b".split_whitespace().map(String::from).collect();
        assert_eq!(test_expr(&args), 0);
    }

    #[tokio::test]
    async fn test_dash_e_checks_vfs_existence() {
        let mut shell = test_shell();
        shell.kernel.vfs.write_file("/tmp/present", b"x", "/").await.unwrap();
        let args = resolve_file_tests(&shell, &["-e".to_string(), "/tmp/present".to_string()]).await;
        assert_eq!(test_expr(&args), 0);
        let args = resolve_file_tests(&shell, &["-e".to_string(), "/tmp/missing".to_string()]).await;
        assert_eq!(test_expr(&args), 1);
    }

    #[tokio::test]
    async fn test_dash_d_distinguishes_file_from_directory() {
        let mut shell = test_shell();
        shell.kernel.vfs.write_file("/tmp/afile", b"x", "/").await.unwrap();
        let args = resolve_file_tests(&shell, &["-d".to_string(), "/tmp/afile".to_string()]).await;
        assert_eq!(test_expr(&args), 1);
        let args = resolve_file_tests(&shell, &["-d".to_string(), "/tmp".to_string()]).await;
        assert_eq!(test_expr(&args), 0);
    }

    #[tokio::test]
    async fn alias_round_trip() {
        let mut shell = test_shell();
        let stdout = OutputStream::buffered();
        alias(&mut shell, &["ll=ls -la".to_string()], &stdout).await;
        assert_eq!(shell.aliases.get("ll").map(String::as_str), Some("ls -la"));
    }
}
