//! Child process supervision.
//!
//! Spawns a branch module as a child process, waits under a deadline, and
//! classifies the outcome. Stdio is inherited by default so children print
//! directly to the user's terminal; discovery uses the captured variant
//! with a background reader draining the pipe.
//!
//! Timeout choice is two-layered. Layer 1 scans the full argv for
//! long-running keywords; a hit means the caller asks for "unlimited".
//! Layer 2 re-bounds a smaller allowlist of commands at the long timeout
//! even when the caller asked for unlimited. Everything else gets the
//! default deadline.

use crate::core::config::RouterConfig;
use crate::core::error::RouterError;
use crate::core::notify::{self, FailureEvent};
use crate::core::oplog::{OpLog, Severity};
use crate::core::output;
use crate::core::store::Store;
use serde_json::json;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Success,
    Failed,
    Timeout,
    LaunchError,
}

impl OutcomeClass {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeClass::Success => "success",
            OutcomeClass::Failed => "failed",
            OutcomeClass::Timeout => "timeout",
            OutcomeClass::LaunchError => "launch_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub class: OutcomeClass,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Resolve the effective deadline for one child argv.
///
/// `None` means no deadline at all: the caller hinted long-running and the
/// command is not re-bounded by the layer-2 allowlist.
pub fn choose_timeout(config: &RouterConfig, child_args: &[String]) -> Option<Duration> {
    let long_running = child_args.iter().any(|arg| {
        let lowered = arg.to_lowercase();
        config.long_running_keywords.iter().any(|k| *k == lowered)
    });
    if !long_running {
        return Some(Duration::from_secs(config.default_timeout_secs));
    }
    let command = child_args.first().map(|c| c.to_lowercase());
    if let Some(command) = command
        && config.bounded_long_commands.contains(&command)
    {
        return Some(Duration::from_secs(config.long_timeout_secs));
    }
    None
}

/// Build the spawn command for a module file: extension-mapped interpreter,
/// or direct execution when the file has no mapped extension.
fn build_command(config: &RouterConfig, module: &Path) -> Command {
    let ext = module.extension().and_then(|e| e.to_str()).unwrap_or("");
    match config.interpreters.get(ext) {
        Some(interpreter) => {
            let mut cmd = Command::new(interpreter);
            cmd.arg(module);
            cmd
        }
        None => Command::new(module),
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        return status.signal().map(|sig| 128 + sig);
    }
    #[allow(unreachable_code)]
    None
}

fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>, start: Instant) -> Outcome {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let code = exit_code_of(status);
                let class = if status.success() {
                    OutcomeClass::Success
                } else {
                    OutcomeClass::Failed
                };
                return Outcome {
                    class,
                    exit_code: code,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
            Ok(None) => {}
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return Outcome {
                    class: OutcomeClass::Failed,
                    exit_code: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        }
        if let Some(limit) = timeout
            && start.elapsed() >= limit
        {
            let _ = child.kill();
            let _ = child.wait();
            return Outcome {
                class: OutcomeClass::Timeout,
                exit_code: None,
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }
        std::thread::sleep(WAIT_POLL_INTERVAL);
    }
}

/// Run a module with inherited stdio and wait under the deadline.
pub fn run(config: &RouterConfig, module: &Path, args: &[String], timeout: Option<Duration>) -> Outcome {
    let start = Instant::now();
    if !module.is_file() {
        return Outcome {
            class: OutcomeClass::LaunchError,
            exit_code: None,
            duration_ms: 0,
        };
    }
    let mut cmd = build_command(config, module);
    cmd.args(args);
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(_) => {
            return Outcome {
                class: OutcomeClass::LaunchError,
                exit_code: None,
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }
    };
    wait_with_deadline(&mut child, timeout, start)
}

/// Captured variant for discovery: stdin closed, stdout drained by a
/// background reader so the child can never block on a full pipe.
pub fn run_captured(
    config: &RouterConfig,
    module: &Path,
    args: &[String],
    timeout: Duration,
) -> (Outcome, String) {
    let start = Instant::now();
    if !module.is_file() {
        return (
            Outcome {
                class: OutcomeClass::LaunchError,
                exit_code: None,
                duration_ms: 0,
            },
            String::new(),
        );
    }
    let mut cmd = build_command(config, module);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(_) => {
            return (
                Outcome {
                    class: OutcomeClass::LaunchError,
                    exit_code: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                },
                String::new(),
            );
        }
    };
    let reader = child.stdout.take().map(|mut stdout| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        })
    });
    let outcome = wait_with_deadline(&mut child, Some(timeout), start);
    let stdout = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    (outcome, stdout)
}

/// Full dispatch: run the child, log non-success at ERROR, and emit the
/// outbound failure notification. Notification delivery is best-effort.
#[allow(clippy::too_many_arguments)]
pub fn supervise(
    store: &Store,
    config: &RouterConfig,
    oplog: &OpLog,
    invocation_id: &str,
    branch: Option<&str>,
    module: &Path,
    args: &[String],
    timeout: Option<Duration>,
) -> Outcome {
    let outcome = run(config, module, args, timeout);
    if outcome.class != OutcomeClass::Success {
        let summary = output::summarize_argv(args, 160);
        oplog.record(
            Severity::Error,
            "supervisor",
            &format!("dispatch {}: {}", outcome.class.as_str(), module.display()),
            json!({
                "branch": branch,
                "argv": summary,
                "exit_code": outcome.exit_code,
                "duration_ms": outcome.duration_ms,
            }),
        );
        notify::emit(
            store,
            &FailureEvent::new(
                invocation_id,
                branch,
                &module.display().to_string(),
                &summary,
                outcome.class.as_str(),
                outcome.exit_code,
                outcome.duration_ms,
            ),
        );
    }
    outcome
}

/// Map a finished outcome onto the router's result type.
pub fn outcome_to_result(outcome: &Outcome, module: &Path) -> Result<i32, RouterError> {
    match outcome.class {
        OutcomeClass::Success => Ok(0),
        OutcomeClass::Failed => {
            let code = outcome.exit_code.unwrap_or(1);
            Err(RouterError::ChildFailure {
                code,
                summary: format!("{} exited with status {}", module.display(), code),
            })
        }
        OutcomeClass::Timeout => Err(RouterError::Timeout(format!(
            "{} exceeded its {}ms deadline and was killed",
            module.display(),
            outcome.duration_ms
        ))),
        OutcomeClass::LaunchError => Err(RouterError::Dispatch(format!(
            "could not launch {}",
            module.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        path
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_choose_timeout_default() {
        let config = RouterConfig::default();
        let timeout = choose_timeout(&config, &strings(&["crunch", "now"]));
        assert_eq!(timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_choose_timeout_keyword_lifts_deadline() {
        let config = RouterConfig::default();
        assert_eq!(choose_timeout(&config, &strings(&["watch", "logs"])), None);
        // the keyword may appear anywhere in the argv
        assert_eq!(choose_timeout(&config, &strings(&["run", "serve"])), None);
    }

    #[test]
    fn test_choose_timeout_rebounds_allowlisted_commands() {
        let config = RouterConfig::default();
        let timeout = choose_timeout(&config, &strings(&["checklist", "--full"]));
        assert_eq!(timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_run_success_and_failure_classes() {
        let tmp = tempdir().unwrap();
        let config = RouterConfig::default();
        let ok = script(tmp.path(), "ok.sh", "exit 0");
        let bad = script(tmp.path(), "bad.sh", "exit 3");

        let outcome = run(&config, &ok, &[], Some(Duration::from_secs(5)));
        assert_eq!(outcome.class, OutcomeClass::Success);
        assert_eq!(outcome.exit_code, Some(0));

        let outcome = run(&config, &bad, &[], Some(Duration::from_secs(5)));
        assert_eq!(outcome.class, OutcomeClass::Failed);
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[test]
    fn test_run_kills_at_deadline() {
        let tmp = tempdir().unwrap();
        let config = RouterConfig::default();
        let sleeper = script(tmp.path(), "sleep.sh", "sleep 5");
        let outcome = run(&config, &sleeper, &[], Some(Duration::from_millis(200)));
        assert_eq!(outcome.class, OutcomeClass::Timeout);
        assert!(outcome.duration_ms >= 200);
        assert!(outcome.duration_ms < 4000);
    }

    #[test]
    fn test_missing_module_is_launch_error() {
        let config = RouterConfig::default();
        let outcome = run(
            &config,
            Path::new("/nonexistent/apps/ghost.sh"),
            &[],
            Some(Duration::from_secs(1)),
        );
        assert_eq!(outcome.class, OutcomeClass::LaunchError);
    }

    #[test]
    fn test_run_captured_collects_stdout() {
        let tmp = tempdir().unwrap();
        let config = RouterConfig::default();
        let talker = script(tmp.path(), "talk.sh", "echo commands: create, list");
        let (outcome, stdout) = run_captured(&config, &talker, &[], Duration::from_secs(5));
        assert_eq!(outcome.class, OutcomeClass::Success);
        assert!(stdout.contains("commands: create, list"));
    }

    #[test]
    fn test_supervise_emits_failure_notification() {
        let tmp = tempdir().unwrap();
        let ws = tempdir().unwrap();
        let store = Store::at(ws.path());
        let config = RouterConfig::default();
        let oplog = OpLog::open(&store, 100);
        let bad = script(tmp.path(), "bad.sh", "exit 9");
        let outcome = supervise(
            &store,
            &config,
            &oplog,
            "inv-test",
            Some("flow"),
            &bad,
            &strings(&["crunch"]),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(outcome.class, OutcomeClass::Failed);
        let events = notify::read_events(&store);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, "failed");
        assert_eq!(events[0].exit_code, Some(9));
        assert_eq!(events[0].invocation_id, "inv-test");
    }

    #[test]
    fn test_outcome_mapping_to_results() {
        let module = Path::new("/ws/core/flow/apps/flow.sh");
        let ok = Outcome {
            class: OutcomeClass::Success,
            exit_code: Some(0),
            duration_ms: 1,
        };
        assert_eq!(outcome_to_result(&ok, module).unwrap(), 0);

        let failed = Outcome {
            class: OutcomeClass::Failed,
            exit_code: Some(4),
            duration_ms: 1,
        };
        let err = outcome_to_result(&failed, module).unwrap_err();
        assert_eq!(err.exit_code(), 4);

        let timed_out = Outcome {
            class: OutcomeClass::Timeout,
            exit_code: None,
            duration_ms: 30000,
        };
        assert!(matches!(
            outcome_to_result(&timed_out, module).unwrap_err(),
            RouterError::Timeout(_)
        ));
    }
}
