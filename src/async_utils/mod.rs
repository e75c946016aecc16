//! Asynchronous utilities for use with Tokio.
//!
//! The extraction pipeline is sequential, but it shells out to `pdfinfo`,
//! `pdftocairo` and `tesseract`, and it does a fair amount of pixel pushing.
//! The helpers here keep both kinds of work off the async executor.

use crate::prelude::*;

pub mod io;

/// Report any command failures, and include any error output.
///
/// The output of standard error and standard output will be logged at
/// appropriate levels. And each line of standard error may be optionally
/// checked by `is_error_line` to determine if the command failed.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
    is_error_line: Option<&dyn Fn(&str) -> bool>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );

    if output.status.success() {
        if !stderr.trim().is_empty() {
            warn!(
                command_name = command_name,
                output = %stderr,
                "Standard error from command",
            );
        }
        if let Some(is_error_line) = is_error_line
            && stderr.lines().any(is_error_line)
        {
            return Err(anyhow!(
                "{} printed error output:\n{}",
                command_name,
                stderr,
            ));
        }
        Ok(())
    } else {
        error!(
            command_name = command_name,
            output = %stderr,
            "Standard error from failed command",
        );
        if let Some(exit_code) = output.status.code() {
            Err(anyhow!(
                "{} failed with exit code {} and error output:\n{}",
                command_name,
                exit_code,
                stderr,
            ))
        } else {
            Err(anyhow!(
                "{} failed with error output:\n{}",
                command_name,
                stderr,
            ))
        }
    }
}

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => panic!("blocking task was cancelled: {err}"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{os::unix::process::ExitStatusExt as _, process::Output};

    use super::*;

    fn output(code: i32, stderr: &str) -> Output {
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: vec![],
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn successful_command_passes() {
        assert!(check_for_command_failure("true", &output(0, ""), None).is_ok());
    }

    #[test]
    fn failing_command_reports_exit_code() {
        let err = check_for_command_failure("pdfinfo", &output(1, "Syntax Error"), None)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pdfinfo failed with exit code 1"));
        assert!(msg.contains("Syntax Error"));
    }

    #[test]
    fn error_lines_flag_successful_command() {
        let is_error = |line: &str| line.starts_with("Error");
        let result = check_for_command_failure(
            "pdftocairo",
            &output(0, "Warning: odd font\nError: bad xref"),
            Some(&is_error),
        );
        assert!(result.is_err());
        let result =
            check_for_command_failure("pdftocairo", &output(0, "Warning: odd font"), Some(&is_error));
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn spawn_blocking_returns_value() {
        let value = spawn_blocking_propagating_panics(|| 2 + 2).await;
        assert_eq!(value, 4);
    }
}
