// Helper functions shared by engine invocations

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

/// Run a command to completion with an overall timeout.
///
/// Both pipes are drained by spawned tasks while waiting, so a chatty
/// child cannot deadlock on a full pipe. On expiry the child is killed
/// and the error names the timeout.
pub async fn run_output_with_timeout(
    program: &Path,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, String> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to start {}: {}", program.display(), e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| format!("Failed to capture stdout from {}", program.display()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| format!("Failed to capture stderr from {}", program.display()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stdout: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stderr: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });

    let waited = timeout(Duration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| format!("Failed to wait for {}: {}", program.display(), e))?;
            let stdout = stdout_task
                .await
                .map_err(|e| format!("stdout task failed: {}", e))??;
            let stderr = stderr_task
                .await
                .map_err(|e| format!("stderr task failed: {}", e))??;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(format!("Timed out after {}s", timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_of_a_quick_command() {
        let output = run_output_with_timeout(
            &PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), "echo hello".to_string()],
            5,
        )
        .await
        .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kills_on_timeout() {
        let result = run_output_with_timeout(
            &PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), "sleep 30".to_string()],
            1,
        )
        .await;
        match result {
            Err(message) => assert!(message.contains("Timed out")),
            Ok(_) => panic!("expected a timeout"),
        }
    }

    #[tokio::test]
    async fn missing_program_reports_start_failure() {
        let result = run_output_with_timeout(
            &PathBuf::from("/definitely/not/here"),
            vec![],
            1,
        )
        .await;
        match result {
            Err(message) => assert!(message.contains("Failed to start")),
            Ok(_) => panic!("expected a spawn failure"),
        }
    }
}
