//! `run_shell` built-in tool. Applies the shared smart-excerpting pass
//! instead of a fixed head/tail byte window so long shell output is
//! trimmed consistently with other tools.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::excerpts::create_smart_excerpt;
use crate::tools::permission::PermissionLevel;
use crate::tools::registry::{ToolDescriptor, ToolExecutor};

pub struct RunShellTool {
    pub cwd: PathBuf,
}

#[async_trait]
impl ToolExecutor for RunShellTool {
    fn list(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "run_shell".into(),
            description: "Run a shell command in the project's working directory.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"],
            }),
            permission_level: PermissionLevel::Dangerous,
        }]
    }

    async fn execute(
        &self,
        _name: &str,
        args: &serde_json::Value,
        deadline: Duration,
    ) -> Result<String, String> {
        let command = args["command"].as_str().unwrap_or("");

        let run = tokio::process::Command::new("bash")
            .args(["-c", command])
            .current_dir(&self.cwd)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(deadline, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("failed to spawn shell: {e}")),
            Err(_) => return Err("shell command timed out".to_string()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let result = if output.status.success() {
            stdout.to_string()
        } else {
            format!(
                "exit code: {}\n{}\n{}",
                output.status.code().unwrap_or(-1),
                stdout,
                stderr
            )
        };

        Ok(create_smart_excerpt("run_shell", &result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_stdout() {
        let tool = RunShellTool { cwd: std::env::temp_dir() };
        let args = serde_json::json!({"command": "echo hi"});
        let out = tool
            .execute("run_shell", &args, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.trim(), "hi");
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let tool = RunShellTool { cwd: std::env::temp_dir() };
        let args = serde_json::json!({"command": "exit 3"});
        let out = tool
            .execute("run_shell", &args, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.contains("exit code: 3"));
    }

    #[tokio::test]
    async fn deadline_is_enforced() {
        let tool = RunShellTool { cwd: std::env::temp_dir() };
        let args = serde_json::json!({"command": "sleep 5"});
        let result = tool
            .execute("run_shell", &args, Duration::from_millis(50))
            .await;
        assert!(result.is_err());
    }
}
