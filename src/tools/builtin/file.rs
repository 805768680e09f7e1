//! `read_file` and `write_file` built-in tools.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tools::permission::PermissionLevel;
use crate::tools::registry::{ToolDescriptor, ToolExecutor};

fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        cwd.join(p)
    }
}

pub struct ReadFileTool {
    pub cwd: PathBuf,
}

#[async_trait]
impl ToolExecutor for ReadFileTool {
    fn list(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "read_file".into(),
            description: "Read a file's contents as UTF-8 text.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"],
            }),
            permission_level: PermissionLevel::Safe,
        }]
    }

    async fn execute(
        &self,
        _name: &str,
        args: &serde_json::Value,
        deadline: Duration,
    ) -> Result<String, String> {
        let path = args["path"].as_str().unwrap_or("");
        let full_path = resolve_path(&self.cwd, path);
        match tokio::time::timeout(deadline, tokio::fs::read_to_string(&full_path)).await {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(format!("error reading {path}: {e}")),
            Err(_) => Err(format!("reading {path} timed out")),
        }
    }
}

pub struct WriteFileTool {
    pub cwd: PathBuf,
}

#[async_trait]
impl ToolExecutor for WriteFileTool {
    fn list(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "write_file".into(),
            description: "Write text content to a file, creating parent directories as needed."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"},
                },
                "required": ["path", "content"],
            }),
            permission_level: PermissionLevel::Cautious,
        }]
    }

    async fn execute(
        &self,
        _name: &str,
        args: &serde_json::Value,
        deadline: Duration,
    ) -> Result<String, String> {
        let path = args["path"].as_str().unwrap_or("");
        let content = args["content"].as_str().unwrap_or("");
        let full_path = resolve_path(&self.cwd, path);

        let write = async {
            if let Some(parent) = full_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("error creating parent dirs for {path}: {e}"))?;
            }
            tokio::fs::write(&full_path, content)
                .await
                .map_err(|e| format!("error writing {path}: {e}"))
        };

        match tokio::time::timeout(deadline, write).await {
            Ok(Ok(())) => Ok(format!("wrote {} bytes to {path}", content.len())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(format!("writing {path} timed out")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let write = WriteFileTool { cwd: dir.path().to_path_buf() };
        let read = ReadFileTool { cwd: dir.path().to_path_buf() };

        let args = serde_json::json!({"path": "notes.txt", "content": "hello"});
        let out = write.execute("write_file", &args, Duration::from_secs(1)).await.unwrap();
        assert!(out.contains("5 bytes"));

        let args = serde_json::json!({"path": "notes.txt"});
        let content = read.execute("read_file", &args, Duration::from_secs(1)).await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn read_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let read = ReadFileTool { cwd: dir.path().to_path_buf() };
        let args = serde_json::json!({"path": "nope.txt"});
        let result = read.execute("read_file", &args, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
