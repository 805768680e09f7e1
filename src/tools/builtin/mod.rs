//! Concrete reference tools shipped with the crate: `read_file` (SAFE),
//! `write_file` (CAUTIOUS), `run_shell` (DANGEROUS).

mod file;
mod shell;

pub use file::{ReadFileTool, WriteFileTool};
pub use shell::RunShellTool;
