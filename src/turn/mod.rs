//! Turn lifecycle: ordering, the tool-calling loop, the event stream, and
//! the executor state machine that ties them together.

pub mod events;
pub mod executor;
pub mod manager;
pub mod tool_loop;

pub use events::{ErrorKind, Event};
pub use executor::{TurnError, TurnExecutor, TurnExecutorConfig};
pub use manager::{order_speakers, OrderingStrategy, RotationState};
pub use tool_loop::{
    run_tool_loop, PermissionReply, PermissionRequestSender, ToolLoopContext, ToolLoopOutcome,
    DEFAULT_MAX_ITERATIONS, DEFAULT_TOOL_DEADLINE,
};
