pub mod config;
pub mod document;
pub mod error;
pub mod event;

pub use config::RunnerConfig;
pub use document::*;
pub use error::{FlowlineError, Result};
pub use event::{EventBus, ExecutionEvent, InterruptSession};
