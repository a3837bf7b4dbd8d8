//! Streaming execution protocol client for the Flowline runner.
//!
//! Encodes an editable graph document into wire requests, incrementally
//! decodes the runner's unbounded event stream, and drives the run state
//! machine across the suspend/resume boundary.

pub mod activity;
pub mod codec;
pub mod runner;
pub mod session;
pub mod sse;

pub use activity::{NodeActivity, StateSnapshot};
pub use codec::{decode_saved_graph, EncodeOptions, ResumeRequest, RunRequest};
pub use runner::{RunnerClient, RunnerTransport, SavedGraph, ValidationReport};
pub use session::{ExecutionSession, RunMode, RunState};
pub use sse::FrameDecoder;
