//! Event parsing, job dispatch and handlers for distbot.
//!
//! Inbound payloads are classified by the `parser`, queued as `Task`s and
//! picked up by `Worker`s. A worker hands events to the `JobDispatcher`,
//! which matches them against the project's configured jobs and runs the
//! handlers.

pub mod allowlist;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod queue;
pub mod reporter;
pub mod tasks;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use allowlist::Allowlist;
pub use context::WorkerContext;
pub use dispatcher::{JobDispatcher, ProcessingResults};
pub use error::{WorkerError, WorkerResult};
pub use handlers::{EventData, HandlerInvocation, HandlerKind};
pub use parser::Parser;
pub use queue::{MemoryTaskSink, TaskQueue, TaskSink};
pub use tasks::Task;
pub use worker::{TaskExecutor, Worker};
