pub mod context;
pub mod queue;
pub mod registry;
pub mod worker;

pub use context::ExecutionContext;
pub use kodit_db::Operation;
pub use queue::TaskQueue;
pub use registry::{Handler, HandlerRegistry};
pub use worker::WorkerRuntime;
