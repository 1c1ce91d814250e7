//! HTTP server: routing, command dispatch and the worker pool

pub mod dispatch;
pub mod routes;
pub mod worker;

pub use dispatch::{Command, DispatchError, Dispatcher, QueryParams, Reply};
pub use routes::{AppState, handle_command, router};
pub use worker::{BoundedPool, Job, UnboundedPool, WorkerError, WorkerPool, pool_for};
