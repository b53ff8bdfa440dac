///! # Calendar Agent Worker Library
///!
///! Runs the background jobs the API enqueues on the `jobs:events` Redis
///! stream.
///!
///! ## Modules
///!
///! - `functions`: Job functions, one per event kind
///! - `orchestrator`: Worker loop, dispatch and retries
///! - `queue`: Consumer group reader for the job stream
///!
///! ## Example
///!
///! ```no_run
///! use calendar_agent_worker::functions::registry;
///!
///! for function in registry() {
///!     println!("{} handles {}", function.id(), function.event());
///! }
///! ```

pub mod functions;
pub mod orchestrator;
pub mod queue;
