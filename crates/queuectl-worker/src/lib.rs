//! Execution lock, single-worker main loop, and multi-process supervision
//! for QueueCTL (design doc §4.4, §4.5). Concrete persistence and the
//! semantic `Queue` layer live in `queuectl-core` / `queuectl-store-sqlite`;
//! this crate is the part that actually runs shell commands.

mod exec;
mod lock;
mod manager;
mod worker;

pub use exec::{run_command, ExecOutcome};
pub use lock::{reap_stale_locks, remove_all_locks, ExecutionLock};
pub use manager::WorkerManager;
pub use worker::Worker;
