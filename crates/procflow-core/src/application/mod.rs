/// Flow executor state machine
pub mod flow_executor;

/// Per-instance exclusive locks
pub mod instance_locks;

/// Engine facade over stores and executor
pub mod engine;
