//! Serialized command execution
//!
//! Every controller owns one [`CommandQueue`]: a FIFO channel drained by a
//! single dedicated worker thread. Callers either post a command and return
//! immediately, or post it and block until the worker has finished running
//! it.

mod command_queue;

pub use command_queue::CommandQueue;
