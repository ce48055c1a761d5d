//! Single-consumer async runtime and event stream APIs.

/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and consumer loop implementation.
pub mod handle;
