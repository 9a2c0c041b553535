//! Single-writer async runtime, event stream and push feed.

/// Event stream types emitted by the runtime.
pub mod events;
/// Ordered-view publisher and callback subscriptions.
pub mod feed;
/// Handle and command loop implementation.
pub mod handle;
