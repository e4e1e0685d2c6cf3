//! Live delivery: the per-user connection registry and the long-lived
//! `text/event-stream` channel each connected client holds open.

pub mod frame;
pub mod registry;
pub mod stream;

pub use frame::Frame;
pub use registry::{ConnectionRegistry, LiveHandle, Publisher};
