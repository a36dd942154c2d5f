//! Incremental completion pipeline: bytes to lines to frames to message.

pub mod accumulator;
pub mod connectivity;
pub mod controller;
pub mod frames;
pub mod lines;
pub mod transport;

pub use controller::{MessageView, StreamController, StreamHandle, StreamOutcome, StreamPhase};
pub use transport::{CompletionRequest, CompletionTransport, Endpoint, HttpTransport, RequestParams};
