//! Subscriber transport abstraction

use std::future::Future;

use super::error::SinkError;
use super::message::PushFrame;

/// Write half of one subscriber's channel
///
/// The manager calls `send` concurrently for different subscribers but never
/// relies on ordering across them. Implementations serialize their own
/// writes and should bound how long a write may take.
pub trait SubscriberSink: Send + Sync + 'static {
    /// Deliver one frame
    fn send(&self, frame: PushFrame) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Close the channel; calling it on a closed sink does nothing
    fn close(&self) -> impl Future<Output = ()> + Send;
}
