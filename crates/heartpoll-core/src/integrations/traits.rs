use std::future::Future;
use std::pin::Pin;

use crate::error::BroadcastError;

/// Boxed future returned by [`Broadcaster`] methods.
pub type BroadcastFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BroadcastError>> + Send + 'a>>;

/// Outbound side of the chat transport.
///
/// Implementations post to a single broadcast channel identified by
/// `channel_id`; they never retry on their own.
pub trait Broadcaster: Send + Sync {
    /// Human-readable name for logs (e.g. "telegram").
    fn name(&self) -> &str;

    /// Post a text-only message.
    fn send_text<'a>(&'a self, channel_id: i64, text: &'a str) -> BroadcastFuture<'a>;

    /// Post an image with a caption. `asset` is a URL or a transport file id.
    fn send_photo<'a>(
        &'a self,
        channel_id: i64,
        asset: &'a str,
        caption: &'a str,
    ) -> BroadcastFuture<'a>;
}
