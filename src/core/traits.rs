//! Collaborator interfaces for media in and media out.
//!
//! The encoder feeding the transmit side and the consumer of received audio
//! live outside this crate. These traits are the seams they plug into.

use async_trait::async_trait;

use super::error::SourceError;
use super::types::{MediaFrame, ReceivedFrame};

/// Pull interface for encoded media.
///
/// # Example
///
/// ```ignore
/// struct Tone { left: usize }
///
/// #[async_trait]
/// impl MediaSource for Tone {
///     async fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError> {
///         if self.left == 0 {
///             return Ok(None);
///         }
///         self.left -= 1;
///         Ok(Some(MediaFrame::audio(vec![0xF8, 0xFF, 0xFE])))
///     }
/// }
/// ```
#[async_trait]
pub trait MediaSource: Send {
    /// Return the next encoded frame, suspending until one is available.
    ///
    /// `Ok(None)` means the source is exhausted. This is a graceful end,
    /// not an error.
    async fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError>;
}

#[async_trait]
impl<S: MediaSource + ?Sized> MediaSource for Box<S> {
    async fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError> {
        (**self).next_frame().await
    }
}

/// Push interface for received media, keyed by remote source id.
///
/// Only authenticated, in-order frames are ever delivered.
pub trait FrameSink: Send {
    /// A frame from a remote speaker.
    fn on_frame(&mut self, frame: ReceivedFrame);

    /// A remote source went silent and its stream state was evicted.
    fn on_source_timeout(&mut self, source_id: u32);
}

/// Sink that discards everything (transmit-only sessions).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn on_frame(&mut self, _frame: ReceivedFrame) {}

    fn on_source_timeout(&mut self, _source_id: u32) {}
}
