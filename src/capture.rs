//! Write-through response body capture — mirrors bytes into a bounded
//! buffer as they flow past, without disturbing the stream itself
//! (`spec.md §4.4`).
//!
//! Grounded on the `StreamingBody<B>` `pin_project_lite` wrapper in
//! `http-cache/src/body.rs`'s `Streaming` variant, which forwards
//! `poll_frame`/`is_end_stream`/`size_hint` to an inner body unchanged.
//! This module adds the one thing that variant doesn't do: teeing each
//! data frame into a side buffer as it passes through, which is how a
//! pull-based [`http_body::Body`] expresses the spec's push-style
//! "forward, then mirror" capture stream.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;

use crate::entry::SegmentedBody;

/// Buffers response body bytes up to `maximum_body_size`, after which
/// buffering is silently disabled and whatever was captured so far is
/// discarded (`spec.md §4.4`) — the stream itself is never affected by
/// this decision.
#[derive(Debug, Default)]
pub struct CaptureStream {
    segments: Vec<Bytes>,
    length: usize,
    maximum_body_size: usize,
    buffering_enabled: bool,
}

impl CaptureStream {
    pub fn new(maximum_body_size: usize) -> Self {
        Self {
            segments: Vec::new(),
            length: 0,
            maximum_body_size,
            buffering_enabled: true,
        }
    }

    /// Wraps a fresh `CaptureStream` in the shared handle [`CaptureBody`]
    /// needs to tee into it from a detached response body.
    pub fn into_handle(self) -> CaptureHandle {
        Arc::new(Mutex::new(self))
    }

    fn record(&mut self, chunk: &Bytes) {
        if !self.buffering_enabled {
            return;
        }
        if self.length + chunk.len() > self.maximum_body_size {
            self.disable_buffering();
            return;
        }
        self.length += chunk.len();
        self.segments.push(chunk.clone());
    }

    /// Abandons any buffered content. An explicit, one-way decision — once
    /// disabled, a capture stream never resumes buffering (`spec.md §4.4`).
    pub fn disable_buffering(&mut self) {
        self.buffering_enabled = false;
        self.segments.clear();
        self.length = 0;
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering_enabled
    }

    pub fn len(&self) -> usize {
        self.length
    }

    /// The captured body, if buffering was never disabled.
    pub fn into_segmented_body(self) -> Option<SegmentedBody> {
        self.buffering_enabled.then(|| SegmentedBody::from_segments(self.segments))
    }

    /// Takes the captured segments out of a shared handle without
    /// consuming it, leaving an empty, still-disabled-or-enabled stream
    /// behind. Used once a response body has reached end-of-stream and the
    /// [`CaptureHandle`] it lives behind cannot be unwrapped.
    pub fn take_segmented_body(&mut self) -> Option<SegmentedBody> {
        if !self.buffering_enabled {
            return None;
        }
        let segments = std::mem::take(&mut self.segments);
        self.length = 0;
        Some(SegmentedBody::from_segments(segments))
    }
}

/// Shared handle to a [`CaptureStream`], cloned into a [`CaptureBody`] so
/// the owning request context can still read it out after the response
/// body has been handed off to the pipeline.
pub type CaptureHandle = Arc<Mutex<CaptureStream>>;

pin_project! {
    /// An [`http_body::Body`] adapter that tees each data frame into a
    /// [`CaptureHandle`] as it is forwarded, unchanged, to the caller.
    pub struct CaptureBody<B> {
        #[pin]
        inner: B,
        handle: CaptureHandle,
    }
}

impl<B> CaptureBody<B> {
    pub fn new(inner: B, handle: CaptureHandle) -> Self {
        Self { inner, handle }
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let poll = this.inner.poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &poll {
            if let Some(data) = frame.data_ref() {
                this.handle.lock().expect("lock poisoned").record(data);
            }
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
