//! Frame sources for the stream pipeline: the local V4L2 camera or a
//! remote camera host's MJPEG feed.

use argus_hw::{Camera, CameraError, RgbFrame};
use std::io::Read;
use std::ops::ControlFlow;
use thiserror::Error;

/// Upper bound on buffered MJPEG bytes before the parser resyncs. A single
/// 640x480 JPEG is well under this.
const MJPEG_BUFFER_CAP: usize = 8 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream feed returned status {0}")]
    UpstreamStatus(u16),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

/// Where the pipeline pulls frames from.
pub enum FrameSource {
    Local(Camera),
    Remote(MjpegSource),
}

impl FrameSource {
    pub fn open_local(device_path: &str) -> Result<Self, SourceError> {
        Ok(Self::Local(Camera::open(device_path)?))
    }

    /// A remote MJPEG feed; the connection is made when streaming starts.
    pub fn remote(feed_url: String) -> Self {
        Self::Remote(MjpegSource { feed_url })
    }

    /// Deliver frames to the callback until it breaks or the source fails.
    ///
    /// Returning `Ok` means the callback ended the stream; an error means
    /// the source did.
    pub fn for_each_frame(
        self,
        on_frame: impl FnMut(RgbFrame) -> ControlFlow<()>,
    ) -> Result<(), SourceError> {
        match self {
            Self::Local(camera) => Ok(camera.stream_frames(on_frame)?),
            Self::Remote(remote) => remote.stream_frames(on_frame),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Local(camera) => camera.device_path.clone(),
            Self::Remote(remote) => remote.feed_url.clone(),
        }
    }
}

/// Blocking reader for a `multipart/x-mixed-replace` MJPEG feed.
pub struct MjpegSource {
    feed_url: String,
}

impl MjpegSource {
    fn stream_frames(
        self,
        mut on_frame: impl FnMut(RgbFrame) -> ControlFlow<()>,
    ) -> Result<(), SourceError> {
        let mut response = reqwest::blocking::get(&self.feed_url)?;
        if !response.status().is_success() {
            return Err(SourceError::UpstreamStatus(response.status().as_u16()));
        }

        tracing::info!(url = %self.feed_url, "connected to upstream feed");

        let mut extractor = JpegExtractor::new();
        let mut chunk = [0u8; 16 * 1024];
        let mut sequence = 0u32;

        loop {
            let n = response
                .read(&mut chunk)
                .map_err(|e| SourceError::Decode(format!("feed read failed: {e}")))?;
            if n == 0 {
                // Upstream closed the feed; treat like a camera read failure.
                return Err(SourceError::Decode("upstream feed closed".to_string()));
            }

            extractor.push(&chunk[..n]);

            while let Some(jpeg) = extractor.next_frame() {
                let image = image::load_from_memory(&jpeg)
                    .map_err(|e| SourceError::Decode(format!("bad JPEG in feed: {e}")))?
                    .to_rgb8();

                let frame = RgbFrame {
                    width: image.width(),
                    height: image.height(),
                    data: image.into_raw(),
                    timestamp: std::time::Instant::now(),
                    sequence,
                };
                sequence = sequence.wrapping_add(1);

                if on_frame(frame).is_break() {
                    return Ok(());
                }
            }
        }
    }
}

/// Incremental JPEG frame extraction from a byte stream.
///
/// Scans for SOI (FF D8) / EOI (FF D9) marker pairs, which is sound for
/// baseline JPEG: inside entropy-coded data every 0xFF is byte-stuffed or
/// a restart marker (FF D0–D7), so a literal FF D9 only appears as the
/// real terminator. Multipart boundaries and part headers between frames
/// are skipped as inter-frame garbage.
pub struct JpegExtractor {
    buf: Vec<u8>,
}

impl JpegExtractor {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MJPEG_BUFFER_CAP {
            tracing::warn!(len = self.buf.len(), "MJPEG buffer overrun, resyncing");
            self.buf.clear();
        }
    }

    /// Pop the next complete JPEG, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let soi = find_marker(&self.buf, 0xD8)?;
        // Discard boundary/header bytes ahead of the image.
        if soi > 0 {
            self.buf.drain(..soi);
        }

        let eoi = find_marker(&self.buf, 0xD9)?;
        let end = eoi + 2;
        let frame = self.buf[..end].to_vec();
        self.buf.drain(..end);
        Some(frame)
    }
}

impl Default for JpegExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset of the first `FF <code>` pair, or None.
fn find_marker(buf: &[u8], code: u8) -> Option<usize> {
    buf.windows(2).position(|w| w[0] == 0xFF && w[1] == code)
}
