//! Per-context video recording.
//!
//! A context's recording is a sequence of viewport screenshots, one taken
//! after every page action, encoded on close into an animated GIF at
//! `<video_dir>/<context_id>.gif`. Frames are downscaled when captured so a
//! long journey stays cheap to hold in memory.

use crate::config::RunConfig;
use crate::driver::Screenshot;
use crate::result::{FlowError, FlowResult};
use gif::{Encoder, Frame, Repeat};
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Widest frame the recorder keeps
pub const MAX_FRAME_WIDTH: u32 = 640;

/// Configuration for a context recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Quality level (1-100, affects palette quantization)
    pub quality: u8,
    /// Shortest delay between frames, in centiseconds
    pub min_delay_cs: u16,
    /// Longest delay between frames, in centiseconds
    pub max_delay_cs: u16,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: MAX_FRAME_WIDTH,
            height: 360,
            quality: 70,
            min_delay_cs: 20,
            max_delay_cs: 300,
        }
    }
}

impl VideoConfig {
    /// Scale the run's viewport down to at most [`MAX_FRAME_WIDTH`], keeping
    /// the aspect ratio
    #[must_use]
    pub fn for_viewport(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let out_w = width.min(MAX_FRAME_WIDTH);
        let out_h = (u64::from(height) * u64::from(out_w) / u64::from(width)).max(1);
        Self {
            width: out_w,
            height: u32::try_from(out_h).unwrap_or(u32::MAX),
            ..Self::default()
        }
    }

    /// Config derived from a run configuration
    #[must_use]
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self::for_viewport(config.viewport_width, config.viewport_height)
    }

    /// Set quality (1-100)
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Convert quality (1-100) to GIF encoder speed (1-30)
    #[must_use]
    pub fn encoder_speed(&self) -> i32 {
        let normalized = i32::from(100 - self.quality.min(100));
        (normalized * 29 / 100 + 1).clamp(1, 30)
    }

    fn delay_cs(&self, elapsed_ms: u64) -> u16 {
        let cs = u16::try_from(elapsed_ms / 10).unwrap_or(u16::MAX);
        cs.clamp(self.min_delay_cs.max(1), self.max_delay_cs.max(1))
    }
}

/// One captured frame, already scaled to the output size
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGBA pixel data
    pub data: Vec<u8>,
    /// Milliseconds since the recording started
    pub offset_ms: u64,
}

/// Recorder attached to one isolated context
#[derive(Debug)]
pub struct VideoRecorder {
    config: VideoConfig,
    frames: Vec<VideoFrame>,
    started: Instant,
}

impl VideoRecorder {
    /// Start a recording
    #[must_use]
    pub fn new(config: VideoConfig) -> Self {
        Self {
            config,
            frames: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &VideoConfig {
        &self.config
    }

    /// Number of captured frames
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Decode a PNG screenshot and keep it as the next frame
    pub fn capture(&mut self, screenshot: &Screenshot) -> FlowResult<()> {
        let img = image::load_from_memory_with_format(&screenshot.data, ImageFormat::Png)
            .map_err(|e| FlowError::Recording {
                message: format!("Failed to decode screenshot: {e}"),
            })?;
        let offset_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let data = self.scale(&img);
        self.frames.push(VideoFrame { data, offset_ms });
        Ok(())
    }

    fn scale(&self, img: &DynamicImage) -> Vec<u8> {
        let (w, h) = img.dimensions();
        if w == self.config.width && h == self.config.height {
            return img.to_rgba8().into_raw();
        }
        img.resize_exact(
            self.config.width,
            self.config.height,
            image::imageops::FilterType::Triangle,
        )
        .to_rgba8()
        .into_raw()
    }

    /// Encode every frame into GIF bytes; each frame is shown until the next
    /// one was captured
    pub fn encode(&self) -> FlowResult<Vec<u8>> {
        if self.frames.is_empty() {
            return Err(FlowError::Recording {
                message: "No frames captured".to_string(),
            });
        }

        let width = u16::try_from(self.config.width).map_err(|_| FlowError::Recording {
            message: format!("frame width {} exceeds GIF limits", self.config.width),
        })?;
        let height = u16::try_from(self.config.height).map_err(|_| FlowError::Recording {
            message: format!("frame height {} exceeds GIF limits", self.config.height),
        })?;

        let mut output = Vec::new();
        {
            let mut encoder =
                Encoder::new(&mut output, width, height, &[]).map_err(|e| FlowError::Recording {
                    message: format!("Failed to create GIF encoder: {e}"),
                })?;
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| FlowError::Recording {
                    message: format!("Failed to set GIF repeat: {e}"),
                })?;

            let speed = self.config.encoder_speed();
            for (i, captured) in self.frames.iter().enumerate() {
                let shown_for = self
                    .frames
                    .get(i + 1)
                    .map_or(u64::from(self.config.max_delay_cs) * 10, |next| {
                        next.offset_ms.saturating_sub(captured.offset_ms)
                    });
                let mut rgba = captured.data.clone();
                let mut frame = Frame::from_rgba_speed(width, height, &mut rgba, speed);
                frame.delay = self.config.delay_cs(shown_for);
                encoder
                    .write_frame(&frame)
                    .map_err(|e| FlowError::Recording {
                        message: format!("Failed to write GIF frame: {e}"),
                    })?;
            }
        }
        Ok(output)
    }

    /// Encode and write to `path`. `Ok(None)` when nothing was captured.
    pub fn finish(self, path: &Path) -> FlowResult<Option<PathBuf>> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        let data = self.encode()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(Some(path.to_path_buf()))
    }
}
