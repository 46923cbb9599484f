//! Real-time playback through the default output device.
//!
//! The audio thread pulls interleaved samples from [`PortSource`], which
//! calls the engine's [`RenderPort`] once per buffer.

use crate::bridge::RenderPort;
use anyhow::{Context, Result};
use rodio::{OutputStream, OutputStreamHandle, Source};
use std::time::Duration;
use tracing::info;

/// Frames rendered per quantum. Smaller is lower latency but more CPU.
pub const BUFFER_SIZE: usize = 256;

/// Rodio source that renders the engine one quantum at a time.
pub struct PortSource {
    port: RenderPort,
    left_buf: Vec<f32>,
    right_buf: Vec<f32>,
    buf_pos: usize,
    channel: usize,
    sample_rate: u32,
    finished: bool,
}

impl PortSource {
    pub fn new(port: RenderPort, sample_rate: u32) -> Self {
        Self {
            port,
            left_buf: vec![0.0; BUFFER_SIZE],
            right_buf: vec![0.0; BUFFER_SIZE],
            buf_pos: BUFFER_SIZE, // Start at end to trigger first render
            channel: 0,
            sample_rate,
            finished: false,
        }
    }
}

impl Iterator for PortSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished {
            return None;
        }
        if self.buf_pos >= BUFFER_SIZE {
            let mut outputs: [&mut [f32]; 2] = [&mut self.left_buf, &mut self.right_buf];
            if !self.port.process(&mut outputs) {
                self.finished = true;
                return None;
            }
            self.buf_pos = 0;
        }

        // Interleave stereo samples: L, R, L, R, ...
        let sample = if self.channel == 0 {
            self.left_buf[self.buf_pos]
        } else {
            self.right_buf[self.buf_pos]
        };

        self.channel = 1 - self.channel;
        if self.channel == 0 {
            self.buf_pos += 1;
        }

        Some(sample)
    }
}

impl Source for PortSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// An open output stream playing a render port.
///
/// Playback stops when this is dropped.
pub struct AudioOutput {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
}

impl AudioOutput {
    /// Opens the default output device and starts pulling from `port`.
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available.
    pub fn start(port: RenderPort, sample_rate: u32) -> Result<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().context("Failed to open audio output")?;

        stream_handle
            .play_raw(PortSource::new(port, sample_rate))
            .context("Failed to start audio playback")?;
        info!(sample_rate, buffer = BUFFER_SIZE, "Audio output started");

        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ControlBridge, Request};
    use crate::config::EngineConfig;

    #[test]
    fn test_silence_before_initialize() {
        let (_bridge, port) = ControlBridge::new();
        let source = PortSource::new(port, 48000);
        assert_eq!(source.channels(), 2);
        assert!(source.take(BUFFER_SIZE * 4).all(|s| s == 0.0));
    }

    #[test]
    fn test_interleaves_engine_output() {
        let (mut bridge, port) = ControlBridge::new();
        bridge.handle(Request::Initialize {
            config: EngineConfig::default(),
        });
        bridge.handle(Request::NoteOn {
            key: 69,
            velocity: 127,
        });

        let samples: Vec<f32> = PortSource::new(port, 48000)
            .take(BUFFER_SIZE * 2)
            .collect();
        assert_eq!(samples.len(), BUFFER_SIZE * 2);
        assert!(samples.iter().any(|s| *s != 0.0));
        // Centered pan: left and right match frame by frame.
        for frame in samples.chunks(2) {
            assert!((frame[0] - frame[1]).abs() < 1e-6);
        }
    }
}
