use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::config::VideoFormat;
use crate::models::error::RecordError;
use crate::traits::hardware_encoder::{HardwareEncoder, InputSurface};

/// Lifecycle of an [`EncoderSink`].
///
/// ```text
/// opened → started → stopped → released
///    └──────────────────────────↗
/// ```
/// The shortcut from `opened` straight to `released` exists for setup
/// failures, before any frame could have been drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Opened,
    Started,
    Stopped,
    Released,
}

/// Hardware encoder plus its input surface and output file.
pub struct EncoderSink<E: HardwareEncoder> {
    encoder: E,
    surface: Arc<dyn InputSurface>,
    output_path: PathBuf,
    state: SinkState,
}

impl<E: HardwareEncoder> EncoderSink<E> {
    /// Configure `encoder` for `format`, creating the output at `output_path`.
    ///
    /// On failure the encoder is released and nothing is left at `output_path`.
    pub fn open(mut encoder: E, format: &VideoFormat, output_path: PathBuf) -> Result<Self, RecordError> {
        let surface = match encoder.configure(format, &output_path) {
            Ok(surface) => surface,
            Err(e) => {
                encoder.release();
                remove_partial_output(&output_path);
                return Err(e);
            }
        };

        if surface.width() != format.width || surface.height() != format.height {
            encoder.release();
            remove_partial_output(&output_path);
            return Err(RecordError::EncoderError(format!(
                "input surface is {}x{}, expected {}x{}",
                surface.width(),
                surface.height(),
                format.width,
                format.height
            )));
        }

        log::info!(
            "encoder opened: {}x{} @ {} bps, {} fps -> {}",
            format.width,
            format.height,
            format.bitrate,
            format.frame_rate,
            output_path.display()
        );

        Ok(Self {
            encoder,
            surface,
            output_path,
            state: SinkState::Opened,
        })
    }

    /// Surface the GPU context presents into. Invalid after `release`.
    pub fn input_surface(&self) -> Arc<dyn InputSurface> {
        Arc::clone(&self.surface)
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn mime_type(&self) -> &str {
        self.encoder.mime_type()
    }

    pub fn frames_encoded(&self) -> u64 {
        self.encoder.frames_encoded()
    }

    /// Must be called before any frame is presented to the surface.
    pub fn start(&mut self) -> Result<(), RecordError> {
        self.expect_state(SinkState::Opened, "start")?;
        self.encoder.start()?;
        self.state = SinkState::Started;
        Ok(())
    }

    /// Flush buffered frames and seal the output.
    ///
    /// Only valid once the render loop has stopped presenting. May block
    /// while the encoder drains. The sink counts as stopped even when the
    /// flush fails, so it can still be released.
    pub fn stop(&mut self) -> Result<(), RecordError> {
        self.expect_state(SinkState::Started, "stop")?;
        self.state = SinkState::Stopped;
        self.encoder.stop()
    }

    pub fn release(&mut self) -> Result<(), RecordError> {
        match self.state {
            SinkState::Opened | SinkState::Stopped => {
                self.encoder.release();
                self.state = SinkState::Released;
                Ok(())
            }
            state => Err(RecordError::InvalidTransition(format!(
                "encoder release from {:?}",
                state
            ))),
        }
    }

    /// Tear down a sink after a setup failure and delete its output.
    pub fn discard(mut self) {
        if self.state == SinkState::Started {
            if let Err(e) = self.stop() {
                log::warn!("encoder stop during discard failed: {}", e);
            }
        }
        if self.state != SinkState::Released {
            let _ = self.release();
        }
        remove_partial_output(&self.output_path);
    }

    fn expect_state(&self, expected: SinkState, operation: &str) -> Result<(), RecordError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RecordError::InvalidTransition(format!(
                "encoder {} from {:?}",
                operation, self.state
            )))
        }
    }
}

impl<E: HardwareEncoder> Drop for EncoderSink<E> {
    fn drop(&mut self) {
        match self.state {
            SinkState::Released => {}
            SinkState::Started => {
                log::warn!("encoder sink dropped while started; stopping");
                if let Err(e) = self.encoder.stop() {
                    log::warn!("encoder stop during drop failed: {}", e);
                }
                self.encoder.release();
            }
            SinkState::Opened | SinkState::Stopped => self.encoder.release(),
        }
    }
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("failed to remove partial output {}: {}", path.display(), e);
        }
    }
}
