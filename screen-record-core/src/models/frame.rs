use std::sync::Arc;

/// A frame delivered by the capture provider.
///
/// Pixels are tightly packed RGBA8, top row first. The pixel buffer is shared,
/// so cloning a frame is cheap.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<[u8]>,
    pub timestamp_ns: u64,
}

impl CapturedFrame {
    pub fn new(width: u32, height: u32, rgba: impl Into<Arc<[u8]>>, timestamp_ns: u64) -> Self {
        Self {
            width,
            height,
            rgba: rgba.into(),
            timestamp_ns,
        }
    }

    /// Whether the frame is non-empty and the pixel buffer matches the
    /// declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.rgba.len() == rgba_len(self.width, self.height)
    }
}

/// A frame presented by the GPU context to the encoder input surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub presentation_time_ns: u64,
}

/// Static image drawn while the captured content is hidden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl PlaceholderImage {
    /// A single-colour placeholder of the given size.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba = color
            .iter()
            .copied()
            .cycle()
            .take(rgba_len(width, height))
            .collect();
        Self { width, height, rgba }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("placeholder image must not be empty".into());
        }
        if self.rgba.len() != rgba_len(self.width, self.height) {
            return Err(format!(
                "placeholder buffer is {} bytes, expected {} for {}x{}",
                self.rgba.len(),
                rgba_len(self.width, self.height),
                self.width,
                self.height
            ));
        }
        Ok(())
    }
}

impl Default for PlaceholderImage {
    fn default() -> Self {
        Self::solid(2, 2, [0x20, 0x20, 0x20, 0xFF])
    }
}

/// Byte length of a packed RGBA8 buffer.
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}
