//! Raw decoded frames.

use serde::{Deserialize, Serialize};

/// Bytes per pixel of the rgb24 stream the decoder emits.
pub const CHANNELS: usize = 3;

/// Width and height of the frames one run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    /// Full-size feed default.
    pub const PRIMARY: FrameDimensions = FrameDimensions {
        width: 1280,
        height: 720,
    };

    /// Side feed default for tabbed dual view.
    pub const SECONDARY: FrameDimensions = FrameDimensions {
        width: 640,
        height: 360,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether both sides are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Bytes in one frame: `width * height * 3`.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    /// Bytes in one row.
    pub fn row_len(&self) -> usize {
        self.width as usize * CHANNELS
    }

    /// `WxH` as passed to the decoder's `-s` option.
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl Default for FrameDimensions {
    fn default() -> Self {
        Self::PRIMARY
    }
}

impl std::fmt::Display for FrameDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One decoded image: row-major, 3 interleaved 8-bit channels, no padding.
///
/// Immutable once produced. The display borrows it for a single render.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    dimensions: FrameDimensions,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Wrap a byte vector, rejecting it unless it holds exactly one frame.
    pub fn from_bytes(dimensions: FrameDimensions, data: Vec<u8>) -> Option<Self> {
        (data.len() == dimensions.frame_len()).then_some(Self { dimensions, data })
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// One row of pixels, or None past the last row.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.dimensions.height {
            return None;
        }
        let len = self.dimensions.row_len();
        let start = y as usize * len;
        Some(&self.data[start..start + len])
    }

    /// Iterate rows top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.dimensions.row_len().max(1))
    }

    /// The `[r, g, b]` triple at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.dimensions.width {
            return None;
        }
        let row = self.row(y)?;
        let i = x as usize * CHANNELS;
        Some([row[i], row[i + 1], row[i + 2]])
    }

    /// Reshape into an `image::RgbImage` (copies the bytes).
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(
            self.dimensions.width,
            self.dimensions.height,
            self.data.clone(),
        )
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("dimensions", &self.dimensions)
            .field("bytes", &self.data.len())
            .finish()
    }
}
