//! Fixed pixel-format table and the per-buffer descriptor handed to the driver.
use crate::{
    buffer::AllocationError,
    format::{FourCc, PixelFormat, Resolution},
};

/// How the driver interprets the channel layout of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed RGB with explicit channel masks.
    Bitfields,
    /// Layout named by a FourCC tag.
    FourCc(FourCc),
}

/// Static layout information for one [`PixelFormat`].
///
/// # Example
/// ```rust
/// use acheron_core::prelude::{FrameDescriptor, PixelFormat};
///
/// let desc = FrameDescriptor::of(PixelFormat::Rgb32);
/// assert_eq!(desc.bits_per_pixel, 32);
/// assert_eq!(desc.masks, [0x00ff_0000, 0x0000_ff00, 0x0000_00ff]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub bits_per_pixel: u32,
    pub compression: Compression,
    /// Red, green, blue masks; zero for non-RGB layouts.
    pub masks: [u32; 3],
    /// Luma plane is followed by a separate chroma plane.
    pub planar: bool,
}

const RGB_MASKS: [u32; 3] = [0x00ff_0000, 0x0000_ff00, 0x0000_00ff];
const RGB565_MASKS: [u32; 3] = [0x0000_f800, 0x0000_07e0, 0x0000_001f];
const NO_MASKS: [u32; 3] = [0; 3];

const TABLE: [FrameDescriptor; 6] = [
    FrameDescriptor {
        bits_per_pixel: 32,
        compression: Compression::Bitfields,
        masks: RGB_MASKS,
        planar: false,
    },
    FrameDescriptor {
        bits_per_pixel: 24,
        compression: Compression::Bitfields,
        masks: RGB_MASKS,
        planar: false,
    },
    FrameDescriptor {
        bits_per_pixel: 16,
        compression: Compression::Bitfields,
        masks: RGB565_MASKS,
        planar: false,
    },
    FrameDescriptor {
        bits_per_pixel: 16,
        compression: Compression::FourCc(FourCc::new(*b"YUY2")),
        masks: NO_MASKS,
        planar: false,
    },
    FrameDescriptor {
        bits_per_pixel: 12,
        compression: Compression::FourCc(FourCc::new(*b"NV12")),
        masks: NO_MASKS,
        planar: true,
    },
    FrameDescriptor {
        bits_per_pixel: 8,
        compression: Compression::FourCc(FourCc::new(*b"GREY")),
        masks: NO_MASKS,
        planar: false,
    },
];

impl FrameDescriptor {
    /// Look up the table entry for `format`.
    pub const fn of(format: PixelFormat) -> FrameDescriptor {
        TABLE[format as usize]
    }

    /// Bytes per row of the first plane.
    pub fn stride(&self, width: u32) -> usize {
        if self.planar {
            width as usize
        } else {
            width as usize * self.bits_per_pixel as usize / 8
        }
    }

    /// Total bytes for a frame of `resolution`: `width * height * bpp / 8`.
    ///
    /// Returns `None` when the product overflows `usize`.
    pub fn frame_size(&self, resolution: Resolution) -> Option<usize> {
        resolution
            .pixels()?
            .checked_mul(self.bits_per_pixel as usize)
            .map(|bits| bits / 8)
    }
}

impl PixelFormat {
    /// Shorthand for [`FrameDescriptor::of`].
    pub const fn descriptor(self) -> FrameDescriptor {
        FrameDescriptor::of(self)
    }
}

/// Pixels per metre advertised in every buffer header.
pub const PIXELS_PER_METER: i32 = 3000;

/// Everything the driver needs to know about a chained buffer besides its address.
///
/// Mirrors a top-down device-independent bitmap header.
///
/// # Example
/// ```rust
/// use acheron_core::prelude::{BufferDescriptor, PixelFormat, Resolution};
///
/// let res = Resolution::new(640, 480).unwrap();
/// let desc = BufferDescriptor::new(res, PixelFormat::Rgb32).unwrap();
/// assert_eq!(desc.image_size, 640 * 480 * 4);
/// assert_eq!(desc.stride, 640 * 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub resolution: Resolution,
    pub format: PixelFormat,
    pub bit_count: u16,
    pub compression: Compression,
    pub masks: [u32; 3],
    /// Rows are stored first-row-first (negative height in bitmap terms).
    pub top_down: bool,
    pub pixels_per_meter: i32,
    pub stride: usize,
    pub image_size: usize,
}

impl BufferDescriptor {
    /// Build the descriptor for a buffer of `resolution` in `format`.
    pub fn new(resolution: Resolution, format: PixelFormat) -> Result<Self, AllocationError> {
        let table = format.descriptor();
        let image_size = table
            .frame_size(resolution)
            .ok_or(AllocationError::SizeOverflow {
                width: resolution.width.get(),
                height: resolution.height.get(),
            })?;
        Ok(Self {
            resolution,
            format,
            bit_count: table.bits_per_pixel as u16,
            compression: table.compression,
            masks: table.masks,
            top_down: true,
            pixels_per_meter: PIXELS_PER_METER,
            stride: table.stride(resolution.width.get()),
            image_size,
        })
    }

    /// Signed height as a bitmap header carries it.
    pub fn header_height(&self) -> i64 {
        let height = self.resolution.height.get() as i64;
        if self.top_down { -height } else { height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_is_exact_for_every_format() {
        let res = Resolution::new(641, 479).unwrap();
        for format in PixelFormat::ALL {
            let bpp = format.descriptor().bits_per_pixel as usize;
            let desc = BufferDescriptor::new(res, format).unwrap();
            assert_eq!(desc.image_size, 641 * 479 * bpp / 8, "{format}");
        }
    }

    #[test]
    fn fourcc_formats_have_no_masks() {
        for format in [PixelFormat::Yuy2, PixelFormat::Nv12, PixelFormat::Y8] {
            let desc = format.descriptor();
            assert!(matches!(desc.compression, Compression::FourCc(_)));
            assert_eq!(desc.masks, [0; 3]);
        }
        assert_eq!(
            PixelFormat::Y8.descriptor().compression,
            Compression::FourCc(FourCc::new(*b"GREY"))
        );
    }

    #[test]
    fn nv12_stride_is_luma_width() {
        assert_eq!(PixelFormat::Nv12.descriptor().stride(1920), 1920);
        assert_eq!(PixelFormat::Rgb24.descriptor().stride(1920), 5760);
    }

    #[test]
    fn header_height_is_negative_for_top_down() {
        let res = Resolution::new(4, 3).unwrap();
        let desc = BufferDescriptor::new(res, PixelFormat::Rgb16).unwrap();
        assert_eq!(desc.header_height(), -3);
        assert_eq!(desc.pixels_per_meter, 3000);
    }

    #[test]
    fn oversized_geometry_overflows() {
        let res = Resolution::new(u32::MAX, u32::MAX).unwrap();
        assert_eq!(PixelFormat::Rgb32.descriptor().frame_size(res), None);
        assert!(matches!(
            BufferDescriptor::new(res, PixelFormat::Rgb32),
            Err(AllocationError::SizeOverflow { .. })
        ));
    }
}
