use std::{fmt, num::NonZeroU32, str::FromStr};

/// Four-character code used to tag packed YUV / greyscale buffers for the driver.
///
/// # Example
/// ```rust
/// use acheron_core::prelude::FourCc;
///
/// let fcc = FourCc::new(*b"YUY2");
/// assert_eq!(fcc.to_string(), "YUY2");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc([u8; 4]);

impl FourCc {
    /// Construct from raw bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Little-endian u32 encoding, as stored in a bitmap header's compression field.
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Try to convert to a printable string.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<u32> for FourCc {
    fn from(value: u32) -> Self {
        Self(value.to_le_bytes())
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "0x{:08x}", self.to_u32()),
        }
    }
}

impl FromStr for FourCc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| "fourcc must be four ASCII bytes".to_string())?;
        Ok(FourCc(bytes))
    }
}

/// Frame geometry in pixels.
///
/// # Example
/// ```rust
/// use acheron_core::prelude::Resolution;
///
/// let res = Resolution::new(640, 480).unwrap();
/// assert_eq!(res.width.get(), 640);
/// assert!(Resolution::new(0, 480).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    /// Width in pixels (non-zero).
    pub width: NonZeroU32,
    /// Height in pixels (non-zero).
    pub height: NonZeroU32,
}

impl Resolution {
    /// Create a resolution, returning `None` if width or height are zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width: NonZeroU32::new(width)?,
            height: NonZeroU32::new(height)?,
        })
    }

    /// Pixel count as `usize`, `None` on overflow.
    pub fn pixels(&self) -> Option<usize> {
        (self.width.get() as usize).checked_mul(self.height.get() as usize)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layouts a capture buffer can be described with.
///
/// The discriminant order matches the driver's pixel-format table and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PixelFormat {
    /// 32-bit BGRX with bitfield masks.
    #[default]
    Rgb32,
    /// 24-bit BGR with bitfield masks.
    Rgb24,
    /// 16-bit 5:6:5 with bitfield masks.
    Rgb16,
    /// Packed 4:2:2 YUV.
    Yuy2,
    /// Planar 4:2:0, luma plane followed by interleaved chroma.
    Nv12,
    /// 8-bit greyscale.
    Y8,
}

impl PixelFormat {
    /// Every supported format, in table order.
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::Rgb32,
        PixelFormat::Rgb24,
        PixelFormat::Rgb16,
        PixelFormat::Yuy2,
        PixelFormat::Nv12,
        PixelFormat::Y8,
    ];

    /// Short lowercase name used in logs and configuration.
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgb32 => "rgb32",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Rgb16 => "rgb16",
            PixelFormat::Yuy2 => "yuy2",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Y8 => "y8",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::ALL
            .into_iter()
            .find(|fmt| fmt.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown pixel format `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_matches_multichar_constant() {
        // 'YUY2' as a little-endian DWORD, the way bitmap headers carry it.
        assert_eq!(FourCc::new(*b"YUY2").to_u32(), 0x3259_5559);
        assert_eq!(FourCc::from(0x3259_5559).to_string(), "YUY2");
    }

    #[test]
    fn fourcc_rejects_wrong_length() {
        assert!("YUY".parse::<FourCc>().is_err());
        assert_eq!("GREY".parse::<FourCc>().unwrap(), FourCc::new(*b"GREY"));
    }

    #[test]
    fn pixel_format_parses_case_insensitively() {
        assert_eq!("RGB32".parse::<PixelFormat>().unwrap(), PixelFormat::Rgb32);
        assert_eq!("nv12".parse::<PixelFormat>().unwrap(), PixelFormat::Nv12);
        assert!("rgba".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn resolution_pixels() {
        let res = Resolution::new(1920, 1080).unwrap();
        assert_eq!(res.pixels(), Some(2_073_600));
        assert_eq!(res.to_string(), "1920x1080");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn pixel_format_serializes_as_snake_case() {
        let json = serde_json::to_string(&PixelFormat::Yuy2).unwrap();
        assert_eq!(json, "\"yuy2\"");
        let back: PixelFormat = serde_json::from_str("\"rgb24\"").unwrap();
        assert_eq!(back, PixelFormat::Rgb24);
    }
}
