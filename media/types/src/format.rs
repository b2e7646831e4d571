/*!
    Pixel format types.
*/

use std::fmt;
use std::str::FromStr;

use crate::Error;

/**
    Packed pixel formats understood by frame buffers and filters.

    The 8-bit variants cover what decoders and most filters produce. The
    wide variants store 16 bits per channel in native byte order.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Single channel, 8 bits.
    Gray8,
    /// Packed RGB, 24bpp
    Rgb24,
    /// Packed RGBA, 32bpp
    Rgba32,
    /// Single channel, 16 bits.
    Gray16,
    /// Packed RGB, 16 bits per channel
    Rgb48,
    /// Packed RGBA, 16 bits per channel
    Rgba64,
}

impl PixelFormat {
    /// All formats, narrow before wide.
    pub const ALL: [PixelFormat; 6] = [
        Self::Gray8,
        Self::Rgb24,
        Self::Rgba32,
        Self::Gray16,
        Self::Rgb48,
        Self::Rgba64,
    ];

    /**
        Returns the number of bytes one pixel occupies.
    */
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Gray16 => 2,
            Self::Rgb24 => 3,
            Self::Rgba32 => 4,
            Self::Rgb48 => 6,
            Self::Rgba64 => 8,
        }
    }

    /**
        Returns the number of color channels, alpha included.
    */
    pub const fn channels(self) -> usize {
        match self {
            Self::Gray8 | Self::Gray16 => 1,
            Self::Rgb24 | Self::Rgb48 => 3,
            Self::Rgba32 | Self::Rgba64 => 4,
        }
    }

    /**
        Returns true for the 16-bit per channel formats.
    */
    pub const fn is_wide(self) -> bool {
        matches!(self, Self::Gray16 | Self::Rgb48 | Self::Rgba64)
    }

    /**
        Returns true if the last channel is alpha.
    */
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba32 | Self::Rgba64)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Gray8 => "gray8",
            Self::Rgb24 => "rgb24",
            Self::Rgba32 => "rgba32",
            Self::Gray16 => "gray16",
            Self::Rgb48 => "rgb48",
            Self::Rgba64 => "rgba64",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.name() == lower)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown pixel format '{s}'")))
    }
}
