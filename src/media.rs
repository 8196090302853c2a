//! Image bytes as embedded in the deck: format detection and pixel size.

/// Picture formats every PowerPoint version can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    /// Detect format from file magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        None
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }
}

/// Downloaded image ready to be placed on a slide.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// Pixel size read from the header, when it could be found.
    pub dimensions: Option<(u32, u32)>,
}

impl ImageData {
    /// Returns `None` for formats the deck cannot embed (WebP, SVG, HTML error
    /// pages served with a 200, ...).
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        let format = ImageFormat::from_magic(&bytes)?;
        let dimensions = match format {
            ImageFormat::Png => png_dimensions(&bytes),
            ImageFormat::Jpeg => jpeg_dimensions(&bytes),
            ImageFormat::Gif => gif_dimensions(&bytes),
        };
        Some(Self {
            bytes,
            format,
            dimensions,
        })
    }

    /// Width / height, or `None` when the size is unknown or degenerate.
    pub fn aspect_ratio(&self) -> Option<f64> {
        match self.dimensions {
            Some((w, h)) if w > 0 && h > 0 => Some(w as f64 / h as f64),
            _ => None,
        }
    }
}

fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    // Signature (8) + IHDR length (4) + "IHDR" (4), then width and height.
    if data.len() < 24 || &data[12..16] != b"IHDR" {
        return None;
    }
    Some((read_u32_be(data, 16), read_u32_be(data, 20)))
}

fn gif_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 10 {
        return None;
    }
    Some((
        read_u16_le(data, 6) as u32,
        read_u16_le(data, 8) as u32,
    ))
}

fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut offset = 2;
    while offset + 4 <= data.len() {
        if data[offset] != 0xFF {
            return None;
        }
        let marker = data[offset + 1];
        // Fill bytes and standalone markers carry no length.
        if marker == 0xFF {
            offset += 1;
            continue;
        }
        if marker == 0xD8 || marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            offset += 2;
            continue;
        }
        let len = read_u16_be(data, offset + 2) as usize;
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            if offset + 9 > data.len() {
                return None;
            }
            let height = read_u16_be(data, offset + 5) as u32;
            let width = read_u16_be(data, offset + 7) as u32;
            return Some((width, height));
        }
        if len < 2 {
            return None;
        }
        offset += 2 + len;
    }
    None
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u16_be(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn read_u32_be(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
