// ABOUTME: Byte-signature sniffing for incoming images.
// ABOUTME: Maps the image crate's magic-byte detection onto the allow-listed kinds.

use image::ImageFormat;

/// Bytes buffered before deciding on a type. Covers every signature we accept.
pub const SNIFF_LEN: usize = 16;

/// Image kinds the wall can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    pub fn canonical_extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
        }
    }

    /// Whether a claimed extension agrees with the sniffed type.
    /// `jpeg` is the same type as `jpg`.
    pub fn matches_extension(self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        match self {
            ImageKind::Jpeg => extension == "jpg" || extension == "jpeg",
            other => extension == other.canonical_extension(),
        }
    }
}

/// Identify the image kind from the leading bytes. Anything outside the allow-list is None.
pub fn sniff(bytes: &[u8]) -> Option<ImageKind> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some(ImageKind::Jpeg),
        ImageFormat::Png => Some(ImageKind::Png),
        ImageFormat::Gif => Some(ImageKind::Gif),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_sniff_known_signatures() {
        assert_eq!(sniff(PNG), Some(ImageKind::Png));
        assert_eq!(sniff(JPEG), Some(ImageKind::Jpeg));
        assert_eq!(sniff(GIF), Some(ImageKind::Gif));
    }

    #[test]
    fn test_sniff_rejects_text_and_other_formats() {
        assert_eq!(sniff(b"<html><body>nope</body></html>"), None);
        assert_eq!(sniff(b""), None);
        // BMP is a real image, but not one we display.
        assert_eq!(sniff(b"BM\0\0\0\0\0\0\0\0\0\0\0\0\0\0"), None);
    }

    #[test]
    fn test_extension_matching() {
        assert!(ImageKind::Jpeg.matches_extension("jpeg"));
        assert!(ImageKind::Jpeg.matches_extension("JPG"));
        assert!(ImageKind::Png.matches_extension("png"));
        assert!(!ImageKind::Png.matches_extension("gif"));
        assert!(!ImageKind::Gif.matches_extension("jpg"));
    }
}
