//! Entry content-type detection
//!
//! Classification is signature sniffing over the first bytes of a payload.
//! The codecs consume a [`TypeDetector`] as a black box during open, so
//! applications can plug in a richer ruleset without touching the format
//! layer. [`SignatureDetector`] ships a small representative set of the
//! formats found inside retro pak archives.

/// Detected content type of an entry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    /// Nothing matched.
    #[default]
    Unknown,
    /// Pseudo-kind for directory nodes; directories always have size 0.
    Directory,
    /// Printable text.
    Text,
    /// RIFF WAVE audio.
    Wave,
    /// ZSoft PCX image.
    Pcx,
    /// Raw 256-color RGB palette (exactly 768 bytes).
    Palette,
}

impl EntryKind {
    /// Short lowercase identifier for logs and listings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Unknown => "unknown",
            EntryKind::Directory => "directory",
            EntryKind::Text => "text",
            EntryKind::Wave => "wave",
            EntryKind::Pcx => "pcx",
            EntryKind::Palette => "palette",
        }
    }
}

/// Classifies raw payload bytes into an [`EntryKind`].
///
/// Implementations must be pure: same bytes in, same kind out, no state.
pub trait TypeDetector: Sync {
    /// Classify `data`. An empty payload classifies as
    /// [`EntryKind::Unknown`].
    fn classify(&self, data: &[u8]) -> EntryKind;
}

impl<F> TypeDetector for F
where
    F: Fn(&[u8]) -> EntryKind + Sync,
{
    fn classify(&self, data: &[u8]) -> EntryKind {
        self(data)
    }
}

/// Built-in magic-number detector.
///
/// The ruleset is intentionally small; it exists so opened archives carry
/// useful kinds out of the box, not to be exhaustive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureDetector;

impl TypeDetector for SignatureDetector {
    fn classify(&self, data: &[u8]) -> EntryKind {
        if data.is_empty() {
            return EntryKind::Unknown;
        }

        // RIFF container with a WAVE form type.
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            return EntryKind::Wave;
        }

        // PCX: ZSoft manufacturer byte, known version, RLE encoding flag.
        if data.len() >= 3
            && data[0] == 0x0A
            && matches!(data[1], 0 | 2 | 3 | 4 | 5)
            && data[2] == 1
        {
            return EntryKind::Pcx;
        }

        // Quake-style palette lumps are exactly 256 RGB triplets.
        if data.len() == 768 {
            return EntryKind::Palette;
        }

        if looks_like_text(data) {
            return EntryKind::Text;
        }

        EntryKind::Unknown
    }
}

// Sample at most the first 512 bytes; enough to rule out binary payloads.
fn looks_like_text(data: &[u8]) -> bool {
    data.iter()
        .take(512)
        .all(|&b| b == b'\t' || b == b'\n' || b == b'\r' || (0x20..0x7F).contains(&b))
}
