//! Container format codecs
//!
//! Each format is an independent stateless struct implementing
//! [`ContainerFormat`]; the [`detect`] chain tries each codec's cheap probe
//! in turn until one claims the data. A codec binds transiently to one
//! [`Archive`]'s tree per call and holds no state of its own.

mod quake;
mod sin;

pub use quake::QuakePakFormat;
pub use sin::SinFormat;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;

use crate::archive::{Archive, Entry};
use crate::buffer::ByteBuffer;
use crate::detect::{SignatureDetector, TypeDetector};
use crate::error::{Error, Result};

/// Per-open configuration, passed into
/// [`ContainerFormat::open`] rather than read from process-wide state so
/// concurrent codec instances can apply different policies.
pub struct OpenOptions {
    keep_payloads: bool,
    detector: Box<dyn TypeDetector>,
}

impl OpenOptions {
    /// Default policy: payloads are released after type detection and
    /// refetched lazily; the built-in [`SignatureDetector`] classifies
    /// entries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keep_payloads: false,
            detector: Box::new(SignatureDetector),
        }
    }

    /// Keep every payload resident after open instead of releasing it for
    /// lazy refetch.
    #[must_use]
    pub fn with_keep_payloads(mut self, keep: bool) -> Self {
        self.keep_payloads = keep;
        self
    }

    /// Replace the type detector run over each entry during open.
    #[must_use]
    pub fn with_detector(mut self, detector: impl TypeDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    /// Whether payloads stay resident after open.
    #[must_use]
    pub fn keep_payloads(&self) -> bool {
        self.keep_payloads
    }

    /// The detector to classify entries with.
    #[must_use]
    pub fn detector(&self) -> &dyn TypeDetector {
        self.detector.as_ref()
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a successful [`ContainerFormat::write`], with support for
/// recovered-but-lossy conditions.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Total bytes serialized into the output buffer.
    pub bytes_written: usize,
    /// Human-readable warnings for lossy recoveries (e.g. an entry path
    /// that did not fit the on-disk name field).
    pub warnings: Vec<String>,
}

impl WriteReport {
    /// True if the write completed without lossy recoveries.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// A per-format container driver: probe, parse, lazy-load, serialize.
///
/// Implementations are stateless unit structs; all archive state lives in
/// the [`Archive`] passed to each call.
pub trait ContainerFormat: Sync {
    /// Short identifier, e.g. `"sin"`.
    fn id(&self) -> &'static str;

    /// Human-readable format name for logs and UI layers.
    fn name(&self) -> &'static str;

    /// Conventional file extension, without the dot.
    fn extension(&self) -> &'static str;

    /// Parse `data` into `archive`'s tree.
    ///
    /// On failure the archive tree is left empty; a partially parsed tree is
    /// never observable.
    ///
    /// # Errors
    /// [`Error::FormatMismatch`](crate::Error::FormatMismatch) when the data
    /// does not carry this format's signature (the buffer is untouched), or
    /// [`Error::Corrupt`](crate::Error::Corrupt) when the directory geometry
    /// is inconsistent.
    fn open(&self, archive: &mut Archive, data: &ByteBuffer, options: &OpenOptions) -> Result<()>;

    /// Serialize `archive`'s tree into `out`, replacing its contents.
    ///
    /// With `update_offsets`, each entry's recorded source offset is
    /// rewritten to its position in the freshly serialized image and its
    /// dirty flag is cleared, so subsequent lazy loads remain correct
    /// against that image once it reaches the backing file.
    fn write(
        &self,
        archive: &mut Archive,
        out: &mut ByteBuffer,
        update_offsets: bool,
    ) -> Result<WriteReport>;

    /// Materialize the payload of the entry at `path` from the archive's
    /// backing file.
    ///
    /// No-op success for zero-size or already-resident entries. On an I/O
    /// failure the entry remains unloaded; the rest of the tree is
    /// unaffected.
    fn load_entry_data(&self, archive: &mut Archive, path: &str) -> Result<()>;

    /// Cheap, side-effect-free structural check: does `data` look like this
    /// format? Never mutates the buffer (not even its cursor).
    fn probe(&self, data: &ByteBuffer) -> bool;

    /// [`probe`](Self::probe) against a file on disk.
    ///
    /// A missing, unreadable, or too-short file is `false`, not an error.
    fn probe_file(&self, path: &Path) -> bool;
}

static FORMATS: [&(dyn ContainerFormat); 2] = [&SinFormat, &QuakePakFormat];

/// All registered container formats, in probe order.
#[must_use]
pub fn registry() -> &'static [&'static dyn ContainerFormat] {
    &FORMATS
}

/// Find the first registered format whose probe accepts `data`.
#[must_use]
pub fn detect(data: &ByteBuffer) -> Option<&'static dyn ContainerFormat> {
    registry().iter().copied().find(|format| format.probe(data))
}

/// Find the first registered format whose probe accepts the file at `path`.
#[must_use]
pub fn detect_file(path: &Path) -> Option<&'static dyn ContainerFormat> {
    registry()
        .iter()
        .copied()
        .find(|format| format.probe_file(path))
}

/// Read `len` bytes at `offset` from the backing file.
///
/// Opens the file read-only for the duration of the call; no handle is held
/// between calls.
pub(crate) fn read_backing(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut data = vec![0u8; len];
    file.read_exact(&mut data)?;
    Ok(data)
}

/// Ensure an entry's payload is resident, refetching from the backing file
/// if it was released or never loaded.
///
/// This is the single fault-in path shared by lazy loads and write-time
/// payload serialization.
pub(crate) fn fault_in(entry: &mut Entry, backing: Option<&Path>) -> Result<()> {
    if entry.size() == 0 || entry.is_resident() {
        return Ok(());
    }
    let path = backing.ok_or(Error::NoBackingFile)?;
    let offset = entry.source_offset().ok_or_else(|| Error::Corrupt {
        reason: format!("entry '{}' has no recorded source offset", entry.name()),
    })?;
    let data = read_backing(path, offset, entry.size())?;
    entry.materialize(data);
    Ok(())
}

/// Decode a zero-padded fixed-size name field into a string, stopping at the
/// first NUL. Lossy UTF-8 conversion keeps odd bytes from aborting an open.
pub(crate) fn decode_name_field(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Read the common 12-byte pak header (magic, directory offset, directory
/// size) from a file, plus the file length. `None` for any file that cannot
/// be read that far.
pub(crate) fn read_file_header(path: &Path) -> Option<([u8; 4], i32, i32, u64)> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    let mut header = [0u8; 12];
    file.read_exact(&mut header).ok()?;

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&header[0..4]);
    let dir_offset = LittleEndian::read_i32(&header[4..8]);
    let dir_size = LittleEndian::read_i32(&header[8..12]);
    Some((magic, dir_offset, dir_size, len))
}

/// Sanity-check directory geometry against the container's total size.
pub(crate) fn sane_directory(dir_offset: i32, dir_size: i32, header_size: usize, total: u64) -> bool {
    dir_offset >= header_size as i32
        && dir_size >= 0
        && dir_offset as u64 + dir_size as u64 <= total
}

/// Encode an entry path into a fixed-size, zero-padded name field.
///
/// A path longer than `field_len` bytes falls back to the leaf name alone,
/// hard-truncated if still too long; the loss is logged and recorded in
/// `warnings` rather than failing the write.
pub(crate) fn encode_name_field(
    path: &str,
    leaf: &str,
    field_len: usize,
    warnings: &mut Vec<String>,
) -> Vec<u8> {
    let mut field = vec![0u8; field_len];
    let bytes = if path.len() <= field_len {
        path.as_bytes()
    } else {
        warn!(
            entry = path,
            limit = field_len,
            "entry path too long for name field, storing leaf name in the root directory"
        );
        warnings.push(format!(
            "entry path '{path}' exceeds {field_len} bytes; stored as '{leaf}' in the root directory"
        ));
        &leaf.as_bytes()[..leaf.len().min(field_len)]
    };
    field[..bytes.len()].copy_from_slice(bytes);
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registry_probes_in_order() {
        let ids: Vec<&str> = registry().iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["sin", "pak"]);
    }

    #[test]
    fn detect_rejects_unknown_data() {
        let data = ByteBuffer::from_vec(b"not an archive at all".to_vec());
        assert!(detect(&data).is_none());
    }

    #[test]
    fn name_field_passthrough_when_it_fits() {
        let mut warnings = Vec::new();
        let field = encode_name_field("maps/e1m1.bsp", "e1m1.bsp", 120, &mut warnings);
        assert_eq!(field.len(), 120);
        assert_eq!(&field[..13], b"maps/e1m1.bsp");
        assert!(field[13..].iter().all(|&b| b == 0));
        assert!(warnings.is_empty());
    }

    #[test]
    fn name_field_falls_back_to_leaf() {
        let long_dir = "d".repeat(150);
        let path = format!("{long_dir}/leaf.bsp");
        let mut warnings = Vec::new();
        let field = encode_name_field(&path, "leaf.bsp", 120, &mut warnings);
        assert_eq!(&field[..8], b"leaf.bsp");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn name_field_hard_truncates_a_long_leaf() {
        let leaf = "x".repeat(130);
        let mut warnings = Vec::new();
        let field = encode_name_field(&leaf, &leaf, 120, &mut warnings);
        assert!(field.iter().all(|&b| b == b'x'));
        assert_eq!(field.len(), 120);
        assert_eq!(warnings.len(), 1);
    }
}
