//! SiN archive format (Ritual Entertainment)
//!
//! A variant of the Quake 2 pak format with wider name fields. All integers
//! are little-endian signed 32-bit.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "SPAK"              (4 bytes)
//! [0x04] DirectoryOffset           (i32 LE, from file start)
//! [0x08] DirectorySize             (i32 LE, = entry count x 128)
//! [0x0C] Payload block             (concatenated entry payloads)
//! [DirectoryOffset]
//!        Directory records         (128 bytes each)
//! ```
//!
//! ## Directory record (128 bytes)
//! ```text
//! [0x00] Path     - zero-padded, '/'-separated  (120 bytes)
//! [0x78] Offset   - absolute payload offset     (i32 LE)
//! [0x7C] Size     - payload size in bytes       (i32 LE)
//! ```

use std::io::SeekFrom;
use std::path::Path;

use tracing::debug;

use crate::archive::{Archive, ArchiveEvent, Entry};
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};

use super::{
    ContainerFormat, OpenOptions, WriteReport, decode_name_field, encode_name_field, fault_in,
    read_file_header, sane_directory,
};

/// Magic signature at offset 0.
pub const MAGIC: [u8; 4] = *b"SPAK";

const HEADER_SIZE: usize = 12;
const RECORD_SIZE: usize = 128;
const NAME_LENGTH: usize = 120;

/// The Ritual Entertainment SiN pak codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinFormat;

impl ContainerFormat for SinFormat {
    fn id(&self) -> &'static str {
        "sin"
    }

    fn name(&self) -> &'static str {
        "SiN pak"
    }

    fn extension(&self) -> &'static str {
        "sin"
    }

    fn open(&self, archive: &mut Archive, data: &ByteBuffer, options: &OpenOptions) -> Result<()> {
        if data.size() < HEADER_SIZE {
            return Err(Error::FormatMismatch { expected: "SPAK" });
        }
        if data.export_range(0, 4)? != MAGIC {
            return Err(Error::FormatMismatch { expected: "SPAK" });
        }
        let dir_offset = data.read_i32_at(4)?;
        let dir_size = data.read_i32_at(8)?;

        // Suppress modification events while entries pour in.
        archive.set_muted(true);
        let loaded = read_directory(archive, data, dir_offset, dir_size)
            .and_then(|()| detect_entry_types(archive, data, options));
        if let Err(err) = loaded {
            // A corrupt directory aborts the whole open; no partial tree
            // survives.
            archive.reset_root();
            archive.set_muted(false);
            return Err(err);
        }

        archive.set_muted(false);
        archive.set_modified(false);
        archive.notify(ArchiveEvent::Opened);
        Ok(())
    }

    fn write(
        &self,
        archive: &mut Archive,
        out: &mut ByteBuffer,
        update_offsets: bool,
    ) -> Result<WriteReport> {
        out.clear();

        let mut payload_total: u64 = 0;
        let mut entry_count: u64 = 0;
        for (_, entry) in archive.root().iter_entries() {
            payload_total += entry.size() as u64;
            entry_count += 1;
        }
        let dir_offset = HEADER_SIZE as u64 + payload_total;
        let dir_size = entry_count * RECORD_SIZE as u64;
        let total = dir_offset + dir_size;
        if total > i32::MAX as u64 {
            return Err(Error::TooLarge { size: total });
        }

        out.resize(total as usize, false);
        out.seek(SeekFrom::Start(0))?;
        out.write(&MAGIC)?;
        out.write_i32(dir_offset as i32)?;
        out.write_i32(dir_size as i32)?;

        let backing = archive.filename().map(Path::to_path_buf);
        let mut warnings = Vec::new();

        // Directory table.
        debug!(entries = entry_count, "writing SiN archive directory");
        out.seek(SeekFrom::Start(dir_offset))?;
        let mut offset: u64 = HEADER_SIZE as u64;
        archive.root_mut().try_for_each_entry_mut(&mut |path, entry| {
            if update_offsets {
                // The recorded source offset is about to be replaced with the
                // entry's position in this image; fault the payload in from
                // the old location first so the data pass still has correct
                // bytes.
                fault_in(entry, backing.as_deref())?;
                entry.set_modified(false);
                entry.set_source_offset(Some(offset));
            }
            let field = encode_name_field(path, entry.name(), NAME_LENGTH, &mut warnings);
            out.write(&field)?;
            out.write_i32(offset as i32)?;
            out.write_i32(entry.size() as i32)?;
            offset += entry.size() as u64;
            Ok(())
        })?;

        // Payload block.
        out.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        archive.root_mut().try_for_each_entry_mut(&mut |_path, entry| {
            if entry.size() == 0 {
                return Ok(());
            }
            fault_in(entry, backing.as_deref())?;
            let bytes = entry.data().ok_or(Error::NoBackingFile)?;
            out.write(bytes)
        })?;

        Ok(WriteReport {
            bytes_written: out.size(),
            warnings,
        })
    }

    fn load_entry_data(&self, archive: &mut Archive, path: &str) -> Result<()> {
        let backing = archive.filename().map(Path::to_path_buf);
        let entry = archive
            .root_mut()
            .entry_at_mut(path)
            .ok_or_else(|| Error::EntryNotFound {
                path: path.to_string(),
            })?;

        if entry.size() == 0 || entry.is_resident() {
            entry.mark_resident();
            return Ok(());
        }
        fault_in(entry, backing.as_deref())
    }

    fn probe(&self, data: &ByteBuffer) -> bool {
        if data.size() < HEADER_SIZE {
            return false;
        }
        let Ok(magic) = data.export_range(0, 4) else {
            return false;
        };
        if magic != MAGIC {
            return false;
        }
        let Ok(dir_offset) = data.read_i32_at(4) else {
            return false;
        };
        let Ok(dir_size) = data.read_i32_at(8) else {
            return false;
        };
        sane_directory(dir_offset, dir_size, HEADER_SIZE, data.size() as u64)
    }

    fn probe_file(&self, path: &Path) -> bool {
        match read_file_header(path) {
            Some((magic, dir_offset, dir_size, len)) => {
                magic == MAGIC && sane_directory(dir_offset, dir_size, HEADER_SIZE, len)
            }
            None => false,
        }
    }
}

fn read_directory(
    archive: &mut Archive,
    data: &ByteBuffer,
    dir_offset: i32,
    dir_size: i32,
) -> Result<()> {
    if dir_offset < 0 || dir_size < 0 {
        return Err(Error::Corrupt {
            reason: "negative directory geometry".to_string(),
        });
    }
    let dir_offset = dir_offset as usize;
    let dir_size = dir_size as usize;
    if dir_offset
        .checked_add(dir_size)
        .is_none_or(|end| end > data.size())
    {
        return Err(Error::Corrupt {
            reason: "directory extends past end of archive".to_string(),
        });
    }

    let num_entries = dir_size / RECORD_SIZE;
    debug!(entries = num_entries, "reading SiN archive directory");

    for index in 0..num_entries {
        let record = dir_offset + index * RECORD_SIZE;
        let name_raw = data.export_range(record, NAME_LENGTH)?;
        let offset = data.read_i32_at(record + NAME_LENGTH)?;
        let size = data.read_i32_at(record + NAME_LENGTH + 4)?;

        if offset < 0 || size < 0 || offset as u64 + size as u64 > data.size() as u64 {
            return Err(Error::Corrupt {
                reason: format!("entry {index} payload extends past end of archive"),
            });
        }

        let name = decode_name_field(name_raw);
        let (dir_path, leaf) = match name.rfind('/') {
            Some(idx) => (&name[..idx], &name[idx + 1..]),
            None => ("", name.as_str()),
        };

        let mut entry = Entry::new(leaf, size as usize);
        entry.set_source_offset(Some(offset as u64));
        archive.root_mut().create_dir(dir_path).add_entry(entry);
    }
    Ok(())
}

fn detect_entry_types(
    archive: &mut Archive,
    data: &ByteBuffer,
    options: &OpenOptions,
) -> Result<()> {
    debug!("detecting entry types");
    archive.root_mut().try_for_each_entry_mut(&mut |_path, entry| {
        if entry.size() > 0 {
            let offset = entry.source_offset().unwrap_or(0) as usize;
            let payload = data.export_range(offset, entry.size())?.to_vec();
            entry.materialize(payload);
        }
        let kind = options.detector().classify(entry.data().unwrap_or(&[]));
        entry.set_kind(kind);
        if !options.keep_payloads() {
            entry.release();
        }
        entry.set_modified(false);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::EntryKind;
    use pretty_assertions::assert_eq;

    fn record(name: &str, offset: i32, size: i32) -> Vec<u8> {
        let mut raw = vec![0u8; NAME_LENGTH];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        raw.extend_from_slice(&offset.to_le_bytes());
        raw.extend_from_slice(&size.to_le_bytes());
        raw
    }

    fn archive_bytes(payload: &[u8], records: &[Vec<u8>]) -> ByteBuffer {
        let dir_offset = (HEADER_SIZE + payload.len()) as i32;
        let dir_size = (records.len() * RECORD_SIZE) as i32;
        let mut raw = Vec::new();
        raw.extend_from_slice(&MAGIC);
        raw.extend_from_slice(&dir_offset.to_le_bytes());
        raw.extend_from_slice(&dir_size.to_le_bytes());
        raw.extend_from_slice(payload);
        for rec in records {
            raw.extend_from_slice(rec);
        }
        ByteBuffer::from_vec(raw)
    }

    #[test]
    fn probe_accepts_a_minimal_header() {
        let data = archive_bytes(&[], &[]);
        assert!(SinFormat.probe(&data));
    }

    #[test]
    fn probe_rejects_bad_magic_and_short_input() {
        let mut raw = archive_bytes(&[], &[]).into_vec();
        raw[0] = b'X';
        assert!(!SinFormat.probe(&ByteBuffer::from_vec(raw)));
        assert!(!SinFormat.probe(&ByteBuffer::from_vec(b"SPAK".to_vec())));
        assert!(!SinFormat.probe(&ByteBuffer::new()));
    }

    #[test]
    fn probe_rejects_bad_directory_geometry() {
        // Directory offset inside the header.
        let mut raw = Vec::new();
        raw.extend_from_slice(&MAGIC);
        raw.extend_from_slice(&4i32.to_le_bytes());
        raw.extend_from_slice(&0i32.to_le_bytes());
        assert!(!SinFormat.probe(&ByteBuffer::from_vec(raw.clone())));

        // Directory extending past the end.
        raw[4..8].copy_from_slice(&12i32.to_le_bytes());
        raw[8..12].copy_from_slice(&128i32.to_le_bytes());
        assert!(!SinFormat.probe(&ByteBuffer::from_vec(raw)));
    }

    #[test]
    fn probe_is_stable_across_calls() {
        let data = archive_bytes(b"xy", &[record("a", 12, 2)]);
        let before = data.as_slice().to_vec();
        assert!(SinFormat.probe(&data));
        assert!(SinFormat.probe(&data));
        assert_eq!(data.as_slice(), &before[..]);
        assert_eq!(data.position(), 0);
    }

    #[test]
    fn open_empty_archive_yields_empty_tree() {
        let data = archive_bytes(&[], &[]);
        let mut archive = Archive::new();
        SinFormat
            .open(&mut archive, &data, &OpenOptions::new())
            .unwrap();
        assert_eq!(archive.root().entry_count(), 0);
        assert!(!archive.is_modified());
    }

    #[test]
    fn open_rejects_bad_magic_without_touching_the_buffer() {
        let mut raw = archive_bytes(&[], &[]).into_vec();
        raw[3] = b'X';
        let data = ByteBuffer::from_vec(raw.clone());
        let mut archive = Archive::new();
        let err = SinFormat
            .open(&mut archive, &data, &OpenOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::FormatMismatch { .. }));
        assert_eq!(data.as_slice(), &raw[..]);
    }

    #[test]
    fn open_aborts_wholesale_on_out_of_bounds_record() {
        let records = vec![
            record("ok.txt", 12, 2),
            record("bad.txt", 12, 9999),
        ];
        let data = archive_bytes(b"hi", &records);
        let mut archive = Archive::new();
        let err = SinFormat
            .open(&mut archive, &data, &OpenOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
        // No partial tree: the valid first record must not survive.
        assert_eq!(archive.root().entry_count(), 0);
    }

    #[test]
    fn open_builds_directories_and_detects_kinds() {
        let payload = b"hello world\n";
        let records = vec![record("docs/readme.txt", 12, payload.len() as i32)];
        let data = archive_bytes(payload, &records);

        let mut archive = Archive::new();
        SinFormat
            .open(
                &mut archive,
                &data,
                &OpenOptions::new().with_keep_payloads(true),
            )
            .unwrap();

        let entry = archive.root().entry_at("docs/readme.txt").unwrap();
        assert_eq!(entry.kind(), EntryKind::Text);
        assert_eq!(entry.data(), Some(&payload[..]));
        assert!(!entry.modified());
        assert_eq!(entry.source_offset(), Some(12));
    }

    #[test]
    fn open_releases_payloads_by_default() {
        let payload = b"hello world\n";
        let records = vec![record("readme.txt", 12, payload.len() as i32)];
        let data = archive_bytes(payload, &records);

        let mut archive = Archive::new();
        SinFormat
            .open(&mut archive, &data, &OpenOptions::new())
            .unwrap();

        let entry = archive.root().entry_at("readme.txt").unwrap();
        assert_eq!(entry.residency(), crate::archive::Residency::Released);
        // The kind was still detected while the payload was resident.
        assert_eq!(entry.kind(), EntryKind::Text);
        assert!(entry.data().is_none());
    }

    #[test]
    fn write_produces_the_canonical_empty_archive() {
        let mut archive = Archive::new();
        let mut out = ByteBuffer::new();
        let report = SinFormat.write(&mut archive, &mut out, true).unwrap();

        assert!(report.is_clean());
        assert_eq!(out.size(), HEADER_SIZE);
        assert_eq!(&out.as_slice()[0..4], b"SPAK");
        assert_eq!(out.read_i32_at(4).unwrap(), 12);
        assert_eq!(out.read_i32_at(8).unwrap(), 0);
    }

    #[test]
    fn write_then_open_round_trips_in_memory() {
        let mut archive = Archive::new();
        archive
            .root_mut()
            .add_entry(Entry::new("config.cfg", 0))
            .set_data(b"bind x +jump\n".to_vec());
        archive
            .root_mut()
            .create_dir("maps")
            .add_entry(Entry::new("e1m1.bsp", 0))
            .set_data(vec![0xAB; 64]);

        let mut out = ByteBuffer::new();
        SinFormat.write(&mut archive, &mut out, true).unwrap();

        let mut reopened = Archive::new();
        SinFormat
            .open(
                &mut reopened,
                &out,
                &OpenOptions::new().with_keep_payloads(true),
            )
            .unwrap();

        assert_eq!(reopened.root().entry_count(), 2);
        assert_eq!(
            reopened.root().entry_at("config.cfg").unwrap().data(),
            Some(&b"bind x +jump\n"[..])
        );
        assert_eq!(
            reopened.root().entry_at("maps/e1m1.bsp").unwrap().data(),
            Some(&[0xAB; 64][..])
        );
    }

    #[test]
    fn write_with_update_resets_dirty_flags_and_offsets() {
        let mut archive = Archive::new();
        archive
            .root_mut()
            .add_entry(Entry::new("a.txt", 0))
            .set_data(b"aaaa".to_vec());
        archive
            .root_mut()
            .add_entry(Entry::new("b.txt", 0))
            .set_data(b"bb".to_vec());

        let mut out = ByteBuffer::new();
        SinFormat.write(&mut archive, &mut out, true).unwrap();

        let a = archive.root().entry_at("a.txt").unwrap();
        let b = archive.root().entry_at("b.txt").unwrap();
        assert!(!a.modified());
        assert_eq!(a.source_offset(), Some(12));
        assert_eq!(b.source_offset(), Some(16));
    }
}
