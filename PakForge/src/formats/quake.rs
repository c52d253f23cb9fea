//! Quake / Quake 2 pak format
//!
//! The ancestor of the SiN format: identical 12-byte header and record
//! shape, but with 56-byte name fields (64-byte records). Magic is `PACK`.

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
pub const MAGIC: [u8; 4] = *b"PACK";

const HEADER_SIZE: usize = 12;
const RECORD_SIZE: usize = 64;
const NAME_LENGTH: usize = 56;

/// The id Software Quake / Quake 2 pak codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuakePakFormat;

impl ContainerFormat for QuakePakFormat {
    fn id(&self) -> &'static str {
        "pak"
    }

    fn name(&self) -> &'static str {
        "Quake pak"
    }

    fn extension(&self) -> &'static str {
        "pak"
    }

    fn open(&self, archive: &mut Archive, data: &ByteBuffer, options: &OpenOptions) -> Result<()> {
        if data.size() < HEADER_SIZE || data.export_range(0, 4)? != MAGIC {
            return Err(Error::FormatMismatch { expected: "PACK" });
        }
        let dir_offset = data.read_i32_at(4)?;
        let dir_size = data.read_i32_at(8)?;

        archive.set_muted(true);
        let loaded = read_directory(archive, data, dir_offset, dir_size)
            .and_then(|()| detect_entry_types(archive, data, options));
        if let Err(err) = loaded {
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

        debug!(entries = entry_count, "writing Quake pak directory");
        out.seek(SeekFrom::Start(dir_offset))?;
        let mut offset: u64 = HEADER_SIZE as u64;
        archive.root_mut().try_for_each_entry_mut(&mut |path, entry| {
            if update_offsets {
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
    debug!(entries = num_entries, "reading Quake pak directory");

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
    use pretty_assertions::assert_eq;

    fn pak_bytes(payload: &[u8], records: &[(&str, i32, i32)]) -> ByteBuffer {
        let dir_offset = (HEADER_SIZE + payload.len()) as i32;
        let dir_size = (records.len() * RECORD_SIZE) as i32;
        let mut raw = Vec::new();
        raw.extend_from_slice(&MAGIC);
        raw.extend_from_slice(&dir_offset.to_le_bytes());
        raw.extend_from_slice(&dir_size.to_le_bytes());
        raw.extend_from_slice(payload);
        for (name, offset, size) in records {
            let mut field = vec![0u8; NAME_LENGTH];
            field[..name.len()].copy_from_slice(name.as_bytes());
            raw.extend_from_slice(&field);
            raw.extend_from_slice(&offset.to_le_bytes());
            raw.extend_from_slice(&size.to_le_bytes());
        }
        ByteBuffer::from_vec(raw)
    }

    #[test]
    fn probe_checks_magic_and_geometry() {
        assert!(QuakePakFormat.probe(&pak_bytes(&[], &[])));
        assert!(!QuakePakFormat.probe(&ByteBuffer::from_vec(b"SPAK\x0c\0\0\0\0\0\0\0".to_vec())));
    }

    #[test]
    fn open_and_rewrite_round_trips() {
        let data = pak_bytes(b"gfx-bytes", &[("gfx/conback.lmp", 12, 9)]);
        let mut archive = Archive::new();
        QuakePakFormat
            .open(
                &mut archive,
                &data,
                &OpenOptions::new().with_keep_payloads(true),
            )
            .unwrap();
        assert_eq!(archive.root().entry_count(), 1);

        let mut out = ByteBuffer::new();
        QuakePakFormat.write(&mut archive, &mut out, true).unwrap();
        assert_eq!(out.as_slice(), data.as_slice());
    }

    #[test]
    fn names_longer_than_56_bytes_fall_back_to_the_leaf() {
        let deep = "a/".repeat(40);
        let mut archive = Archive::new();
        archive
            .root_mut()
            .create_dir(&deep)
            .add_entry(Entry::new("flag.lmp", 0))
            .set_data(vec![1, 2, 3]);

        let mut out = ByteBuffer::new();
        let report = QuakePakFormat.write(&mut archive, &mut out, true).unwrap();
        assert_eq!(report.warnings.len(), 1);

        let mut reopened = Archive::new();
        QuakePakFormat
            .open(&mut reopened, &out, &OpenOptions::new())
            .unwrap();
        assert!(reopened.root().entry_at("flag.lmp").is_some());
    }
}
