//! Archive state: directory tree, backing store, change notifications

mod entry;
mod tree;

pub use entry::{Entry, Residency};
pub use tree::{DirNode, Entries};

use std::path::{Path, PathBuf};

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::formats::{self, ContainerFormat, OpenOptions, WriteReport};

/// Change events emitted by an [`Archive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveEvent {
    /// A codec finished opening into this archive.
    Opened,
    /// The archive was serialized to its backing file.
    Saved,
    /// The archive transitioned to the modified state.
    Modified,
}

/// Fire-and-forget change-notification sink.
///
/// Notifications carry no payload beyond the event and expect no
/// acknowledgment; implementations are free to no-op.
pub trait ChangeListener {
    /// Called for each unmuted event.
    fn notify(&self, event: ArchiveEvent);
}

/// One in-memory container: a directory tree plus the backing-store
/// reference used for lazy payload loads.
///
/// An archive is exclusively owned by one caller at a time; `open` and
/// `write` run to completion on the calling thread with at most one in
/// flight against a given tree.
#[derive(Default)]
pub struct Archive {
    root: DirNode,
    filename: Option<PathBuf>,
    modified: bool,
    muted: bool,
    listener: Option<Box<dyn ChangeListener>>,
}

impl Archive {
    /// Create an empty, unmodified archive with no backing file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the file at `path`, auto-detect its container format, and open
    /// it.
    ///
    /// The filename is recorded as the backing store for later lazy entry
    /// loads, so the file must stay unmodified for those offsets to remain
    /// valid.
    ///
    /// # Errors
    /// Returns [`Error::UnknownFormat`] if no registered format recognizes
    /// the data, or the codec's open error.
    pub fn open_path<P: AsRef<Path>>(
        path: P,
        options: &OpenOptions,
    ) -> Result<(Self, &'static dyn ContainerFormat)> {
        let path = path.as_ref();
        let data = ByteBuffer::read_file(path)?;
        let format = formats::detect(&data).ok_or(Error::UnknownFormat)?;

        let mut archive = Archive::new();
        archive.filename = Some(path.to_path_buf());
        format.open(&mut archive, &data, options)?;
        Ok((archive, format))
    }

    /// Serialize with `format` and write the result to `path`.
    ///
    /// Entry offsets are updated to match the freshly written file, which
    /// then becomes the archive's backing store.
    pub fn write_to_file<P: AsRef<Path>>(
        &mut self,
        format: &dyn ContainerFormat,
        path: P,
    ) -> Result<WriteReport> {
        // Serialize fully in memory before touching the file: write-time
        // fault-ins must still be able to read the old image.
        let mut out = ByteBuffer::new();
        let report = format.write(self, &mut out, true)?;
        std::fs::write(path.as_ref(), out.as_slice())?;

        self.filename = Some(path.as_ref().to_path_buf());
        self.modified = false;
        self.notify(ArchiveEvent::Saved);
        Ok(report)
    }

    /// The root directory node.
    #[must_use]
    pub fn root(&self) -> &DirNode {
        &self.root
    }

    /// The root directory node, mutably.
    pub fn root_mut(&mut self) -> &mut DirNode {
        &mut self.root
    }

    /// Replace the whole tree. Used by codecs to discard a partially built
    /// tree when an open aborts.
    pub(crate) fn reset_root(&mut self) {
        self.root = DirNode::root();
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Set or clear the backing file used for lazy loads.
    pub fn set_filename(&mut self, filename: Option<PathBuf>) {
        self.filename = filename;
    }

    /// Archive-level dirty flag.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Set the dirty flag; becoming modified emits
    /// [`ArchiveEvent::Modified`].
    pub fn set_modified(&mut self, modified: bool) {
        let became_modified = modified && !self.modified;
        self.modified = modified;
        if became_modified {
            self.notify(ArchiveEvent::Modified);
        }
    }

    /// True while change notifications are suppressed.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Suppress or re-enable change notifications. Codecs mute for the
    /// duration of a bulk load.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Install the notification sink.
    pub fn set_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.listener = Some(listener);
    }

    /// Emit `event` to the listener unless muted.
    pub(crate) fn notify(&self, event: ArchiveEvent) {
        if self.muted {
            return;
        }
        if let Some(listener) = &self.listener {
            listener.notify(event);
        }
    }
}
