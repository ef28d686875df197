//! Typed read/write/delete/list access to the shared rendezvous root.
//!
//! All writes are atomic with respect to concurrent readers: bytes go to a
//! temporary sibling first, then a rename replaces the target. A reader can
//! therefore never observe a half-written file. Rename atomicity is the only
//! cross-process guarantee required; no lock files are used.

use crate::error::RendezvousError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The four named subdirectories of the rendezvous root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Audio chunk pairs (`.pcm` + `.json`), producer-written.
    Audio,
    /// Partial and final transcripts, consumer-written.
    Transcripts,
    /// Control signals, status, and errors.
    Control,
    /// Cross-process settings, producer-written.
    Settings,
}

impl Channel {
    /// Directory name under the rendezvous root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Channel::Audio => "audio",
            Channel::Transcripts => "transcripts",
            Channel::Control => "control",
            Channel::Settings => "settings",
        }
    }

    /// All channels, in layout-creation order.
    pub fn all() -> [Channel; 4] {
        [
            Channel::Audio,
            Channel::Transcripts,
            Channel::Control,
            Channel::Settings,
        ]
    }
}

/// A directory entry returned by [`RendezvousStore::list`].
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub name: String,
    pub mtime: SystemTime,
}

/// Typed view over one shared rendezvous root.
#[derive(Debug, Clone)]
pub struct RendezvousStore {
    root: PathBuf,
}

impl RendezvousStore {
    /// Open a store over `root`. The root directory must already exist;
    /// the four channel subdirectories are created on demand.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RendezvousError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(RendezvousError::ContainerNotFound {
                path: root.display().to_string(),
            });
        }
        let store = Self { root };
        store.ensure_layout()?;
        Ok(store)
    }

    /// Rendezvous root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create any missing channel subdirectories.
    pub fn ensure_layout(&self) -> Result<(), RendezvousError> {
        for channel in Channel::all() {
            fs::create_dir_all(self.root.join(channel.dir_name()))?;
        }
        Ok(())
    }

    /// Reject names that could address anything outside the channel dir.
    fn checked_name<'a>(&self, name: &'a str) -> Result<&'a str, RendezvousError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(RendezvousError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(name)
    }

    fn entry_path(&self, channel: Channel, name: &str) -> Result<PathBuf, RendezvousError> {
        let name = self.checked_name(name)?;
        Ok(self.root.join(channel.dir_name()).join(name))
    }

    /// Atomically publish `bytes` under `name`: write a temporary sibling,
    /// then rename over the target.
    ///
    /// The temp name is the full target name plus a `.tmp` suffix, so the
    /// two halves of a chunk pair (same stem, different extensions) can be
    /// in flight at the same time without clobbering each other.
    pub fn write_atomic(
        &self,
        channel: Channel,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), RendezvousError> {
        let name = self.checked_name(name)?;
        let dir = self.root.join(channel.dir_name());
        let target = dir.join(name);
        let tmp = dir.join(format!("{name}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    /// Read the full contents of an entry.
    pub fn read(&self, channel: Channel, name: &str) -> Result<Vec<u8>, RendezvousError> {
        let path = self.entry_path(channel, name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RendezvousError::NotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// True if the entry exists.
    pub fn exists(&self, channel: Channel, name: &str) -> Result<bool, RendezvousError> {
        Ok(self.entry_path(channel, name)?.exists())
    }

    /// Delete an entry. Deleting a missing entry is not an error: the other
    /// process may have consumed it first.
    pub fn delete(&self, channel: Channel, name: &str) -> Result<(), RendezvousError> {
        let path = self.entry_path(channel, name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List entries in a channel, sorted by modification time (oldest first).
    ///
    /// In-flight `.tmp` siblings are never reported; temp files orphaned by
    /// a crash mid-publish are reclaimed by the reaper, not by readers.
    pub fn list(&self, channel: Channel) -> Result<Vec<EntryInfo>, RendezvousError> {
        let dir = self.root.join(channel.dir_name());
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name.ends_with(".tmp") {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let mtime = metadata.modified()?;
            entries.push(EntryInfo { name, mtime });
        }
        entries.sort_by_key(|e| e.mtime);
        Ok(entries)
    }

    /// Modification time of an entry, or `None` if it does not exist.
    pub fn mtime(
        &self,
        channel: Channel,
        name: &str,
    ) -> Result<Option<SystemTime>, RendezvousError> {
        let path = self.entry_path(channel, name)?;
        match fs::metadata(&path) {
            Ok(m) => Ok(Some(m.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
