//! Checkpoint stores

use crate::ports::{
    CheckpointStore,
    StorageError,
};
use lightbridge_types::entities::{
    RelayCheckpoint,
    RelayDirection,
};
use parking_lot::Mutex;
use std::{
    fs,
    io::{
        self,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};

/// Keeps the checkpoint of one direction in `<dir>/<direction>.checkpoint`,
/// encoded with the relay codec.
///
/// A save writes a temporary file, syncs it, renames it over the checkpoint
/// and syncs the directory. A crash leaves either the old or the new
/// checkpoint, and a completed save survives a power loss.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// The store of `direction` inside `dir`. The directory is created on the
    /// first save.
    pub fn new(dir: impl AsRef<Path>, direction: &RelayDirection) -> Self {
        let path = dir.as_ref().join(format!("{direction}.checkpoint"));
        Self { path }
    }

    /// The checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let dir = self.dir();
        fs::create_dir_all(dir)?;
        let tmp = self.path.with_extension("checkpoint.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        sync_dir(dir)
    }
}

/// Persists the entries of `dir`, so that a rename inside it is durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

// Directories cannot be opened as files on other platforms.
#[cfg(not(unix))]
fn sync_dir(_: &Path) -> io::Result<()> {
    Ok(())
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<RelayCheckpoint>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err.to_string())),
        };
        lightbridge_codec::decode(&bytes)
            .map(Some)
            .map_err(|err| {
                StorageError::Corrupted(format!("{}: {err}", self.path.display()))
            })
    }

    fn save(&mut self, checkpoint: &RelayCheckpoint) -> Result<(), StorageError> {
        let bytes = lightbridge_codec::encode(checkpoint).map_err(|err| {
            StorageError::Corrupted(format!("{}: {err}", self.path.display()))
        })?;
        self.write(&bytes)
            .map_err(|err| StorageError::Io(format!("{}: {err}", self.path.display())))
    }
}

/// Keeps the checkpoint in memory. Clones share the checkpoint, so a test can
/// hand one clone to the relayer and inspect another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    checkpoint: Arc<Mutex<Option<RelayCheckpoint>>>,
}

impl InMemoryCheckpointStore {
    /// A store that already holds `checkpoint`.
    pub fn with(checkpoint: RelayCheckpoint) -> Self {
        Self {
            checkpoint: Arc::new(Mutex::new(Some(checkpoint))),
        }
    }

    /// The stored checkpoint.
    pub fn get(&self) -> Option<RelayCheckpoint> {
        self.checkpoint.lock().clone()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self) -> Result<Option<RelayCheckpoint>, StorageError> {
        Ok(self.get())
    }

    fn save(&mut self, checkpoint: &RelayCheckpoint) -> Result<(), StorageError> {
        *self.checkpoint.lock() = Some(checkpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightbridge_types::{
        entities::{
            InFlightSubmission,
            RelayedHeader,
        },
        test_helpers::header,
    };

    fn checkpoint() -> RelayCheckpoint {
        let mut checkpoint = RelayCheckpoint::starting_at(&header(100, 10, 0));
        checkpoint.advance(RelayedHeader::from(&header(101, 10, 0)), Some(4), 8);
        checkpoint.in_flight = Some(InFlightSubmission {
            header: RelayedHeader::from(&header(102, 10, 0)),
            sequence: 5,
            payload_hash: [7; 32].into(),
            tx_hashes: vec![[8; 32].into()],
            fee: 120,
        });
        checkpoint
    }

    #[test]
    fn file_store_is_empty_before_the_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path(), &"eth-to-near".into());

        assert_eq!(store.load(), Ok(None));
    }

    #[test]
    fn file_store_keeps_one_checkpoint_per_direction() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("relay");
        let mut forward = FileCheckpointStore::new(&nested, &"eth-to-near".into());
        let mut backward = FileCheckpointStore::new(&nested, &"near-to-eth".into());
        let mut other = checkpoint();
        other.in_flight = None;

        forward.save(&checkpoint()).unwrap();
        backward.save(&other).unwrap();

        assert_eq!(forward.load(), Ok(Some(checkpoint())));
        assert_eq!(backward.load(), Ok(Some(other)));
        assert!(forward.path().ends_with("relay/eth-to-near.checkpoint"));
    }

    #[test]
    fn save_replaces_the_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileCheckpointStore::new(dir.path(), &"eth-to-near".into());
        let mut checkpoint = checkpoint();
        store.save(&checkpoint).unwrap();

        checkpoint.advance(RelayedHeader::from(&header(102, 10, 0)), Some(5), 8);
        store.save(&checkpoint).unwrap();

        let reopened = FileCheckpointStore::new(dir.path(), &"eth-to-near".into());
        assert_eq!(reopened.load(), Ok(Some(checkpoint)));
        assert!(!store.path().with_extension("checkpoint.tmp").exists());
    }

    #[test]
    fn checkpoint_next_to_the_working_directory_syncs_the_current_dir() {
        let store = FileCheckpointStore::new("", &"eth-to-near".into());

        assert_eq!(store.path(), Path::new("eth-to-near.checkpoint"));
        assert_eq!(store.dir(), Path::new("."));
    }

    #[cfg(unix)]
    #[test]
    fn directory_sync_fails_for_a_missing_directory() {
        let dir = tempfile::tempdir().unwrap();

        assert!(sync_dir(dir.path()).is_ok());
        assert!(sync_dir(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn garbage_is_reported_as_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path(), &"eth-to-near".into());
        fs::write(store.path(), [1, 2, 3]).unwrap();

        assert!(matches!(store.load(), Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn memory_store_clones_share_the_checkpoint() {
        let store = InMemoryCheckpointStore::default();
        let mut writer = store.clone();

        writer.save(&checkpoint()).unwrap();

        assert_eq!(store.get(), Some(checkpoint()));
    }
}
