use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{fs, io::AsyncWriteExt};

use crate::dao::{
    models::{SnapshotDocuments, StateDocument, TeamsDocument},
    snapshot_store::SnapshotStore,
    storage::StorageResult,
};

use super::error::{FileDaoError, FileResult};

const STATE_FILE: &str = "state.json";
const TEAMS_FILE: &str = "teams.json";
const WRITE_CHECK_FILE: &str = ".write-check";

/// Snapshot store writing two JSON documents into a data directory.
///
/// Every document is written to `<name>.tmp`, synced, then renamed over the
/// target, so a crash mid-write leaves the previous version intact.
#[derive(Clone)]
pub struct FileSnapshotStore {
    dir: Arc<Path>,
}

impl FileSnapshotStore {
    /// Open (and create if needed) the data directory.
    pub async fn open(dir: impl Into<PathBuf>) -> FileResult<Self> {
        let dir: PathBuf = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| FileDaoError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            dir: Arc::from(dir),
        })
    }

    /// Directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_document<T>(&self, name: &str, document: &T) -> FileResult<()>
    where
        T: Serialize,
    {
        let bytes =
            serde_json::to_vec_pretty(document).map_err(|source| FileDaoError::Serialize {
                document: "snapshot document",
                source,
            })?;
        self.write_atomic(name, &bytes).await
    }

    async fn write_atomic(&self, name: &str, bytes: &[u8]) -> FileResult<()> {
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));

        let write_err = |source: std::io::Error| FileDaoError::Write {
            path: tmp.clone(),
            source,
        };
        let mut file = fs::File::create(&tmp).await.map_err(write_err)?;
        file.write_all(bytes).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        fs::rename(&tmp, &target)
            .await
            .map_err(|source| FileDaoError::Rename {
                from: tmp.clone(),
                to: target.clone(),
                source,
            })
    }

    async fn read_document<T>(&self, name: &str) -> FileResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let path = self.dir.join(name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(FileDaoError::Read { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| FileDaoError::Deserialize { path, source })
    }

    async fn load_documents(&self) -> FileResult<Option<SnapshotDocuments>> {
        let state = self.read_document::<StateDocument>(STATE_FILE).await?;
        let teams = self.read_document::<TeamsDocument>(TEAMS_FILE).await?;
        if state.is_none() && teams.is_none() {
            return Ok(None);
        }

        let documents = SnapshotDocuments {
            state: state.unwrap_or_default(),
            teams: teams.unwrap_or_default(),
        };
        documents.validate()?;
        Ok(Some(documents))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, documents: SnapshotDocuments) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.write_document(TEAMS_FILE, &documents.teams).await?;
            store.write_document(STATE_FILE, &documents.state).await?;
            Ok(())
        })
    }

    fn load(&self) -> BoxFuture<'static, StorageResult<Option<SnapshotDocuments>>> {
        let store = self.clone();
        Box::pin(async move { store.load_documents().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.write_atomic(WRITE_CHECK_FILE, b"ok").await?;
            Ok(())
        })
    }
}
