//! Outbox persistence. Each `(session_id, kind)` is written at most once.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::OutboxError;

use super::{ArtifactKind, ArtifactSummary, OutboxArtifact};

/// Storage for emitted artifacts.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Store `artifact` unless one already exists for its session and kind.
    ///
    /// Returns whichever artifact is stored once the call completes, so a
    /// losing concurrent writer gets the winner's record back.
    async fn put_if_absent(&self, artifact: OutboxArtifact) -> Result<OutboxArtifact, OutboxError>;

    async fn get(
        &self,
        session_id: Uuid,
        kind: ArtifactKind,
    ) -> Result<Option<OutboxArtifact>, OutboxError>;

    /// Summaries of every stored artifact, oldest first.
    async fn list(&self) -> Result<Vec<ArtifactSummary>, OutboxError>;
}

fn sort_summaries(summaries: &mut [ArtifactSummary]) {
    summaries.sort_by(|a, b| {
        (a.emitted_at, a.session_id, a.kind).cmp(&(b.emitted_at, b.session_id, b.kind))
    });
}

// ── In-memory ───────────────────────────────────────────────────────

/// Process-local store, used in tests and when no outbox directory is wanted.
#[derive(Default)]
pub struct MemoryOutbox {
    artifacts: Mutex<BTreeMap<(Uuid, ArtifactKind), OutboxArtifact>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn put_if_absent(&self, artifact: OutboxArtifact) -> Result<OutboxArtifact, OutboxError> {
        let mut artifacts = self.artifacts.lock().await;
        let stored = artifacts
            .entry((artifact.session_id, artifact.kind))
            .or_insert(artifact);
        Ok(stored.clone())
    }

    async fn get(
        &self,
        session_id: Uuid,
        kind: ArtifactKind,
    ) -> Result<Option<OutboxArtifact>, OutboxError> {
        Ok(self.artifacts.lock().await.get(&(session_id, kind)).cloned())
    }

    async fn list(&self) -> Result<Vec<ArtifactSummary>, OutboxError> {
        let mut summaries: Vec<ArtifactSummary> = self
            .artifacts
            .lock()
            .await
            .values()
            .map(OutboxArtifact::summary)
            .collect();
        sort_summaries(&mut summaries);
        Ok(summaries)
    }
}

// ── Filesystem ──────────────────────────────────────────────────────

/// Directory-backed store.
///
/// Layout: `<root>/<session_id>/<kind>.json` holds the full record and
/// `<root>/<session_id>/{email.eml,sms.txt,form.txt}` the rendered text.
/// Records are written to a temp file and hard-linked into place, which
/// fails if the target exists, so concurrent writers cannot both win.
pub struct FileOutbox {
    root: PathBuf,
    locks: Mutex<HashMap<(Uuid, ArtifactKind), Arc<Mutex<()>>>>,
}

impl FileOutbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: Uuid) -> PathBuf {
        self.root.join(session_id.to_string())
    }

    fn record_path(&self, session_id: Uuid, kind: ArtifactKind) -> PathBuf {
        self.session_dir(session_id).join(format!("{kind}.json"))
    }

    async fn key_lock(&self, session_id: Uuid, kind: ArtifactKind) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry((session_id, kind)).or_default())
    }

    /// Drop the key's lock entry unless another writer is waiting on it.
    async fn release_key_lock(&self, session_id: Uuid, kind: ArtifactKind, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one held here.
        let waiting = Arc::strong_count(&lock) > 2;
        drop(lock);
        if !waiting {
            locks.remove(&(session_id, kind));
        }
    }

    async fn write_once(&self, artifact: OutboxArtifact) -> Result<OutboxArtifact, OutboxError> {
        let (session_id, kind) = (artifact.session_id, artifact.kind);
        let path = self.record_path(session_id, kind);
        if let Some(existing) = Self::read(&path).await? {
            tracing::debug!(%session_id, %kind, "Outbox artifact already stored");
            return Ok(existing);
        }

        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).await?;
        let tmp = dir.join(format!(".{kind}.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, serde_json::to_vec_pretty(&artifact)?).await?;
        let linked = fs::hard_link(&tmp, &path).await;
        if let Err(e) = fs::remove_file(&tmp).await {
            tracing::warn!(path = %tmp.display(), error = %e, "Failed to remove outbox temp file");
        }

        match linked {
            Ok(()) => {
                fs::write(dir.join(kind.rendering_file_name()), &artifact.payload.body).await?;
                tracing::info!(%session_id, %kind, path = %path.display(), "Outbox artifact written");
                Ok(artifact)
            }
            // Another process got there first.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Self::read(&path).await?.ok_or_else(|| OutboxError::Io(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(test)]
    async fn held_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    async fn read(path: &Path) -> Result<Option<OutboxArtifact>, OutboxError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl OutboxStore for FileOutbox {
    async fn put_if_absent(&self, artifact: OutboxArtifact) -> Result<OutboxArtifact, OutboxError> {
        let (session_id, kind) = (artifact.session_id, artifact.kind);
        let lock = self.key_lock(session_id, kind).await;
        let result = {
            let _guard = lock.lock().await;
            self.write_once(artifact).await
        };
        self.release_key_lock(session_id, kind, lock).await;
        result
    }

    async fn get(
        &self,
        session_id: Uuid,
        kind: ArtifactKind,
    ) -> Result<Option<OutboxArtifact>, OutboxError> {
        Self::read(&self.record_path(session_id, kind)).await
    }

    async fn list(&self) -> Result<Vec<ArtifactSummary>, OutboxError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(session_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            else {
                continue;
            };
            for kind in ArtifactKind::ALL {
                if let Some(artifact) = self.get(session_id, kind).await? {
                    summaries.push(artifact.summary());
                }
            }
        }
        sort_summaries(&mut summaries);
        Ok(summaries)
    }
}
