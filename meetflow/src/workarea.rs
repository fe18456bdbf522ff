//! Per-task working directories and upload staging.
//!
//! Every task owns `<root>/<task_id>/` and nothing else, so concurrent
//! tasks never write into the same directory.

use crate::errors::SubmitError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Subdirectories created for every task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkDir {
    /// The uploaded file.
    Raw,
    /// Normalized audio.
    Converted,
    /// Voice-activity segments.
    Vad,
    /// Speaker turns.
    Diarization,
    /// Transcript outputs.
    Transcript,
    /// Summary outputs.
    Summary,
}

impl WorkDir {
    /// All subdirectories.
    pub const ALL: [Self; 6] = [
        Self::Raw,
        Self::Converted,
        Self::Vad,
        Self::Diarization,
        Self::Transcript,
        Self::Summary,
    ];

    /// Directory name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Converted => "converted",
            Self::Vad => "vad",
            Self::Diarization => "diarization",
            Self::Transcript => "transcript",
            Self::Summary => "summary",
        }
    }
}

/// A fully written upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    /// Final location of the file.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
    /// Hex SHA-256 of the content.
    pub sha256: String,
}

/// The partitioned working area rooted at `DATA_DIR`.
#[derive(Debug, Clone)]
pub struct WorkArea {
    root: PathBuf,
}

impl WorkArea {
    /// Creates a work area rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<task_id>`.
    #[must_use]
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.root.join(task_id)
    }

    /// `<root>/<task_id>/<dir>`.
    #[must_use]
    pub fn dir(&self, task_id: &str, dir: WorkDir) -> PathBuf {
        self.task_dir(task_id).join(dir.as_str())
    }

    /// Creates the task directory and all its subdirectories.
    ///
    /// The task directory itself must not exist yet; an
    /// [`io::ErrorKind::AlreadyExists`] error means the id is taken.
    pub async fn prepare(&self, task_id: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root).await?;
        let task_dir = self.task_dir(task_id);
        fs::create_dir(&task_dir).await?;
        for dir in WorkDir::ALL {
            fs::create_dir(task_dir.join(dir.as_str())).await?;
        }
        Ok(task_dir)
    }

    /// Removes a task directory and everything in it.
    pub async fn discard(&self, task_id: &str) -> io::Result<()> {
        match fs::remove_dir_all(self.task_dir(task_id)).await {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// Streams an upload into `raw/`.
    ///
    /// Chunks go to `<name>.part`, which is renamed into place once the
    /// stream ends. Exceeding `max_bytes` or a stream error removes the
    /// partial file.
    pub async fn stage_upload<S>(
        &self,
        task_id: &str,
        file_name: &str,
        stream: S,
        max_bytes: u64,
    ) -> Result<StagedUpload, SubmitError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let name = sanitize_file_name(file_name)
            .ok_or_else(|| SubmitError::validation("file name is empty"))?;
        let path = self.dir(task_id, WorkDir::Raw).join(&name);
        let part = self.dir(task_id, WorkDir::Raw).join(format!("{name}.part"));

        match write_part(&part, stream, max_bytes).await {
            Ok((bytes, sha256)) => {
                fs::rename(&part, &path).await?;
                debug!(task_id = %task_id, bytes, path = %path.display(), "Upload staged");
                Ok(StagedUpload { path, bytes, sha256 })
            }
            Err(err) => {
                // Best effort: the part file may not exist yet.
                let _ = fs::remove_file(&part).await;
                Err(err)
            }
        }
    }

    /// Writes `value` as pretty JSON to `path`.
    pub async fn write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> io::Result<()> {
        let body = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
        fs::write(path, body).await
    }
}

async fn write_part<S>(part: &Path, stream: S, max_bytes: u64) -> Result<(u64, String), SubmitError>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut stream = std::pin::pin!(stream);
    let mut file = fs::File::create(part).await?;
    let mut hasher = Sha256::new();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(SubmitError::TooLarge { limit: max_bytes });
        }
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((written, hex::encode(hasher.finalize())))
}

/// Reduces a client-supplied name to its final path component.
///
/// Returns `None` when nothing usable remains.
#[must_use]
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pretty_assertions::assert_eq;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("meeting.mp3").as_deref(), Some("meeting.mp3"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\Users\\a\\call.wav").as_deref(), Some("call.wav"));
        assert_eq!(sanitize_file_name("dir/.."), None);
        assert_eq!(sanitize_file_name("  "), None);
    }

    #[tokio::test]
    async fn test_prepare_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let area = WorkArea::new(tmp.path());
        let dir = area.prepare("t1").await.unwrap();
        for sub in WorkDir::ALL {
            assert!(dir.join(sub.as_str()).is_dir());
        }
    }

    #[tokio::test]
    async fn test_prepare_is_exclusive_and_discard_removes() {
        let tmp = tempfile::tempdir().unwrap();
        let area = WorkArea::new(tmp.path().join("nested/root"));
        area.prepare("t1").await.unwrap();
        let err = area.prepare("t1").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        area.discard("t1").await.unwrap();
        assert!(!area.task_dir("t1").exists());
        area.discard("t1").await.unwrap();
    }

    #[tokio::test]
    async fn test_stage_upload_hashes_and_renames() {
        let tmp = tempfile::tempdir().unwrap();
        let area = WorkArea::new(tmp.path());
        area.prepare("t1").await.unwrap();

        let staged = area
            .stage_upload("t1", "standup.mp3", chunks(&[b"hello ", b"world"]), 1024)
            .await
            .unwrap();

        assert_eq!(staged.bytes, 11);
        assert_eq!(staged.path, tmp.path().join("t1/raw/standup.mp3"));
        assert_eq!(
            staged.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(std::fs::read(&staged.path).unwrap(), b"hello world");
        assert!(!tmp.path().join("t1/raw/standup.mp3.part").exists());
    }

    #[tokio::test]
    async fn test_stage_upload_too_large_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let area = WorkArea::new(tmp.path());
        area.prepare("t1").await.unwrap();

        let err = area
            .stage_upload("t1", "big.wav", chunks(&[b"0123456789", b"0123456789"]), 15)
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::TooLarge { limit: 15 }));
        let raw = std::fs::read_dir(tmp.path().join("t1/raw")).unwrap().count();
        assert_eq!(raw, 0);
    }

    #[tokio::test]
    async fn test_stage_upload_stream_error_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let area = WorkArea::new(tmp.path());
        area.prepare("t1").await.unwrap();

        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);
        let err = area
            .stage_upload("t1", "a.mp3", failing, 1024)
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Io(_)));
        assert!(!tmp.path().join("t1/raw/a.mp3.part").exists());
    }
}
