use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Blob storage addressed by object name (`user-{id}/{uuid}[.ext]`).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, object_name: &str, data: Bytes) -> Result<()>;
    /// `None` when no such object exists.
    async fn get(&self, object_name: &str) -> Result<Option<Bytes>>;
    /// Returns `false` when the object was already gone.
    async fn delete(&self, object_name: &str) -> Result<bool>;
}

/// Builds a fresh object name in the uploader's namespace, keeping a short
/// alphanumeric extension from the original file name when there is one.
pub fn new_object_name(user_id: i64, file_name: Option<&str>) -> String {
    let ext = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.bytes().all(|b| b.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{}{}.{}", user_namespace(user_id), Uuid::new_v4(), ext),
        None => format!("{}{}", user_namespace(user_id), Uuid::new_v4()),
    }
}

/// Prefix every object uploaded by `user_id` starts with.
pub fn user_namespace(user_id: i64) -> String {
    format!("user-{user_id}/")
}

/// Rejects anything that could escape the storage root: empty segments,
/// `.`/`..`, and characters outside `[A-Za-z0-9._-]`.
pub fn validate_object_name(object_name: &str) -> Result<()> {
    if object_name.is_empty() || object_name.len() > 255 {
        bail!("invalid object name length");
    }
    for segment in object_name.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            bail!("invalid object name segment in '{}'", object_name);
        }
        if !segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
        {
            bail!("invalid characters in object name '{}'", object_name);
        }
    }
    Ok(())
}

/// Content type served for an object, guessed from its extension.
pub fn content_type_for(object_name: &str) -> &'static str {
    let ext = object_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "webm" => "audio/webm",
        "pdf" => "application/pdf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Objects stored as plain files under a root directory, one file per object
/// at `{dir}/{object_name}`.
pub struct LocalObjectStore {
    dir: PathBuf,
}

impl LocalObjectStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Object storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    fn object_path(&self, object_name: &str) -> Result<PathBuf> {
        validate_object_name(object_name)?;
        Ok(self.dir.join(object_name))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, object_name: &str, data: Bytes) -> Result<()> {
        let path = self.object_path(object_name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get(&self, object_name: &str) -> Result<Option<Bytes>> {
        let path = self.object_path(object_name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, object_name: &str) -> Result<bool> {
        let path = self.object_path(object_name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted object {}", object_name);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Object {} already gone", object_name);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, object_name: &str, data: Bytes) -> Result<()> {
        validate_object_name(object_name)?;
        self.objects
            .lock()
            .map_err(|e| anyhow!("object map lock poisoned: {}", e))?
            .insert(object_name.to_string(), data);
        Ok(())
    }

    async fn get(&self, object_name: &str) -> Result<Option<Bytes>> {
        validate_object_name(object_name)?;
        let objects = self
            .objects
            .lock()
            .map_err(|e| anyhow!("object map lock poisoned: {}", e))?;
        Ok(objects.get(object_name).cloned())
    }

    async fn delete(&self, object_name: &str) -> Result<bool> {
        validate_object_name(object_name)?;
        let removed = self
            .objects
            .lock()
            .map_err(|e| anyhow!("object map lock poisoned: {}", e))?
            .remove(object_name);
        Ok(removed.is_some())
    }
}
