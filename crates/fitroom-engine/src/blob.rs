use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::{bail, Context, Result};
use image::ImageFormat;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Uploads above this size are refused, matching the try-on service limit.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

type LiveSet = Mutex<BTreeSet<Uuid>>;

/// Registry of locally selected images.
///
/// A blob stays live while any [`BlobRef`] to it exists and is released the
/// moment the last handle drops.
#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    live: Arc<LiveSet>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import_path(&self, path: &Path) -> Result<BlobRef> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image")
            .to_string();
        self.import_bytes(name, bytes)
            .with_context(|| format!("{} is not a usable image", path.display()))
    }

    pub fn import_bytes(&self, name: impl Into<String>, bytes: Vec<u8>) -> Result<BlobRef> {
        if bytes.is_empty() {
            bail!("image is empty");
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            bail!(
                "image is {} bytes; the limit is {} bytes",
                bytes.len(),
                MAX_IMAGE_BYTES
            );
        }
        let format = image::guess_format(&bytes).context("unrecognised image format")?;
        if !matches!(
            format,
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP
        ) {
            bail!("unsupported image format {format:?}; use PNG, JPEG or WebP");
        }
        Ok(self.register(name.into(), format.to_mime_type().to_string(), bytes))
    }

    pub fn live_count(&self) -> usize {
        lock_live(&self.live).len()
    }

    pub fn is_live(&self, id: Uuid) -> bool {
        lock_live(&self.live).contains(&id)
    }

    fn register(&self, name: String, mime: String, bytes: Vec<u8>) -> BlobRef {
        let id = Uuid::new_v4();
        let digest = hex::encode(Sha256::digest(&bytes));
        lock_live(&self.live).insert(id);
        BlobRef {
            inner: Arc::new(BlobInner {
                id,
                name,
                mime,
                digest,
                bytes,
                live: Arc::downgrade(&self.live),
            }),
        }
    }
}

/// Handle to image data held by a [`BlobStore`].
#[derive(Clone)]
pub struct BlobRef {
    inner: Arc<BlobInner>,
}

struct BlobInner {
    id: Uuid,
    name: String,
    mime: String,
    digest: String,
    bytes: Vec<u8>,
    live: Weak<LiveSet>,
}

impl Drop for BlobInner {
    fn drop(&mut self) {
        if let Some(live) = self.live.upgrade() {
            lock_live(&live).remove(&self.id);
        }
    }
}

impl BlobRef {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mime(&self) -> &str {
        &self.inner.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// Short content digest, safe to log.
    pub fn digest(&self) -> &str {
        &self.inner.digest[..12]
    }

    pub fn url(&self) -> String {
        format!("blob:fitroom/{}", self.inner.id)
    }

    /// A handle that does not keep the blob live.
    pub fn downgrade(&self) -> WeakBlob {
        WeakBlob {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn info(&self) -> BlobInfo {
        BlobInfo {
            id: self.id(),
            url: self.url(),
            name: self.name().to_string(),
            mime: self.mime().to_string(),
        }
    }
}

impl PartialEq for BlobRef {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for BlobRef {}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobRef")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("mime", &self.inner.mime)
            .field("len", &self.inner.bytes.len())
            .finish()
    }
}

/// Non-owning counterpart of [`BlobRef`].
#[derive(Clone)]
pub struct WeakBlob {
    inner: Weak<BlobInner>,
}

impl WeakBlob {
    /// `None` once every owning handle has dropped.
    pub fn upgrade(&self) -> Option<BlobRef> {
        self.inner.upgrade().map(|inner| BlobRef { inner })
    }
}

impl fmt::Debug for WeakBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBlob")
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Read-only description of a blob for renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub id: Uuid,
    pub url: String,
    pub name: String,
    pub mime: String,
}

fn lock_live(live: &LiveSet) -> MutexGuard<'_, BTreeSet<Uuid>> {
    live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::{BlobStore, MAX_IMAGE_BYTES};

    pub(crate) fn png_bytes(shade: u8) -> Vec<u8> {
        let image = RgbImage::from_pixel(4, 4, Rgb([shade, 64, 128]));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .expect("png encode");
        out.into_inner()
    }

    #[test]
    fn import_detects_format_and_tracks_liveness() -> anyhow::Result<()> {
        let store = BlobStore::new();
        let blob = store.import_bytes("me.png", png_bytes(10))?;
        assert_eq!(blob.mime(), "image/png");
        assert_eq!(blob.name(), "me.png");
        assert_eq!(blob.digest().len(), 12);
        assert!(blob.url().starts_with("blob:fitroom/"));
        assert!(store.is_live(blob.id()));

        let id = blob.id();
        let copy = blob.clone();
        drop(blob);
        assert!(store.is_live(id));
        drop(copy);
        assert!(!store.is_live(id));
        assert_eq!(store.live_count(), 0);
        Ok(())
    }

    #[test]
    fn weak_handle_does_not_keep_blob_live() -> anyhow::Result<()> {
        let store = BlobStore::new();
        let blob = store.import_bytes("me.png", png_bytes(3))?;
        let id = blob.id();
        let weak = blob.downgrade();
        assert_eq!(weak.upgrade().as_ref(), Some(&blob));

        drop(blob);
        assert!(!store.is_live(id));
        assert!(weak.upgrade().is_none());
        Ok(())
    }

    #[test]
    fn import_path_reads_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("shirt.png");
        std::fs::write(&path, png_bytes(200))?;
        let store = BlobStore::new();
        let blob = store.import_path(&path)?;
        assert_eq!(blob.name(), "shirt.png");
        assert_eq!(store.live_count(), 1);
        Ok(())
    }

    #[test]
    fn import_rejects_non_images() {
        let store = BlobStore::new();
        assert!(store.import_bytes("empty.png", Vec::new()).is_err());
        assert!(store
            .import_bytes("notes.txt", b"just some text".to_vec())
            .is_err());
        let mut oversized = png_bytes(1);
        oversized.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(store.import_bytes("huge.png", oversized).is_err());
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn handles_compare_by_identity() -> anyhow::Result<()> {
        let store = BlobStore::new();
        let first = store.import_bytes("a.png", png_bytes(5))?;
        let second = store.import_bytes("a.png", png_bytes(5))?;
        assert_ne!(first, second);
        assert_eq!(first.digest(), second.digest());
        assert_eq!(first, first.clone());
        Ok(())
    }
}
