use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Append-only directory holding the raw bytes of every prediction upload.
#[derive(Clone, Debug)]
pub struct UploadStore {
    upload_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to create upload directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to write upload {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Where one upload ended up. Never mutated after the write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedRecord {
    pub id: Uuid,
    pub extension: String,
    pub path: PathBuf,
}

impl UploadStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let upload_dir = upload_dir.into();
        std::fs::create_dir_all(&upload_dir).map_err(|source| StorageError::CreateDir {
            path: upload_dir.display().to_string(),
            source,
        })?;
        Ok(Self { upload_dir })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Text after the last `.` of the final path component, with control
    /// characters removed. A name without a dot is used whole.
    pub fn extract_file_extension(file_name: &str) -> String {
        let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
        base.rsplit('.')
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_control())
            .collect()
    }

    pub fn generate_file_name(id: Uuid, file_extension: &str) -> String {
        format!("{}.{}", id, file_extension)
    }

    pub async fn persist(
        &self,
        data: &[u8],
        file_name: Option<&str>,
    ) -> Result<PersistedRecord, StorageError> {
        let id = Uuid::new_v4();
        let extension = file_name
            .map(Self::extract_file_extension)
            .unwrap_or_default();
        let path = self
            .upload_dir
            .join(Self::generate_file_name(id, &extension));

        tokio::fs::write(&path, data)
            .await
            .map_err(|source| StorageError::Write {
                path: path.display().to_string(),
                source,
            })?;

        log::debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(PersistedRecord {
            id,
            extension,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extension_is_text_after_last_dot() {
        assert_eq!(UploadStore::extract_file_extension("leaf.jpg"), "jpg");
        assert_eq!(UploadStore::extract_file_extension("leaf.tar.png"), "png");
        assert_eq!(UploadStore::extract_file_extension("leaf"), "leaf");
        assert_eq!(UploadStore::extract_file_extension("leaf."), "");
    }

    #[test]
    fn extension_never_carries_path_segments() {
        assert_eq!(UploadStore::extract_file_extension("leaf.png/x"), "x");
        assert_eq!(UploadStore::extract_file_extension("../../etc/passwd"), "passwd");
        assert_eq!(UploadStore::extract_file_extension("C:\\photos\\leaf.jpg"), "jpg");
        assert_eq!(UploadStore::extract_file_extension("leaf.pn\0g"), "png");
        assert_eq!(UploadStore::extract_file_extension("dir/.."), "");
    }

    #[actix_web::test]
    async fn traversal_in_file_name_stays_inside_upload_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::new(temp_dir.path()).unwrap();

        let record = store.persist(b"x", Some("leaf.png/../../x")).await.unwrap();

        assert_eq!(record.path.parent().unwrap(), temp_dir.path());
        assert_eq!(record.extension, "x");
        assert!(record.path.is_file());
    }

    #[test]
    fn new_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("uploads").join("predictions");
        let store = UploadStore::new(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.upload_dir(), dir.as_path());
    }

    #[actix_web::test]
    async fn persist_writes_bytes_under_uuid_name() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::new(temp_dir.path()).unwrap();

        let record = store.persist(b"raw bytes", Some("photo.JPG")).await.unwrap();

        assert_eq!(record.extension, "JPG");
        assert_eq!(
            record.path.file_name().unwrap().to_str().unwrap(),
            format!("{}.JPG", record.id)
        );
        assert_eq!(std::fs::read(&record.path).unwrap(), b"raw bytes");
    }

    #[actix_web::test]
    async fn identical_file_names_never_collide() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::new(temp_dir.path()).unwrap();

        let first = store.persist(b"one", Some("leaf.png")).await.unwrap();
        let second = store.persist(b"two", Some("leaf.png")).await.unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(std::fs::read(&first.path).unwrap(), b"one");
        assert_eq!(std::fs::read(&second.path).unwrap(), b"two");
    }

    #[actix_web::test]
    async fn missing_file_name_yields_empty_extension() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::new(temp_dir.path()).unwrap();

        let record = store.persist(b"x", None).await.unwrap();

        assert_eq!(record.extension, "");
        assert!(record.path.to_str().unwrap().ends_with('.'));
    }

    #[actix_web::test]
    async fn unwritable_directory_surfaces_write_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::new(temp_dir.path().join("gone")).unwrap();
        std::fs::remove_dir(store.upload_dir()).unwrap();

        let err = store.persist(b"x", Some("a.png")).await.unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
    }
}
