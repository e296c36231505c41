use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::backend::{Backend, BackendError, ObjectInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedObject {
    pub bucket: String,
    pub path: String,
    pub public_url: String,
    pub sha256: String,
    pub size: u64,
}

pub fn archive_path(prefix: &str, table_name: &str, file_name: &str) -> String {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("csv");
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{table_name}.{extension}")
    } else {
        format!("{prefix}/{table_name}.{extension}")
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn upload_archive(
    backend: &dyn Backend,
    bucket: &str,
    path: &str,
    bytes: &[u8],
    content_type: &str,
) -> Result<ArchivedObject, BackendError> {
    backend.upload_object(bucket, path, bytes, content_type)?;
    Ok(ArchivedObject {
        bucket: bucket.to_string(),
        path: path.to_string(),
        public_url: backend.public_url(bucket, path),
        sha256: sha256_hex(bytes),
        size: bytes.len() as u64,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveListing {
    pub object: ObjectInfo,
    pub path: String,
    pub public_url: String,
}

pub fn list_archives(
    backend: &dyn Backend,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<ArchiveListing>, BackendError> {
    let prefix = prefix.trim_matches('/');
    let objects = backend.list_objects(bucket, prefix)?;
    Ok(objects
        .into_iter()
        .map(|object| {
            let path = format!("{prefix}/{}", object.name);
            ArchiveListing {
                public_url: backend.public_url(bucket, &path),
                path,
                object,
            }
        })
        .collect())
}
