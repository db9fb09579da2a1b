//! Reading and writing COCO documents on disk.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::types::Dataset;

/// Load a COCO document.
pub fn read_document(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Serialize a document; `indent: None` produces compact JSON.
pub fn to_json_bytes(dataset: &Dataset, indent: Option<usize>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match indent {
        Some(width) => {
            let indent = vec![b' '; width];
            let mut ser =
                serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(&indent));
            dataset.serialize(&mut ser)?;
        }
        None => serde_json::to_writer(&mut buf, dataset)?,
    }
    Ok(buf)
}

/// Replace `path` with `bytes` via a sibling temp file, so readers never see a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(tmp.path(), e))?;
    if let Some(perms) = destination_permissions(path) {
        tmp.as_file()
            .set_permissions(perms)
            .map_err(|e| Error::io(tmp.path(), e))?;
    }
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Keep an existing destination's mode; new files get 0644 instead of the
/// temp file's 0600.
fn destination_permissions(path: &Path) -> Option<std::fs::Permissions> {
    match std::fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        #[cfg(unix)]
        Err(_) => {
            use std::os::unix::fs::PermissionsExt;
            Some(std::fs::Permissions::from_mode(0o644))
        }
        #[cfg(not(unix))]
        Err(_) => None,
    }
}

pub fn write_document(dataset: &Dataset, path: &Path, indent: Option<usize>) -> Result<()> {
    let bytes = to_json_bytes(dataset, indent)?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Image};

    fn small() -> Dataset {
        Dataset {
            info: None,
            licenses: vec![],
            images: vec![Image {
                id: 1,
                file_name: "a.jpg".into(),
                width: 4,
                height: 3,
            }],
            annotations: vec![],
            categories: vec![Category {
                id: 1,
                name: "cat".into(),
                supercategory: Some("none".into()),
            }],
        }
    }

    #[test]
    fn test_indent_width() {
        let pretty = String::from_utf8(to_json_bytes(&small(), Some(2)).unwrap()).unwrap();
        assert!(pretty.contains("\n  \"images\""));
        let compact = String::from_utf8(to_json_bytes(&small(), None).unwrap()).unwrap();
        assert!(!compact.contains('\n'));
        assert!(compact.starts_with("{\"info\":null,\"licenses\":[],\"images\""));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_document(&small(), &path, Some(4)).unwrap();
        assert_eq!(read_document(&path).unwrap(), small());
        // nothing but the destination is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_document(&small(), &path, None).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_overwrite_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, b"{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();
        write_document(&small(), &path, None).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        assert_eq!(read_document(&path).unwrap(), small());
    }

    #[test]
    fn test_unwritable_destination_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.json");
        let err = write_document(&small(), &path, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
        assert!(!path.exists());
    }
}
