//! Purpose: Select the on-disk reader for a dataset path.
//! Exports: `FormatKind`, `EpisodeSource`, `DatasetSource`, `CONTAINER_EXTENSION`.
//! Role: Closed dispatch over the two supported formats; no plugin registry.
//! Invariants: Directories are chunked array stores; `.h5` files are containers.
//! Invariants: Detection only inspects path shape; readers do the real validation.

use std::fmt;
use std::path::Path;

use crate::core::chunked::ChunkedArrayStore;
use crate::core::container::HierarchicalContainer;
use crate::core::episode::Episode;
use crate::core::error::{Error, ErrorKind};

pub const CONTAINER_EXTENSION: &str = "h5";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FormatKind {
    ChunkedArrayStore,
    HierarchicalContainer,
}

impl FormatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatKind::ChunkedArrayStore => "zarr",
            FormatKind::HierarchicalContainer => "hdf5",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that can produce the ordered, normalized episodes of a dataset.
pub trait EpisodeSource {
    fn format(&self) -> FormatKind;

    fn read_episodes(&self) -> Result<Vec<Episode>, Error>;
}

#[derive(Clone, Debug)]
pub enum DatasetSource {
    Chunked(ChunkedArrayStore),
    Container(HierarchicalContainer),
}

impl DatasetSource {
    pub fn detect(path: &Path) -> Result<Self, Error> {
        match detect_format(path) {
            Some(FormatKind::ChunkedArrayStore) => {
                Ok(DatasetSource::Chunked(ChunkedArrayStore::new(path)))
            }
            Some(FormatKind::HierarchicalContainer) => {
                Ok(DatasetSource::Container(HierarchicalContainer::new(path)))
            }
            None => Err(Error::new(ErrorKind::UnsupportedFormat)
                .with_message(format!("unsupported file format: {}", path.display()))
                .with_path(path)
                .with_hint("Use a Zarr directory or an .h5 file.")),
        }
    }
}

impl EpisodeSource for DatasetSource {
    fn format(&self) -> FormatKind {
        match self {
            DatasetSource::Chunked(source) => source.format(),
            DatasetSource::Container(source) => source.format(),
        }
    }

    fn read_episodes(&self) -> Result<Vec<Episode>, Error> {
        match self {
            DatasetSource::Chunked(source) => source.read_episodes(),
            DatasetSource::Container(source) => source.read_episodes(),
        }
    }
}

pub fn detect_format(path: &Path) -> Option<FormatKind> {
    if path.is_dir() {
        return Some(FormatKind::ChunkedArrayStore);
    }
    let is_container = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == CONTAINER_EXTENSION);
    is_container.then_some(FormatKind::HierarchicalContainer)
}

#[cfg(test)]
mod tests {
    use super::{DatasetSource, EpisodeSource, FormatKind, detect_format};
    use crate::core::error::ErrorKind;

    #[test]
    fn directories_are_chunked_stores() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(detect_format(temp.path()), Some(FormatKind::ChunkedArrayStore));
        let source = DatasetSource::detect(temp.path()).expect("detect");
        assert_eq!(source.format(), FormatKind::ChunkedArrayStore);
    }

    #[test]
    fn h5_files_are_containers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("demo.h5");
        std::fs::write(&path, b"").expect("write");
        assert_eq!(detect_format(&path), Some(FormatKind::HierarchicalContainer));
    }

    #[test]
    fn other_files_are_unsupported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("demo.npz");
        std::fs::write(&path, b"").expect("write");
        let err = DatasetSource::detect(&path).expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }
}
