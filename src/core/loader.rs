//! Purpose: Load a whole dataset from a path.
//! Exports: `load`, `validate_episodes`.
//! Role: Existence check, format dispatch, then post-load validation.
//! Invariants: Either every episode loads or an error is returned; no partial datasets.

use std::path::Path;

use tracing::info;

use crate::core::episode::{Dataset, Episode, POINT_FEATURES};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{DatasetSource, EpisodeSource};

/// Load every episode of the dataset at `path`. Either the whole dataset loads
/// or an error is returned.
pub fn load(path: impl AsRef<Path>) -> Result<Dataset, Error> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::new(ErrorKind::PathNotFound)
            .with_message(format!("path is invalid: {}", path.display()))
            .with_path(path));
    }

    let source = DatasetSource::detect(path)?;
    let episodes = source.read_episodes()?;
    validate_episodes(&episodes).map_err(|err| err.with_path(path))?;

    info!(
        path = %path.display(),
        format = %source.format(),
        episodes = episodes.len(),
        "loaded dataset"
    );
    Ok(Dataset::new(path, source.format(), episodes))
}

pub fn validate_episodes(episodes: &[Episode]) -> Result<(), Error> {
    let Some(first) = episodes.first() else {
        return Err(Error::new(ErrorKind::EmptyDataset).with_message("dataset has no episodes"));
    };
    if first.features() != POINT_FEATURES {
        return Err(Error::new(ErrorKind::InvalidShape).with_message(format!(
            "Shape error. Expected (frames, points, {POINT_FEATURES}), actually got {:?}",
            first.shape()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load, validate_episodes};
    use crate::core::episode::Episode;
    use crate::core::error::ErrorKind;

    #[test]
    fn missing_path_is_reported_before_dispatch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nope.zarr");
        let err = load(&path).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::PathNotFound);
        assert_eq!(
            err.message(),
            Some(format!("path is invalid: {}", path.display()).as_str())
        );
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cloud.ply");
        std::fs::write(&path, b"ply").expect("write");
        let err = load(&path).expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn empty_directory_is_malformed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load(temp.path()).expect_err("no arrays");
        assert_eq!(err.kind(), ErrorKind::MalformedDataset);
    }

    #[test]
    fn validation_requires_episodes_with_six_features() {
        let err = validate_episodes(&[]).expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::EmptyDataset);

        let odd = Episode::with_features(1, 1, 4, vec![0.0; 4]).expect("episode");
        let err = validate_episodes(&[odd]).expect_err("shape");
        assert_eq!(err.kind(), ErrorKind::InvalidShape);

        let ok = Episode::new(1, 1, vec![0.0; 6]).expect("episode");
        validate_episodes(&[ok]).expect("valid");
    }
}
