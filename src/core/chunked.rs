//! Purpose: Read episodes from a chunked array store (Zarr directory).
//! Exports: `ChunkedArrayStore`, `episode_ranges`, `split_episodes`.
//! Role: Adapter from `meta/episode_ends` + `data/point_cloud` to `Episode`s.
//! Invariants: Ends are cumulative, non-negative, non-decreasing, and bounded by the
//! frame count of the point array.
//! Invariants: Colors are normalized here and nowhere else on this path.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use zarrs::array::{Array, DataType};
use zarrs::filesystem::FilesystemStore;

use crate::core::episode::{Episode, POINT_FEATURES, normalize_colors};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{EpisodeSource, FormatKind};

pub const EPISODE_ENDS_KEY: &str = "/meta/episode_ends";
pub const POINT_CLOUD_KEY: &str = "/data/point_cloud";

#[derive(Clone, Debug)]
pub struct ChunkedArrayStore {
    root: PathBuf,
}

impl ChunkedArrayStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl EpisodeSource for ChunkedArrayStore {
    fn format(&self) -> FormatKind {
        FormatKind::ChunkedArrayStore
    }

    fn read_episodes(&self) -> Result<Vec<Episode>, Error> {
        let store = FilesystemStore::new(&self.root).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to open store: {err}"))
                .with_path(&self.root)
        })?;
        let store = Arc::new(store);

        let ends_array = open_array(&store, EPISODE_ENDS_KEY, &self.root)?;
        let points_array = open_array(&store, POINT_CLOUD_KEY, &self.root)?;
        let shape = point_cloud_shape(points_array.shape())?;

        let ends = read_episode_ends(&ends_array, &self.root)?;
        let ranges = episode_ranges(&ends, shape[0])?;
        let values = read_point_values(&points_array, &self.root)?;
        debug!(
            path = %self.root.display(),
            episodes = ranges.len(),
            frames = shape[0],
            points = shape[1],
            "read chunked array store"
        );
        split_episodes(&ranges, shape, values)
    }
}

/// Turn cumulative episode ends into half-open frame ranges.
pub fn episode_ranges(ends: &[i64], frame_total: usize) -> Result<Vec<Range<usize>>, Error> {
    let mut ranges = Vec::with_capacity(ends.len());
    let mut start = 0usize;
    for (index, &end) in ends.iter().enumerate() {
        let stop = usize::try_from(end).map_err(|_| {
            Error::new(ErrorKind::IndexOutOfRange)
                .with_message(format!("episode {index} ends at negative index {end}"))
        })?;
        if stop < start {
            return Err(Error::new(ErrorKind::IndexOutOfRange).with_message(format!(
                "episode ends are not monotonic: episode {index} ends at {stop} before {start}"
            )));
        }
        if stop > frame_total {
            return Err(Error::new(ErrorKind::IndexOutOfRange).with_message(format!(
                "episode {index} ends at {stop} but the point array has {frame_total} frames"
            )));
        }
        ranges.push(start..stop);
        start = stop;
    }
    Ok(ranges)
}

/// Slice a flat `frames × points × 6` buffer into episodes, normalizing colors once.
pub fn split_episodes(
    ranges: &[Range<usize>],
    shape: [usize; 3],
    mut values: Vec<f32>,
) -> Result<Vec<Episode>, Error> {
    let [frames, points, features] = shape;
    if features != POINT_FEATURES {
        return Err(feature_mismatch(shape));
    }
    let row = points * features;
    if values.len() != frames * row {
        return Err(Error::new(ErrorKind::ShapeMismatch).with_message(format!(
            "point array holds {} values, expected {frames}x{points}x{features}",
            values.len()
        )));
    }
    normalize_colors(&mut values);

    ranges
        .iter()
        .map(|range| {
            if range.end > frames || range.start > range.end {
                return Err(Error::new(ErrorKind::IndexOutOfRange).with_message(format!(
                    "episode range {}..{} outside {frames} frames",
                    range.start, range.end
                )));
            }
            let data = values[range.start * row..range.end * row].to_vec();
            Episode::new(range.len(), points, data)
        })
        .collect()
}

fn point_cloud_shape(shape: &[u64]) -> Result<[usize; 3], Error> {
    let dims = shape
        .iter()
        .map(|&dim| usize::try_from(dim))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Error::new(ErrorKind::InvalidShape).with_message("point array too large"))?;
    let [frames, points, features] = dims[..] else {
        return Err(Error::new(ErrorKind::InvalidShape).with_message(format!(
            "expected (frames, points, {POINT_FEATURES}), actually got {dims:?}"
        )));
    };
    let shape = [frames, points, features];
    if features != POINT_FEATURES {
        return Err(feature_mismatch(shape));
    }
    Ok(shape)
}

fn feature_mismatch(shape: [usize; 3]) -> Error {
    Error::new(ErrorKind::ShapeMismatch).with_message(format!(
        "expected {POINT_FEATURES} features per point, actually got shape {shape:?}"
    ))
}

fn open_array(
    store: &Arc<FilesystemStore>,
    key: &str,
    root: &Path,
) -> Result<Array<FilesystemStore>, Error> {
    Array::open(store.clone(), key).map_err(|err| {
        Error::new(ErrorKind::MalformedDataset)
            .with_message(format!("missing or unreadable array {}: {err}", &key[1..]))
            .with_path(root)
    })
}

fn read_error(key: &str, root: &Path, err: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(format!("failed to read {}: {err}", &key[1..]))
        .with_path(root)
}

fn read_episode_ends(array: &Array<FilesystemStore>, root: &Path) -> Result<Vec<i64>, Error> {
    if array.shape().len() != 1 {
        return Err(Error::new(ErrorKind::MalformedDataset)
            .with_message(format!(
                "episode_ends must be one-dimensional, got shape {:?}",
                array.shape()
            ))
            .with_path(root));
    }
    let subset = array.subset_all();
    let read = |err| read_error(EPISODE_ENDS_KEY, root, err);
    let ends = match array.data_type() {
        DataType::Int64 => array
            .retrieve_array_subset_elements::<i64>(&subset)
            .map_err(read)?,
        DataType::Int32 => array
            .retrieve_array_subset_elements::<i32>(&subset)
            .map_err(read)?
            .into_iter()
            .map(i64::from)
            .collect(),
        DataType::UInt32 => array
            .retrieve_array_subset_elements::<u32>(&subset)
            .map_err(read)?
            .into_iter()
            .map(i64::from)
            .collect(),
        DataType::UInt64 => array
            .retrieve_array_subset_elements::<u64>(&subset)
            .map_err(read)?
            .into_iter()
            .map(|end| i64::try_from(end).unwrap_or(i64::MAX))
            .collect(),
        other => {
            return Err(Error::new(ErrorKind::MalformedDataset)
                .with_message(format!("episode_ends has non-integer type {other:?}"))
                .with_path(root));
        }
    };
    Ok(ends)
}

fn read_point_values(array: &Array<FilesystemStore>, root: &Path) -> Result<Vec<f32>, Error> {
    let subset = array.subset_all();
    let read = |err| read_error(POINT_CLOUD_KEY, root, err);
    let values = match array.data_type() {
        DataType::Float32 => array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map_err(read)?,
        DataType::Float64 => array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(read)?
            .into_iter()
            .map(|value| value as f32)
            .collect(),
        DataType::UInt8 => array
            .retrieve_array_subset_elements::<u8>(&subset)
            .map_err(read)?
            .into_iter()
            .map(f32::from)
            .collect(),
        DataType::UInt16 => array
            .retrieve_array_subset_elements::<u16>(&subset)
            .map_err(read)?
            .into_iter()
            .map(f32::from)
            .collect(),
        DataType::Int32 => array
            .retrieve_array_subset_elements::<i32>(&subset)
            .map_err(read)?
            .into_iter()
            .map(|value| value as f32)
            .collect(),
        other => {
            return Err(Error::new(ErrorKind::MalformedDataset)
                .with_message(format!("point_cloud has unsupported type {other:?}"))
                .with_path(root));
        }
    };
    Ok(values)
}
