//! Purpose: Read episodes from a hierarchical container (HDF5 file).
//! Exports: `HierarchicalContainer`, `assemble_episode`, `episode_group_names`.
//! Role: Adapter from `traj_<i>/obs/pointcloud/{xyzw,rgb}` to `Episode`s.
//! Invariants: Episode `i` comes from group `traj_<i>`; groups are dense from 0.
//! Invariants: xyz and rgb agree on frames and points; only the first 3 components
//! of each are used; rgb is divided by 255 here and nowhere else.
//! Notes: Native reading is behind the `hdf5` cargo feature (on by default).
//! Integer and f64 datasets are widened to f32 before assembly.

use std::path::{Path, PathBuf};

use crate::core::episode::{COLOR_SCALE, Episode, POINT_FEATURES};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{EpisodeSource, FormatKind};

pub const EPISODE_GROUP_PREFIX: &str = "traj_";
pub const XYZ_DATASET: &str = "obs/pointcloud/xyzw";
pub const RGB_DATASET: &str = "obs/pointcloud/rgb";

const COMPONENTS: usize = 3;

#[derive(Clone, Debug)]
pub struct HierarchicalContainer {
    path: PathBuf,
}

impl HierarchicalContainer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EpisodeSource for HierarchicalContainer {
    fn format(&self) -> FormatKind {
        FormatKind::HierarchicalContainer
    }

    fn read_episodes(&self) -> Result<Vec<Episode>, Error> {
        native::read_episodes(&self.path)
    }
}

/// Names of the episode groups `traj_0..traj_{n-1}`, where `n` counts the
/// `traj_*` members. Gaps in the numbering are malformed.
pub fn episode_group_names(members: &[String]) -> Result<Vec<String>, Error> {
    let count = members
        .iter()
        .filter(|name| name.starts_with(EPISODE_GROUP_PREFIX))
        .count();
    (0..count)
        .map(|index| {
            let name = format!("{EPISODE_GROUP_PREFIX}{index}");
            if members.iter().any(|member| *member == name) {
                Ok(name)
            } else {
                Err(Error::new(ErrorKind::MalformedDataset)
                    .with_message(format!("missing episode group {name}")))
            }
        })
        .collect()
}

/// Concatenate `xyz[..., :3]` and `rgb[..., :3] / 255` along the feature axis.
pub fn assemble_episode(
    xyz: &[f32],
    xyz_shape: &[usize],
    rgb: &[f32],
    rgb_shape: &[usize],
) -> Result<Episode, Error> {
    let (frames, points, xyz_width) = split_shape(xyz_shape, "xyz")?;
    let (rgb_frames, rgb_points, rgb_width) = split_shape(rgb_shape, "rgb")?;
    if (frames, points) != (rgb_frames, rgb_points) {
        return Err(Error::new(ErrorKind::ShapeMismatch).with_message(format!(
            "xyz has {frames}x{points} points but rgb has {rgb_frames}x{rgb_points}"
        )));
    }
    if xyz.len() != frames * points * xyz_width || rgb.len() != frames * points * rgb_width {
        return Err(Error::new(ErrorKind::ShapeMismatch)
            .with_message("array data does not match its declared shape"));
    }

    let mut data = Vec::with_capacity(frames * points * POINT_FEATURES);
    for (position, color) in xyz
        .chunks_exact(xyz_width)
        .zip(rgb.chunks_exact(rgb_width))
    {
        data.extend_from_slice(&position[..COMPONENTS]);
        data.extend(color[..COMPONENTS].iter().map(|value| value / COLOR_SCALE));
    }
    Episode::new(frames, points, data)
}

fn split_shape(shape: &[usize], name: &str) -> Result<(usize, usize, usize), Error> {
    match *shape {
        [frames, points, width] if width >= COMPONENTS => Ok((frames, points, width)),
        _ => Err(Error::new(ErrorKind::ShapeMismatch).with_message(format!(
            "{name} must be (frames, points, >=3), actually got {shape:?}"
        ))),
    }
}

#[cfg(feature = "hdf5")]
mod native {
    use std::path::Path;

    use hdf5::types::{FloatSize, IntSize, TypeDescriptor};
    use tracing::debug;

    use super::{RGB_DATASET, XYZ_DATASET, assemble_episode, episode_group_names};
    use crate::core::episode::Episode;
    use crate::core::error::{Error, ErrorKind};

    pub(super) fn read_episodes(path: &Path) -> Result<Vec<Episode>, Error> {
        let file = hdf5::File::open(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to open container: {err}"))
                .with_path(path)
        })?;
        let members = file.member_names().map_err(|err| {
            Error::new(ErrorKind::MalformedDataset)
                .with_message(format!("failed to list groups: {err}"))
                .with_path(path)
        })?;
        let groups = episode_group_names(&members).map_err(|err| err.with_path(path))?;
        debug!(path = %path.display(), episodes = groups.len(), "reading container");

        groups
            .iter()
            .map(|group| {
                let (xyz, xyz_shape) = read_dataset(&file, &format!("{group}/{XYZ_DATASET}"), path)?;
                let (rgb, rgb_shape) = read_dataset(&file, &format!("{group}/{RGB_DATASET}"), path)?;
                assemble_episode(&xyz, &xyz_shape, &rgb, &rgb_shape)
                    .map_err(|err| err.with_path(path))
            })
            .collect()
    }

    fn read_dataset(
        file: &hdf5::File,
        name: &str,
        path: &Path,
    ) -> Result<(Vec<f32>, Vec<usize>), Error> {
        let dataset = file.dataset(name).map_err(|err| {
            Error::new(ErrorKind::MalformedDataset)
                .with_message(format!("missing dataset {name}: {err}"))
                .with_path(path)
        })?;
        let descriptor = dataset
            .dtype()
            .and_then(|dtype| dtype.to_descriptor())
            .map_err(|err| {
                Error::new(ErrorKind::MalformedDataset)
                    .with_message(format!("unreadable type for {name}: {err}"))
                    .with_path(path)
            })?;
        let read = |err: hdf5::Error| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read {name}: {err}"))
                .with_path(path)
        };
        let values = match descriptor {
            TypeDescriptor::Float(FloatSize::U4) => dataset.read_raw::<f32>().map_err(read)?,
            TypeDescriptor::Float(FloatSize::U8) => dataset
                .read_raw::<f64>()
                .map_err(read)?
                .into_iter()
                .map(|value| value as f32)
                .collect(),
            TypeDescriptor::Unsigned(IntSize::U1) => dataset
                .read_raw::<u8>()
                .map_err(read)?
                .into_iter()
                .map(f32::from)
                .collect(),
            TypeDescriptor::Unsigned(IntSize::U2) => dataset
                .read_raw::<u16>()
                .map_err(read)?
                .into_iter()
                .map(f32::from)
                .collect(),
            TypeDescriptor::Integer(IntSize::U4) => dataset
                .read_raw::<i32>()
                .map_err(read)?
                .into_iter()
                .map(|value| value as f32)
                .collect(),
            other => {
                return Err(Error::new(ErrorKind::MalformedDataset)
                    .with_message(format!("{name} has unsupported type {other:?}"))
                    .with_path(path));
            }
        };
        Ok((values, dataset.shape()))
    }
}

#[cfg(not(feature = "hdf5"))]
mod native {
    use std::path::Path;

    use crate::core::episode::Episode;
    use crate::core::error::{Error, ErrorKind};

    pub(super) fn read_episodes(path: &Path) -> Result<Vec<Episode>, Error> {
        Err(Error::new(ErrorKind::UnsupportedFormat)
            .with_message("HDF5 support is not compiled in")
            .with_path(path)
            .with_hint("Rebuild with the default `hdf5` feature enabled."))
    }
}
