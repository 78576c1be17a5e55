//! Purpose: Hold loaded episodes and datasets.
//! Exports: `Episode`, `Dataset`, `DatasetSummary`, `normalize_colors`, `POINT_FEATURES`.
//! Role: Format-independent data model produced by the adapters.
//! Invariants: Episode buffers are row-major `frames × points × features`.

use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};
use crate::core::format::FormatKind;

/// Features per point: `x, y, z, r, g, b`.
pub const POINT_FEATURES: usize = 6;
/// First color feature; colors occupy `COLOR_OFFSET..POINT_FEATURES`.
pub const COLOR_OFFSET: usize = 3;
pub const COLOR_SCALE: f32 = 255.0;

/// One recorded trajectory, stored row-major as `frames × points × features`.
#[derive(Clone, Debug, PartialEq)]
pub struct Episode {
    frames: usize,
    points: usize,
    features: usize,
    data: Vec<f32>,
}

impl Episode {
    pub fn new(frames: usize, points: usize, data: Vec<f32>) -> Result<Self, Error> {
        Self::with_features(frames, points, POINT_FEATURES, data)
    }

    pub(crate) fn with_features(
        frames: usize,
        points: usize,
        features: usize,
        data: Vec<f32>,
    ) -> Result<Self, Error> {
        let expected = frames
            .checked_mul(points)
            .and_then(|value| value.checked_mul(features))
            .ok_or_else(|| Error::new(ErrorKind::ShapeMismatch).with_message("episode too large"))?;
        if data.len() != expected {
            return Err(Error::new(ErrorKind::ShapeMismatch).with_message(format!(
                "episode data has {} values, expected {frames}x{points}x{features}",
                data.len()
            )));
        }
        Ok(Self {
            frames,
            points,
            features,
            data,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn points_per_frame(&self) -> usize {
        self.points
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.frames, self.points, self.features]
    }

    /// Width of one flattened frame row (`points * features`).
    pub fn row_len(&self) -> usize {
        self.points * self.features
    }

    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        if index >= self.frames {
            return None;
        }
        let row = self.row_len();
        Some(&self.data[index * row..(index + 1) * row])
    }

    /// Frames as `(points * features)` rows. Yields nothing for point-less frames.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        let row = self.row_len().max(1);
        self.data.chunks_exact(row).take(self.frames)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Divide color channels by 255. Called once per adapter, on freshly read data.
pub fn normalize_colors(points: &mut [f32]) {
    for point in points.chunks_exact_mut(POINT_FEATURES) {
        for value in &mut point[COLOR_OFFSET..] {
            *value /= COLOR_SCALE;
        }
    }
}

#[derive(Clone, Debug)]
pub struct Dataset {
    path: PathBuf,
    format: FormatKind,
    episodes: Vec<Episode>,
}

impl Dataset {
    pub fn new(path: impl Into<PathBuf>, format: FormatKind, episodes: Vec<Episode>) -> Self {
        Self {
            path: path.into(),
            format,
            episodes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FormatKind {
        self.format
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.len()
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            path: self.path.clone(),
            format: self.format,
            frames_per_episode: self.episodes.iter().map(Episode::frame_count).collect(),
            points_per_frame: self.episodes.first().map_or(0, Episode::points_per_frame),
            features: self.episodes.first().map_or(0, Episode::features),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetSummary {
    pub path: PathBuf,
    pub format: FormatKind,
    pub frames_per_episode: Vec<usize>,
    pub points_per_frame: usize,
    pub features: usize,
}

impl DatasetSummary {
    pub fn episode_count(&self) -> usize {
        self.frames_per_episode.len()
    }

    pub fn total_frames(&self) -> usize {
        self.frames_per_episode.iter().sum()
    }
}
