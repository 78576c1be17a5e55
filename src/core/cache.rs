//! Purpose: Hold the most recently loaded dataset for episode-by-episode reads.
//! Exports: `EpisodeCache`, `CachedEpisodeSet`, `CachedEpisode`.
//! Role: Single-slot, owned cache shared by request handlers through `Arc`.
//! Invariants: `replace` swaps a whole immutable snapshot; readers observe either
//! the previous or the new set, never a mix.
//! Invariants: Generations increase strictly with each replace.

use std::path::Path;
use std::sync::Arc;

use arc_swap::{ArcSwapOption, Guard};

use crate::core::episode::{Dataset, DatasetSummary, Episode};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::FormatKind;

#[derive(Debug)]
pub struct CachedEpisodeSet {
    generation: u64,
    dataset: Arc<Dataset>,
}

impl CachedEpisodeSet {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> &Path {
        self.dataset.path()
    }

    pub fn format(&self) -> FormatKind {
        self.dataset.format()
    }

    pub fn episode_count(&self) -> usize {
        self.dataset.episode_count()
    }

    pub fn summary(&self) -> DatasetSummary {
        self.dataset.summary()
    }
}

/// A cached episode. Holds its snapshot alive even if the cache is replaced.
#[derive(Clone, Debug)]
pub struct CachedEpisode {
    set: Arc<CachedEpisodeSet>,
    index: usize,
}

impl CachedEpisode {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.set.generation
    }

    pub fn episode(&self) -> &Episode {
        &self.set.dataset.episodes()[self.index]
    }

    /// `(frames, points * features)` rows.
    pub fn rows(&self) -> Vec<&[f32]> {
        self.episode().rows().collect()
    }
}

#[derive(Debug, Default)]
pub struct EpisodeCache {
    current: ArcSwapOption<CachedEpisodeSet>,
}

impl EpisodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `dataset` as the current set. The generation is derived from the
    /// set being replaced and committed by compare-and-swap, so stored generations
    /// follow store order even under concurrent replaces.
    pub fn replace(&self, dataset: Dataset) -> Arc<CachedEpisodeSet> {
        let dataset = Arc::new(dataset);
        let mut current = self.current.load_full();
        loop {
            let generation = current.as_ref().map_or(0, |set| set.generation) + 1;
            let set = Arc::new(CachedEpisodeSet {
                generation,
                dataset: dataset.clone(),
            });
            let previous = self.current.compare_and_swap(&current, Some(set.clone()));
            if same_set(&previous, &current) {
                return set;
            }
            current = Guard::into_inner(previous);
        }
    }

    pub fn snapshot(&self) -> Option<Arc<CachedEpisodeSet>> {
        self.current.load_full()
    }

    pub fn episode_count(&self) -> Option<usize> {
        self.snapshot().map(|set| set.episode_count())
    }

    pub fn get(&self, episode_index: i64) -> Result<CachedEpisode, Error> {
        let Some(set) = self.snapshot() else {
            return Err(Error::new(ErrorKind::NotLoaded)
                .with_message("no dataset loaded")
                .with_hint("Load a dataset with /load_zarr first."));
        };
        let count = set.episode_count();
        let index = usize::try_from(episode_index)
            .ok()
            .filter(|&index| index < count)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidEpisodeIndex).with_message(format!(
                    "episode {episode_index} out of range (0..{count})"
                ))
            })?;
        Ok(CachedEpisode { set, index })
    }
}

fn same_set(a: &Option<Arc<CachedEpisodeSet>>, b: &Option<Arc<CachedEpisodeSet>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
