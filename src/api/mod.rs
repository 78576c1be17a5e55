//! Purpose: Define the public Rust API boundary for trajview.
//! Exports: Core types and the `ViewerSession` operations used by the server and CLI.
//! Role: Public surface; the HTTP layer and tests go through here.
//! Invariants: Handlers call exactly one session operation per request.

mod session;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::cache::{CachedEpisode, CachedEpisodeSet, EpisodeCache};
pub use crate::core::episode::{Dataset, DatasetSummary, Episode, POINT_FEATURES};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::format::{DatasetSource, EpisodeSource, FormatKind};
pub use crate::core::loader::load;
pub use crate::core::pose::{FrameContext, Pose, PoseRecorder};
pub use crate::sidecar_paths::{TargetKind, sidecar_path_for};
pub use session::{ApiResult, MeshAsset, SavedPose, ViewerSession, mesh_content_type};
