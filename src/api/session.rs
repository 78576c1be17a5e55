//! Purpose: Own the viewer's server-side state and expose its four operations.
//! Exports: `ViewerSession`, `MeshAsset`, `SavedPose`, `mesh_content_type`.
//! Role: Injected into HTTP handlers; handlers never touch files or arrays directly.
//! Invariants: Every operation validates fully before mutating cache, mesh path, or
//! sidecar files.
//! Invariants: The demo path is the cached dataset's path; the mesh path is the
//! last successfully served mesh asset.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::info;

use crate::core::cache::{CachedEpisode, EpisodeCache};
use crate::core::episode::DatasetSummary;
use crate::core::error::{Error, ErrorKind};
use crate::core::loader;
use crate::core::pose::{FrameContext, Pose, PoseRecorder};
use crate::sidecar_paths::{TargetKind, sidecar_path_for};

pub type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_SCALE: f64 = 1.0;

#[derive(Clone, Debug)]
pub struct MeshAsset {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[derive(Clone, Debug)]
pub struct SavedPose {
    pub sidecar: PathBuf,
    pub pose: Pose,
    pub context: FrameContext,
    pub scale: f64,
}

#[derive(Debug, Default)]
pub struct ViewerSession {
    cache: EpisodeCache,
    recorder: PoseRecorder,
    mesh_path: ArcSwapOption<PathBuf>,
}

impl ViewerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &EpisodeCache {
        &self.cache
    }

    pub fn demo_path(&self) -> Option<PathBuf> {
        self.cache.snapshot().map(|set| set.source().to_path_buf())
    }

    pub fn mesh_path(&self) -> Option<PathBuf> {
        self.mesh_path.load_full().map(|path| path.as_ref().clone())
    }

    /// Load a dataset and replace the cached one. On failure the cache is untouched.
    pub fn load_dataset(&self, path: impl AsRef<Path>) -> ApiResult<DatasetSummary> {
        let dataset = loader::load(path)?;
        let set = self.cache.replace(dataset);
        Ok(set.summary())
    }

    pub fn show_episode(&self, episode_id: i64) -> ApiResult<CachedEpisode> {
        self.cache.get(episode_id)
    }

    pub fn load_mesh(&self, path: impl AsRef<Path>) -> ApiResult<MeshAsset> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::new(ErrorKind::PathNotFound)
                .with_message(format!("path is invalid: {}", path.display()))
                .with_path(path));
        }
        let bytes = std::fs::read(path).map_err(|err| Error::io(path, err))?;
        self.mesh_path.store(Some(Arc::new(path.to_path_buf())));
        info!(path = %path.display(), bytes = bytes.len(), "serving mesh asset");
        Ok(MeshAsset {
            path: path.to_path_buf(),
            bytes,
            content_type: mesh_content_type(path),
        })
    }

    /// Append a pose to the sidecar of the current mesh (`frame == -1`) or the
    /// current dataset (`frame >= 0`). `scale` is validated and echoed only.
    pub fn save_pose(
        &self,
        components: &[f64],
        frame: i64,
        scale: Option<f64>,
    ) -> ApiResult<SavedPose> {
        let pose = Pose::from_components(components)?;
        let context = FrameContext::from_index(frame)?;
        let scale = validate_scale(scale)?;

        let (target, kind) = match context {
            FrameContext::Mesh => {
                let path = self.mesh_path().ok_or_else(|| {
                    Error::new(ErrorKind::NotLoaded)
                        .with_message("no mesh loaded")
                        .with_hint("Load a mesh with /load_mesh before annotating it.")
                })?;
                (path, TargetKind::Mesh)
            }
            FrameContext::Frame(_) => {
                let set = self.cache.snapshot().ok_or_else(|| {
                    Error::new(ErrorKind::NotLoaded)
                        .with_message("no dataset loaded")
                        .with_hint("Load a dataset with /load_zarr before annotating frames.")
                })?;
                (set.source().to_path_buf(), TargetKind::Dataset(set.format()))
            }
        };

        let sidecar = sidecar_path_for(&target, kind, context)?;
        self.recorder.record(&pose, &sidecar, context)?;
        info!(
            sidecar = %sidecar.display(),
            frame = context.index(),
            "saved annotated pose"
        );
        Ok(SavedPose {
            sidecar,
            pose,
            context,
            scale,
        })
    }
}

fn validate_scale(scale: Option<f64>) -> ApiResult<f64> {
    match scale {
        None => Ok(DEFAULT_SCALE),
        Some(scale) if scale.is_finite() && scale > 0.0 => Ok(scale),
        Some(scale) => Err(Error::new(ErrorKind::InvalidPose)
            .with_message(format!("scale must be a positive finite number, got {scale}"))),
    }
}

pub fn mesh_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("obj") => "model/obj",
        Some("mtl") => "model/mtl",
        Some("stl") => "model/stl",
        Some("ply") => "application/x-ply",
        Some("glb") => "model/gltf-binary",
        Some("gltf") => "model/gltf+json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::{ViewerSession, mesh_content_type};
    use crate::core::error::ErrorKind;
    use std::path::Path;

    const IDENTITY: [f64; 7] = [0.1, 0.2, 0.3, 1.0, 0.0, 0.0, 0.0];

    #[test]
    fn mesh_annotation_without_mesh_is_not_loaded() {
        let session = ViewerSession::new();
        let err = session.save_pose(&IDENTITY, -1, None).expect_err("no mesh");
        assert_eq!(err.kind(), ErrorKind::NotLoaded);
    }

    #[test]
    fn frame_annotation_without_dataset_is_not_loaded() {
        let session = ViewerSession::new();
        let err = session.save_pose(&IDENTITY, 0, None).expect_err("no dataset");
        assert_eq!(err.kind(), ErrorKind::NotLoaded);
    }

    #[test]
    fn invalid_inputs_fail_before_lookup() {
        let session = ViewerSession::new();
        let err = session.save_pose(&IDENTITY[..6], -1, None).expect_err("pose");
        assert_eq!(err.kind(), ErrorKind::InvalidPose);
        let err = session.save_pose(&IDENTITY, -3, None).expect_err("frame");
        assert_eq!(err.kind(), ErrorKind::InvalidFrame);
        let err = session.save_pose(&IDENTITY, -1, Some(0.0)).expect_err("scale");
        assert_eq!(err.kind(), ErrorKind::InvalidPose);
    }

    #[test]
    fn mesh_annotation_lands_beside_mesh() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mesh = temp.path().join("textured.obj");
        std::fs::write(&mesh, b"v 0 0 0\n").expect("write");

        let session = ViewerSession::new();
        let asset = session.load_mesh(&mesh).expect("mesh");
        assert_eq!(asset.bytes, b"v 0 0 0\n");
        assert_eq!(asset.content_type, "model/obj");

        let saved = session.save_pose(&IDENTITY, -1, Some(2.5)).expect("save");
        assert_eq!(saved.sidecar, temp.path().join("annotated_poses.csv"));
        assert_eq!(saved.scale, 2.5);
        let text = std::fs::read_to_string(&saved.sidecar).expect("read");
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn missing_mesh_keeps_previous_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mesh = temp.path().join("a.obj");
        std::fs::write(&mesh, b"v 1 1 1\n").expect("write");

        let session = ViewerSession::new();
        session.load_mesh(&mesh).expect("mesh");
        let err = session
            .load_mesh(temp.path().join("missing.obj"))
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::PathNotFound);
        assert_eq!(session.mesh_path(), Some(mesh));
    }

    #[test]
    fn failed_load_leaves_cache_empty() {
        let session = ViewerSession::new();
        let err = session.load_dataset("/definitely/not/here.zarr").expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::PathNotFound);
        assert!(session.demo_path().is_none());
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(mesh_content_type(Path::new("m/material.mtl")), "model/mtl");
        assert_eq!(mesh_content_type(Path::new("m/MESH.GLB")), "model/gltf-binary");
        assert_eq!(mesh_content_type(Path::new("m/blob")), "application/octet-stream");
    }
}
