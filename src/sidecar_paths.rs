//! Purpose: Derive annotation sidecar CSV paths from annotated targets.
//! Exports: `TargetKind`, `sidecar_path_for`, `MESH_SIDECAR_NAME`, `DATASET_SIDECAR_SUFFIX`.
//! Role: Pure path arithmetic shared by the session and its tests; no I/O.
//! Invariants: Mesh annotations go to `annotated_poses.csv` beside the mesh.
//! Invariants: Frame annotations go beside the dataset, named after it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};
use crate::core::format::FormatKind;
use crate::core::pose::FrameContext;

pub const MESH_SIDECAR_NAME: &str = "annotated_poses.csv";
pub const DATASET_SIDECAR_SUFFIX: &str = "_annotated_poses.csv";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TargetKind {
    Mesh,
    Dataset(FormatKind),
}

pub fn sidecar_path_for(
    target: &Path,
    kind: TargetKind,
    context: FrameContext,
) -> Result<PathBuf, Error> {
    match (context, kind) {
        (FrameContext::Mesh, _) => {
            let dir = target.parent().unwrap_or_else(|| Path::new(""));
            Ok(dir.join(MESH_SIDECAR_NAME))
        }
        (FrameContext::Frame(_), TargetKind::Dataset(FormatKind::ChunkedArrayStore)) => {
            let trimmed = trim_trailing_separators(target);
            let mut name = trimmed.as_os_str().to_os_string();
            name.push(DATASET_SIDECAR_SUFFIX);
            Ok(PathBuf::from(name))
        }
        (FrameContext::Frame(_), TargetKind::Dataset(FormatKind::HierarchicalContainer)) => {
            let stem = target.file_stem().ok_or_else(|| {
                Error::new(ErrorKind::InvalidFrame)
                    .with_message("container path has no file name")
                    .with_path(target)
            })?;
            let mut name = OsString::from(stem);
            name.push(DATASET_SIDECAR_SUFFIX);
            Ok(target.with_file_name(name))
        }
        (FrameContext::Frame(frame), TargetKind::Mesh) => Err(Error::new(ErrorKind::InvalidFrame)
            .with_message(format!("frame {frame} given for a mesh annotation"))
            .with_hint("Use frame -1 for mesh annotations.")),
    }
}

fn trim_trailing_separators(path: &Path) -> PathBuf {
    // `Path::components` drops trailing separators and `.` segments at the end.
    path.components().collect()
}
