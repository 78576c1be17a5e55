//! Purpose: Validate annotated poses and append them to CSV sidecar files.
//! Exports: `Pose`, `FrameContext`, `PoseRecorder`, `SIDECAR_HEADER`, `MESH_FRAME`.
//! Role: Storage half of `save_pose`; path derivation lives in `sidecar_paths`.
//! Invariants: A sidecar has exactly one header line, written when the file is empty.
//! Invariants: The exclusive lock covers the header check and the append.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};

pub const SIDECAR_HEADER: [&str; 8] = ["frame", "x", "y", "z", "qw", "qx", "qy", "qz"];
pub const POSE_COMPONENTS: usize = 7;
/// Frame index the viewer sends for mesh annotations.
pub const MESH_FRAME: i64 = -1;

const UNIT_NORM_TOLERANCE: f64 = 1e-3;

/// Position plus `(w, x, y, z)` orientation quaternion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
}

impl Pose {
    pub fn from_components(values: &[f64]) -> Result<Self, Error> {
        let &[x, y, z, qw, qx, qy, qz] = values else {
            return Err(Error::new(ErrorKind::InvalidPose).with_message(format!(
                "Pose must be a {POSE_COMPONENTS}-element array: [x, y, z, qw, qx, qy, qz], got {} values",
                values.len()
            )));
        };
        if values.iter().any(|value| !value.is_finite()) {
            return Err(Error::new(ErrorKind::InvalidPose).with_message("pose values must be finite"));
        }
        Ok(Self {
            x,
            y,
            z,
            qw,
            qx,
            qy,
            qz,
        })
    }

    pub fn components(&self) -> [f64; POSE_COMPONENTS] {
        [self.x, self.y, self.z, self.qw, self.qx, self.qy, self.qz]
    }

    pub fn quaternion_norm(&self) -> f64 {
        (self.qw * self.qw + self.qx * self.qx + self.qy * self.qy + self.qz * self.qz).sqrt()
    }
}

/// Which temporal frame an annotation belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameContext {
    Mesh,
    Frame(u64),
}

impl FrameContext {
    pub fn from_index(frame: i64) -> Result<Self, Error> {
        match frame {
            MESH_FRAME => Ok(FrameContext::Mesh),
            frame if frame >= 0 => Ok(FrameContext::Frame(frame as u64)),
            frame => Err(Error::new(ErrorKind::InvalidFrame)
                .with_message(format!("Current frame must be -1 or a non-negative integer, got {frame}"))),
        }
    }

    pub fn index(self) -> i64 {
        match self {
            FrameContext::Mesh => MESH_FRAME,
            FrameContext::Frame(frame) => frame as i64,
        }
    }
}

/// Appends poses to sidecar files. Writers to one file are serialized with an
/// exclusive advisory lock, which also covers other processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoseRecorder;

impl PoseRecorder {
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, pose: &Pose, sidecar: &Path, context: FrameContext) -> Result<(), Error> {
        if (pose.quaternion_norm() - 1.0).abs() > UNIT_NORM_TOLERANCE {
            warn!(norm = pose.quaternion_norm(), "recording non-unit quaternion");
        }
        let row = encode_row(pose, context)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(sidecar)
            .map_err(|err| Error::io(sidecar, err))?;
        let lock = SidecarLock::acquire(&file, sidecar)?;

        let len = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| Error::io(sidecar, err))?;
        let mut out = Vec::with_capacity(row.len() + 32);
        if len == 0 {
            out.extend_from_slice(encode_header()?.as_slice());
        }
        out.extend_from_slice(&row);
        lock.file()
            .write_all(&out)
            .map_err(|err| Error::io(sidecar, err))?;

        debug!(path = %sidecar.display(), frame = context.index(), "recorded pose");
        Ok(())
    }
}

fn encode_header() -> Result<Vec<u8>, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(SIDECAR_HEADER).map_err(csv_error)?;
    writer.into_inner().map_err(|err| csv_error(err.into_error().into()))
}

fn encode_row(pose: &Pose, context: FrameContext) -> Result<Vec<u8>, Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    let [x, y, z, qw, qx, qy, qz] = pose.components();
    writer
        .serialize((context.index(), x, y, z, qw, qx, qy, qz))
        .map_err(csv_error)?;
    writer.into_inner().map_err(|err| csv_error(err.into_error().into()))
}

fn csv_error(err: csv::Error) -> Error {
    Error::new(ErrorKind::Internal)
        .with_message("failed to encode pose row")
        .with_source(err)
}

struct SidecarLock<'a> {
    file: &'a File,
}

impl<'a> SidecarLock<'a> {
    fn acquire(file: &'a File, path: &Path) -> Result<Self, Error> {
        file.lock_exclusive().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to lock sidecar file: {err}"))
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Self { file })
    }

    fn file(&self) -> &'a File {
        self.file
    }
}

impl Drop for SidecarLock<'_> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
