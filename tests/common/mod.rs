//! Purpose: Shared fixtures for integration tests.
//! Exports: `write_zarr_dataset`, `write_zarr_dataset_as`, `ZarrLayout`, `Dtype`,
//! `ZarrVersion`, `point_row`, `simple_frames`.
//! Role: Writes small uncompressed Zarr v2 or v3 stores with the demo layout.
//! Invariants: One chunk per array; little-endian raw bytes; no compression.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Clone, Copy, Debug)]
pub enum ZarrVersion {
    V2,
    V3,
}

#[derive(Clone, Copy, Debug)]
pub enum Dtype {
    Int64,
    Int32,
    UInt32,
    Float32,
    Float64,
    UInt8,
    UInt16,
}

impl Dtype {
    fn v3_name(self) -> &'static str {
        match self {
            Dtype::Int64 => "int64",
            Dtype::Int32 => "int32",
            Dtype::UInt32 => "uint32",
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
            Dtype::UInt8 => "uint8",
            Dtype::UInt16 => "uint16",
        }
    }

    fn v2_name(self) -> &'static str {
        match self {
            Dtype::Int64 => "<i8",
            Dtype::Int32 => "<i4",
            Dtype::UInt32 => "<u4",
            Dtype::Float32 => "<f4",
            Dtype::Float64 => "<f8",
            Dtype::UInt8 => "|u1",
            Dtype::UInt16 => "<u2",
        }
    }

    fn is_float(self) -> bool {
        matches!(self, Dtype::Float32 | Dtype::Float64)
    }

    fn encode(self, value: f64, out: &mut Vec<u8>) {
        match self {
            Dtype::Int64 => out.extend_from_slice(&(value as i64).to_le_bytes()),
            Dtype::Int32 => out.extend_from_slice(&(value as i32).to_le_bytes()),
            Dtype::UInt32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
            Dtype::Float32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            Dtype::Float64 => out.extend_from_slice(&value.to_le_bytes()),
            Dtype::UInt8 => out.push(value as u8),
            Dtype::UInt16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
        }
    }
}

/// On-disk format and element types of a fixture store.
#[derive(Clone, Copy, Debug)]
pub struct ZarrLayout {
    pub version: ZarrVersion,
    pub ends: Dtype,
    pub points: Dtype,
}

impl Default for ZarrLayout {
    fn default() -> Self {
        Self {
            version: ZarrVersion::V3,
            ends: Dtype::Int64,
            points: Dtype::Float32,
        }
    }
}

/// One raw point: position plus 0..=255 color.
pub fn point_row(x: f32, y: f32, z: f32, r: f32, g: f32, b: f32) -> [f32; 6] {
    [x, y, z, r, g, b]
}

/// `frame_count` frames of `points` rows; frame `f` point `p` sits at `(f, p, 0)`
/// with color `(255, 51, 0)`.
pub fn simple_frames(frame_count: usize, points: usize) -> Vec<Vec<[f32; 6]>> {
    (0..frame_count)
        .map(|frame| {
            (0..points)
                .map(|point| point_row(frame as f32, point as f32, 0.0, 255.0, 51.0, 0.0))
                .collect()
        })
        .collect()
}

/// Write a v3 store with `int64` ends and `float32` points.
pub fn write_zarr_dataset(
    root: &Path,
    episode_ends: &[i64],
    points: usize,
    frames: &[Vec<[f32; 6]>],
) -> TestResult<()> {
    write_zarr_dataset_as(root, ZarrLayout::default(), episode_ends, points, frames)
}

/// Write `meta/episode_ends` and `data/point_cloud` under `root`.
/// `frames` is `[frame][point]`; every frame must hold `points` rows.
pub fn write_zarr_dataset_as(
    root: &Path,
    layout: ZarrLayout,
    episode_ends: &[i64],
    points: usize,
    frames: &[Vec<[f32; 6]>],
) -> TestResult<()> {
    write_group(root, layout.version)?;
    write_group(&root.join("meta"), layout.version)?;
    write_group(&root.join("data"), layout.version)?;

    let mut ends_bytes = Vec::new();
    for end in episode_ends {
        layout.ends.encode(*end as f64, &mut ends_bytes);
    }
    write_array(
        &root.join("meta").join("episode_ends"),
        layout.version,
        &[episode_ends.len()],
        layout.ends,
        &ends_bytes,
    )?;

    let mut point_bytes = Vec::new();
    for frame in frames {
        assert_eq!(frame.len(), points, "fixture frame has wrong point count");
        for row in frame {
            for value in row {
                layout.points.encode(f64::from(*value), &mut point_bytes);
            }
        }
    }
    write_array(
        &root.join("data").join("point_cloud"),
        layout.version,
        &[frames.len(), points, 6],
        layout.points,
        &point_bytes,
    )?;
    Ok(())
}

fn write_group(dir: &Path, version: ZarrVersion) -> TestResult<()> {
    fs::create_dir_all(dir)?;
    match version {
        ZarrVersion::V2 => {
            fs::write(dir.join(".zgroup"), json!({ "zarr_format": 2 }).to_string())?;
        }
        ZarrVersion::V3 => {
            let meta = json!({
                "zarr_format": 3,
                "node_type": "group",
                "attributes": {},
            });
            fs::write(dir.join("zarr.json"), serde_json::to_vec_pretty(&meta)?)?;
        }
    }
    Ok(())
}

fn write_array(
    dir: &Path,
    version: ZarrVersion,
    shape: &[usize],
    dtype: Dtype,
    bytes: &[u8],
) -> TestResult<()> {
    fs::create_dir_all(dir)?;
    // Zero-length dimensions still need a positive chunk extent.
    let chunk_shape: Vec<usize> = shape.iter().map(|dim| (*dim).max(1)).collect();
    let fill_value = if dtype.is_float() { json!(0.0) } else { json!(0) };

    let chunk_path: PathBuf = match version {
        ZarrVersion::V2 => {
            let meta = json!({
                "zarr_format": 2,
                "shape": shape,
                "chunks": chunk_shape,
                "dtype": dtype.v2_name(),
                "compressor": null,
                "filters": null,
                "fill_value": fill_value,
                "order": "C",
                "dimension_separator": ".",
            });
            fs::write(dir.join(".zarray"), serde_json::to_vec_pretty(&meta)?)?;
            let key = vec!["0"; shape.len()].join(".");
            dir.join(key)
        }
        ZarrVersion::V3 => {
            let meta = json!({
                "zarr_format": 3,
                "node_type": "array",
                "shape": shape,
                "data_type": dtype.v3_name(),
                "chunk_grid": {
                    "name": "regular",
                    "configuration": { "chunk_shape": chunk_shape },
                },
                "chunk_key_encoding": {
                    "name": "default",
                    "configuration": { "separator": "/" },
                },
                "fill_value": fill_value,
                "codecs": [
                    { "name": "bytes", "configuration": { "endian": "little" } }
                ],
                "attributes": {},
            });
            fs::write(dir.join("zarr.json"), serde_json::to_vec_pretty(&meta)?)?;
            let mut path = dir.join("c");
            for _ in 0..shape.len() {
                path = path.join("0");
            }
            path
        }
    };

    if shape.iter().all(|dim| *dim > 0) {
        if let Some(parent) = chunk_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(chunk_path, bytes)?;
    }
    Ok(())
}
