//! Purpose: Library crate behind the `trajview` server and CLI.
//! Exports: `api` (session, loaders, cache, poses), `core` (formats, errors),
//! `sidecar_paths`.
//! Role: Loads robot-demonstration point clouds and records annotated poses.
//! Invariants: Core modules take explicit inputs; shared state lives in `ViewerSession`.
pub mod api;
pub mod core;
pub mod sidecar_paths;
