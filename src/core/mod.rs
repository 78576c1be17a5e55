// Core modules implementing dataset formats, caching, pose recording, and errors.
pub mod cache;
pub mod chunked;
pub mod container;
pub mod episode;
pub mod error;
pub mod format;
pub mod loader;
pub mod pose;
