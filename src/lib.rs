//! oncutf - Batch File Renamer
//!
//! A cross-platform batch file renamer built around a pure, composable
//! rename module chain, an EXIF/metadata extraction subsystem with a
//! two-tier (memory + SQLite) cache, and a rename engine with conflict
//! detection and safe case-only rename handling.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod files;
pub mod logging;
pub mod metadata;
pub mod path_utils;
pub mod progress;
pub mod rename;
pub mod signal;

pub use app::run_app;
