//! Rename pipeline: module chain, final transform, validation, preview,
//! and execution.
//!
//! # Architecture
//!
//! * [`modules`]: pure fragment generators (counter, text, metadata, ...).
//! * [`transform`]: the single post-compose case/separator transform.
//! * [`validate`]: filesystem-validity rules and duplicate detection.
//! * [`preview_cache`]: short-TTL memoization for interactive use.
//! * [`engine`]: composes the above into preview and execution.

pub mod engine;
pub mod modules;
pub mod preview_cache;
pub mod transform;
pub mod validate;

pub use engine::{
    Conflict, ConflictChoice, ConflictKind, ConflictResolver, EngineConfig, ExecuteOptions,
    ExecutionReport, PolicyResolver, PreviewEntry, RenameEngine, RenamePlan, RenameRecord,
    SkipReason,
};
pub use modules::{RemovalPosition, RenameModule};
pub use transform::{CaseStyle, PostTransform, SeparatorStyle};
pub use validate::{validate_filename, ValidationError, MAX_FILENAME_LEN};
