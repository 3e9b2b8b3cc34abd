//! Installation and patching error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the binary patcher.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The bytes at the patch offset match neither the pre-image nor the
    /// replacement.  The file is left untouched.
    #[error("patch precondition failed: {name}")]
    PreconditionFailed { name: String },

    /// The remaster's render DLL is required but absent.  Raised before any
    /// executable patch is attempted.
    #[error("render DLL not found: {0}")]
    DxRenderDllNotFound(PathBuf),

    /// A parameter patch received a value it cannot encode.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the XML config editor.
#[derive(Debug, Error)]
pub enum ConfigEditError {
    /// The attribute is not on the whitelist for its element.
    #[error("attribute '{key}' of element '{element}' is not editable")]
    UnknownKey { element: String, key: String },

    /// The document could not be parsed.
    #[error("XML error in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while executing an install plan.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The game directory could not be re-probed before installing.
    #[error("game probe failed before install: {0}")]
    Probe(#[from] emm_core::ProbeError),

    /// The game is running; the directory is not exclusively ours.
    #[error("the game appears to be running, close it before installing")]
    GameRunning,

    /// The fresh probe taken right before installing no longer satisfies
    /// the mod's prerequisites.
    #[error("prerequisites no longer met: {details}")]
    PrerequisitesNoLongerMet { details: String },

    /// A file copy failed.  Files copied so far are left in place.
    #[error("copy failed for {path}: {source}")]
    CopyFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A binary patch failed.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// A config edit failed.
    #[error(transparent)]
    ConfigEdit(#[from] ConfigEditError),

    /// The installed-mods manifest could not be committed.
    #[error("failed to write installed-mods manifest: {0}")]
    ManifestWriteFailed(String),

    /// The install was cancelled at a yield point.  Partial copies remain;
    /// the installed-mods manifest is untouched.
    #[error("installation cancelled")]
    Cancelled,

    /// An I/O error occurred outside a file copy.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
