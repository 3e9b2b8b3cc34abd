//! Core error types for the mod manager.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while parsing versions and version constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The literal could not be read as a version.
    #[error("malformed version: '{0}'")]
    MalformedVersion(String),

    /// The literal could not be read as a version constraint.
    #[error("malformed constraint: '{0}'")]
    MalformedConstraint(String),
}

/// Errors that can occur while loading and validating a mod manifest.
///
/// Load failures are attached to the offending manifest and never abort
/// loading of sibling mods.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The YAML document does not match the manifest schema.  Carries the
    /// field (or deserializer) diagnostic.
    #[error("manifest schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A version or constraint literal inside the manifest is malformed.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// A declared translation has no `manifest_<lang>.yaml` sibling.
    #[error("declared translation '{lang}' has no manifest file")]
    MissingTranslation { lang: String },

    /// A translation manifest disagrees with its parent on identity fields.
    #[error("translation '{lang}' mismatch on {field}: '{found}', parent has '{expected}'")]
    TranslationMetadataMismatch {
        lang: String,
        field: &'static str,
        found: String,
        expected: String,
    },

    /// A variant manifest disagrees with its parent on identity fields.
    #[error("variant '{slug}' mismatch on {field}: '{found}', parent has '{expected}'")]
    VariantMetadataMismatch {
        slug: String,
        field: &'static str,
        found: String,
        expected: String,
    },

    /// An optional content uses one of the reserved system names.
    #[error("optional content name '{0}' is reserved")]
    ReservedOptionName(String),

    /// A prerequisite on `community_patch` declares required optional
    /// content, which is a forbidden combination.
    #[error("prerequisite on '{0}' must not require optional content")]
    ForbiddenPrerequisite(String),

    /// An incompatibility entry names `community_patch` directly.
    #[error("incompatibility must not name '{0}'; express it as a prerequisite on the alternative")]
    ForbiddenIncompatible(String),

    /// A content directory declared by the manifest does not exist in the
    /// distribution (or archive listing).
    #[error("declared content directory missing: {0}")]
    MissingContentDirectory(PathBuf),

    /// The archive listing could not be read.
    #[error("failed to read archive listing: {0}")]
    ArchiveListing(String),

    /// An I/O error occurred while reading the distribution.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while probing a game directory.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The directory does not exist or holds no known game executable.
    #[error("no game found at: {0}")]
    GameNotFound(PathBuf),

    /// A sentinel file expected in every game copy is absent.
    #[error("game directory is missing: {0}")]
    MissingFiles(PathBuf),

    /// The executable exists but its contents could not be fingerprinted.
    #[error("unreadable game executable: {0}")]
    BadExe(PathBuf),

    /// The executable is held open for writing by another process.
    #[error("game executable is locked: {0}")]
    ExeLocked(PathBuf),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable reasons a mod cannot be installed against a game snapshot.
///
/// These are data as much as errors: the resolver records one per failed
/// check so front-ends can render verdicts point by point, and the CLI maps
/// them onto exit codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The mod targets a different game installment.
    #[error("mod targets installment '{required}', game is '{found}'")]
    InstallmentMismatch { required: String, found: String },

    /// The running tool is older than the manifest requires.
    #[error("mod requires tool version {required}, running {available}")]
    ToolVersionTooOld { required: String, available: String },

    /// The manifest pins an older tool version than the one running.
    #[error("mod was built for tool version {required}, running the newer {available}")]
    ToolVersionTooNew { required: String, available: String },

    /// No alternative of a prerequisite is installed.
    #[error("required mod not found: {names}")]
    PrerequisiteMissing { names: String },

    /// A patch-only mod cannot run on a remaster setup.
    #[error("'{name}' requires the plain community patch and cannot be installed over the remaster")]
    PatchOnlyIncompatibleWithRemaster { name: String },

    /// The installed prerequisite version fails the declared constraints.
    #[error("installed '{name}' {installed} does not satisfy {required}")]
    PrerequisiteVersionMismatch {
        name: String,
        installed: String,
        required: String,
    },

    /// A required optional content of the prerequisite is absent or skipped.
    #[error("required option '{option}' of '{name}' is not installed")]
    PrerequisiteOptionMissing { name: String, option: String },

    /// An incompatible mod is present in the game copy.
    #[error("incompatible mod installed: {name}")]
    IncompatibleInstalled { name: String },

    /// Reinstalling is not allowed in the current state.
    #[error("reinstall blocked: {reason}")]
    ReinstallBlocked { reason: String },
}

/// Errors that can occur while turning an option selection into a copy plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The selection has no `base` entry.
    #[error("selection is missing the 'base' entry")]
    MissingBase,

    /// The selection names an option the mod does not declare.
    #[error("unknown option in selection: '{0}'")]
    UnknownOption(String),

    /// A declared option has no entry in the selection.
    #[error("selection is missing declared option '{0}'")]
    MissingOption(String),

    /// The value is not allowed for this option.
    #[error("invalid value '{value}' for option '{option}'")]
    InvalidValue { option: String, value: String },
}
