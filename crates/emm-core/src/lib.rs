//! Core domain types for the Ex Machina mod manager.
//!
//! This crate holds everything that decides *whether* and *how* a mod can be
//! installed, without touching the game directory:
//!
//! - [`version`] - version parsing and constraint evaluation
//! - [`manifest`] - the typed mod manifest model
//! - [`loader`] - manifest discovery, validation, translations and variants
//! - [`probe`] - game directory identification and the installed-mods record
//! - [`resolver`] - compatibility and reinstall verdicts
//! - [`planner`] - option selection validation and ordered copy plans
//! - [`session`] - the loaded mod set with hash-based change detection
//!
//! The effectful half (copying, binary patching, config edits) lives in the
//! `emm-install` crate.

pub mod cancel;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod planner;
pub mod probe;
pub mod resolver;
pub mod session;
pub mod version;

pub use cancel::CancelToken;
pub use error::{LoadError, PlanError, ProbeError, ResolveError, VersionError};
pub use loader::{ArchiveListing, DistributionScan, LoadFailure, LoadedMod};
pub use manifest::{
    DependencyRule, Installment, Manifest, OptionalContent, PatcherOptions, Tag, TOOL_VERSION,
};
pub use planner::{CopyJob, InstallPlan, PatchPlan, Selection};
pub use probe::{GameFlags, GameSnapshot, InstalledContent, InstalledEntry};
pub use resolver::{ReinstallVerdict, Resolution};
pub use session::Session;
pub use version::{ConstraintSet, ConstraintStyle, Relation, Version, VersionConstraint};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        CancelToken, ConstraintSet, GameSnapshot, InstallPlan, InstalledEntry, Installment,
        LoadError, LoadedMod, Manifest, PlanError, ProbeError, ReinstallVerdict, Resolution,
        ResolveError, Selection, Session, Version,
    };
}
