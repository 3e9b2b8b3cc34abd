//! Installation pipeline for the Ex Machina mod manager.
//!
//! Everything here mutates the game directory and nothing else does:
//!
//! - [`installer`] - copy plan execution, progress, cancellation, and the
//!   atomic installed-mods record commit
//! - [`patcher`] - the binary patch catalogue and parameter patches
//! - [`config_edit`] - whitelisted attribute edits of the game's XML
//!   configuration
//!
//! Decisions about *what* to install come from `emm-core`.

pub mod config_edit;
pub mod error;
pub mod installer;
pub mod patcher;

pub use error::{ConfigEditError, InstallError, PatchError};
pub use installer::{
    install_mod, FileProgress, InstallObserver, InstallOutcome, NullObserver, RENDER_DLL_NAME,
};
pub use patcher::{
    AppliedPatch, BinaryPatch, PatchCondition, PatchContext, PatchOutcome, PatchTarget,
    PATCH_CATALOGUE,
};
