//! Install plan execution.
//!
//! The installer runs a validated [`InstallPlan`] against a game directory:
//!
//! 1. re-probe the game and re-verify prerequisites (another process may
//!    have touched the directory between resolve and install),
//! 2. stream the copy jobs with throttled per-file progress,
//! 3. apply the whitelisted config edits,
//! 4. run the binary patcher,
//! 5. merge the selection into the installed-mods record and commit it by
//!    writing a temp sibling and renaming over the target.
//!
//! Failures after the copy step abort without rolling copied files back;
//! the installed-mods record is only ever written in step 5, so a failed or
//! cancelled install leaves it byte-identical.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};
use walkdir::WalkDir;

use emm_core::cancel::CancelToken;
use emm_core::manifest::{Manifest, COMMUNITY_PATCH};
use emm_core::planner::InstallPlan;
use emm_core::probe::{self, InstalledEntry};
use emm_core::resolver;

use crate::config_edit;
use crate::error::InstallError;
use crate::patcher::{self, AppliedPatch, PatchContext};

/// Name of the secondary patch target next to the executable.
pub const RENDER_DLL_NAME: &str = "dxrender9.dll";

/// Minimum interval between progress callbacks.
pub const PROGRESS_THROTTLE: Duration = Duration::from_millis(16);

/// Per-file progress report.
#[derive(Debug, Clone)]
pub struct FileProgress<'a> {
    pub file_index: usize,
    pub file_count: usize,
    pub relative_path: &'a Path,
    pub size_bytes: u64,
}

/// Receiver for installer progress.  Both channels are throttled by the
/// installer to roughly one call per frame.
pub trait InstallObserver {
    fn on_file(&mut self, _progress: &FileProgress<'_>) {}
    fn on_status(&mut self, _status: &str) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl InstallObserver for NullObserver {}

/// What a successful install did.
#[derive(Debug)]
pub struct InstallOutcome {
    pub files_copied: usize,
    pub patches: Vec<AppliedPatch>,
    /// The record now stored under the mod's name.
    pub entry: InstalledEntry,
}

struct PendingCopy {
    source: PathBuf,
    destination: PathBuf,
    relative: PathBuf,
    size: u64,
}

/// Execute `plan` for `manifest` against the game at `game_root`.
pub fn install_mod(
    manifest: &Manifest,
    plan: &InstallPlan,
    game_root: &Path,
    observer: &mut dyn InstallObserver,
    cancel: &CancelToken,
) -> Result<InstallOutcome, InstallError> {
    observer.on_status("verifying game state");
    let fresh = probe::probe_game(game_root, cancel)?;
    if fresh.is_running {
        return Err(InstallError::GameRunning);
    }

    let resolution = resolver::resolve(manifest, &fresh);
    if !resolution.requirements_met() {
        let details = resolution
            .requirements
            .iter()
            .filter_map(|status| status.error.as_ref())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(InstallError::PrerequisitesNoLongerMet { details });
    }

    observer.on_status("copying files");
    let pending = collect_copies(plan)?;
    let file_count = pending.len();
    let mut last_report: Option<Instant> = None;

    for (file_index, copy) in pending.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(copied = file_index, "install cancelled between files");
            return Err(InstallError::Cancelled);
        }

        if let Some(parent) = copy.destination.parent() {
            fs::create_dir_all(parent).map_err(|source| InstallError::CopyFailed {
                path: copy.destination.clone(),
                source,
            })?;
        }
        fs::copy(&copy.source, &copy.destination).map_err(|source| {
            InstallError::CopyFailed {
                path: copy.source.clone(),
                source,
            }
        })?;

        let due = last_report
            .map(|at| at.elapsed() >= PROGRESS_THROTTLE)
            .unwrap_or(true);
        if due || file_index + 1 == file_count {
            observer.on_file(&FileProgress {
                file_index,
                file_count,
                relative_path: &copy.relative,
                size_bytes: copy.size,
            });
            last_report = Some(Instant::now());
        }
    }

    observer.on_status("adjusting game configuration");
    apply_config_edits(plan, game_root)?;

    observer.on_status("patching executable");
    let patches = apply_patches(manifest, plan, &fresh.exe_path, game_root)?;

    observer.on_status("recording installation");
    let entry = installed_entry(manifest, plan);
    let mut content = fresh.installed_content.clone();
    content.insert(manifest.name.clone(), entry.clone());
    commit_installed_content(&fresh.installed_manifest_path(), &content)?;

    info!(
        name = %manifest.name,
        version = %manifest.version,
        files = file_count,
        patches = patches.len(),
        "mod installed"
    );

    Ok(InstallOutcome {
        files_copied: file_count,
        patches,
        entry,
    })
}

/// Expand the plan's directory jobs into an ordered file list.
fn collect_copies(plan: &InstallPlan) -> Result<Vec<PendingCopy>, InstallError> {
    let mut pending = Vec::new();
    for job in &plan.jobs {
        for entry in WalkDir::new(&job.source).sort_by_file_name() {
            let entry = entry.map_err(|err| InstallError::CopyFailed {
                path: job.source.clone(),
                source: err.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&job.source)
                .unwrap_or(entry.path())
                .to_path_buf();
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            pending.push(PendingCopy {
                source: entry.path().to_path_buf(),
                destination: job.destination.join(&relative),
                relative,
                size,
            });
        }
    }
    Ok(pending)
}

fn apply_config_edits(plan: &InstallPlan, game_root: &Path) -> Result<(), InstallError> {
    let config_path = game_root.join("data/config.cfg");
    if !config_path.is_file() {
        return Ok(());
    }

    if plan.patch.remaster {
        config_edit::toggle_hd_ui_paths(&config_path, true)?;
        config_edit::set_hd_resolution(&config_path)?;
        let glob = config_edit::glob_props_path(game_root, &config_path)?;
        if glob.is_file() {
            config_edit::toggle_ground_repository(&glob, true)?;
            config_edit::toggle_smart_cursor(&glob, true)?;
        }
    }

    if let Some(font) = &plan.patch.options.game_font {
        let schema = config_edit::ui_schema_path(game_root, &config_path)?;
        if schema.is_file() {
            config_edit::set_ui_fonts(&schema, font, 1.0)?;
        }
    }

    Ok(())
}

fn apply_patches(
    manifest: &Manifest,
    plan: &InstallPlan,
    exe_path: &Path,
    game_root: &Path,
) -> Result<Vec<AppliedPatch>, InstallError> {
    let context = PatchContext {
        community_patch: manifest.name == COMMUNITY_PATCH,
        community_remaster: plan.patch.remaster,
        features: Vec::new(),
    };
    let dll_path = game_root.join(RENDER_DLL_NAME);

    let mut patches = patcher::apply_catalogue(exe_path, &dll_path, &context)?;
    patches.extend(patcher::apply_parameter_patches(
        exe_path,
        &plan.patch.options,
    )?);
    Ok(patches)
}

fn installed_entry(manifest: &Manifest, plan: &InstallPlan) -> InstalledEntry {
    let mut entry = InstalledEntry {
        version: manifest.version.to_string(),
        build: manifest.build.clone(),
        language: manifest.language.clone(),
        installment: Some(manifest.installment.to_string()),
        display_name: manifest.display_name.clone(),
        base: plan
            .selection
            .get("base")
            .cloned()
            .unwrap_or_else(|| "yes".to_owned()),
        options: Default::default(),
    };
    for (key, value) in &plan.selection {
        if key != "base" {
            entry.options.insert(key.clone(), value.clone());
        }
    }
    entry
}

/// Write the record to a temp sibling and rename it over the target, so the
/// on-disk manifest is always either the old or the new version.
fn commit_installed_content(
    target: &Path,
    content: &emm_core::probe::InstalledContent,
) -> Result<(), InstallError> {
    let yaml = serde_yaml::to_string(content)
        .map_err(|err| InstallError::ManifestWriteFailed(err.to_string()))?;
    let dir = target
        .parent()
        .ok_or_else(|| InstallError::ManifestWriteFailed("record has no parent dir".to_owned()))?;

    let temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|err| InstallError::ManifestWriteFailed(err.to_string()))?;
    fs::write(temp.path(), yaml)
        .map_err(|err| InstallError::ManifestWriteFailed(err.to_string()))?;
    temp.persist(target)
        .map_err(|err| InstallError::ManifestWriteFailed(err.to_string()))?;
    Ok(())
}
