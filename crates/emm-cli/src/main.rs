//! Batch front-end.
//!
//! Exit codes are a stable contract for scripted installs:
//!
//! | code | meaning |
//! |------|---------|
//! | 0    | success |
//! | 2    | usage error |
//! | 10   | manifest schema mismatch |
//! | 11   | malformed version or constraint |
//! | 12   | missing translation manifest |
//! | 13   | translation/variant metadata mismatch |
//! | 14   | reserved option name |
//! | 15   | forbidden prerequisite |
//! | 16   | forbidden incompatibility |
//! | 17   | missing content directory |
//! | 18   | other load failure |
//! | 19   | mod not found in distribution |
//! | 20   | game not found |
//! | 21   | game directory missing sentinel files |
//! | 22   | unreadable executable |
//! | 23   | executable locked |
//! | 24   | other probe failure |
//! | 30   | installment mismatch |
//! | 31   | tool version too old |
//! | 32   | tool version too new |
//! | 33   | prerequisite missing |
//! | 34   | prerequisite version mismatch |
//! | 35   | prerequisite option missing |
//! | 36   | incompatible mod installed |
//! | 37   | reinstall blocked |
//! | 38   | patch-only mod on remaster setup |
//! | 40   | selection missing base |
//! | 41   | unknown option |
//! | 42   | invalid option value |
//! | 43   | declared option missing from selection |
//! | 50   | prerequisites no longer met |
//! | 51   | copy failed |
//! | 52   | patch precondition failed |
//! | 53   | render DLL not found |
//! | 54   | installed-mods manifest write failed |
//! | 55   | cancelled |
//! | 56   | game running |
//! | 57   | other install failure |

mod config;
mod prog_args;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use emm_core::cancel::CancelToken;
use emm_core::error::{LoadError, PlanError, ProbeError, ResolveError};
use emm_core::loader::{self, LoadedMod};
use emm_core::manifest::Manifest;
use emm_core::planner::{self, Selection};
use emm_core::probe::{self, GameSnapshot};
use emm_core::resolver::{self, Resolution};
use emm_install::error::{InstallError, PatchError};
use emm_install::installer::{self, FileProgress, InstallObserver};

use crate::config::ToolConfig;
use crate::prog_args::{Command, ProgArgs};

struct Failure {
    code: u8,
    message: String,
}

impl Failure {
    fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<LoadError> for Failure {
    fn from(error: LoadError) -> Self {
        let code = match &error {
            LoadError::SchemaMismatch(_) => 10,
            LoadError::Version(_) => 11,
            LoadError::MissingTranslation { .. } => 12,
            LoadError::TranslationMetadataMismatch { .. }
            | LoadError::VariantMetadataMismatch { .. } => 13,
            LoadError::ReservedOptionName(_) => 14,
            LoadError::ForbiddenPrerequisite(_) => 15,
            LoadError::ForbiddenIncompatible(_) => 16,
            LoadError::MissingContentDirectory(_) => 17,
            LoadError::ArchiveListing(_) | LoadError::Io(_) => 18,
        };
        Failure::new(code, error.to_string())
    }
}

impl From<ProbeError> for Failure {
    fn from(error: ProbeError) -> Self {
        let code = match &error {
            ProbeError::GameNotFound(_) => 20,
            ProbeError::MissingFiles(_) => 21,
            ProbeError::BadExe(_) => 22,
            ProbeError::ExeLocked(_) => 23,
            ProbeError::Io(_) => 24,
        };
        Failure::new(code, error.to_string())
    }
}

fn resolve_code(error: &ResolveError) -> u8 {
    match error {
        ResolveError::InstallmentMismatch { .. } => 30,
        ResolveError::ToolVersionTooOld { .. } => 31,
        ResolveError::ToolVersionTooNew { .. } => 32,
        ResolveError::PrerequisiteMissing { .. } => 33,
        ResolveError::PrerequisiteVersionMismatch { .. } => 34,
        ResolveError::PrerequisiteOptionMissing { .. } => 35,
        ResolveError::IncompatibleInstalled { .. } => 36,
        ResolveError::ReinstallBlocked { .. } => 37,
        ResolveError::PatchOnlyIncompatibleWithRemaster { .. } => 38,
    }
}

impl From<PlanError> for Failure {
    fn from(error: PlanError) -> Self {
        let code = match &error {
            PlanError::MissingBase => 40,
            PlanError::UnknownOption(_) => 41,
            PlanError::InvalidValue { .. } => 42,
            PlanError::MissingOption(_) => 43,
        };
        Failure::new(code, error.to_string())
    }
}

impl From<InstallError> for Failure {
    fn from(error: InstallError) -> Self {
        let code = match &error {
            InstallError::PrerequisitesNoLongerMet { .. } => 50,
            InstallError::CopyFailed { .. } => 51,
            InstallError::Patch(PatchError::PreconditionFailed { .. }) => 52,
            InstallError::Patch(PatchError::DxRenderDllNotFound(_)) => 53,
            InstallError::ManifestWriteFailed(_) => 54,
            InstallError::Cancelled => 55,
            InstallError::GameRunning => 56,
            InstallError::Probe(probe_error) => return Failure::from_probe_ref(probe_error),
            _ => 57,
        };
        Failure::new(code, error.to_string())
    }
}

impl Failure {
    fn from_probe_ref(error: &ProbeError) -> Self {
        let code = match error {
            ProbeError::GameNotFound(_) => 20,
            ProbeError::MissingFiles(_) => 21,
            ProbeError::BadExe(_) => 22,
            ProbeError::ExeLocked(_) => 23,
            ProbeError::Io(_) => 24,
        };
        Failure::new(code, error.to_string())
    }
}

struct ConsoleObserver;

impl InstallObserver for ConsoleObserver {
    fn on_file(&mut self, progress: &FileProgress<'_>) {
        println!(
            "[{}/{}] {} ({} bytes)",
            progress.file_index + 1,
            progress.file_count,
            progress.relative_path.display(),
            progress.size_bytes
        );
    }

    fn on_status(&mut self, status: &str) {
        println!("-- {status}");
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = ProgArgs::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            ExitCode::from(failure.code)
        }
    }
}

fn run(args: ProgArgs) -> Result<(), Failure> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::CONFIG_FILE_NAME));
    let mut tool_config = ToolConfig::load(&config_path);

    let result = match &args.command {
        Command::List { distro } => cmd_list(distro),
        Command::Probe { game } => cmd_probe(game),
        Command::Check {
            distro,
            game,
            name,
            language,
        } => cmd_check(distro, game, name, language.as_deref()),
        Command::Install {
            distro,
            game,
            name,
            options,
            language,
            skip_base,
        } => cmd_install(distro, game, name, options, language.as_deref(), *skip_base),
    };

    if result.is_ok() {
        remember_paths(&mut tool_config, &args.command);
        if let Err(err) = tool_config.save(&config_path) {
            info!(%err, "could not persist tool config");
        }
    }
    result
}

fn remember_paths(config: &mut ToolConfig, command: &Command) {
    let (game, distro) = match command {
        Command::Probe { game } => (Some(game), None),
        Command::Check { game, distro, .. } | Command::Install { game, distro, .. } => {
            (Some(game), Some(distro))
        }
        Command::List { distro } => (None, Some(distro)),
    };
    if let Some(game) = game {
        config.current_game = game.to_string_lossy().into_owned();
    }
    if let Some(distro) = distro {
        config.current_distro = distro.to_string_lossy().into_owned();
    }
}

fn cmd_list(distro: &Path) -> Result<(), Failure> {
    let scan = loader::scan_distribution(distro, &CancelToken::new());
    for loaded in &scan.mods {
        let m = &loaded.manifest;
        println!(
            "{} {} [{}] ({}) build {}",
            m.name, m.version, m.installment, m.language, m.build
        );
        for (lang, _) in loaded.translations().filter(|(l, _)| *l != m.language) {
            println!("  translation: {lang}");
        }
        for slug in loaded.variants.keys() {
            println!("  variant: {slug}");
        }
    }
    for failure in &scan.failures {
        println!(
            "BROKEN {}: {}",
            failure.manifest_path.display(),
            failure.error
        );
    }
    Ok(())
}

fn cmd_probe(game: &Path) -> Result<(), Failure> {
    let snapshot = probe::probe_game(game, &CancelToken::new())?;
    println!("exe: {}", snapshot.exe_path.display());
    println!(
        "exe version: {}",
        snapshot.exe_version.as_deref().unwrap_or("locked")
    );
    println!(
        "installment: {}",
        snapshot
            .installment
            .map(|i| i.to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    );
    println!("running: {}", snapshot.is_running);
    for (name, description) in &snapshot.installed_descriptions {
        println!("installed: {name} - {description}");
    }
    Ok(())
}

fn find_mod(distro: &Path, name: &str) -> Result<LoadedMod, Failure> {
    let scan = loader::scan_distribution(distro, &CancelToken::new());
    if let Some(loaded) = scan.mods.into_iter().find(|m| m.manifest.name == name) {
        return Ok(loaded);
    }
    // a broken manifest for that mod is more useful than "not found"
    if let Some(failure) = scan.failures.into_iter().next() {
        return Err(failure.error.into());
    }
    Err(Failure::new(
        19,
        format!("mod '{name}' not found in {}", distro.display()),
    ))
}

fn report_resolution(manifest: &Manifest, resolution: &Resolution) {
    println!("mod: {} {}", manifest.name, manifest.version);
    println!("  installment compatible: {}", resolution.installment_compatible);
    println!("  tool compatible: {}", resolution.tool_compatible);
    for status in &resolution.requirements {
        println!(
            "  requires {}: {}",
            status.label,
            if status.satisfied { "ok" } else { "MISSING" }
        );
    }
    for status in &resolution.incompatibilities {
        println!(
            "  incompatible with {}: {}",
            status.label,
            if status.satisfied { "absent" } else { "PRESENT" }
        );
    }
    if resolution.reinstall.is_reinstall() {
        println!("  reinstall: {:?}", resolution.reinstall);
    }
    println!("  can install: {}", resolution.can_install);
    for failure in resolution.failures() {
        println!("  reason: {failure}");
    }
}

fn resolve_or_fail(
    manifest: &Manifest,
    snapshot: &GameSnapshot,
) -> Result<Resolution, Failure> {
    let resolution = resolver::resolve(manifest, snapshot);
    if resolution.can_install {
        Ok(resolution)
    } else {
        let code = resolution.failures().first().map_or(2, |e| resolve_code(e));
        let message = resolution
            .failures()
            .iter()
            .map(|failure| failure.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(Failure::new(code, message))
    }
}

fn cmd_check(
    distro: &Path,
    game: &Path,
    name: &str,
    language: Option<&str>,
) -> Result<(), Failure> {
    let loaded = find_mod(distro, name)?;
    let manifest = language
        .map(|lang| loaded.localized(lang))
        .unwrap_or(&loaded.manifest);
    let snapshot = probe::probe_game(game, &CancelToken::new())?;
    let resolution = resolver::resolve(manifest, &snapshot);
    report_resolution(manifest, &resolution);
    if resolution.can_install {
        Ok(())
    } else {
        let code = resolution.failures().first().map_or(2, |e| resolve_code(e));
        Err(Failure::new(code, "mod cannot be installed"))
    }
}

fn cmd_install(
    distro: &Path,
    game: &Path,
    name: &str,
    option_args: &[String],
    language: Option<&str>,
    skip_base: bool,
) -> Result<(), Failure> {
    let loaded = find_mod(distro, name)?;
    let manifest = language
        .map(|lang| loaded.localized(lang))
        .unwrap_or(&loaded.manifest);

    let snapshot = probe::probe_game(game, &CancelToken::new())?;
    let resolution = resolve_or_fail(manifest, &snapshot)?;

    let mut selection: Selection = manifest.default_selection();
    if skip_base {
        selection.insert("base".to_owned(), "skip".to_owned());
    }
    for arg in option_args {
        let (key, value) = arg.split_once('=').ok_or_else(|| {
            Failure::new(2, format!("bad --option '{arg}', expected NAME=VALUE"))
        })?;
        selection.insert(key.trim().to_owned(), value.trim().to_owned());
    }

    let plan = planner::plan_install(
        manifest,
        &selection,
        &snapshot,
        &resolution.reinstall,
        resolution.previous_install.as_ref(),
    )?;

    let outcome = installer::install_mod(
        manifest,
        &plan,
        game,
        &mut ConsoleObserver,
        &CancelToken::new(),
    )?;

    println!(
        "installed {} {} ({} files, {} patches)",
        manifest.name,
        manifest.version,
        outcome.files_copied,
        outcome.patches.len()
    );
    Ok(())
}
