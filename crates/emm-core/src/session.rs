//! Session state and change detection.
//!
//! The session owns the currently loaded mod set and the current game
//! snapshot.  Refreshes hash every manifest's bytes and three-way diff
//! against the tracked set, so an unchanged distribution costs one read per
//! manifest instead of a full reload, and the UI never flickers through a
//! drop-everything-and-reload cycle.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::loader::{self, LoadFailure, LoadedMod};
use crate::probe::GameSnapshot;
use crate::resolver::{self, Resolution};

/// Counters describing what one refresh did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub kept: usize,
    pub reloaded: usize,
    pub added: usize,
    pub dropped: usize,
}

/// The set of loaded mods plus the current game copy.
#[derive(Debug, Default)]
pub struct Session {
    mods: BTreeMap<PathBuf, LoadedMod>,
    /// mod id → content hash of its manifest at load time.
    tracked_hashes: BTreeMap<String, String>,
    game: Option<GameSnapshot>,
    failures: Vec<LoadFailure>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mods(&self) -> impl Iterator<Item = &LoadedMod> {
        self.mods.values()
    }

    pub fn mod_by_name(&self, name: &str) -> Option<&LoadedMod> {
        self.mods.values().find(|m| m.manifest.name == name)
    }

    pub fn game(&self) -> Option<&GameSnapshot> {
        self.game.as_ref()
    }

    /// Replace the game snapshot wholesale.
    pub fn set_game(&mut self, snapshot: GameSnapshot) {
        self.game = Some(snapshot);
    }

    /// Load failures recorded by the last refresh.
    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    /// Content hashes by mod id, as of the last refresh.
    pub fn tracked_hashes(&self) -> &BTreeMap<String, String> {
        &self.tracked_hashes
    }

    /// Resolve every loaded mod against the current game snapshot.
    pub fn resolve_all(&self) -> Vec<(&LoadedMod, Resolution)> {
        let Some(game) = &self.game else {
            return Vec::new();
        };
        self.mods
            .values()
            .map(|loaded| (loaded, resolver::resolve(&loaded.manifest, game)))
            .collect()
    }

    /// Re-enumerate the distribution, keeping mods whose manifests did not
    /// change, reloading changed ones, and dropping removed ones.
    pub fn refresh(&mut self, distro: &Path, cancel: &CancelToken) -> RefreshStats {
        let mut stats = RefreshStats::default();
        let mut next_mods = BTreeMap::new();
        let mut next_hashes = BTreeMap::new();
        self.failures.clear();

        let mods_root = distro.join("mods");
        let mut mod_dirs: Vec<PathBuf> = fs::read_dir(&mods_root)
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && path.join("manifest.yaml").is_file())
            .collect();
        mod_dirs.sort();

        for mod_dir in mod_dirs {
            if cancel.is_cancelled() {
                break;
            }
            let manifest_path = mod_dir.join("manifest.yaml");
            let bytes = match fs::read(&manifest_path) {
                Ok(bytes) => bytes,
                Err(error) => {
                    self.failures.push(LoadFailure {
                        manifest_path,
                        error: error.into(),
                    });
                    continue;
                }
            };
            let hash = loader::manifest_hash(&bytes);

            if let Some(existing) = self.mods.remove(&manifest_path) {
                if existing.content_hash == hash {
                    debug!(path = %manifest_path.display(), "manifest unchanged, retained");
                    next_hashes.insert(existing.manifest.name.clone(), hash);
                    next_mods.insert(manifest_path, existing);
                    stats.kept += 1;
                    continue;
                }
                stats.reloaded += 1;
            } else {
                stats.added += 1;
            }

            match loader::load_mod_dir(&mod_dir) {
                Ok(loaded) => {
                    next_hashes.insert(loaded.manifest.name.clone(), loaded.content_hash.clone());
                    next_mods.insert(manifest_path, loaded);
                }
                Err(error) => {
                    self.failures.push(LoadFailure {
                        manifest_path,
                        error,
                    });
                }
            }
        }

        // whatever is left in the old map has disappeared from disk
        stats.dropped = self.mods.len();
        self.mods = next_mods;
        self.tracked_hashes = next_hashes;

        info!(
            kept = stats.kept,
            reloaded = stats.reloaded,
            added = stats.added,
            dropped = stats.dropped,
            failed = self.failures.len(),
            "session refreshed"
        );
        stats
    }
}
