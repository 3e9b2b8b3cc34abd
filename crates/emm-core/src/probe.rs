//! Game directory probing.
//!
//! A probe identifies a game copy: which executable it uses, which release
//! of which installment it is (via a byte signature embedded at a fixed
//! offset, left there by official patches), whether the game appears to be
//! running, and what the tool has previously installed into it.
//!
//! Snapshots are immutable; a refresh replaces the whole value.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use unicase::UniCase;

use crate::cancel::CancelToken;
use crate::error::ProbeError;
use crate::manifest::Installment;

/// Candidate executable names, in resolution priority order.
pub const EXE_CANDIDATES: [&str; 4] = ["hta.exe", "em.exe", "game.exe", "start.exe"];

/// Location of the installed-mods record inside a game copy.
pub const INSTALLED_MANIFEST_REL: &str = "data/installed_mods.yaml";

/// Sentinel paths every playable game copy carries, relative to the root.
const SENTINEL_PATHS: [&str; 2] = ["data", "data/config.cfg"];

/// A known executable signature: `magic` at `offset` identifies the release
/// named by `token`.
#[derive(Debug, Clone, Copy)]
pub struct ExeFingerprint {
    pub token: &'static str,
    pub installment: Installment,
    pub offset: u64,
    pub magic: &'static [u8],
}

/// Signature catalogue.  Offsets and byte patterns are data; unknown
/// executables simply map to the `"unknown"` token.
pub const EXE_FINGERPRINTS: &[ExeFingerprint] = &[
    ExeFingerprint {
        token: "1.02",
        installment: Installment::ExMachina,
        offset: 0x004E_9A40,
        magic: b"1.02",
    },
    ExeFingerprint {
        token: "1.04",
        installment: Installment::ExMachina,
        offset: 0x004E_9A40,
        magic: b"1.04",
    },
    ExeFingerprint {
        token: "KRBDZHA10",
        installment: Installment::M113,
        offset: 0x0051_30C8,
        magic: b"KRBDZHA10",
    },
    ExeFingerprint {
        token: "1.52",
        installment: Installment::Arcade,
        offset: 0x0048_77F4,
        magic: b"1.52",
    },
];

/// Map a fingerprint token onto its installment.  `"unknown"` and anything
/// else outside the catalogue yield `None`.
pub fn classify_installment(exe_version: &str) -> Option<Installment> {
    EXE_FINGERPRINTS
        .iter()
        .find(|fp| fp.token == exe_version)
        .map(|fp| fp.installment)
}

/// One record of the installed-mods manifest.
///
/// Option values are flattened next to the fixed keys, which is why option
/// names may not collide with them (see `RESERVED_OPTION_NAMES`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledEntry {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment: Option<String>,
    #[serde(default)]
    pub display_name: String,
    /// `"yes"` or `"skip"`.
    #[serde(default)]
    pub base: String,
    /// Per-option values: `"yes"`, `"skip"`, or an install-setting name.
    #[serde(flatten)]
    pub options: BTreeMap<String, String>,
}

impl InstalledEntry {
    /// Is the named optional content present (recorded and not skipped)?
    pub fn option_installed(&self, name: &str) -> bool {
        matches!(self.options.get(name), Some(value) if value != "skip")
    }
}

/// The full installed-mods record, keyed by mod name.
pub type InstalledContent = BTreeMap<String, InstalledEntry>;

/// Best-effort flags read from the game configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameFlags {
    /// Registry-backed; always false here since registry access is an
    /// external collaborator.
    pub hi_dpi_aware: bool,
    pub fullscreen_opts_disabled: bool,
    pub windowed: bool,
}

/// An immutable snapshot of a game copy.
#[derive(Debug, Clone)]
pub struct GameSnapshot {
    pub root_path: PathBuf,
    pub exe_path: PathBuf,
    /// Fingerprint token; `None` when the executable was locked.
    pub exe_version: Option<String>,
    pub installment: Option<Installment>,
    pub installed_content: InstalledContent,
    /// Human-readable one-liners per installed mod, for error rendering.
    pub installed_descriptions: BTreeMap<String, String>,
    pub is_running: bool,
    pub flags: GameFlags,
}

impl GameSnapshot {
    pub fn installed_manifest_path(&self) -> PathBuf {
        self.root_path.join(INSTALLED_MANIFEST_REL)
    }
}

/// Find the game executable inside `root` by candidate name,
/// case-insensitively.
pub fn resolve_exe(root: &Path) -> Result<PathBuf, ProbeError> {
    let entries: Vec<String> = fs::read_dir(root)
        .map_err(|_| ProbeError::GameNotFound(root.to_path_buf()))?
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();

    for candidate in EXE_CANDIDATES {
        if let Some(found) = entries
            .iter()
            .find(|name| UniCase::new(name.as_str()) == UniCase::new(candidate))
        {
            return Ok(root.join(found));
        }
    }
    Err(ProbeError::GameNotFound(root.to_path_buf()))
}

/// Require the fixed sentinel files of a game copy.
pub fn validate_game_dir(root: &Path) -> Result<(), ProbeError> {
    for rel in SENTINEL_PATHS {
        let path = root.join(rel);
        if !path.exists() {
            return Err(ProbeError::MissingFiles(path));
        }
    }
    Ok(())
}

/// Best-effort "is the game running" probe: a write-open of the executable
/// that is refused with a sharing/permission error means some process holds
/// it.
pub fn check_is_running(exe_path: &Path) -> bool {
    match OpenOptions::new().write(true).open(exe_path) {
        Ok(_) => false,
        Err(err) => matches!(
            err.kind(),
            std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::WouldBlock
        ),
    }
}

/// Read the version signature out of the executable.
///
/// Returns `Ok(None)` when the file is locked by another process; otherwise
/// the matched token or `"unknown"`.
pub fn read_exe_version(exe_path: &Path) -> Result<Option<String>, ProbeError> {
    if check_is_running(exe_path) {
        return Ok(None);
    }

    let mut file =
        fs::File::open(exe_path).map_err(|_| ProbeError::BadExe(exe_path.to_path_buf()))?;
    let len = file
        .metadata()
        .map_err(|_| ProbeError::BadExe(exe_path.to_path_buf()))?
        .len();
    if len == 0 {
        return Err(ProbeError::BadExe(exe_path.to_path_buf()));
    }

    for fp in EXE_FINGERPRINTS {
        let end = fp.offset + fp.magic.len() as u64;
        if end > len {
            continue;
        }
        file.seek(SeekFrom::Start(fp.offset))?;
        let mut buf = vec![0u8; fp.magic.len()];
        file.read_exact(&mut buf)?;
        if buf == fp.magic {
            return Ok(Some(fp.token.to_owned()));
        }
    }
    Ok(Some("unknown".to_owned()))
}

/// Read the installed-mods record.  A malformed record is treated as empty
/// (with a warning) so a damaged file never bricks the probe.
pub fn load_installed_content(root: &Path) -> InstalledContent {
    let path = root.join(INSTALLED_MANIFEST_REL);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(_) => return InstalledContent::new(),
    };
    match serde_yaml::from_slice::<InstalledContent>(&bytes) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %path.display(), %err, "installed-mods record is corrupt, treating as empty");
            InstalledContent::new()
        }
    }
}

fn read_config_flags(root: &Path) -> GameFlags {
    let config_path = root.join("data/config.cfg");
    let attrs = match read_root_attributes(&config_path) {
        Ok(attrs) => attrs,
        Err(_) => return GameFlags::default(),
    };
    let fullscreen = attrs.get("r_fullScreen").map(String::as_str);
    GameFlags {
        hi_dpi_aware: false,
        fullscreen_opts_disabled: fullscreen.is_none(),
        windowed: fullscreen == Some("0"),
    }
}

/// Attributes of the first element of an XML document.
fn read_root_attributes(path: &Path) -> Result<BTreeMap<String, String>, ProbeError> {
    let text = fs::read_to_string(path)?;
    let mut reader = quick_xml::Reader::from_str(&text);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(el))
            | Ok(quick_xml::events::Event::Empty(el)) => {
                let mut attrs = BTreeMap::new();
                for attr in el.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    attrs.insert(key, value);
                }
                return Ok(attrs);
            }
            Ok(quick_xml::events::Event::Eof) => return Ok(BTreeMap::new()),
            Err(_) => return Ok(BTreeMap::new()),
            _ => {}
        }
    }
}

/// Probe a game directory and return an immutable snapshot.
pub fn probe_game(root: &Path, cancel: &CancelToken) -> Result<GameSnapshot, ProbeError> {
    if !root.is_dir() {
        return Err(ProbeError::GameNotFound(root.to_path_buf()));
    }

    let exe_path = resolve_exe(root)?;
    if cancel.is_cancelled() {
        return Err(ProbeError::GameNotFound(root.to_path_buf()));
    }
    validate_game_dir(root)?;

    let is_running = check_is_running(&exe_path);
    let exe_version = read_exe_version(&exe_path)?;
    let installment = exe_version.as_deref().and_then(classify_installment);

    let installed_content = load_installed_content(root);
    let installed_descriptions = installed_content
        .iter()
        .map(|(name, entry)| {
            let label = if entry.display_name.is_empty() {
                name.clone()
            } else {
                entry.display_name.clone()
            };
            (name.clone(), format!("{label} ({})", entry.version))
        })
        .collect();

    let flags = read_config_flags(root);

    debug!(
        root = %root.display(),
        exe = %exe_path.display(),
        version = exe_version.as_deref().unwrap_or("locked"),
        running = is_running,
        mods = installed_content.len(),
        "game probed"
    );

    Ok(GameSnapshot {
        root_path: root.to_path_buf(),
        exe_path,
        exe_version,
        installment,
        installed_content,
        installed_descriptions,
        is_running,
        flags,
    })
}
