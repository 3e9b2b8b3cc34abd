//! Binary patching of the game executable and the render DLL.
//!
//! Every edit is data: the catalogue below lists named patches with their
//! target file, offset, pre-image and replacement bytes, applied in table
//! order.  A patch whose pre-image does not match is never written; bytes
//! that already equal the replacement are reported as already applied, so
//! re-running the patcher over a patched game is a no-op.
//!
//! Parameter patches (gravity, shop skins, friendly fire, font) encode
//! user-tunable values at fixed offsets with range clamping.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info};

use emm_core::manifest::PatcherOptions;

use crate::error::PatchError;

/// Which file a catalogue entry edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTarget {
    Exe,
    RenderDll,
}

/// When a catalogue entry applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchCondition {
    Always,
    CommunityPatch,
    CommunityRemaster,
    VanillaMod,
    Feature(&'static str),
}

/// A named byte-level edit with pre-image verification.
#[derive(Debug, Clone, Copy)]
pub struct BinaryPatch {
    pub name: &'static str,
    pub description: &'static str,
    pub target: PatchTarget,
    pub offset: u64,
    pub expected: &'static [u8],
    pub replacement: &'static [u8],
    pub applies_when: PatchCondition,
}

/// The fixed patch catalogue, applied in order.
pub const PATCH_CATALOGUE: &[BinaryPatch] = &[
    BinaryPatch {
        name: "widescreen_aspect",
        description: "unlock 16:9 aspect ratio",
        target: PatchTarget::Exe,
        offset: 0x0014_E035,
        // 4:3 -> 16:9 as little-endian f32
        expected: &[0xAB, 0xAA, 0xAA, 0x3F],
        replacement: &[0x39, 0x8E, 0xE3, 0x3F],
        applies_when: PatchCondition::Always,
    },
    BinaryPatch {
        name: "draw_distance_cap",
        description: "raise terrain draw distance cap",
        target: PatchTarget::Exe,
        offset: 0x0019_C2F0,
        expected: &[0x00, 0x00, 0x7A, 0x43],
        replacement: &[0x00, 0x00, 0xFA, 0x43],
        applies_when: PatchCondition::CommunityRemaster,
    },
    BinaryPatch {
        name: "quest_timer_fix",
        description: "fix the 60-minute convoy quest timer rollover",
        target: PatchTarget::Exe,
        offset: 0x000F_81B6,
        expected: &[0x76, 0x04],
        replacement: &[0x90, 0x90],
        applies_when: PatchCondition::CommunityPatch,
    },
    BinaryPatch {
        name: "vanilla_savegame_guard",
        description: "keep vanilla savegame signature intact",
        target: PatchTarget::Exe,
        offset: 0x0011_4D60,
        expected: &[0x85, 0xC0, 0x74, 0x12],
        replacement: &[0x85, 0xC0, 0xEB, 0x12],
        applies_when: PatchCondition::VanillaMod,
    },
    BinaryPatch {
        name: "hd_render_targets",
        description: "enable high-resolution render targets",
        target: PatchTarget::RenderDll,
        offset: 0x0002_6A40,
        expected: &[0x00, 0x04, 0x00, 0x00],
        replacement: &[0x00, 0x10, 0x00, 0x00],
        applies_when: PatchCondition::CommunityRemaster,
    },
    BinaryPatch {
        name: "borderless_window",
        description: "borderless windowed mode",
        target: PatchTarget::Exe,
        offset: 0x000C_9A14,
        expected: &[0x00, 0x00, 0xCF, 0x00],
        replacement: &[0x00, 0x00, 0x0B, 0x86],
        applies_when: PatchCondition::Feature("borderless"),
    },
];

// Parameter patch locations.  Offsets and coefficient pairs are data; the
// damage table lists (ratio at reference gravity, offset) pairs recomputed
// whenever gravity changes.
pub const GRAVITY_OFFSET: u64 = 0x0012_9C78;
pub const REFERENCE_GRAVITY: f64 = -9.8;
pub const DAMAGE_COEFF_TABLE: &[(f64, u64)] = &[
    (0.2, 0x0012_9C90),
    (0.35, 0x0012_9C9C),
    (0.6, 0x0012_9CA8),
];
pub const SKINS_IN_SHOP_OFFSET: u64 = 0x0016_42D1;
pub const BLAST_FRIENDLY_FIRE_OFFSET: u64 = 0x000E_77A2;
/// Conditional jump skipping friendly-fire damage, NOPed out when the
/// toggle is on.
pub const BLAST_FRIENDLY_FIRE_JUMP: [u8; 2] = [0x74, 0x2A];
pub const BLAST_FRIENDLY_FIRE_NOP: [u8; 2] = [0x90, 0x90];
pub const GAME_FONT_OFFSET: u64 = 0x001A_5E00;
/// Reserved region for the font name: one length byte plus the name,
/// zero-filled to the region size.
pub const GAME_FONT_REGION: usize = 32;

/// Which mod kind is being installed, for `applies_when` evaluation.
#[derive(Debug, Clone, Default)]
pub struct PatchContext {
    pub community_patch: bool,
    pub community_remaster: bool,
    /// Feature flags enabled for this install.
    pub features: Vec<String>,
}

impl PatchContext {
    fn accepts(&self, condition: PatchCondition) -> bool {
        match condition {
            PatchCondition::Always => true,
            PatchCondition::CommunityPatch => self.community_patch,
            PatchCondition::CommunityRemaster => self.community_remaster,
            PatchCondition::VanillaMod => !self.community_patch && !self.community_remaster,
            PatchCondition::Feature(flag) => self.features.iter().any(|f| f == flag),
        }
    }
}

/// How a single patch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// The bytes already equal the replacement; informational, not fatal.
    AlreadyApplied,
}

/// Record of one applied (or skipped-as-applied) patch.
#[derive(Debug, Clone)]
pub struct AppliedPatch {
    pub name: String,
    pub description: String,
    pub outcome: PatchOutcome,
}

fn read_at(path: &Path, offset: u64, len: usize) -> Result<Option<Vec<u8>>, PatchError> {
    let mut file = OpenOptions::new().read(true).open(path)?;
    let total = file.metadata()?.len();
    if offset + len as u64 > total {
        return Ok(None);
    }
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(Some(buf))
}

fn write_at(path: &Path, offset: u64, bytes: &[u8]) -> Result<(), PatchError> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    Ok(())
}

/// Apply one catalogue entry to `path`.
///
/// The file is written only when the pre-image matches exactly; any other
/// content at the offset fails with [`PatchError::PreconditionFailed`] and
/// leaves the file byte-identical.
pub fn apply_patch(path: &Path, patch: &BinaryPatch) -> Result<PatchOutcome, PatchError> {
    let current = read_at(path, patch.offset, patch.expected.len())?.ok_or_else(|| {
        PatchError::PreconditionFailed {
            name: patch.name.to_owned(),
        }
    })?;

    if current == patch.replacement {
        debug!(patch = patch.name, "already applied");
        return Ok(PatchOutcome::AlreadyApplied);
    }
    if current != patch.expected {
        return Err(PatchError::PreconditionFailed {
            name: patch.name.to_owned(),
        });
    }

    write_at(path, patch.offset, patch.replacement)?;
    info!(patch = patch.name, "applied: {}", patch.description);
    Ok(PatchOutcome::Applied)
}

/// Apply every catalogue entry accepted by `context`, in catalogue order.
///
/// When the context is a remaster install, the render DLL must exist before
/// any executable patch is attempted.
pub fn apply_catalogue(
    exe_path: &Path,
    render_dll_path: &Path,
    context: &PatchContext,
) -> Result<Vec<AppliedPatch>, PatchError> {
    if context.community_remaster && !render_dll_path.is_file() {
        return Err(PatchError::DxRenderDllNotFound(render_dll_path.to_path_buf()));
    }

    let mut applied = Vec::new();
    for patch in PATCH_CATALOGUE {
        if !context.accepts(patch.applies_when) {
            continue;
        }
        let target = match patch.target {
            PatchTarget::Exe => exe_path,
            PatchTarget::RenderDll => render_dll_path,
        };
        let outcome = apply_patch(target, patch)?;
        applied.push(AppliedPatch {
            name: patch.name.to_owned(),
            description: patch.description.to_owned(),
            outcome,
        });
    }
    Ok(applied)
}

/// Apply the parameter patches requested by `options` to the executable.
pub fn apply_parameter_patches(
    exe_path: &Path,
    options: &PatcherOptions,
) -> Result<Vec<AppliedPatch>, PatchError> {
    let mut applied = Vec::new();

    if let Some(gravity) = options.gravity {
        let gravity = gravity.clamp(-100.0, -1.0);
        write_at(exe_path, GRAVITY_OFFSET, &(gravity as f32).to_le_bytes())?;
        for (ratio, offset) in DAMAGE_COEFF_TABLE {
            let coeff = (ratio * gravity / REFERENCE_GRAVITY) as f32;
            write_at(exe_path, *offset, &coeff.to_le_bytes())?;
        }
        applied.push(AppliedPatch {
            name: "gravity".to_owned(),
            description: format!("gravity set to {gravity}"),
            outcome: PatchOutcome::Applied,
        });
    }

    if let Some(skins) = options.skins_in_shop {
        let skins = skins.clamp(8, 32);
        write_at(exe_path, SKINS_IN_SHOP_OFFSET, &[skins])?;
        applied.push(AppliedPatch {
            name: "skins_in_shop".to_owned(),
            description: format!("shop skin slots set to {skins}"),
            outcome: PatchOutcome::Applied,
        });
    }

    if let Some(enabled) = options.blast_damage_friendly_fire {
        let bytes = if enabled {
            BLAST_FRIENDLY_FIRE_NOP
        } else {
            BLAST_FRIENDLY_FIRE_JUMP
        };
        write_at(exe_path, BLAST_FRIENDLY_FIRE_OFFSET, &bytes)?;
        applied.push(AppliedPatch {
            name: "blast_damage_friendly_fire".to_owned(),
            description: format!("blast friendly fire {}", if enabled { "on" } else { "off" }),
            outcome: PatchOutcome::Applied,
        });
    }

    if let Some(font) = &options.game_font {
        write_game_font(exe_path, font)?;
        applied.push(AppliedPatch {
            name: "game_font".to_owned(),
            description: format!("game font set to {font}"),
            outcome: PatchOutcome::Applied,
        });
    }

    Ok(applied)
}

/// Encode the font name as a length-prefixed ASCII blob, zero-filled to the
/// reserved region.
fn write_game_font(exe_path: &Path, font: &str) -> Result<(), PatchError> {
    if !font.is_ascii() {
        return Err(PatchError::InvalidParameter {
            name: "game_font".to_owned(),
            reason: "font name must be ASCII".to_owned(),
        });
    }
    if font.len() > GAME_FONT_REGION - 1 {
        return Err(PatchError::InvalidParameter {
            name: "game_font".to_owned(),
            reason: format!("font name longer than {} bytes", GAME_FONT_REGION - 1),
        });
    }
    let mut blob = vec![0u8; GAME_FONT_REGION];
    blob[0] = font.len() as u8;
    blob[1..=font.len()].copy_from_slice(font.as_bytes());
    write_at(exe_path, GAME_FONT_OFFSET, &blob)?;
    Ok(())
}
