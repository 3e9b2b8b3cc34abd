#[cfg(test)]
mod core_tests;

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use emm_core::probe::{EXE_FINGERPRINTS, INSTALLED_MANIFEST_REL};
use emm_install::patcher::{PatchTarget, PATCH_CATALOGUE};

/// Size of the generated stand-in binaries; larger than every catalogue and
/// fingerprint offset.
const BINARY_SIZE: usize = 0x0060_0000;

/// A temporary mock game directory that persists for the lifetime of the
/// test.
///
/// Creates a minimal game installation layout:
///
/// ```text
/// <root>/
/// ├── hta.exe           (fingerprinted, patch pre-images planted)
/// ├── dxrender9.dll     (pre-images planted)
/// └── data/
///     └── config.cfg
/// ```
pub struct MockGameDir {
    _temp: TempDir,
    root: PathBuf,
}

impl MockGameDir {
    /// Create a mock game whose executable carries the fingerprint of
    /// `exe_version` (e.g. `"1.02"`).
    pub fn new(exe_version: &str) -> std::io::Result<Self> {
        let temp = TempDir::new()?;
        let root = temp.path().to_path_buf();

        let fingerprint = EXE_FINGERPRINTS
            .iter()
            .find(|fp| fp.token == exe_version)
            .unwrap_or(&EXE_FINGERPRINTS[0]);

        let mut exe = vec![0u8; BINARY_SIZE];
        let at = fingerprint.offset as usize;
        exe[at..at + fingerprint.magic.len()].copy_from_slice(fingerprint.magic);
        plant_preimages(&mut exe, PatchTarget::Exe);
        fs::write(root.join("hta.exe"), exe)?;

        let mut dll = vec![0u8; BINARY_SIZE];
        plant_preimages(&mut dll, PatchTarget::RenderDll);
        fs::write(root.join("dxrender9.dll"), dll)?;

        fs::create_dir_all(root.join("data"))?;
        fs::write(
            root.join("data/config.cfg"),
            r#"<config r_width="1024" r_height="768" pathToUiWindows="data\if\dialogs\UiWindows.xml"/>"#,
        )?;

        Ok(Self { _temp: temp, root })
    }

    /// Path to the mock game root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path to the mock game's data subdirectory.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Path of the installed-mods record.
    pub fn installed_manifest_path(&self) -> PathBuf {
        self.root.join(INSTALLED_MANIFEST_REL)
    }

    /// Seed the installed-mods record with raw YAML.
    pub fn set_installed(&self, yaml: &str) -> std::io::Result<()> {
        fs::write(self.installed_manifest_path(), yaml)
    }
}

fn plant_preimages(data: &mut [u8], target: PatchTarget) {
    for patch in PATCH_CATALOGUE {
        if patch.target == target {
            let at = patch.offset as usize;
            data[at..at + patch.expected.len()].copy_from_slice(patch.expected);
        }
    }
}

/// A temporary mod distribution with a `mods/` directory.
pub struct MockDistro {
    _temp: TempDir,
    root: PathBuf,
}

impl MockDistro {
    pub fn new() -> std::io::Result<Self> {
        let temp = TempDir::new()?;
        let root = temp.path().to_path_buf();
        fs::create_dir_all(root.join("mods"))?;
        Ok(Self { _temp: temp, root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn mod_dir(&self, id: &str) -> PathBuf {
        self.root.join("mods").join(id)
    }

    /// Write a mod: its manifest, the given content directories, and one
    /// marker file inside each.
    pub fn add_mod(
        &self,
        id: &str,
        manifest: &str,
        content_dirs: &[&str],
    ) -> std::io::Result<PathBuf> {
        let mod_dir = self.mod_dir(id);
        fs::create_dir_all(&mod_dir)?;
        fs::write(mod_dir.join("manifest.yaml"), manifest)?;
        for dir in content_dirs {
            let full = mod_dir.join(dir);
            fs::create_dir_all(&full)?;
            fs::write(full.join("marker.txt"), format!("{id}/{dir}"))?;
        }
        Ok(mod_dir)
    }
}

/// Minimal manifest YAML for `name`/`version`/`build` targeting exmachina.
pub fn manifest_yaml(name: &str, version: &str, build: &str) -> String {
    format!(
        r#"name: {name}
display_name: {name}
description: test mod
authors: tester
version: "{version}"
build: "{build}"
language: eng
installment: exmachina
prerequisites: []
"#
    )
}
