//! Manifest discovery, validation and loading.
//!
//! A distribution is a directory (or archive) holding
//! `mods/<mod_id>/manifest.yaml` plus the mod's content directories.
//! Loading a mod parses and normalises the primary manifest, pulls in
//! translation and variant siblings by naming convention, and verifies that
//! every declared content directory actually exists — against the
//! filesystem, or against an archive's file listing when the distribution
//! has not been unpacked yet.
//!
//! Load failures are recorded per manifest and never abort sibling loads.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::LoadError;
use crate::manifest::Manifest;

/// A loaded mod: the primary manifest plus its translation and variant
/// siblings.  Translations are parent-owned and keyed by language; the
/// primary itself is reachable through [`LoadedMod::translations`].
#[derive(Debug, Clone)]
pub struct LoadedMod {
    pub manifest: Manifest,
    /// Translation manifests keyed by language, excluding the primary.
    pub translation_manifests: BTreeMap<String, Manifest>,
    /// Variant manifests keyed by variant slug.
    pub variants: BTreeMap<String, Manifest>,
    /// Path of the primary manifest file.
    pub manifest_path: PathBuf,
    /// md5 of the primary manifest bytes, used for change detection.
    pub content_hash: String,
}

impl LoadedMod {
    /// All translations including the primary, keyed by language.
    pub fn translations(&self) -> impl Iterator<Item = (&str, &Manifest)> {
        std::iter::once((self.manifest.language.as_str(), &self.manifest)).chain(
            self.translation_manifests
                .iter()
                .map(|(lang, m)| (lang.as_str(), m)),
        )
    }

    /// The manifest for `lang`, falling back to the primary.
    pub fn localized(&self, lang: &str) -> &Manifest {
        if self.manifest.language == lang {
            &self.manifest
        } else {
            self.translation_manifests.get(lang).unwrap_or(&self.manifest)
        }
    }
}

/// A per-manifest load failure, surfaced with the offending path.
#[derive(Debug)]
pub struct LoadFailure {
    pub manifest_path: PathBuf,
    pub error: LoadError,
}

/// Result of enumerating a distribution directory.
#[derive(Debug, Default)]
pub struct DistributionScan {
    pub mods: Vec<LoadedMod>,
    pub failures: Vec<LoadFailure>,
}

/// Compute the content hash used for change detection.
pub fn manifest_hash(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Load every mod under `<distro>/mods/`, yielding after each manifest.
///
/// Broken manifests land in [`DistributionScan::failures`]; a cancelled scan
/// returns whatever was loaded so far.
pub fn scan_distribution(distro: &Path, cancel: &CancelToken) -> DistributionScan {
    let mut scan = DistributionScan::default();
    let mods_root = distro.join("mods");

    if !mods_root.is_dir() {
        warn!(path = %mods_root.display(), "cannot enumerate distribution");
        return scan;
    }

    let mod_dirs: Vec<PathBuf> = walkdir::WalkDir::new(&mods_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect();

    for mod_dir in mod_dirs {
        if cancel.is_cancelled() {
            debug!("distribution scan cancelled");
            break;
        }
        let manifest_path = mod_dir.join("manifest.yaml");
        if !manifest_path.is_file() {
            continue;
        }
        match load_mod_dir(&mod_dir) {
            Ok(loaded) => scan.mods.push(loaded),
            Err(error) => {
                warn!(path = %manifest_path.display(), %error, "manifest failed to load");
                scan.failures.push(LoadFailure {
                    manifest_path,
                    error,
                });
            }
        }
    }

    scan
}

/// Load a single mod from its distribution directory, with content
/// directory checks enforced.
pub fn load_mod_dir(mod_dir: &Path) -> Result<LoadedMod, LoadError> {
    load_mod_dir_with(mod_dir, true)
}

/// Load a single mod, optionally skipping the content directory checks
/// (used by tooling that inspects manifests outside a full distribution).
pub fn load_mod_dir_with(mod_dir: &Path, check_content: bool) -> Result<LoadedMod, LoadError> {
    let manifest_path = mod_dir.join("manifest.yaml");
    let bytes = fs::read(&manifest_path)?;
    let content_hash = manifest_hash(&bytes);
    let manifest = Manifest::from_yaml(&bytes, mod_dir)?;

    if check_content {
        validate_content_dirs(&manifest, mod_dir)?;
    }

    let translation_manifests = load_translations(&manifest, mod_dir)?;
    let variants = load_variants(&manifest, mod_dir)?;

    debug!(
        name = %manifest.name,
        version = %manifest.version,
        translations = translation_manifests.len(),
        variants = variants.len(),
        "mod loaded"
    );

    Ok(LoadedMod {
        manifest,
        translation_manifests,
        variants,
        manifest_path,
        content_hash,
    })
}

fn load_translations(
    parent: &Manifest,
    mod_dir: &Path,
) -> Result<BTreeMap<String, Manifest>, LoadError> {
    let mut loaded = BTreeMap::new();
    for lang in &parent.declared_translations {
        let path = mod_dir.join(format!("manifest_{lang}.yaml"));
        if !path.is_file() {
            return Err(LoadError::MissingTranslation { lang: lang.clone() });
        }
        let bytes = fs::read(&path)?;
        let translation = Manifest::from_yaml(&bytes, mod_dir)?;
        check_translation_identity(parent, &translation, lang)?;
        loaded.insert(lang.clone(), translation);
    }
    Ok(loaded)
}

fn check_translation_identity(
    parent: &Manifest,
    translation: &Manifest,
    lang: &str,
) -> Result<(), LoadError> {
    if translation.name != parent.name {
        return Err(LoadError::TranslationMetadataMismatch {
            lang: lang.to_owned(),
            field: "name",
            found: translation.name.clone(),
            expected: parent.name.clone(),
        });
    }
    if translation.version != parent.version {
        return Err(LoadError::TranslationMetadataMismatch {
            lang: lang.to_owned(),
            field: "version",
            found: translation.version.to_string(),
            expected: parent.version.to_string(),
        });
    }
    if translation.tags != parent.tags {
        return Err(LoadError::TranslationMetadataMismatch {
            lang: lang.to_owned(),
            field: "tags",
            found: format!("{:?}", translation.tags),
            expected: format!("{:?}", parent.tags),
        });
    }
    if translation.language != lang {
        return Err(LoadError::TranslationMetadataMismatch {
            lang: lang.to_owned(),
            field: "language",
            found: translation.language.clone(),
            expected: lang.to_owned(),
        });
    }
    if translation.language == parent.language {
        return Err(LoadError::TranslationMetadataMismatch {
            lang: lang.to_owned(),
            field: "language",
            found: translation.language.clone(),
            expected: format!("any language other than '{}'", parent.language),
        });
    }
    Ok(())
}

fn load_variants(
    parent: &Manifest,
    mod_dir: &Path,
) -> Result<BTreeMap<String, Manifest>, LoadError> {
    let mut loaded = BTreeMap::new();
    for slug in &parent.declared_variants {
        let path = mod_dir.join(format!("manifest_variant_{slug}.yaml"));
        if !path.is_file() {
            return Err(LoadError::MissingContentDirectory(path));
        }
        let bytes = fs::read(&path)?;
        let variant = Manifest::from_yaml(&bytes, mod_dir)?;
        if variant.name != parent.name {
            return Err(LoadError::VariantMetadataMismatch {
                slug: slug.clone(),
                field: "name",
                found: variant.name.clone(),
                expected: parent.name.clone(),
            });
        }
        if variant.version != parent.version {
            return Err(LoadError::VariantMetadataMismatch {
                slug: slug.clone(),
                field: "version",
                found: variant.version.to_string(),
                expected: parent.version.to_string(),
            });
        }
        loaded.insert(slug.clone(), variant);
    }
    Ok(loaded)
}

/// Verify every content directory the manifest declares exists on disk.
pub fn validate_content_dirs(manifest: &Manifest, mod_dir: &Path) -> Result<(), LoadError> {
    if !manifest.no_base_content {
        let data = mod_dir.join("data");
        if !data.is_dir() {
            return Err(LoadError::MissingContentDirectory(data));
        }
    }
    for option in &manifest.optional_content {
        let option_dir = mod_dir.join(&option.name);
        if !option_dir.is_dir() {
            return Err(LoadError::MissingContentDirectory(option_dir));
        }
        let shared = option_dir.join("data");
        if !shared.is_dir() {
            return Err(LoadError::MissingContentDirectory(shared));
        }
        for setting in &option.install_settings {
            let setting_dir = option_dir.join(&setting.name);
            if !setting_dir.is_dir() {
                return Err(LoadError::MissingContentDirectory(setting_dir));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Archive-backed distributions
// ---------------------------------------------------------------------------

/// The file listing of a zip/7z distribution archive.  Directory entries are
/// stored with a trailing `/`; 7z entries with no stream count as
/// directories.
#[derive(Debug, Clone, Default)]
pub struct ArchiveListing {
    entries: Vec<String>,
}

impl ArchiveListing {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Read the listing of a `.zip` archive.
    pub fn from_zip(path: &Path) -> Result<Self, LoadError> {
        let file = fs::File::open(path)?;
        let archive = zip::ZipArchive::new(file)
            .map_err(|err| LoadError::ArchiveListing(err.to_string()))?;
        Ok(Self {
            entries: archive.file_names().map(str::to_owned).collect(),
        })
    }

    /// Read the listing of a `.7z` archive.
    pub fn from_7z(path: &Path) -> Result<Self, LoadError> {
        let reader = sevenz_rust::SevenZReader::open(path, sevenz_rust::Password::empty())
            .map_err(|err| LoadError::ArchiveListing(err.to_string()))?;
        let entries = reader
            .archive()
            .files
            .iter()
            .map(|entry| {
                let name = entry.name().replace('\\', "/");
                if entry.is_directory() || !entry.has_stream() {
                    format!("{}/", name.trim_end_matches('/'))
                } else {
                    name
                }
            })
            .collect();
        Ok(Self { entries })
    }

    /// Does the listing contain `dir` (with or without trailing slash), or
    /// any entry beneath it?
    pub fn has_dir(&self, dir: &str) -> bool {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.entries
            .iter()
            .any(|entry| entry == &prefix || entry.starts_with(&prefix))
    }
}

/// Parse manifest bytes taken out of an archive and verify its declared
/// content directories against the archive listing.
///
/// `manifest_entry` is the manifest's path inside the archive, e.g.
/// `mods/alpha/manifest.yaml`; checks run relative to its parent.
pub fn load_archived_manifest(
    bytes: &[u8],
    listing: &ArchiveListing,
    manifest_entry: &str,
) -> Result<Manifest, LoadError> {
    let entry_norm = manifest_entry.replace('\\', "/");
    let base = match entry_norm.rfind('/') {
        Some(idx) => &entry_norm[..=idx],
        None => "",
    };
    let mod_dir = PathBuf::from(base.trim_end_matches('/'));
    let manifest = Manifest::from_yaml(bytes, &mod_dir)?;

    let missing = |rel: String| LoadError::MissingContentDirectory(PathBuf::from(rel));

    if !manifest.no_base_content {
        let data = format!("{base}data");
        if !listing.has_dir(&data) {
            return Err(missing(data));
        }
    }
    for option in &manifest.optional_content {
        let option_dir = format!("{base}{}", option.name);
        if !listing.has_dir(&option_dir) {
            return Err(missing(option_dir));
        }
        let shared = format!("{option_dir}/data");
        if !listing.has_dir(&shared) {
            return Err(missing(shared));
        }
        for setting in &option.install_settings {
            let setting_dir = format!("{option_dir}/{}", setting.name);
            if !listing.has_dir(&setting_dir) {
                return Err(missing(setting_dir));
            }
        }
    }
    for lang in &manifest.declared_translations {
        let translation = format!("{base}manifest_{lang}.yaml");
        if !listing.entries.iter().any(|entry| entry == &translation) {
            return Err(LoadError::MissingTranslation { lang: lang.clone() });
        }
    }

    Ok(manifest)
}
