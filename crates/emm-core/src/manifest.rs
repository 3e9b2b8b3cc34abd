//! Typed manifest model.
//!
//! Manifests arrive as loosely-shaped YAML: scalars where lists are allowed,
//! booleans spelled as strings, numbers standing in for version literals.
//! Deserialization happens into a raw layer of untagged helpers
//! ([`OneOrMany`], [`BoolOrString`], [`StringOrNumber`]); a normalisation
//! pass then produces the immutable [`Manifest`] that the rest of the system
//! works with, so no ambiguity survives past this module.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::version::{ConstraintSet, Relation, Version};

/// The mod manager's own version, compared against manifest tool
/// requirements (with the identifier stripped).
pub const TOOL_VERSION: &str = "1.14.2";

/// Tool requirement assumed when a manifest does not declare one.
pub const DEFAULT_TOOL_REQUIREMENT: &str = ">=1.10";

/// Reserved slug of the community patch, subject to special resolver rules.
pub const COMMUNITY_PATCH: &str = "community_patch";

/// Reserved slug of the community remaster.
pub const COMMUNITY_REMASTER: &str = "community_remaster";

/// Option names that collide with keys of the installed-mods record.
pub const RESERVED_OPTION_NAMES: [&str; 4] = ["base", "display_name", "build", "version"];

const NAME_MAX: usize = 64;
const DESCRIPTION_MAX: usize = 2048;
const AUTHORS_MAX: usize = 256;
const VERSION_LITERAL_MAX: usize = 64;
const BUILD_MAX: usize = 7;
const URL_MAX: usize = 128;
const OPTION_DESCRIPTION_MAX: usize = 256;
const SETTING_DESCRIPTION_MAX: usize = 128;

/// Languages with first-class support.  Unknown languages still load but are
/// flagged so the UI can fall back to the raw code.
pub const KNOWN_LANGUAGES: [&str; 6] = ["eng", "ru", "ua", "de", "pl", "tr"];

/// Is `lang` one of the languages the tool ships strings for?
pub fn is_known_language(lang: &str) -> bool {
    KNOWN_LANGUAGES.contains(&lang)
}

// ---------------------------------------------------------------------------
// Raw layer
// ---------------------------------------------------------------------------

/// A field that may be a single value or a list of values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// A boolean that may be spelled `true` or `"true"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BoolOrString {
    Bool(bool),
    Text(String),
}

impl BoolOrString {
    fn normalize(self, field: &str) -> Result<bool, LoadError> {
        match self {
            BoolOrString::Bool(value) => Ok(value),
            BoolOrString::Text(text) => match text.trim().to_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(LoadError::SchemaMismatch(format!(
                    "field '{field}': expected a boolean, found '{other}'"
                ))),
            },
        }
    }
}

/// A scalar that may arrive as a YAML string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrNumber {
    Text(String),
    Int(i64),
    Float(f64),
}

impl StringOrNumber {
    fn normalize(self) -> String {
        match self {
            StringOrNumber::Text(text) => text,
            StringOrNumber::Int(value) => value.to_string(),
            StringOrNumber::Float(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDependency {
    pub name: OneOrMany<String>,
    #[serde(default)]
    pub versions: Option<OneOrMany<StringOrNumber>>,
    #[serde(default)]
    pub optional_content: Option<OneOrMany<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPatcherOptions {
    #[serde(default)]
    pub gravity: Option<f64>,
    #[serde(default)]
    pub skins_in_shop: Option<i64>,
    #[serde(default)]
    pub blast_damage_friendly_fire: Option<BoolOrString>,
    #[serde(default)]
    pub game_font: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInstallSetting {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOptionalContent {
    pub name: String,
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub default_option: Option<String>,
    #[serde(default)]
    pub install_settings: Option<Vec<RawInstallSetting>>,
    #[serde(default)]
    pub no_base_content: Option<BoolOrString>,
    #[serde(default)]
    pub patcher_options: Option<RawPatcherOptions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawScreenshot {
    pub img: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub compare: Option<String>,
}

/// The manifest exactly as it deserializes from YAML.  Unknown fields are
/// ignored for forward compatibility.
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub authors: String,
    pub version: StringOrNumber,
    pub build: StringOrNumber,
    pub language: String,
    pub installment: Installment,
    pub prerequisites: Vec<RawDependency>,
    #[serde(default)]
    pub incompatible: Option<Vec<RawDependency>>,
    #[serde(default)]
    pub patcher_version_requirement: Option<OneOrMany<StringOrNumber>>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub translations: Option<Vec<String>>,
    #[serde(default)]
    pub variants: Option<Vec<String>>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub trailer_link: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub install_banner: Option<String>,
    #[serde(default)]
    pub screenshots: Option<Vec<RawScreenshot>>,
    #[serde(default)]
    pub change_log: Option<String>,
    #[serde(default)]
    pub other_info: Option<String>,
    #[serde(default)]
    pub patcher_options: Option<RawPatcherOptions>,
    #[serde(default)]
    pub no_base_content: Option<BoolOrString>,
    #[serde(default)]
    pub optional_content: Option<Vec<RawOptionalContent>>,
}

// ---------------------------------------------------------------------------
// Normalized model
// ---------------------------------------------------------------------------

/// The target game a mod is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Installment {
    ExMachina,
    M113,
    Arcade,
}

impl fmt::Display for Installment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Installment::ExMachina => "exmachina",
            Installment::M113 => "m113",
            Installment::Arcade => "arcade",
        };
        f.write_str(name)
    }
}

/// Closed set of content tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tag {
    Bugfix,
    Gameplay,
    Story,
    Visual,
    Audio,
    Weapons,
    Vehicles,
    Ui,
    Balance,
    Humor,
    Uncategorized,
}

impl Tag {
    /// Case-insensitive lookup; unknown strings yield `None` and are dropped
    /// by the normaliser.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "BUGFIX" => Some(Tag::Bugfix),
            "GAMEPLAY" => Some(Tag::Gameplay),
            "STORY" => Some(Tag::Story),
            "VISUAL" => Some(Tag::Visual),
            "AUDIO" => Some(Tag::Audio),
            "WEAPONS" => Some(Tag::Weapons),
            "VEHICLES" => Some(Tag::Vehicles),
            "UI" => Some(Tag::Ui),
            "BALANCE" => Some(Tag::Balance),
            "HUMOR" => Some(Tag::Humor),
            "UNCATEGORIZED" => Some(Tag::Uncategorized),
            _ => None,
        }
    }
}

/// One prerequisite or incompatibility entry: alternatives ORed by name,
/// optionally narrowed by a version constraint set and required options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRule {
    /// Alternative mod names; any one satisfies the name check.
    pub names: Vec<String>,
    /// Constraints on the installed version; empty means any.
    pub constraints: ConstraintSet,
    /// Optional-content names that must be installed (prerequisites) or
    /// whose presence triggers the incompatibility.
    pub required_options: Vec<String>,
}

/// Numeric and toggle patches a mod may request from the binary patcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatcherOptions {
    pub gravity: Option<f64>,
    pub skins_in_shop: Option<u8>,
    pub blast_damage_friendly_fire: Option<bool>,
    pub game_font: Option<String>,
}

impl PatcherOptions {
    pub fn is_empty(&self) -> bool {
        self.gravity.is_none()
            && self.skins_in_shop.is_none()
            && self.blast_damage_friendly_fire.is_none()
            && self.game_font.is_none()
    }

    /// Overlay `other` on top of `self`: set fields win.  Used when a
    /// selected optional content refines the base mod's options.
    pub fn overlay(&mut self, other: &PatcherOptions) {
        if other.gravity.is_some() {
            self.gravity = other.gravity;
        }
        if other.skins_in_shop.is_some() {
            self.skins_in_shop = other.skins_in_shop;
        }
        if other.blast_damage_friendly_fire.is_some() {
            self.blast_damage_friendly_fire = other.blast_damage_friendly_fire;
        }
        if other.game_font.is_some() {
            self.game_font = other.game_font.clone();
        }
    }
}

/// What a simple or settings-backed option installs by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultChoice {
    /// Install the option (the default when nothing is declared; an
    /// explicit `"install"` means the same thing).
    Install,
    /// Leave the option out.
    Skip,
    /// Pre-select one of the declared install settings.
    Setting(String),
}

/// A sub-choice of a settings-backed option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSetting {
    pub name: String,
    pub description: String,
}

/// A named, install-time toggleable sub-package of a mod.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionalContent {
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Mutually exclusive sub-choices; empty for flat yes/skip options.
    pub install_settings: Vec<InstallSetting>,
    pub default_choice: DefaultChoice,
    pub no_base_content: bool,
    pub patcher_options: PatcherOptions,
}

impl OptionalContent {
    /// Is `value` a legal selection value for this option?  Flat options
    /// accept only `yes`/`skip`; settings-backed options accept `skip` or a
    /// declared setting name.
    pub fn accepts(&self, value: &str) -> bool {
        match value {
            "skip" => true,
            "yes" => self.install_settings.is_empty(),
            setting => self.install_settings.iter().any(|s| s.name == setting),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub img: String,
    pub text: String,
    pub compare: String,
}

/// A fully normalised mod manifest, immutable after load.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub authors: String,
    pub version: Version,
    pub build: String,
    pub language: String,
    pub known_language: bool,
    pub installment: Installment,
    pub release_date: String,
    pub tags: Vec<Tag>,

    pub url: String,
    pub trailer_url: String,
    pub logo: Option<String>,
    pub install_banner: Option<String>,
    pub screenshots: Vec<Screenshot>,
    pub change_log: Option<String>,
    pub other_info: Option<String>,

    pub prerequisites: Vec<DependencyRule>,
    pub incompatible: Vec<DependencyRule>,
    pub tool_requirement: ConstraintSet,

    pub no_base_content: bool,
    pub optional_content: Vec<OptionalContent>,
    pub patcher_options: PatcherOptions,

    /// Languages this manifest declares translations for.
    pub declared_translations: Vec<String>,
    /// Variant slugs this manifest declares siblings for.
    pub declared_variants: Vec<String>,

    /// Directory the manifest was loaded from (the mod's distribution root).
    pub manifest_dir: PathBuf,
}

fn cap(text: &str, max: usize) -> String {
    text.trim().chars().take(max).collect()
}

/// Strip path-meaningful characters from a slug and cap its length.
fn sanitize_slug(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '.'))
        .collect();
    cap(&cleaned, NAME_MAX)
}

fn normalize_dependencies(
    raw: Vec<RawDependency>,
    default_relation: Relation,
) -> Result<Vec<DependencyRule>, LoadError> {
    raw.into_iter()
        .map(|dep| {
            let names: Vec<String> = dep
                .name
                .into_vec()
                .into_iter()
                .map(|n| sanitize_slug(&n))
                .collect();
            let literals: Vec<String> = dep
                .versions
                .map(OneOrMany::into_vec)
                .unwrap_or_default()
                .into_iter()
                .map(StringOrNumber::normalize)
                .collect();
            let constraints = ConstraintSet::parse_all(&literals, default_relation)?;
            let required_options = dep
                .optional_content
                .map(OneOrMany::into_vec)
                .unwrap_or_default();
            Ok(DependencyRule {
                names,
                constraints,
                required_options,
            })
        })
        .collect()
}

fn normalize_patcher_options(raw: RawPatcherOptions) -> Result<PatcherOptions, LoadError> {
    if let Some(gravity) = raw.gravity {
        if !(-100.0..=-1.0).contains(&gravity) {
            return Err(LoadError::SchemaMismatch(format!(
                "field 'gravity': {gravity} is outside [-100.0, -1.0]"
            )));
        }
    }
    let skins_in_shop = match raw.skins_in_shop {
        Some(count) if (8..=32).contains(&count) => Some(count as u8),
        Some(count) => {
            return Err(LoadError::SchemaMismatch(format!(
                "field 'skins_in_shop': {count} is outside [8, 32]"
            )))
        }
        None => None,
    };
    let blast_damage_friendly_fire = raw
        .blast_damage_friendly_fire
        .map(|value| value.normalize("blast_damage_friendly_fire"))
        .transpose()?;
    Ok(PatcherOptions {
        gravity: raw.gravity,
        skins_in_shop,
        blast_damage_friendly_fire,
        game_font: raw.game_font,
    })
}

fn normalize_optional_content(raw: RawOptionalContent) -> Result<OptionalContent, LoadError> {
    let name = sanitize_slug(&raw.name);
    if RESERVED_OPTION_NAMES.contains(&name.as_str()) {
        return Err(LoadError::ReservedOptionName(name));
    }

    let install_settings: Vec<InstallSetting> = raw
        .install_settings
        .unwrap_or_default()
        .into_iter()
        .map(|setting| InstallSetting {
            name: cap(&setting.name, NAME_MAX),
            description: cap(&setting.description, SETTING_DESCRIPTION_MAX),
        })
        .collect();
    if install_settings.len() == 1 {
        return Err(LoadError::SchemaMismatch(format!(
            "option '{name}': install_settings needs at least two entries"
        )));
    }

    let default_choice = match raw.default_option.as_deref().map(str::trim) {
        None => DefaultChoice::Install,
        Some(choice) if choice.eq_ignore_ascii_case("skip") => DefaultChoice::Skip,
        Some(choice) if install_settings.iter().any(|s| s.name == choice) => {
            DefaultChoice::Setting(choice.to_owned())
        }
        Some(choice) if install_settings.is_empty() && choice.eq_ignore_ascii_case("install") => {
            DefaultChoice::Install
        }
        Some(other) => {
            return Err(LoadError::SchemaMismatch(format!(
                "option '{name}': default_option '{other}' is neither 'skip' nor a declared setting"
            )))
        }
    };

    let no_base_content = raw
        .no_base_content
        .map(|value| value.normalize("no_base_content"))
        .transpose()?
        .unwrap_or(false);
    let patcher_options = raw
        .patcher_options
        .map(normalize_patcher_options)
        .transpose()?
        .unwrap_or_default();

    Ok(OptionalContent {
        name,
        display_name: cap(&raw.display_name, NAME_MAX),
        description: cap(&raw.description, OPTION_DESCRIPTION_MAX),
        install_settings,
        default_choice,
        no_base_content,
        patcher_options,
    })
}

impl Manifest {
    /// Parse manifest YAML bytes and normalise them.
    ///
    /// `manifest_dir` is the directory the manifest sits in; content
    /// directory checks and copy sources are resolved against it.
    pub fn from_yaml(bytes: &[u8], manifest_dir: &std::path::Path) -> Result<Self, LoadError> {
        let raw: RawManifest = serde_yaml::from_slice(bytes)
            .map_err(|err| LoadError::SchemaMismatch(err.to_string()))?;
        Self::from_raw(raw, manifest_dir.to_path_buf())
    }

    /// Normalise a raw manifest, enforcing the structural rules that serde
    /// cannot express.
    pub fn from_raw(raw: RawManifest, manifest_dir: PathBuf) -> Result<Self, LoadError> {
        let name = sanitize_slug(&raw.name);

        let version_literal = cap(&raw.version.normalize(), VERSION_LITERAL_MAX);
        let version = Version::parse(&version_literal)?;

        let prerequisites = normalize_dependencies(raw.prerequisites, Relation::Eq)?;
        for prereq in &prerequisites {
            if prereq.names.iter().any(|n| n == COMMUNITY_PATCH)
                && !prereq.required_options.is_empty()
            {
                return Err(LoadError::ForbiddenPrerequisite(COMMUNITY_PATCH.to_owned()));
            }
        }

        let incompatible = normalize_dependencies(raw.incompatible.unwrap_or_default(), Relation::Eq)?;
        for incomp in &incompatible {
            if incomp.names.iter().any(|n| n == COMMUNITY_PATCH) {
                return Err(LoadError::ForbiddenIncompatible(COMMUNITY_PATCH.to_owned()));
            }
        }

        let tool_requirement = match raw.patcher_version_requirement {
            Some(literals) => {
                let literals: Vec<String> = literals
                    .into_vec()
                    .into_iter()
                    .map(StringOrNumber::normalize)
                    .collect();
                ConstraintSet::parse_all(&literals, Relation::Ge)?
            }
            None => ConstraintSet::parse_all([DEFAULT_TOOL_REQUIREMENT], Relation::Ge)?,
        };

        let tags: Vec<Tag> = match raw.tags {
            Some(labels) => {
                // unknown labels are dropped rather than failing the load
                let set: BTreeSet<Tag> =
                    labels.iter().filter_map(|l| Tag::from_label(l)).collect();
                if set.is_empty() {
                    vec![Tag::Uncategorized]
                } else {
                    set.into_iter().collect()
                }
            }
            None => vec![Tag::Uncategorized],
        };

        let screenshots = raw
            .screenshots
            .unwrap_or_default()
            .into_iter()
            .map(|shot| Screenshot {
                img: shot.img,
                text: shot.text.map(|t| t.trim().to_owned()).unwrap_or_default(),
                compare: shot.compare.unwrap_or_default(),
            })
            .collect();

        let no_base_content = raw
            .no_base_content
            .map(|value| value.normalize("no_base_content"))
            .transpose()?
            .unwrap_or(false);

        let optional_content = raw
            .optional_content
            .unwrap_or_default()
            .into_iter()
            .map(normalize_optional_content)
            .collect::<Result<Vec<_>, _>>()?;

        let patcher_options = raw
            .patcher_options
            .map(normalize_patcher_options)
            .transpose()?
            .unwrap_or_default();

        let language = raw.language.trim().to_lowercase();
        let known_language = is_known_language(&language);

        Ok(Self {
            name,
            display_name: cap(&raw.display_name, NAME_MAX),
            description: cap(&raw.description, DESCRIPTION_MAX),
            authors: cap(&raw.authors, AUTHORS_MAX),
            version,
            build: cap(&raw.build.normalize(), BUILD_MAX),
            language,
            known_language,
            installment: raw.installment,
            release_date: raw.release_date.map(|d| d.trim().to_owned()).unwrap_or_default(),
            tags,
            url: raw.link.map(|u| cap(&u, URL_MAX)).unwrap_or_default(),
            trailer_url: raw
                .trailer_link
                .map(|u| cap(&u, URL_MAX))
                .unwrap_or_default(),
            logo: raw.logo,
            install_banner: raw.install_banner,
            screenshots,
            change_log: raw.change_log.filter(|p| !p.is_empty()),
            other_info: raw.other_info.filter(|p| !p.is_empty()),
            prerequisites,
            incompatible,
            tool_requirement,
            no_base_content,
            optional_content,
            patcher_options,
            declared_translations: raw.translations.unwrap_or_default(),
            declared_variants: raw.variants.unwrap_or_default(),
            manifest_dir,
        })
    }

    /// Look up a declared option by name.
    pub fn option(&self, name: &str) -> Option<&OptionalContent> {
        self.optional_content.iter().find(|o| o.name == name)
    }

    /// The selection describing a default installation: base plus every
    /// option's default choice.
    pub fn default_selection(&self) -> std::collections::BTreeMap<String, String> {
        let mut selection = std::collections::BTreeMap::new();
        selection.insert("base".to_owned(), "yes".to_owned());
        for option in &self.optional_content {
            let value = match &option.default_choice {
                DefaultChoice::Install => "yes".to_owned(),
                DefaultChoice::Skip => "skip".to_owned(),
                DefaultChoice::Setting(setting) => setting.clone(),
            };
            selection.insert(option.name.clone(), value);
        }
        selection
    }
}
