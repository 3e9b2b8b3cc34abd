//! Compatibility resolution.
//!
//! Given a manifest and a game snapshot, the resolver computes four
//! orthogonal verdicts (installment, tool version, prerequisites,
//! incompatibilities) plus a reinstall verdict, and folds them into a single
//! `can_install`.  Verdicts live in a separate [`Resolution`] value rather
//! than on the manifest, so resolving is a pure function of its inputs:
//! the same (manifest, snapshot) pair always yields identical verdicts.

use std::cmp::Ordering;

use tracing::debug;

use crate::error::ResolveError;
use crate::manifest::{
    DependencyRule, Manifest, COMMUNITY_PATCH, COMMUNITY_REMASTER, TOOL_VERSION,
};
use crate::probe::{GameSnapshot, InstalledEntry};
use crate::version::{Relation, Version};

/// The mod manager's own parsed version.
pub fn tool_version() -> Version {
    Version::parse(TOOL_VERSION).unwrap_or_else(|_| Version {
        major: "1".to_owned(),
        minor: "0".to_owned(),
        patch: "0".to_owned(),
        identifier: None,
        is_numeric: true,
    })
}

/// Verdict for a single prerequisite entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementStatus {
    pub rule: DependencyRule,
    /// Human-readable rendering of the alternatives ("Beta or Gamma").
    pub label: String,
    pub satisfied: bool,
    pub error: Option<ResolveError>,
}

/// Verdict for a single incompatibility entry.  `satisfied` means the
/// incompatible configuration is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompatibilityStatus {
    pub rule: DependencyRule,
    pub label: String,
    pub satisfied: bool,
    pub error: Option<ResolveError>,
}

/// Outcome of the reinstall check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReinstallVerdict {
    /// The mod is not present in the game copy.
    NotReinstall,
    /// Same version and build; reinstalling is harmless.  `complex` marks
    /// mods with optional content, whose previous selections are forced.
    Safe { complex: bool },
    /// Same version, newer build over older; proceed with a warning.
    Unsafe { complex: bool },
    /// Mods outside the prerequisite set are installed on top.
    BlockedOtherMods(Vec<String>),
    /// The installed build is newer than the one being installed.
    BlockedNewerBuild,
    /// The installed version differs.
    BlockedOtherVersion,
}

impl ReinstallVerdict {
    pub fn is_reinstall(&self) -> bool {
        !matches!(self, ReinstallVerdict::NotReinstall)
    }

    pub fn allows_install(&self) -> bool {
        matches!(
            self,
            ReinstallVerdict::NotReinstall
                | ReinstallVerdict::Safe { .. }
                | ReinstallVerdict::Unsafe { .. }
        )
    }

    /// Complex reinstalls reuse the previously installed per-option
    /// selection instead of the caller's.
    pub fn forces_previous_selection(&self) -> bool {
        matches!(
            self,
            ReinstallVerdict::Safe { complex: true } | ReinstallVerdict::Unsafe { complex: true }
        )
    }

    fn blocking_reason(&self) -> Option<String> {
        match self {
            ReinstallVerdict::BlockedOtherMods(names) => Some(format!(
                "other mods are installed on top: {}",
                names.join(", ")
            )),
            ReinstallVerdict::BlockedNewerBuild => {
                Some("a newer build of this mod is already installed".to_owned())
            }
            ReinstallVerdict::BlockedOtherVersion => {
                Some("another version of this mod is already installed".to_owned())
            }
            _ => None,
        }
    }
}

/// The full verdict set for one (manifest, snapshot) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub installment_compatible: bool,
    pub installment_error: Option<ResolveError>,
    pub tool_compatible: bool,
    pub tool_error: Option<ResolveError>,
    pub requirements: Vec<RequirementStatus>,
    pub incompatibilities: Vec<IncompatibilityStatus>,
    pub reinstall: ReinstallVerdict,
    /// Stable reason when the reinstall verdict blocks installation.
    pub reinstall_error: Option<ResolveError>,
    /// The record being reinstalled over, when there is one.
    pub previous_install: Option<InstalledEntry>,
    pub can_install: bool,
}

impl Resolution {
    pub fn requirements_met(&self) -> bool {
        self.requirements.iter().all(|status| status.satisfied)
    }

    pub fn incompatibilities_absent(&self) -> bool {
        self.incompatibilities.iter().all(|status| status.satisfied)
    }

    /// Every stable failure reason, in verdict order.
    pub fn failures(&self) -> Vec<&ResolveError> {
        let mut failures = Vec::new();
        failures.extend(self.installment_error.as_ref());
        failures.extend(self.tool_error.as_ref());
        failures.extend(
            self.requirements
                .iter()
                .filter_map(|status| status.error.as_ref()),
        );
        failures.extend(
            self.incompatibilities
                .iter()
                .filter_map(|status| status.error.as_ref()),
        );
        failures.extend(self.reinstall_error.as_ref());
        failures
    }

    /// Blocking reinstall reason, if any.
    pub fn reinstall_blocked(&self) -> bool {
        !self.reinstall.allows_install()
    }
}

/// Compare build tokens.  Builds are opaque; ordering is shortlex (length
/// first, then lexicographic) so the common digit-string builds order
/// naturally: "7" < "10".
pub fn build_cmp(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Resolve `manifest` against `game` using the running tool version.
pub fn resolve(manifest: &Manifest, game: &GameSnapshot) -> Resolution {
    resolve_with_tool(manifest, game, &tool_version())
}

/// Resolve with an explicit tool version (tests and forward-compat checks).
pub fn resolve_with_tool(manifest: &Manifest, game: &GameSnapshot, tool: &Version) -> Resolution {
    let (installment_compatible, installment_error) = check_installment(manifest, game);
    let (tool_compatible, tool_error) = check_tool_version(manifest, tool);
    let requirements = check_requirements(manifest, game);
    let incompatibilities = check_incompatibilities(manifest, game);
    let (reinstall, previous_install) = check_reinstallability(manifest, game);

    let reinstall_error = reinstall
        .blocking_reason()
        .map(|reason| ResolveError::ReinstallBlocked { reason });

    let can_install = installment_compatible
        && tool_compatible
        && requirements.iter().all(|status| status.satisfied)
        && incompatibilities.iter().all(|status| status.satisfied)
        && reinstall.allows_install();

    debug!(
        name = %manifest.name,
        installment = installment_compatible,
        tool = tool_compatible,
        prereqs = requirements.iter().filter(|s| s.satisfied).count(),
        can_install,
        "resolved"
    );

    Resolution {
        installment_compatible,
        installment_error,
        tool_compatible,
        tool_error,
        requirements,
        incompatibilities,
        reinstall,
        reinstall_error,
        previous_install,
        can_install,
    }
}

fn check_installment(manifest: &Manifest, game: &GameSnapshot) -> (bool, Option<ResolveError>) {
    match game.installment {
        Some(installment) if installment == manifest.installment => (true, None),
        other => (
            false,
            Some(ResolveError::InstallmentMismatch {
                required: manifest.installment.to_string(),
                found: other
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "unknown".to_owned()),
            }),
        ),
    }
}

fn check_tool_version(manifest: &Manifest, tool: &Version) -> (bool, Option<ResolveError>) {
    // the tool is always treated as the released form of its version
    let tool = tool.released();
    let mut compatible = true;
    let mut pinned_older = false;

    for constraint in &manifest.tool_requirement.constraints {
        let bound = constraint.version.released();
        if !constraint.relation.evaluate(&tool, &bound) {
            compatible = false;
        }
        if constraint.relation == Relation::Eq && bound.release_cmp(&tool) == Ordering::Less {
            pinned_older = true;
        }
    }

    if compatible {
        (true, None)
    } else {
        let required = manifest.tool_requirement.to_string();
        let available = tool.to_string();
        let error = if pinned_older {
            ResolveError::ToolVersionTooNew {
                required,
                available,
            }
        } else {
            ResolveError::ToolVersionTooOld {
                required,
                available,
            }
        };
        (false, Some(error))
    }
}

/// Render the alternatives of a rule with installed display names where
/// available.
fn rule_label(rule: &DependencyRule, game: &GameSnapshot) -> String {
    let names: Vec<String> = rule
        .names
        .iter()
        .map(|name| match game.installed_content.get(name) {
            Some(entry) if !entry.display_name.is_empty() => entry.display_name.clone(),
            _ => name.clone(),
        })
        .collect();
    let mut label = names.join(" or ");
    if !rule.constraints.is_empty() {
        label.push_str(&format!(", of version: {}", rule.constraints));
    }
    if !rule.required_options.is_empty() {
        label.push_str(&format!(
            ", including options: {}",
            rule.required_options.join(", ")
        ));
    }
    label
}

fn check_requirements(manifest: &Manifest, game: &GameSnapshot) -> Vec<RequirementStatus> {
    manifest
        .prerequisites
        .iter()
        .filter(|rule| {
            // the remaster carries the patch inside itself
            !(manifest.name == COMMUNITY_REMASTER
                && rule.names.first().map(String::as_str) == Some(COMMUNITY_PATCH))
        })
        .map(|rule| check_requirement(manifest, rule, game))
        .collect()
}

fn check_requirement(
    manifest: &Manifest,
    rule: &DependencyRule,
    game: &GameSnapshot,
) -> RequirementStatus {
    let label = rule_label(rule, game);
    let installed = &game.installed_content;

    let found_name = rule.names.iter().find(|name| installed.contains_key(*name));

    // a patch-only mod cannot sit on top of an installed remaster
    if found_name.map(String::as_str) == Some(COMMUNITY_PATCH)
        && installed.contains_key(COMMUNITY_REMASTER)
        && manifest.name != COMMUNITY_REMASTER
        && !rule.names.iter().any(|n| n == COMMUNITY_REMASTER)
    {
        return RequirementStatus {
            rule: rule.clone(),
            label,
            satisfied: false,
            error: Some(ResolveError::PatchOnlyIncompatibleWithRemaster {
                name: manifest.name.clone(),
            }),
        };
    }

    let Some(found_name) = found_name else {
        return RequirementStatus {
            rule: rule.clone(),
            label: label.clone(),
            satisfied: false,
            error: Some(ResolveError::PrerequisiteMissing { names: label }),
        };
    };
    let entry = &installed[found_name];

    if !rule.constraints.is_empty() {
        let version_ok = Version::parse(&entry.version)
            .map(|installed_version| rule.constraints.matches(&installed_version))
            .unwrap_or(false);
        if !version_ok {
            return RequirementStatus {
                rule: rule.clone(),
                label,
                satisfied: false,
                error: Some(ResolveError::PrerequisiteVersionMismatch {
                    name: found_name.clone(),
                    installed: entry.version.clone(),
                    required: rule.constraints.to_string(),
                }),
            };
        }
    }

    for option in &rule.required_options {
        if !entry.option_installed(option) {
            return RequirementStatus {
                rule: rule.clone(),
                label,
                satisfied: false,
                error: Some(ResolveError::PrerequisiteOptionMissing {
                    name: found_name.clone(),
                    option: option.clone(),
                }),
            };
        }
    }

    RequirementStatus {
        rule: rule.clone(),
        label,
        satisfied: true,
        error: None,
    }
}

fn check_incompatibilities(
    manifest: &Manifest,
    game: &GameSnapshot,
) -> Vec<IncompatibilityStatus> {
    manifest
        .incompatible
        .iter()
        .map(|rule| check_incompatibility(rule, game))
        .collect()
}

fn check_incompatibility(rule: &DependencyRule, game: &GameSnapshot) -> IncompatibilityStatus {
    let label = rule_label(rule, game);
    let installed = &game.installed_content;

    let found = rule
        .names
        .iter()
        .find_map(|name| installed.get(name).map(|entry| (name, entry)));

    let Some((found_name, entry)) = found else {
        return IncompatibilityStatus {
            rule: rule.clone(),
            label,
            satisfied: true,
            error: None,
        };
    };

    let version_matches = rule.constraints.is_empty()
        || Version::parse(&entry.version)
            .map(|installed_version| rule.constraints.matches(&installed_version))
            .unwrap_or(false);

    let options_match = rule.required_options.is_empty()
        || rule
            .required_options
            .iter()
            .any(|option| entry.option_installed(option));

    let conflict = version_matches && options_match;

    IncompatibilityStatus {
        rule: rule.clone(),
        label: label.clone(),
        satisfied: !conflict,
        error: conflict.then(|| ResolveError::IncompatibleInstalled {
            name: if entry.display_name.is_empty() {
                found_name.clone()
            } else {
                entry.display_name.clone()
            },
        }),
    }
}

fn check_reinstallability(
    manifest: &Manifest,
    game: &GameSnapshot,
) -> (ReinstallVerdict, Option<InstalledEntry>) {
    let installed = &game.installed_content;

    let mut previous = installed.get(&manifest.name);
    if previous.is_none() && manifest.name == COMMUNITY_REMASTER {
        previous = installed.get(COMMUNITY_PATCH);
    }
    let Some(previous) = previous else {
        return (ReinstallVerdict::NotReinstall, None);
    };

    let mut allowed: Vec<&str> = vec![manifest.name.as_str()];
    if manifest.name == COMMUNITY_REMASTER {
        allowed.push(COMMUNITY_PATCH);
    }
    for rule in &manifest.prerequisites {
        allowed.extend(rule.names.iter().map(String::as_str));
    }

    let mut others: Vec<String> = installed
        .iter()
        .filter(|(name, _)| !allowed.contains(&name.as_str()))
        .map(|(name, entry)| {
            if entry.display_name.is_empty() {
                name.clone()
            } else {
                entry.display_name.clone()
            }
        })
        .collect();
    if !others.is_empty() {
        others.sort();
        return (
            ReinstallVerdict::BlockedOtherMods(others),
            Some(previous.clone()),
        );
    }

    let complex = !manifest.optional_content.is_empty();
    let same_version = Version::parse(&previous.version)
        .map(|installed_version| installed_version == manifest.version)
        .unwrap_or(false);

    let verdict = if same_version {
        match build_cmp(&manifest.build, &previous.build) {
            Ordering::Equal => ReinstallVerdict::Safe { complex },
            Ordering::Greater => ReinstallVerdict::Unsafe { complex },
            Ordering::Less => ReinstallVerdict::BlockedNewerBuild,
        }
    } else {
        ReinstallVerdict::BlockedOtherVersion
    };

    (verdict, Some(previous.clone()))
}
