//! Install planning.
//!
//! Turns a mod plus a validated option selection into an ordered list of
//! copy jobs and a patch plan.  Base content always precedes optional
//! content; options are enqueued in declaration order; a settings-backed
//! option contributes its shared directory before the chosen setting's
//! payload.  All job destinations are the game's `data` directory.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::PlanError;
use crate::manifest::{Installment, Manifest, PatcherOptions, COMMUNITY_REMASTER};
use crate::probe::{GameSnapshot, InstalledEntry};
use crate::resolver::ReinstallVerdict;

/// Option selection: `"base"` plus one entry per declared option, each
/// `"yes"`, `"skip"`, or an install-setting name.
pub type Selection = BTreeMap<String, String>;

/// One recursive directory copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyJob {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// What the binary patcher and config editor should do after the copies.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchPlan {
    /// Merged parameter patches: the manifest's, overlaid with each selected
    /// option's in declaration order.
    pub options: PatcherOptions,
    /// Remaster installs additionally patch the render DLL and switch the
    /// HD UI resources on.
    pub remaster: bool,
    pub installment: Installment,
}

/// A fully validated, ordered install plan.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallPlan {
    pub jobs: Vec<CopyJob>,
    pub patch: PatchPlan,
    /// The effective selection after forced-option overrides; this is what
    /// gets recorded in the installed-mods manifest.
    pub selection: Selection,
}

/// Build the install plan for `manifest` under `selection`.
///
/// When the resolver verdict is a complex reinstall, per-option values from
/// the previous installation override the supplied selection.
pub fn plan_install(
    manifest: &Manifest,
    selection: &Selection,
    game: &GameSnapshot,
    reinstall: &ReinstallVerdict,
    previous: Option<&InstalledEntry>,
) -> Result<InstallPlan, PlanError> {
    let mut effective = selection.clone();

    if reinstall.forces_previous_selection() {
        if let Some(previous) = previous {
            for option in &manifest.optional_content {
                if let Some(value) = previous.options.get(&option.name) {
                    effective.insert(option.name.clone(), value.clone());
                }
            }
        }
    }

    validate_selection(manifest, &effective)?;

    let destination = game.root_path.join("data");
    let mut jobs = Vec::new();

    let base = effective
        .get("base")
        .map(String::as_str)
        .unwrap_or("skip");
    if !manifest.no_base_content && base == "yes" {
        jobs.push(CopyJob {
            source: manifest.manifest_dir.join("data"),
            destination: destination.clone(),
        });
    }

    let mut options = manifest.patcher_options.clone();
    for option in &manifest.optional_content {
        let value = effective
            .get(&option.name)
            .map(String::as_str)
            .unwrap_or("skip");
        match value {
            "skip" => continue,
            "yes" => {
                jobs.push(CopyJob {
                    source: manifest.manifest_dir.join(&option.name).join("data"),
                    destination: destination.clone(),
                });
            }
            setting => {
                jobs.push(CopyJob {
                    source: manifest.manifest_dir.join(&option.name).join("data"),
                    destination: destination.clone(),
                });
                jobs.push(CopyJob {
                    source: manifest.manifest_dir.join(&option.name).join(setting),
                    destination: destination.clone(),
                });
            }
        }
        options.overlay(&option.patcher_options);
    }

    Ok(InstallPlan {
        jobs,
        patch: PatchPlan {
            options,
            remaster: manifest.name == COMMUNITY_REMASTER,
            installment: manifest.installment,
        },
        selection: effective,
    })
}

fn validate_selection(manifest: &Manifest, selection: &Selection) -> Result<(), PlanError> {
    let base = selection.get("base").ok_or(PlanError::MissingBase)?;
    if base != "yes" && base != "skip" {
        return Err(PlanError::InvalidValue {
            option: "base".to_owned(),
            value: base.clone(),
        });
    }

    for (key, value) in selection {
        if key == "base" {
            continue;
        }
        let option = manifest
            .option(key)
            .ok_or_else(|| PlanError::UnknownOption(key.clone()))?;
        if !option.accepts(value) {
            return Err(PlanError::InvalidValue {
                option: key.clone(),
                value: value.clone(),
            });
        }
    }

    for option in &manifest.optional_content {
        if !selection.contains_key(&option.name) {
            return Err(PlanError::MissingOption(option.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Installment;
    use crate::probe::{GameFlags, InstalledContent};
    use std::path::Path;

    fn manifest(yaml: &str) -> Manifest {
        Manifest::from_yaml(yaml.as_bytes(), Path::new("/distro/mods/alpha")).unwrap()
    }

    fn base_yaml() -> String {
        r#"
name: alpha
display_name: Alpha
description: d
authors: a
version: 1.0.0
build: "1"
language: eng
installment: exmachina
prerequisites: []
"#
        .to_owned()
    }

    fn with_options() -> String {
        format!(
            "{}optional_content:\n  - name: hud\n    display_name: HUD\n    description: d\n  - name: maps\n    display_name: Maps\n    description: d\n    install_settings:\n      - name: classic\n        description: d\n      - name: remixed\n        description: d\n",
            base_yaml()
        )
    }

    fn game() -> GameSnapshot {
        GameSnapshot {
            root_path: PathBuf::from("/game"),
            exe_path: PathBuf::from("/game/hta.exe"),
            exe_version: Some("1.02".to_owned()),
            installment: Some(Installment::ExMachina),
            installed_content: InstalledContent::new(),
            installed_descriptions: BTreeMap::new(),
            is_running: false,
            flags: GameFlags::default(),
        }
    }

    fn selection(pairs: &[(&str, &str)]) -> Selection {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn base_only_plan() {
        let m = manifest(&base_yaml());
        let plan = plan_install(
            &m,
            &selection(&[("base", "yes")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap();
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].source, PathBuf::from("/distro/mods/alpha/data"));
        assert_eq!(plan.jobs[0].destination, PathBuf::from("/game/data"));
        assert!(!plan.patch.remaster);
    }

    #[test]
    fn base_precedes_options_in_declaration_order() {
        let m = manifest(&with_options());
        let plan = plan_install(
            &m,
            &selection(&[("base", "yes"), ("hud", "yes"), ("maps", "remixed")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap();
        let sources: Vec<_> = plan.jobs.iter().map(|j| j.source.clone()).collect();
        assert_eq!(
            sources,
            vec![
                PathBuf::from("/distro/mods/alpha/data"),
                PathBuf::from("/distro/mods/alpha/hud/data"),
                PathBuf::from("/distro/mods/alpha/maps/data"),
                PathBuf::from("/distro/mods/alpha/maps/remixed"),
            ]
        );
    }

    #[test]
    fn skipped_entries_produce_no_jobs() {
        let m = manifest(&with_options());
        let plan = plan_install(
            &m,
            &selection(&[("base", "skip"), ("hud", "skip"), ("maps", "skip")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap();
        assert!(plan.jobs.is_empty());
    }

    #[test]
    fn every_installed_key_has_a_job_under_its_directory() {
        let m = manifest(&with_options());
        let sel = selection(&[("base", "yes"), ("hud", "yes"), ("maps", "classic")]);
        let plan = plan_install(&m, &sel, &game(), &ReinstallVerdict::NotReinstall, None).unwrap();
        for (key, value) in &sel {
            if value == "skip" {
                continue;
            }
            let root = if key == "base" {
                m.manifest_dir.clone()
            } else {
                m.manifest_dir.join(key)
            };
            assert!(
                plan.jobs.iter().any(|job| job.source.starts_with(&root)),
                "no job under {root:?}"
            );
        }
    }

    #[test]
    fn missing_base_rejected() {
        let m = manifest(&base_yaml());
        let err = plan_install(
            &m,
            &Selection::new(),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap_err();
        assert_eq!(err, PlanError::MissingBase);
    }

    #[test]
    fn unknown_option_rejected() {
        let m = manifest(&base_yaml());
        let err = plan_install(
            &m,
            &selection(&[("base", "yes"), ("phantom", "yes")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap_err();
        assert_eq!(err, PlanError::UnknownOption("phantom".to_owned()));
    }

    #[test]
    fn invalid_values_rejected() {
        let m = manifest(&with_options());
        // flat options take yes/skip only
        let err = plan_install(
            &m,
            &selection(&[("base", "yes"), ("hud", "classic"), ("maps", "skip")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidValue { .. }));

        // settings options take skip or a declared setting, not yes
        let err = plan_install(
            &m,
            &selection(&[("base", "yes"), ("hud", "yes"), ("maps", "yes")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidValue { .. }));
    }

    #[test]
    fn undeclared_option_missing_from_selection_rejected() {
        let m = manifest(&with_options());
        let err = plan_install(
            &m,
            &selection(&[("base", "yes"), ("hud", "yes")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap_err();
        assert_eq!(err, PlanError::MissingOption("maps".to_owned()));
    }

    #[test]
    fn no_base_content_suppresses_base_job() {
        let yaml = format!("{}no_base_content: true\n", base_yaml());
        let m = manifest(&yaml);
        let plan = plan_install(
            &m,
            &selection(&[("base", "yes")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap();
        assert!(plan.jobs.is_empty());
    }

    #[test]
    fn complex_reinstall_forces_previous_options() {
        let m = manifest(&with_options());
        let mut previous = InstalledEntry {
            version: "1.0.0".to_owned(),
            build: "1".to_owned(),
            base: "yes".to_owned(),
            ..Default::default()
        };
        previous.options.insert("hud".to_owned(), "skip".to_owned());
        previous
            .options
            .insert("maps".to_owned(), "classic".to_owned());

        let plan = plan_install(
            &m,
            &selection(&[("base", "yes"), ("hud", "yes"), ("maps", "remixed")]),
            &game(),
            &ReinstallVerdict::Safe { complex: true },
            Some(&previous),
        )
        .unwrap();

        assert_eq!(plan.selection.get("hud").map(String::as_str), Some("skip"));
        assert_eq!(
            plan.selection.get("maps").map(String::as_str),
            Some("classic")
        );
        // jobs reflect the forced values
        assert!(plan
            .jobs
            .iter()
            .any(|j| j.source.ends_with("maps/classic")));
        assert!(!plan.jobs.iter().any(|j| j.source.ends_with("hud/data")));
    }

    #[test]
    fn patcher_options_merge_from_selected_options() {
        let yaml = format!(
            "{}patcher_options:\n  gravity: -12.0\noptional_content:\n  - name: hardcore\n    display_name: Hardcore\n    description: d\n    patcher_options:\n      gravity: -45.0\n      skins_in_shop: 24\n",
            base_yaml()
        );
        let m = manifest(&yaml);

        let plan = plan_install(
            &m,
            &selection(&[("base", "yes"), ("hardcore", "yes")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap();
        assert_eq!(plan.patch.options.gravity, Some(-45.0));
        assert_eq!(plan.patch.options.skins_in_shop, Some(24));

        let plan = plan_install(
            &m,
            &selection(&[("base", "yes"), ("hardcore", "skip")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap();
        assert_eq!(plan.patch.options.gravity, Some(-12.0));
        assert_eq!(plan.patch.options.skins_in_shop, None);
    }

    #[test]
    fn remaster_plan_sets_flag() {
        let yaml = base_yaml().replace("name: alpha", "name: community_remaster");
        let m = manifest(&yaml);
        let plan = plan_install(
            &m,
            &selection(&[("base", "yes")]),
            &game(),
            &ReinstallVerdict::NotReinstall,
            None,
        )
        .unwrap();
        assert!(plan.patch.remaster);
    }
}
