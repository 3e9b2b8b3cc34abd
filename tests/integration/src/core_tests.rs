use std::fs;

use assert_fs::prelude::*;
use predicates::prelude::*;
use proptest::prelude::*;

use emm_core::cancel::CancelToken;
use emm_core::error::{LoadError, ResolveError};
use emm_core::loader::{self, LoadedMod};
use emm_core::planner::{plan_install, Selection};
use emm_core::probe::{self, GameSnapshot};
use emm_core::resolver::{self, ReinstallVerdict};
use emm_core::version::{ConstraintStyle, Relation, Version, VersionConstraint};
use emm_install::error::{InstallError, PatchError};
use emm_install::installer::{install_mod, NullObserver};
use emm_install::patcher::{PatchOutcome, PATCH_CATALOGUE};

use crate::{manifest_yaml, MockDistro, MockGameDir};

fn load(distro: &MockDistro, id: &str) -> LoadedMod {
    loader::load_mod_dir(&distro.mod_dir(id)).expect("mod should load")
}

fn snapshot(game: &MockGameDir) -> GameSnapshot {
    probe::probe_game(game.path(), &CancelToken::new()).expect("probe should succeed")
}

fn base_selection() -> Selection {
    let mut selection = Selection::new();
    selection.insert("base".to_owned(), "yes".to_owned());
    selection
}

// ---------------------------------------------------------------------------
// S1: fresh install
// ---------------------------------------------------------------------------

#[test]
fn s1_fresh_install() {
    let distro = MockDistro::new().unwrap();
    distro
        .add_mod("alpha", &manifest_yaml("alpha", "1.0.0", "1"), &["data"])
        .unwrap();
    let game = MockGameDir::new("1.02").unwrap();

    let loaded = load(&distro, "alpha");
    let game_state = snapshot(&game);

    let resolution = resolver::resolve(&loaded.manifest, &game_state);
    assert!(resolution.can_install, "{:?}", resolution.failures());

    let plan = plan_install(
        &loaded.manifest,
        &base_selection(),
        &game_state,
        &resolution.reinstall,
        None,
    )
    .unwrap();

    // the plan copies exactly alpha/data -> game/data
    assert_eq!(plan.jobs.len(), 1);
    assert_eq!(plan.jobs[0].source, distro.mod_dir("alpha").join("data"));
    assert_eq!(plan.jobs[0].destination, game.data_dir());

    install_mod(
        &loaded.manifest,
        &plan,
        game.path(),
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(game.data_dir().join("marker.txt").is_file());

    let installed = probe::load_installed_content(game.path());
    let entry = installed.get("alpha").expect("entry recorded");
    assert_eq!(entry.base, "yes");
    assert_eq!(entry.version, "1.0.0");
    assert_eq!(entry.build, "1");
}

// ---------------------------------------------------------------------------
// S2: prerequisite satisfied by range
// ---------------------------------------------------------------------------

#[test]
fn s2_prerequisite_satisfied_by_range() {
    let distro = MockDistro::new().unwrap();
    let manifest = manifest_yaml("alpha", "1.0.0", "1").replace(
        "prerequisites: []",
        "prerequisites:\n  - name: beta\n    versions: [\">=2.0\", \"<3.0\"]",
    );
    distro.add_mod("alpha", &manifest, &["data"]).unwrap();

    let game = MockGameDir::new("1.02").unwrap();
    game.set_installed("beta:\n  version: 2.3.1\n  base: 'yes'\n")
        .unwrap();

    let loaded = load(&distro, "alpha");
    assert_eq!(
        loaded.manifest.prerequisites[0].constraints.style(),
        ConstraintStyle::Range
    );

    let resolution = resolver::resolve(&loaded.manifest, &snapshot(&game));
    assert!(resolution.installment_compatible);
    assert!(resolution.tool_compatible);
    assert!(resolution.requirements_met());
    assert!(resolution.incompatibilities_absent());
    assert!(resolution.can_install);
}

// ---------------------------------------------------------------------------
// S3: prerequisite fails on pre-release identifier
// ---------------------------------------------------------------------------

#[test]
fn s3_prerequisite_fails_on_identifier() {
    let distro = MockDistro::new().unwrap();
    let manifest = manifest_yaml("alpha", "1.0.0", "1").replace(
        "prerequisites: []",
        "prerequisites:\n  - name: beta\n    versions: [\"=1.0.0\"]",
    );
    distro.add_mod("alpha", &manifest, &["data"]).unwrap();

    let game = MockGameDir::new("1.02").unwrap();
    game.set_installed("beta:\n  version: 1.0.0-rc1\n  base: 'yes'\n")
        .unwrap();

    let loaded = load(&distro, "alpha");
    let resolution = resolver::resolve(&loaded.manifest, &snapshot(&game));
    assert!(!resolution.can_install);
    assert!(matches!(
        resolution.requirements[0].error,
        Some(ResolveError::PrerequisiteVersionMismatch { .. })
    ));
}

// ---------------------------------------------------------------------------
// S4: incompatible mod present
// ---------------------------------------------------------------------------

#[test]
fn s4_incompatible_present() {
    let distro = MockDistro::new().unwrap();
    let manifest = format!(
        "{}incompatible:\n  - name: gamma\n",
        manifest_yaml("alpha", "1.0.0", "1")
    );
    distro.add_mod("alpha", &manifest, &["data"]).unwrap();

    let game = MockGameDir::new("1.02").unwrap();
    game.set_installed("gamma:\n  version: '0.5'\n  base: 'yes'\n")
        .unwrap();

    let loaded = load(&distro, "alpha");
    let resolution = resolver::resolve(&loaded.manifest, &snapshot(&game));
    assert!(!resolution.can_install);
    assert!(matches!(
        resolution.incompatibilities[0].error,
        Some(ResolveError::IncompatibleInstalled { .. })
    ));
}

// ---------------------------------------------------------------------------
// S5: reinstall same build
// ---------------------------------------------------------------------------

#[test]
fn s5_reinstall_same_build() {
    let distro = MockDistro::new().unwrap();
    distro
        .add_mod("alpha", &manifest_yaml("alpha", "1.0.0", "1"), &["data"])
        .unwrap();

    let game = MockGameDir::new("1.02").unwrap();
    game.set_installed(
        "alpha:\n  version: 1.0.0\n  build: '1'\n  display_name: alpha\n  base: 'yes'\n",
    )
    .unwrap();

    let loaded = load(&distro, "alpha");
    let resolution = resolver::resolve(&loaded.manifest, &snapshot(&game));
    assert!(resolution.reinstall.is_reinstall());
    assert_eq!(resolution.reinstall, ReinstallVerdict::Safe { complex: false });
    assert!(resolution.can_install);
}

// ---------------------------------------------------------------------------
// S6: reinstall over a newer build
// ---------------------------------------------------------------------------

#[test]
fn s6_reinstall_over_newer_build_blocked() {
    let distro = MockDistro::new().unwrap();
    distro
        .add_mod("alpha", &manifest_yaml("alpha", "1.0.0", "7"), &["data"])
        .unwrap();

    let game = MockGameDir::new("1.02").unwrap();
    game.set_installed(
        "alpha:\n  version: 1.0.0\n  build: '10'\n  display_name: alpha\n  base: 'yes'\n",
    )
    .unwrap();

    let loaded = load(&distro, "alpha");
    let resolution = resolver::resolve(&loaded.manifest, &snapshot(&game));
    assert_eq!(resolution.reinstall, ReinstallVerdict::BlockedNewerBuild);
    assert!(!resolution.can_install);
}

// ---------------------------------------------------------------------------
// Property 1-3: version parsing, monotonicity, identifier equality
// ---------------------------------------------------------------------------

#[test]
fn version_round_trip_normalizes_missing_components() {
    for (literal, rendered) in [
        ("1", "1.0.0"),
        ("1.2", "1.2.0"),
        ("1.2.3", "1.2.3"),
        ("1.2.3-RC1", "1.2.3-RC1"),
    ] {
        assert_eq!(Version::parse(literal).unwrap().to_string(), rendered);
    }
}

proptest! {
    #[test]
    fn version_round_trip_property(major in 0u64..10_000, minor in 0u64..10_000, patch in 0u64..1_000_000) {
        let literal = format!("{major}.{minor}.{patch}");
        prop_assert_eq!(Version::parse(&literal).unwrap().to_string(), literal);
    }

    #[test]
    fn constraint_monotonicity_property(base in 0u64..1_000, bump in 1u64..1_000) {
        let lower = Version::parse(&format!("1.{base}.0")).unwrap();
        let higher = Version::parse(&format!("1.{}.0", base + bump)).unwrap();
        let floor = VersionConstraint { relation: Relation::Ge, version: lower.clone() };
        prop_assert!(floor.matches(&lower));
        prop_assert!(floor.matches(&higher));
    }
}

#[test]
fn version_equality_with_identifier() {
    assert_eq!(Version::parse("1.2.3").unwrap(), Version::parse("1.2.3").unwrap());
    assert_ne!(
        Version::parse("1.2.3").unwrap(),
        Version::parse("1.2.3-beta").unwrap()
    );
}

// ---------------------------------------------------------------------------
// Property 4: resolver idempotence
// ---------------------------------------------------------------------------

#[test]
fn resolver_idempotent_on_loaded_mod() {
    let distro = MockDistro::new().unwrap();
    let manifest = manifest_yaml("alpha", "1.0.0", "1").replace(
        "prerequisites: []",
        "prerequisites:\n  - name: beta\n    versions: [\">=2.0\"]",
    );
    distro.add_mod("alpha", &manifest, &["data"]).unwrap();
    let game = MockGameDir::new("1.02").unwrap();

    let loaded = load(&distro, "alpha");
    let game_state = snapshot(&game);
    let first = resolver::resolve(&loaded.manifest, &game_state);
    let second = resolver::resolve(&loaded.manifest, &game_state);
    assert_eq!(first, second);
    assert_eq!(
        first.requirements[0].label,
        second.requirements[0].label
    );
}

// ---------------------------------------------------------------------------
// Property 5: planner completeness
// ---------------------------------------------------------------------------

#[test]
fn planner_covers_every_selected_key() {
    let distro = MockDistro::new().unwrap();
    let manifest = format!(
        "{}optional_content:\n  - name: hud\n    display_name: HUD\n    description: d\n  - name: maps\n    display_name: Maps\n    description: d\n    install_settings:\n      - name: classic\n        description: d\n      - name: remixed\n        description: d\n",
        manifest_yaml("alpha", "1.0.0", "1")
    );
    distro
        .add_mod(
            "alpha",
            &manifest,
            &["data", "hud/data", "maps/data", "maps/classic", "maps/remixed"],
        )
        .unwrap();
    let game = MockGameDir::new("1.02").unwrap();

    let loaded = load(&distro, "alpha");
    let mut selection = base_selection();
    selection.insert("hud".to_owned(), "yes".to_owned());
    selection.insert("maps".to_owned(), "remixed".to_owned());

    let plan = plan_install(
        &loaded.manifest,
        &selection,
        &snapshot(&game),
        &ReinstallVerdict::NotReinstall,
        None,
    )
    .unwrap();

    for (key, value) in &selection {
        if value == "skip" {
            continue;
        }
        let root = if key == "base" {
            loaded.manifest.manifest_dir.join("data")
        } else {
            loaded.manifest.manifest_dir.join(key)
        };
        assert!(
            plan.jobs.iter().any(|job| job.source.starts_with(&root)),
            "selection key '{key}' has no copy job under {root:?}"
        );
    }
}

// ---------------------------------------------------------------------------
// Property 6-7: installer atomicity on patch failure
// ---------------------------------------------------------------------------

#[test]
fn failed_patch_aborts_without_touching_record() {
    let distro = MockDistro::new().unwrap();
    distro
        .add_mod("alpha", &manifest_yaml("alpha", "1.0.0", "1"), &["data"])
        .unwrap();
    let game = MockGameDir::new("1.02").unwrap();
    game.set_installed("{}\n").unwrap();
    let record_before = fs::read(game.installed_manifest_path()).unwrap();

    // corrupt the widescreen patch site so its precondition fails
    let exe = game.path().join("hta.exe");
    let mut bytes = fs::read(&exe).unwrap();
    let site = PATCH_CATALOGUE[0].offset as usize;
    bytes[site..site + 4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    fs::write(&exe, bytes).unwrap();

    let loaded = load(&distro, "alpha");
    let game_state = snapshot(&game);
    let plan = plan_install(
        &loaded.manifest,
        &base_selection(),
        &game_state,
        &ReinstallVerdict::NotReinstall,
        None,
    )
    .unwrap();

    let err = install_mod(
        &loaded.manifest,
        &plan,
        game.path(),
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        InstallError::Patch(PatchError::PreconditionFailed { .. })
    ));

    // copied files stay (no rollback), the record is byte-identical
    assert!(game.data_dir().join("marker.txt").is_file());
    assert_eq!(
        fs::read(game.installed_manifest_path()).unwrap(),
        record_before
    );
}

// ---------------------------------------------------------------------------
// Property 8: patch idempotence across reinstall
// ---------------------------------------------------------------------------

#[test]
fn reinstall_reports_patches_already_applied() {
    let distro = MockDistro::new().unwrap();
    distro
        .add_mod("alpha", &manifest_yaml("alpha", "1.0.0", "1"), &["data"])
        .unwrap();
    let game = MockGameDir::new("1.02").unwrap();

    let loaded = load(&distro, "alpha");

    let game_state = snapshot(&game);
    let resolution = resolver::resolve(&loaded.manifest, &game_state);
    let plan = plan_install(
        &loaded.manifest,
        &base_selection(),
        &game_state,
        &resolution.reinstall,
        None,
    )
    .unwrap();
    let first = install_mod(
        &loaded.manifest,
        &plan,
        game.path(),
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(first
        .patches
        .iter()
        .any(|patch| patch.outcome == PatchOutcome::Applied));

    let exe_after_first = fs::read(game.path().join("hta.exe")).unwrap();

    // second run: safe reinstall, every catalogue patch is a no-op
    let game_state = snapshot(&game);
    let resolution = resolver::resolve(&loaded.manifest, &game_state);
    assert_eq!(resolution.reinstall, ReinstallVerdict::Safe { complex: false });
    let plan = plan_install(
        &loaded.manifest,
        &base_selection(),
        &game_state,
        &resolution.reinstall,
        resolution.previous_install.as_ref(),
    )
    .unwrap();
    let second = install_mod(
        &loaded.manifest,
        &plan,
        game.path(),
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(second
        .patches
        .iter()
        .all(|patch| patch.outcome == PatchOutcome::AlreadyApplied));
    assert_eq!(fs::read(game.path().join("hta.exe")).unwrap(), exe_after_first);
}

// ---------------------------------------------------------------------------
// Property 9: forbidden configurations fail the load
// ---------------------------------------------------------------------------

#[test]
fn forbidden_prerequisite_fails_load() {
    let distro = MockDistro::new().unwrap();
    let manifest = manifest_yaml("alpha", "1.0.0", "1").replace(
        "prerequisites: []",
        "prerequisites:\n  - name: community_patch\n    optional_content: [anything]",
    );
    distro.add_mod("alpha", &manifest, &["data"]).unwrap();

    let err = loader::load_mod_dir(&distro.mod_dir("alpha")).unwrap_err();
    assert!(matches!(err, LoadError::ForbiddenPrerequisite(_)));
}

#[test]
fn forbidden_incompatible_fails_load() {
    let distro = MockDistro::new().unwrap();
    let manifest = format!(
        "{}incompatible:\n  - name: community_patch\n",
        manifest_yaml("alpha", "1.0.0", "1")
    );
    distro.add_mod("alpha", &manifest, &["data"]).unwrap();

    let err = loader::load_mod_dir(&distro.mod_dir("alpha")).unwrap_err();
    assert!(matches!(err, LoadError::ForbiddenIncompatible(_)));
}

// ---------------------------------------------------------------------------
// End-to-end odds and ends
// ---------------------------------------------------------------------------

#[test]
fn distribution_scan_with_assert_fs_layout() {
    let distro = assert_fs::TempDir::new().unwrap();
    distro
        .child("mods/alpha/manifest.yaml")
        .write_str(&manifest_yaml("alpha", "1.0.0", "1"))
        .unwrap();
    distro
        .child("mods/alpha/data/marker.txt")
        .write_str("alpha")
        .unwrap();

    let scan = loader::scan_distribution(distro.path(), &CancelToken::new());
    assert_eq!(scan.mods.len(), 1);
    assert!(scan.failures.is_empty());
    distro
        .child("mods/alpha/data/marker.txt")
        .assert(predicate::path::exists());
}

#[test]
fn probe_reflects_install_after_refresh() {
    let distro = MockDistro::new().unwrap();
    distro
        .add_mod("alpha", &manifest_yaml("alpha", "1.0.0", "1"), &["data"])
        .unwrap();
    let game = MockGameDir::new("1.02").unwrap();

    let loaded = load(&distro, "alpha");
    let before = snapshot(&game);
    assert!(before.installed_content.is_empty());

    let plan = plan_install(
        &loaded.manifest,
        &base_selection(),
        &before,
        &ReinstallVerdict::NotReinstall,
        None,
    )
    .unwrap();
    install_mod(
        &loaded.manifest,
        &plan,
        game.path(),
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap();

    // the probe-resolve cycle now reports a safe reinstall
    let after = snapshot(&game);
    assert!(after.installed_content.contains_key("alpha"));
    let resolution = resolver::resolve(&loaded.manifest, &after);
    assert!(resolution.reinstall.is_reinstall());
    assert!(resolution.can_install);
}

#[test]
fn hd_config_edits_applied_for_remaster() {
    let distro = MockDistro::new().unwrap();
    let manifest = manifest_yaml("community_remaster", "1.4", "1");
    distro
        .add_mod("community_remaster", &manifest, &["data"])
        .unwrap();
    let game = MockGameDir::new("1.02").unwrap();

    let loaded = load(&distro, "community_remaster");
    let game_state = snapshot(&game);
    let resolution = resolver::resolve(&loaded.manifest, &game_state);
    assert!(resolution.can_install, "{:?}", resolution.failures());
    let plan = plan_install(
        &loaded.manifest,
        &base_selection(),
        &game_state,
        &resolution.reinstall,
        None,
    )
    .unwrap();
    assert!(plan.patch.remaster);

    install_mod(
        &loaded.manifest,
        &plan,
        game.path(),
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap();

    let config = fs::read_to_string(game.data_dir().join("config.cfg")).unwrap();
    assert!(config.contains("dialogs_16_9"), "HD UI paths switched on");
    assert!(config.contains(r#"r_width="1280""#), "stock resolution bumped");
}
