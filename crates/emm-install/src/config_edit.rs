//! Attribute-level edits of the game's XML configuration files.
//!
//! Three documents are touched: `data/config.cfg` (rendering and UI resource
//! paths), the UI schema (font faces and sizes), and the global properties
//! XML (ground repository, smart cursor).  Edits are bounded to a whitelist
//! of known attributes; everything else in the documents passes through
//! untouched.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::error::ConfigEditError;

/// Attributes the editor is allowed to touch, per element.
const EDITABLE: &[(&str, &[&str])] = &[
    (
        "config",
        &[
            "r_width",
            "r_height",
            "pathToUiWindows",
            "pathToCredits",
            "ui_pathToFrames",
            "pathToSplashes",
            "pathToUiIcons",
            "pathToLevelInfo",
        ],
    ),
    (
        "schema",
        &[
            "titleFontFace",
            "titleFontSize",
            "titleFontType",
            "wndFontFace",
            "wndFontSize",
            "wndFontType",
            "tooltipFontFace",
            "tooltipFontSize",
            "tooltipFontType",
            "miscFontFace",
            "miscFontSize",
            "miscFontType",
        ],
    ),
    ("GroundRepository", &["Size"]),
    (
        "SmartCursor",
        &["InfoAreaRadius", "UnlockRegion", "InfoObjUpdateTimeout"],
    ),
];

/// UI resource paths swapped between the stock and HD dialog sets.
const HD_UI_PATHS: &[(&str, &str, &str)] = &[
    (
        "pathToUiWindows",
        r"data\if\dialogs_16_9\UiWindows.xml",
        r"data\if\dialogs\UiWindows.xml",
    ),
    (
        "pathToCredits",
        r"data\if\dialogs_16_9\credits.xml",
        r"data\if\dialogs\credits.xml",
    ),
    (
        "ui_pathToFrames",
        r"data\if\frames\frames_hd.xml",
        r"data\if\frames\frames.xml",
    ),
    (
        "pathToSplashes",
        r"data\if\ico_hd\splashes.xml",
        r"data\if\ico\splashes.xml",
    ),
    (
        "pathToUiIcons",
        r"data\if\ico_hd\UiIcons.xml",
        r"data\if\ico\UiIcons.xml",
    ),
    (
        "pathToLevelInfo",
        r"data\if\diz\LevelInfo_hd.xml",
        r"data\if\diz\LevelInfo.xml",
    ),
];

/// One attribute mutation.
#[derive(Debug, Clone)]
pub struct AttrEdit {
    pub element: String,
    pub key: String,
    pub value: String,
    /// Only overwrite an existing attribute; never add one.
    pub only_if_present: bool,
}

impl AttrEdit {
    pub fn new(element: &str, key: &str, value: impl Into<String>) -> Self {
        Self {
            element: element.to_owned(),
            key: key.to_owned(),
            value: value.into(),
            only_if_present: false,
        }
    }

    pub fn if_present(mut self) -> Self {
        self.only_if_present = true;
        self
    }
}

fn is_editable(element: &str, key: &str) -> bool {
    EDITABLE
        .iter()
        .any(|(el, keys)| *el == element && keys.contains(&key))
}

fn xml_error<E: std::fmt::Display>(path: &Path, err: E) -> ConfigEditError {
    ConfigEditError::Xml {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Apply `edits` to the XML document at `path`, returning how many
/// attributes changed.  Elements and attributes outside the edit list are
/// written back verbatim.
pub fn edit_attributes(path: &Path, edits: &[AttrEdit]) -> Result<usize, ConfigEditError> {
    for edit in edits {
        if !is_editable(&edit.element, &edit.key) {
            return Err(ConfigEditError::UnknownKey {
                element: edit.element.clone(),
                key: edit.key.clone(),
            });
        }
    }

    let text = fs::read_to_string(path)?;
    let mut reader = Reader::from_str(&text);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut changed = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(path, e))?;
        match event {
            Event::Start(ref el) | Event::Empty(ref el) => {
                let name = String::from_utf8_lossy(el.name().as_ref()).into_owned();
                let relevant: Vec<&AttrEdit> =
                    edits.iter().filter(|e| e.element == name).collect();
                if relevant.is_empty() {
                    writer
                        .write_event(event.clone())
                        .map_err(|e| xml_error(path, e))?;
                } else {
                    let mut rebuilt = BytesStart::new(name.clone());
                    let mut present: Vec<String> = Vec::new();
                    for attr in el.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map_err(|e| xml_error(path, e))?
                            .into_owned();
                        present.push(key.clone());
                        match relevant.iter().find(|e| e.key == key) {
                            Some(edit) if edit.value != value => {
                                rebuilt.push_attribute((key.as_str(), edit.value.as_str()));
                                changed += 1;
                            }
                            _ => rebuilt.push_attribute((key.as_str(), value.as_str())),
                        }
                    }
                    for edit in &relevant {
                        if !edit.only_if_present && !present.contains(&edit.key) {
                            rebuilt.push_attribute((edit.key.as_str(), edit.value.as_str()));
                            changed += 1;
                        }
                    }
                    let rebuilt_event = if matches!(event, Event::Empty(_)) {
                        Event::Empty(rebuilt)
                    } else {
                        Event::Start(rebuilt)
                    };
                    writer
                        .write_event(rebuilt_event)
                        .map_err(|e| xml_error(path, e))?;
                }
            }
            Event::Eof => break,
            other => {
                writer
                    .write_event(other)
                    .map_err(|e| xml_error(path, e))?;
            }
        }
    }

    fs::write(path, writer.into_inner().into_inner())?;
    debug!(path = %path.display(), changed, "config attributes edited");
    Ok(changed)
}

/// Read one attribute of the first `element` occurrence in the document.
pub fn read_attribute(
    path: &Path,
    element: &str,
    key: &str,
) -> Result<Option<String>, ConfigEditError> {
    let text = fs::read_to_string(path)?;
    let mut reader = Reader::from_str(&text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(el)) | Ok(Event::Empty(el)) => {
                if el.name().as_ref() == element.as_bytes() {
                    for attr in el.attributes().flatten() {
                        if attr.key.as_ref() == key.as_bytes() {
                            let value = attr
                                .unescape_value()
                                .map_err(|err| xml_error(path, err))?
                                .into_owned();
                            return Ok(Some(value));
                        }
                    }
                    return Ok(None);
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(err) => return Err(xml_error(path, err)),
            _ => {}
        }
    }
}

/// Resolve a windows-style relative path from a config attribute against the
/// game root.
pub fn resolve_config_path(game_root: &Path, value: &str) -> PathBuf {
    let mut path = game_root.to_path_buf();
    for part in value.replace('\\', "/").split('/') {
        if !part.is_empty() {
            path.push(part);
        }
    }
    path
}

/// Path of the global properties XML, taken from `pathToGlobProps` with the
/// stock default as fallback.
pub fn glob_props_path(game_root: &Path, config_path: &Path) -> Result<PathBuf, ConfigEditError> {
    let rel = read_attribute(config_path, "config", "pathToGlobProps")?
        .unwrap_or_else(|| r"data\gamedata\globprops.xml".to_owned());
    Ok(resolve_config_path(game_root, &rel))
}

/// Path of the UI schema XML, taken from `ui_pathToSchema` with the stock
/// default as fallback.
pub fn ui_schema_path(game_root: &Path, config_path: &Path) -> Result<PathBuf, ConfigEditError> {
    let rel = read_attribute(config_path, "config", "ui_pathToSchema")?
        .unwrap_or_else(|| r"data\if\frames\uischema.xml".to_owned());
    Ok(resolve_config_path(game_root, &rel))
}

/// Switch the UI resource paths between the stock and HD dialog sets.
pub fn toggle_hd_ui_paths(config_path: &Path, enable: bool) -> Result<usize, ConfigEditError> {
    let edits: Vec<AttrEdit> = HD_UI_PATHS
        .iter()
        .map(|(key, hd, sd)| {
            AttrEdit::new("config", key, if enable { *hd } else { *sd }).if_present()
        })
        .collect();
    edit_attributes(config_path, &edits)
}

/// Bump the stock 1024x768 resolution to the HD default; any other value is
/// the player's own choice and stays.
pub fn set_hd_resolution(config_path: &Path) -> Result<usize, ConfigEditError> {
    let width = read_attribute(config_path, "config", "r_width")?;
    let height = read_attribute(config_path, "config", "r_height")?;
    if width.as_deref() != Some("1024") || height.as_deref() != Some("768") {
        return Ok(0);
    }
    edit_attributes(
        config_path,
        &[
            AttrEdit::new("config", "r_width", "1280").if_present(),
            AttrEdit::new("config", "r_height", "720").if_present(),
        ],
    )
}

/// Set the UI font faces and scaled sizes.  Each font group is touched only
/// when its size attribute already exists in the schema.
pub fn set_ui_fonts(schema_path: &Path, face: &str, scale: f64) -> Result<usize, ConfigEditError> {
    // (size attribute, face attribute, type attribute, base size)
    const GROUPS: &[(&str, &str, &str, f64)] = &[
        ("titleFontSize", "titleFontFace", "titleFontType", 12.0),
        ("wndFontSize", "wndFontFace", "wndFontType", 10.0),
        ("tooltipFontSize", "tooltipFontFace", "tooltipFontType", 12.0),
        ("miscFontSize", "miscFontFace", "miscFontType", 10.0),
    ];

    let mut edits = Vec::new();
    for (size_key, face_key, type_key, base) in GROUPS {
        if read_attribute(schema_path, "schema", size_key)?.is_none() {
            continue;
        }
        edits.push(AttrEdit::new("schema", face_key, face));
        edits.push(AttrEdit::new(
            "schema",
            size_key,
            format!("{:.1}", base * scale),
        ));
        edits.push(AttrEdit::new("schema", type_key, "0"));
    }
    if edits.is_empty() {
        return Ok(0);
    }
    edit_attributes(schema_path, &edits)
}

/// Resize the ground repository for the HD asset set.
pub fn toggle_ground_repository(glob_path: &Path, hd: bool) -> Result<usize, ConfigEditError> {
    let size = if hd { "18 300" } else { "13 10000" };
    edit_attributes(glob_path, &[AttrEdit::new("GroundRepository", "Size", size)])
}

/// Retune the smart cursor for the HD UI.
pub fn toggle_smart_cursor(glob_path: &Path, hd: bool) -> Result<usize, ConfigEditError> {
    let (radius, region, timeout) = if hd {
        ("70", "422 422", "0.2")
    } else {
        ("50", "300 300", "0.5")
    };
    edit_attributes(
        glob_path,
        &[
            AttrEdit::new("SmartCursor", "InfoAreaRadius", radius),
            AttrEdit::new("SmartCursor", "UnlockRegion", region),
            AttrEdit::new("SmartCursor", "InfoObjUpdateTimeout", timeout),
        ],
    )
}
