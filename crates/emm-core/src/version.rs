//! Version parsing and constraint evaluation.
//!
//! Mod versions in the wild are only loosely numeric: `1.02`, `2.5.1-rc1`,
//! `dev.3`, even bare words.  This module keeps the three release components
//! as bounded strings, compares them numerically when all three parse as
//! integers and as lowercased strings otherwise, and treats the optional
//! pre-release identifier as significant for equality only.

use std::cmp::Ordering;
use std::fmt;

use crate::error::VersionError;

/// Maximum stored length of the major and minor components.
const COMPONENT_MAX: usize = 4;
/// Maximum stored length of the patch component.
const PATCH_MAX: usize = 10;

/// A parsed version: `MAJOR[.MINOR[.PATCH]][-IDENTIFIER]`.
///
/// Missing components default to `"0"`.  Components past the third are
/// concatenated into `patch`.  `is_numeric` is derived at parse time and
/// decides whether comparisons run on integer tuples or lowercased strings.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: String,
    pub minor: String,
    pub patch: String,

    /// Optional pre-release tag after `-`, kept in its original casing.
    pub identifier: Option<String>,

    /// True when major, minor and patch all parse as integers.
    pub is_numeric: bool,
}

fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl Version {
    /// Parse a version literal.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::MalformedVersion`] when the literal is empty
    /// or has no release part before the identifier.
    pub fn parse(literal: &str) -> Result<Self, VersionError> {
        let trimmed = literal.trim();
        let (release, identifier) = match trimmed.split_once('-') {
            Some((rel, id)) => (rel, Some(id.to_owned()).filter(|i| !i.is_empty())),
            None => (trimmed, None),
        };

        if release.is_empty() {
            return Err(VersionError::MalformedVersion(literal.to_owned()));
        }

        let mut major = "0".to_owned();
        let mut minor = "0".to_owned();
        let mut patch = "0".to_owned();

        if release.contains('.') {
            let parts: Vec<&str> = release.split('.').collect();
            if let Some(p) = parts.first() {
                major = clip(p, COMPONENT_MAX);
            }
            if let Some(p) = parts.get(1) {
                minor = clip(p, COMPONENT_MAX);
            }
            if parts.len() > 3 {
                // Excess components are folded into the patch slot.
                patch = clip(&parts[2..].concat(), PATCH_MAX);
            } else if let Some(p) = parts.get(2) {
                patch = clip(p, PATCH_MAX);
            }
        } else {
            major = clip(release, COMPONENT_MAX);
        }

        if major.is_empty() {
            return Err(VersionError::MalformedVersion(literal.to_owned()));
        }

        let is_numeric = [&major, &minor, &patch]
            .iter()
            .all(|part| part.parse::<u64>().is_ok());

        Ok(Self {
            major,
            minor,
            patch,
            identifier,
            is_numeric,
        })
    }

    /// The same version with the pre-release identifier stripped.
    ///
    /// Used for the mod-manager's own version, which is always compared as
    /// its released form.
    pub fn released(&self) -> Self {
        Self {
            identifier: None,
            ..self.clone()
        }
    }

    /// Compare release components only, ignoring identifiers.
    ///
    /// Numeric tuples when both sides are numeric, lowercased string tuples
    /// otherwise.
    pub fn release_cmp(&self, other: &Self) -> Ordering {
        if self.is_numeric && other.is_numeric {
            let lhs = (
                self.major.parse::<u64>().unwrap_or(0),
                self.minor.parse::<u64>().unwrap_or(0),
                self.patch.parse::<u64>().unwrap_or(0),
            );
            let rhs = (
                other.major.parse::<u64>().unwrap_or(0),
                other.minor.parse::<u64>().unwrap_or(0),
                other.patch.parse::<u64>().unwrap_or(0),
            );
            lhs.cmp(&rhs)
        } else {
            let lhs = (
                self.major.to_lowercase(),
                self.minor.to_lowercase(),
                self.patch.to_lowercase(),
            );
            let rhs = (
                other.major.to_lowercase(),
                other.minor.to_lowercase(),
                other.patch.to_lowercase(),
            );
            lhs.cmp(&rhs)
        }
    }

    fn identifier_lowered(&self) -> Option<String> {
        self.identifier.as_deref().map(str::to_lowercase)
    }
}

impl PartialEq for Version {
    /// Equal release components AND equal (case-insensitive) identifiers.
    /// `1.2.3` is not equal to `1.2.3-beta`.
    fn eq(&self, other: &Self) -> bool {
        self.release_cmp(other) == Ordering::Equal
            && self.identifier_lowered() == other.identifier_lowered()
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(id) = &self.identifier {
            write!(f, "-{id}")?;
        }
        Ok(())
    }
}

/// Comparison relation of a single constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Relation {
    /// Evaluate `candidate <relation> bound`.
    ///
    /// Range relations ignore pre-release identifiers; equality includes
    /// them.
    pub fn evaluate(self, candidate: &Version, bound: &Version) -> bool {
        match self {
            Relation::Eq => candidate == bound,
            Relation::Ne => candidate != bound,
            Relation::Lt => candidate.release_cmp(bound) == Ordering::Less,
            Relation::Le => candidate.release_cmp(bound) != Ordering::Greater,
            Relation::Gt => candidate.release_cmp(bound) == Ordering::Greater,
            Relation::Ge => candidate.release_cmp(bound) != Ordering::Less,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Relation::Eq => "=",
            Relation::Ne => "!=",
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::Gt => ">",
            Relation::Ge => ">=",
        }
    }

    fn is_lower_bound(self) -> bool {
        matches!(self, Relation::Gt | Relation::Ge)
    }

    fn is_upper_bound(self) -> bool {
        matches!(self, Relation::Lt | Relation::Le)
    }
}

/// A single relation plus its bound version, e.g. `>=2.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub relation: Relation,
    pub version: Version,
}

impl VersionConstraint {
    /// Parse a constraint literal.  A missing operator prefix falls back to
    /// `default` — `=` for mod prerequisites, `>=` for tool-version
    /// requirements (tool versions are forward-compatible by default).
    pub fn parse(literal: &str, default: Relation) -> Result<Self, VersionError> {
        let trimmed = literal.trim();
        let (relation, rest) = if let Some(rest) = trimmed.strip_prefix(">=") {
            (Relation::Ge, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=") {
            (Relation::Le, rest)
        } else if let Some(rest) = trimmed.strip_prefix("!=") {
            (Relation::Ne, rest)
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            (Relation::Gt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('<') {
            (Relation::Lt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('=') {
            (Relation::Eq, rest)
        } else {
            (default, trimmed)
        };

        let version = Version::parse(rest)
            .map_err(|_| VersionError::MalformedConstraint(literal.to_owned()))?;

        Ok(Self { relation, version })
    }

    /// Does `candidate` satisfy this constraint?
    pub fn matches(&self, candidate: &Version) -> bool {
        self.relation.evaluate(candidate, &self.version)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.relation.symbol(), self.version)
    }
}

/// How a constraint set should be rendered for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintStyle {
    /// A single exact-version pin.
    Strict,
    /// One lower and one upper bound.
    Range,
    /// Anything else.
    Mixed,
}

/// A conjunction of version constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    pub constraints: Vec<VersionConstraint>,
}

impl ConstraintSet {
    /// Parse a list of constraint literals with a shared default relation.
    pub fn parse_all<I, S>(literals: I, default: Relation) -> Result<Self, VersionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let constraints = literals
            .into_iter()
            .map(|lit| VersionConstraint::parse(lit.as_ref(), default))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { constraints })
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// AND over all constraints.  An empty set matches everything.
    pub fn matches(&self, candidate: &Version) -> bool {
        self.constraints.iter().all(|c| c.matches(candidate))
    }

    /// Derive the rendering style.
    pub fn style(&self) -> ConstraintStyle {
        match self.constraints.as_slice() {
            [only] if only.relation == Relation::Eq => ConstraintStyle::Strict,
            [a, b]
                if (a.relation.is_lower_bound() && b.relation.is_upper_bound())
                    || (a.relation.is_upper_bound() && b.relation.is_lower_bound()) =>
            {
                ConstraintStyle::Range
            }
            _ => ConstraintStyle::Mixed,
        }
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.constraints {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn parse_defaults_missing_components() {
        let ver = v("1.2");
        assert_eq!(ver.major, "1");
        assert_eq!(ver.minor, "2");
        assert_eq!(ver.patch, "0");
        assert!(ver.is_numeric);
        assert_eq!(ver.to_string(), "1.2.0");
    }

    #[test]
    fn parse_bare_major() {
        let ver = v("5");
        assert_eq!(ver.to_string(), "5.0.0");
    }

    #[test]
    fn parse_identifier() {
        let ver = v("1.2.3-RC1");
        assert_eq!(ver.identifier.as_deref(), Some("RC1"));
        // display keeps the original casing
        assert_eq!(ver.to_string(), "1.2.3-RC1");
    }

    #[test]
    fn parse_excess_components_fold_into_patch() {
        let ver = v("1.2.3.4.5");
        assert_eq!(ver.major, "1");
        assert_eq!(ver.minor, "2");
        assert_eq!(ver.patch, "345");
    }

    #[test]
    fn parse_clips_component_lengths() {
        let ver = v("123456.7890123.999");
        assert_eq!(ver.major, "1234");
        assert_eq!(ver.minor, "7890");
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(matches!(
            Version::parse(""),
            Err(VersionError::MalformedVersion(_))
        ));
        assert!(matches!(
            Version::parse("-beta"),
            Err(VersionError::MalformedVersion(_))
        ));
    }

    #[test]
    fn equality_requires_identifier_match() {
        assert_eq!(v("1.2.3"), v("1.2.3"));
        assert_ne!(v("1.2.3"), v("1.2.3-beta"));
        assert_ne!(v("1.2.3-alpha"), v("1.2.3-beta"));
        // identifier comparison is case-insensitive
        assert_eq!(v("1.2.3-RC1"), v("1.2.3-rc1"));
    }

    #[test]
    fn numeric_ordering() {
        assert_eq!(v("1.2").release_cmp(&v("1.10")), Ordering::Less);
        assert_eq!(v("2.0").release_cmp(&v("1.99")), Ordering::Greater);
        assert_eq!(v("1.02").release_cmp(&v("1.2")), Ordering::Equal);
    }

    #[test]
    fn non_numeric_ordering_is_lowercased_lexicographic() {
        assert_eq!(v("alpha").release_cmp(&v("Beta")), Ordering::Less);
        assert_eq!(v("Beta").release_cmp(&v("alpha")), Ordering::Greater);
        assert_eq!(v("dev.2").release_cmp(&v("DEV.2")), Ordering::Equal);
    }

    #[test]
    fn range_relations_ignore_identifier() {
        // 1.0-rc1 is neither less nor greater than 1.0
        assert!(!Relation::Lt.evaluate(&v("1.0-rc1"), &v("1.0")));
        assert!(!Relation::Gt.evaluate(&v("1.0-rc1"), &v("1.0")));
        assert!(Relation::Ge.evaluate(&v("1.0-rc1"), &v("1.0")));
        assert!(Relation::Le.evaluate(&v("1.0-rc1"), &v("1.0")));
    }

    #[test]
    fn constraint_parse_operators() {
        let c = VersionConstraint::parse(">=2.0", Relation::Eq).unwrap();
        assert_eq!(c.relation, Relation::Ge);
        assert!(c.matches(&v("2.3.1")));
        assert!(!c.matches(&v("1.9")));

        let c = VersionConstraint::parse("<3.0", Relation::Eq).unwrap();
        assert_eq!(c.relation, Relation::Lt);
        assert!(c.matches(&v("2.99")));
    }

    #[test]
    fn constraint_default_relation() {
        // no prefix: prerequisites pin exactly, tool requirements float up
        let pin = VersionConstraint::parse("1.0", Relation::Eq).unwrap();
        assert_eq!(pin.relation, Relation::Eq);
        let floor = VersionConstraint::parse("1.10", Relation::Ge).unwrap();
        assert_eq!(floor.relation, Relation::Ge);
    }

    #[test]
    fn strict_equality_rejects_prerelease() {
        let pin = VersionConstraint::parse("=1.0.0", Relation::Eq).unwrap();
        assert!(pin.matches(&v("1.0.0")));
        assert!(!pin.matches(&v("1.0.0-rc1")));
    }

    #[test]
    fn set_styles() {
        let strict = ConstraintSet::parse_all(["=1.0"], Relation::Eq).unwrap();
        assert_eq!(strict.style(), ConstraintStyle::Strict);

        let range = ConstraintSet::parse_all([">=2.0", "<3.0"], Relation::Eq).unwrap();
        assert_eq!(range.style(), ConstraintStyle::Range);
        assert!(range.matches(&v("2.3.1")));
        assert!(!range.matches(&v("3.0")));

        let mixed = ConstraintSet::parse_all([">=2.0", "<3.0", "=2.5"], Relation::Eq).unwrap();
        assert_eq!(mixed.style(), ConstraintStyle::Mixed);
    }

    #[test]
    fn empty_set_matches_everything() {
        let set = ConstraintSet::default();
        assert!(set.matches(&v("0.0.1")));
        assert!(set.matches(&v("anything")));
    }

    #[test]
    fn malformed_constraint_keeps_literal() {
        let err = VersionConstraint::parse(">=", Relation::Eq).unwrap_err();
        assert_eq!(err, VersionError::MalformedConstraint(">=".to_owned()));
    }

    proptest! {
        /// format(parse(s)) normalizes missing components to 0 and keeps
        /// everything else verbatim.
        #[test]
        fn round_trip_numeric(major in 0u64..10_000, minor in 0u64..10_000, patch in 0u64..1_000_000) {
            let literal = format!("{major}.{minor}.{patch}");
            let parsed = Version::parse(&literal).unwrap();
            prop_assert_eq!(parsed.to_string(), literal);
            prop_assert!(parsed.is_numeric);
        }

        /// If `>= v1` holds at v1 and v1 < v2, it also holds at v2.
        #[test]
        fn constraint_monotonic(a in 0u64..100, b in 0u64..100, c in 0u64..100, bump in 1u64..50) {
            let lower = Version::parse(&format!("{a}.{b}.{c}")).unwrap();
            let higher = Version::parse(&format!("{a}.{b}.{}", c + bump)).unwrap();
            let floor = VersionConstraint { relation: Relation::Ge, version: lower.clone() };
            prop_assert!(floor.matches(&lower));
            prop_assert!(floor.matches(&higher));
        }
    }
}
