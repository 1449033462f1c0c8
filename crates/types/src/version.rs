//! Versions and version constraints
//!
//! Versions are dotted token strings (`1.2.3`, `2.0rc1`, `develop`). They
//! split into numeric and alphabetic components:
//! - numeric components compare numerically and rank above alphabetic ones
//! - `develop`, `main`, `master`, `head`, `trunk` and `stable` rank above
//!   every number, in that order
//! - a version that is a strict prefix of another is older (`1.2 < 1.2.1`)
//!
//! Constraints:
//! - `1.2` - the range `1.2:1.2`, matching `1.2` and every `1.2.x`
//! - `=1.2` - exactly `1.2`
//! - `1.2:1.4` - inclusive, the upper bound is prefix-inclusive
//! - `:2.0`, `1.5:`, `:` - open ranges
//! - `1.2,1.4:1.6` - union of the items

use serde::{Deserialize, Serialize};
use sprig_errors::VersionError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Tokens that sort above any numbered release, newest first.
pub const INFINITY_VERSIONS: [&str; 6] = ["develop", "main", "master", "head", "trunk", "stable"];

/// One parsed component of a version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Component {
    Num(u64),
    Str(String),
    /// Rank among [`INFINITY_VERSIONS`], higher is newer
    Infinity(usize),
}

impl Component {
    fn from_alpha(token: &str) -> Self {
        match INFINITY_VERSIONS.iter().position(|inf| *inf == token) {
            Some(idx) => Self::Infinity(INFINITY_VERSIONS.len() - idx),
            None => Self::Str(token.to_string()),
        }
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Infinity(a), Self::Infinity(b)) => a.cmp(b),
            (Self::Infinity(_), _) | (Self::Num(_), Self::Str(_)) => Ordering::Greater,
            (_, Self::Infinity(_)) | (Self::Str(_), Self::Num(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A concrete package version
///
/// Equality and ordering use the parsed components; `Display` keeps the
/// string the version was parsed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    text: String,
    components: Vec<Component>,
}

impl Version {
    /// Parse a version string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty or contains characters other
    /// than ASCII alphanumerics and the separators `.`, `-`, `_`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let text = input.trim();
        let invalid = || VersionError::InvalidVersion {
            input: input.to_string(),
        };
        if text.is_empty()
            || !text.starts_with(|c: char| c.is_ascii_alphanumeric())
            || !text
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(invalid());
        }

        let mut components = Vec::new();
        let mut chars = text.char_indices().peekable();
        while let Some(&(start, c)) = chars.peek() {
            if matches!(c, '.' | '-' | '_') {
                chars.next();
                continue;
            }
            let numeric = c.is_ascii_digit();
            let mut end = start;
            while let Some(&(idx, ch)) = chars.peek() {
                if ch.is_ascii_alphanumeric() && ch.is_ascii_digit() == numeric {
                    end = idx + ch.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let token = &text[start..end];
            if numeric {
                components.push(Component::Num(token.parse().map_err(|_| invalid())?));
            } else {
                components.push(Component::from_alpha(token));
            }
        }

        Ok(Self {
            text: text.to_string(),
            components,
        })
    }

    /// The version string as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True if `self`'s components are a prefix of `other`'s (`1.2` of `1.2.5`)
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a == b)
    }

    /// True for `develop`-style versions that track a branch
    #[must_use]
    pub fn is_infinity(&self) -> bool {
        matches!(self.components.first(), Some(Component::Infinity(_)))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Vec ordering already treats a strict prefix as smaller
        self.components.cmp(&other.components)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.text
    }
}

/// Inclusive range of versions; `None` bounds are open
///
/// The upper bound is prefix-inclusive: `:1.4` contains `1.4.7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub lo: Option<Version>,
    pub hi: Option<Version>,
}

impl VersionRange {
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        let above = self.lo.as_ref().is_none_or(|lo| lo <= version);
        let below = self
            .hi
            .as_ref()
            .is_none_or(|hi| version <= hi || hi.is_prefix_of(version));
        above && below
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.lo, &self.hi) {
            (Some(lo), Some(hi)) => lo > hi && !hi.is_prefix_of(lo),
            _ => false,
        }
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let lo = match (&self.lo, &other.lo) {
            (Some(a), Some(b)) => Some(a.max(b).clone()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        let hi = match (&self.hi, &other.hi) {
            (Some(a), Some(b)) => Some(tighter_upper(a, b).clone()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        Self { lo, hi }
    }

    /// True if every version in `self` is also in `other`
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        let lo_ok = match (&self.lo, &other.lo) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => b <= a,
        };
        let hi_ok = match (&self.hi, &other.hi) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a <= b || b.is_prefix_of(a),
        };
        lo_ok && hi_ok
    }
}

fn tighter_upper<'a>(a: &'a Version, b: &'a Version) -> &'a Version {
    if a.is_prefix_of(b) {
        b
    } else if b.is_prefix_of(a) {
        a
    } else {
        a.min(b)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.lo, &self.hi) {
            (Some(lo), Some(hi)) if lo == hi => write!(f, "{lo}"),
            (lo, hi) => {
                if let Some(lo) = lo {
                    write!(f, "{lo}")?;
                }
                f.write_str(":")?;
                if let Some(hi) = hi {
                    write!(f, "{hi}")?;
                }
                Ok(())
            }
        }
    }
}

/// A single item of a version list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionItem {
    Exact(Version),
    Range(VersionRange),
}

impl VersionItem {
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            Self::Exact(v) => v == version,
            Self::Range(r) => r.contains(version),
        }
    }

    fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => (a == b).then(|| self.clone()),
            (Self::Exact(v), Self::Range(r)) | (Self::Range(r), Self::Exact(v)) => {
                r.contains(v).then(|| Self::Exact(v.clone()))
            }
            (Self::Range(a), Self::Range(b)) => {
                let range = a.intersect(b);
                (!range.is_empty()).then_some(Self::Range(range))
            }
        }
    }

    fn is_subset_of(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(v), item) => item.contains(v),
            (Self::Range(_), Self::Exact(_)) => false,
            (Self::Range(a), Self::Range(b)) => a.is_subset_of(b),
        }
    }

    fn parse(input: &str) -> Result<Self, VersionError> {
        let item = input.trim();
        if let Some(exact) = item.strip_prefix('=') {
            return Ok(Self::Exact(Version::parse(exact)?));
        }
        let bound = |s: &str| -> Result<Option<Version>, VersionError> {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                Version::parse(s).map(Some)
            }
        };
        let range = if let Some((lo, hi)) = item.split_once(':') {
            VersionRange {
                lo: bound(lo)?,
                hi: bound(hi)?,
            }
        } else {
            let v = Version::parse(item)?;
            VersionRange {
                lo: Some(v.clone()),
                hi: Some(v),
            }
        };
        if range.is_empty() {
            return Err(VersionError::EmptyRange {
                input: input.to_string(),
            });
        }
        Ok(Self::Range(range))
    }
}

impl fmt::Display for VersionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "={v}"),
            Self::Range(r) => write!(f, "{r}"),
        }
    }
}

/// Constraint on a node's version: anything, or a union of items
///
/// An empty list matches nothing; it is the result of intersecting
/// disjoint constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionConstraint {
    #[default]
    Any,
    List(Vec<VersionItem>),
}

impl VersionConstraint {
    /// Constraint matching exactly one version
    #[must_use]
    pub fn exact(version: Version) -> Self {
        Self::List(vec![VersionItem::Exact(version)])
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// True if no version can satisfy the constraint
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::List(items) if items.is_empty())
    }

    /// The pinned version, if the constraint is a single exact item
    #[must_use]
    pub fn concrete(&self) -> Option<&Version> {
        match self {
            Self::List(items) => match items.as_slice() {
                [VersionItem::Exact(v)] => Some(v),
                _ => None,
            },
            Self::Any => None,
        }
    }

    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::List(items) => items.iter().any(|item| item.contains(version)),
        }
    }

    /// Versions allowed by both constraints
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Any, c) | (c, Self::Any) => c.clone(),
            (Self::List(a), Self::List(b)) => {
                let mut items: Vec<VersionItem> = Vec::new();
                for x in a {
                    for y in b {
                        if let Some(item) = x.intersect(y) {
                            if !items.contains(&item) {
                                items.push(item);
                            }
                        }
                    }
                }
                Self::List(items)
            }
        }
    }

    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// True if every version allowed by `self` is allowed by `other`
    #[must_use]
    pub fn satisfies(&self, other: &Self) -> bool {
        match (self, other) {
            (_, Self::Any) => true,
            (Self::Any, Self::List(_)) => false,
            (Self::List(a), Self::List(b)) => a
                .iter()
                .all(|item| b.iter().any(|candidate| item.is_subset_of(candidate))),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == ":" || s == "*" {
            return Ok(Self::Any);
        }
        let items = s
            .split(',')
            .map(VersionItem::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::List(items))
    }
}

impl TryFrom<String> for VersionConstraint {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionConstraint> for String {
    fn from(value: VersionConstraint) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(":"),
            Self::List(items) => {
                let strs: Vec<_> = items.iter().map(ToString::to_string).collect();
                f.write_str(&strs.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn c(s: &str) -> VersionConstraint {
        s.parse().unwrap()
    }

    #[test]
    fn test_component_ordering() {
        assert!(v("1.10") > v("1.9"));
        assert!(v("1.2") < v("1.2.1"));
        assert!(v("1.2.1") < v("1.3"));
        assert!(v("1.2rc1") < v("1.2.0"));
        assert!(v("develop") > v("999.0"));
        assert!(v("develop") > v("main"));
        assert!(v("stable") > v("2024.1"));
    }

    #[test]
    fn test_display_keeps_original_text() {
        assert_eq!(v("1_2-3").to_string(), "1_2-3");
        assert_eq!(v("1_2-3"), v("1.2.3"));
    }

    #[test]
    fn test_invalid_versions() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse(".1").is_err());
        assert!(Version::parse("1.2/3").is_err());
    }

    #[test]
    fn test_plain_version_is_prefix_range() {
        let con = c("1.2");
        assert!(con.contains(&v("1.2")));
        assert!(con.contains(&v("1.2.9")));
        assert!(!con.contains(&v("1.3")));
        assert!(con.concrete().is_none());
    }

    #[test]
    fn test_exact_constraint() {
        let con = c("=1.2");
        assert!(con.contains(&v("1.2")));
        assert!(!con.contains(&v("1.2.1")));
        assert_eq!(con.concrete(), Some(&v("1.2")));
    }

    #[test]
    fn test_open_ranges() {
        assert!(c(":2.0").contains(&v("2.0.5")));
        assert!(!c(":2.0").contains(&v("2.1")));
        assert!(c("1.5:").contains(&v("develop")));
        assert!(!c("1.5:").contains(&v("1.4")));
        assert!(c(":").is_any());
    }

    #[test]
    fn test_intersection_narrows() {
        let merged = c(":2.0").intersect(&c("1.5:"));
        assert_eq!(merged.to_string(), "1.5:2.0");
        assert!(!merged.contains(&v("1.4")));
        assert!(merged.contains(&v("1.6")));
        assert!(merged.contains(&v("2.0")));
        assert!(!merged.contains(&v("2.1")));
    }

    #[test]
    fn test_prefix_upper_bound_intersection() {
        let merged = c(":1.4").intersect(&c(":1.4.5"));
        assert_eq!(merged.to_string(), ":1.4.5");
    }

    #[test]
    fn test_disjoint_exacts_are_empty() {
        assert!(c("=1.4").intersect(&c("=2.0")).is_empty());
        assert!(!c("=1.4").intersects(&c("=2.0")));
    }

    #[test]
    fn test_empty_range_rejected() {
        assert!(matches!(
            "2.0:1.0".parse::<VersionConstraint>(),
            Err(VersionError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_satisfies() {
        assert!(c("=1.6").satisfies(&c("1.5:")));
        assert!(c("1.6:1.8").satisfies(&c("1.5:")));
        assert!(!c("1.4:").satisfies(&c("1.5:")));
        assert!(!VersionConstraint::Any.satisfies(&c("1.5:")));
        assert!(c("1.2.3").satisfies(&c("1.2")));
    }

    #[test]
    fn test_union_display_roundtrip() {
        let con = c("1.2,1.4:1.6,=2.0");
        assert_eq!(con.to_string(), "1.2,1.4:1.6,=2.0");
        assert_eq!(con.to_string().parse::<VersionConstraint>().unwrap(), con);
    }
}
