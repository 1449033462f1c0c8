//! Variant values

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Value of a variant: on/off, one token, or a set of tokens
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
    Bool(bool),
    Single(String),
    Multi(BTreeSet<String>),
}

impl VariantValue {
    /// Parse the right-hand side of `key=value`
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "true" | "True" => Self::Bool(true),
            "false" | "False" => Self::Bool(false),
            v if v.contains(',') => Self::Multi(
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            v => Self::Single(v.to_string()),
        }
    }

    /// Tokens held by a single or multi value
    #[must_use]
    pub fn tokens(&self) -> BTreeSet<String> {
        match self {
            Self::Bool(b) => BTreeSet::from([b.to_string()]),
            Self::Single(s) => BTreeSet::from([s.clone()]),
            Self::Multi(set) => set.clone(),
        }
    }

    /// Combine two requirements on the same variant
    ///
    /// Multi-valued requirements accumulate; anything else must agree.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (a, b) if a == b => Some(a.clone()),
            (Self::Multi(_), Self::Single(_) | Self::Multi(_))
            | (Self::Single(_), Self::Multi(_)) => {
                let mut union = self.tokens();
                union.extend(other.tokens());
                Some(Self::Multi(union))
            }
            _ => None,
        }
    }

    /// True if a node carrying `self` meets the requirement `required`
    #[must_use]
    pub fn satisfies(&self, required: &Self) -> bool {
        match (self, required) {
            (a, b) if a == b => true,
            (Self::Multi(have), Self::Single(_) | Self::Multi(_)) => {
                required.tokens().is_subset(have)
            }
            _ => false,
        }
    }

    /// Coerce a single token to the multi form
    #[must_use]
    pub fn into_multi(self) -> Self {
        match self {
            Self::Single(s) => Self::Multi(BTreeSet::from([s])),
            other => other,
        }
    }
}

impl fmt::Display for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Single(s) => f.write_str(s),
            Self::Multi(set) => {
                let items: Vec<&str> = set.iter().map(String::as_str).collect();
                f.write_str(&items.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(VariantValue::parse("true"), VariantValue::Bool(true));
        assert_eq!(
            VariantValue::parse("release"),
            VariantValue::Single("release".into())
        );
        assert_eq!(
            VariantValue::parse("b,a").to_string(),
            "a,b",
            "multi values print sorted"
        );
    }

    #[test]
    fn test_merge_rules() {
        let on = VariantValue::Bool(true);
        let off = VariantValue::Bool(false);
        assert_eq!(on.merge(&on), Some(on.clone()));
        assert_eq!(on.merge(&off), None);

        let a = VariantValue::Single("a".into());
        let b = VariantValue::Single("b".into());
        assert_eq!(a.merge(&b), None);
        assert_eq!(
            a.merge(&VariantValue::parse("b,c")),
            Some(VariantValue::parse("a,b,c"))
        );
    }

    #[test]
    fn test_multi_satisfies_subset() {
        let have = VariantValue::parse("a,b,c");
        assert!(have.satisfies(&VariantValue::Single("b".into())));
        assert!(have.satisfies(&VariantValue::parse("a,c")));
        assert!(!have.satisfies(&VariantValue::Single("d".into())));
    }
}
