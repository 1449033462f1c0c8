//! Dependency edge types

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags::bitflags! {
    /// Phases in which a dependency is needed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct DepTypes: u8 {
        const BUILD = 0b0001;
        const LINK = 0b0010;
        const RUN = 0b0100;
        const TEST = 0b1000;
    }
}

const NAMES: [(DepTypes, &str); 4] = [
    (DepTypes::BUILD, "build"),
    (DepTypes::LINK, "link"),
    (DepTypes::RUN, "run"),
    (DepTypes::TEST, "test"),
];

impl DepTypes {
    /// Edges that order builds and feed the hash
    pub const BUILD_LINK: Self = Self::BUILD.union(Self::LINK);

    /// Parse a single type name
    #[must_use]
    pub fn parse_name(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(flag, _)| *flag)
    }

    /// Type names in canonical order
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        NAMES
            .iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, n)| *n)
    }

    /// True if the edge participates in build ordering
    #[must_use]
    pub fn is_build_or_link(self) -> bool {
        self.intersects(Self::BUILD_LINK)
    }
}

impl Default for DepTypes {
    fn default() -> Self {
        Self::BUILD_LINK
    }
}

impl fmt::Display for DepTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.names().collect();
        f.write_str(&names.join(","))
    }
}

impl Serialize for DepTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for name in self.names() {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for DepTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DepTypesVisitor;

        impl<'de> Visitor<'de> for DepTypesVisitor {
            type Value = DepTypes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of dependency types (build, link, run, test)")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DepTypes, A::Error> {
                let mut types = DepTypes::empty();
                while let Some(name) = seq.next_element::<String>()? {
                    types |= DepTypes::parse_name(&name)
                        .ok_or_else(|| de::Error::custom(format!("unknown dependency type {name}")))?;
                }
                Ok(types)
            }
        }

        deserializer.deserialize_seq(DepTypesVisitor)
    }
}
