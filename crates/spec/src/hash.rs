//! Canonical form fed to the content hash

use sprig_hash::Hash;
use sprig_types::{ArchSpec, CompilerSpec, DepTypes, VariantValue, Version};
use std::collections::BTreeMap;

pub(crate) struct CanonicalDep {
    pub name: String,
    pub hash: Hash,
    pub types: DepTypes,
}

/// Hash input for one node; maps are ordered, dependencies get sorted
pub(crate) struct CanonicalNode<'a> {
    pub name: &'a str,
    pub version: &'a Version,
    pub variants: &'a BTreeMap<String, VariantValue>,
    pub compiler: &'a CompilerSpec,
    pub arch: &'a ArchSpec,
    pub dependencies: Vec<CanonicalDep>,
}

pub(crate) fn canonical_hash(node: &CanonicalNode<'_>) -> Hash {
    let mut deps: Vec<&CanonicalDep> = node.dependencies.iter().collect();
    deps.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.hash.cmp(&b.hash)));

    // Strings are rendered explicitly so the digest only depends on the
    // canonical text of each attribute.
    let payload = serde_json::json!({
        "name": node.name,
        "version": node.version.as_str(),
        "variants": node
            .variants
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        "compiler": node.compiler.to_string(),
        "arch": node.arch.to_string(),
        "dependencies": deps
            .iter()
            .map(|d| serde_json::json!({
                "name": d.name,
                "hash": d.hash.to_hex(),
                "types": d.types.to_string(),
            }))
            .collect::<Vec<_>>(),
    });
    Hash::from_data(payload.to_string().as_bytes())
}
