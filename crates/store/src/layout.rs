//! Paths inside an install root

use sprig_config::constants::{DB_DIR, LOCKS_DIR, LOGS_DIR, META_DIR, RECORDS_DIR, STAGE_DIR};
use sprig_hash::Hash;
use sprig_spec::ConcreteNode;
use std::path::{Path, PathBuf};

/// Where prefixes, records, locks and logs live under one root
///
/// ```text
/// <root>/<platform>-<os>-<target>/<compiler>-<version>/<name>-<version>-<hash>
/// <root>/.sprig/db/records/<hash>.json
/// <root>/.sprig/db/locks/<hash>.lock
/// <root>/.sprig/logs/<name>-<hash7>.log
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    #[must_use]
    pub fn records_dir(&self) -> PathBuf {
        self.meta_dir().join(DB_DIR).join(RECORDS_DIR)
    }

    #[must_use]
    pub fn locks_dir(&self) -> PathBuf {
        self.meta_dir().join(DB_DIR).join(LOCKS_DIR)
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.meta_dir().join(LOGS_DIR)
    }

    /// Scratch space for unpacked sources and out-of-tree builds
    #[must_use]
    pub fn stage_dir(&self, node: &ConcreteNode) -> PathBuf {
        self.meta_dir()
            .join(STAGE_DIR)
            .join(format!("{}-{}", node.name, node.hash.short()))
    }

    #[must_use]
    pub fn record_path(&self, hash: &Hash) -> PathBuf {
        self.records_dir().join(format!("{}.json", hash.to_hex()))
    }

    #[must_use]
    pub fn lock_path(&self, hash: &Hash) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", hash.to_hex()))
    }

    #[must_use]
    pub fn log_path(&self, node: &ConcreteNode) -> PathBuf {
        self.logs_dir()
            .join(format!("{}-{}.log", node.name, node.hash.short()))
    }

    /// Install prefix of a concrete node
    #[must_use]
    pub fn prefix(&self, node: &ConcreteNode) -> PathBuf {
        let compiler_version = node
            .compiler
            .version
            .concrete()
            .map(ToString::to_string)
            .unwrap_or_default();
        self.root
            .join(node.arch.to_string())
            .join(format!("{}-{compiler_version}", node.compiler.name))
            .join(format!("{}-{}-{}", node.name, node.version, node.hash.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_spec::{DagBuilder, NodeDraft};
    use sprig_types::{ArchSpec, BuildSystemKind, CompilerSpec, Version};
    use std::collections::BTreeMap;

    fn node() -> ConcreteNode {
        let mut builder = DagBuilder::new();
        let id = builder.add_node(NodeDraft {
            name: "zlib".to_string(),
            version: Version::parse("1.3").unwrap(),
            variants: BTreeMap::new(),
            compiler: CompilerSpec::exact("gcc", Version::parse("12.3").unwrap()),
            arch: ArchSpec::new("linux", "ubuntu22.04", "x86_64"),
            build_system: BuildSystemKind::default(),
        });
        let dag = builder.finish(&[id]).unwrap();
        dag.node(id).clone()
    }

    #[test]
    fn test_prefix_projection() {
        let layout = InstallLayout::new("/opt/sprig");
        let node = node();
        let expected = format!(
            "/opt/sprig/linux-ubuntu22.04-x86_64/gcc-12.3/zlib-1.3-{}",
            node.hash.to_hex()
        );
        assert_eq!(layout.prefix(&node), PathBuf::from(expected));
    }

    #[test]
    fn test_metadata_paths() {
        let layout = InstallLayout::new("/opt/sprig");
        let node = node();
        assert_eq!(
            layout.log_path(&node),
            PathBuf::from(format!("/opt/sprig/.sprig/logs/zlib-{}.log", node.hash.short()))
        );
        assert_eq!(
            layout.record_path(&node.hash),
            PathBuf::from(format!(
                "/opt/sprig/.sprig/db/records/{}.json",
                node.hash.to_hex()
            ))
        );
        assert!(layout
            .lock_path(&node.hash)
            .starts_with("/opt/sprig/.sprig/db/locks"));
    }
}
