//! Integration tests for resolver crate

use proptest::prelude::*;
use sprig_errors::{Error, ResolveError};
use sprig_events::{AppEvent, ResolverEvent};
use sprig_index::{PackageIndex, PackageRecipeDescriptor};
use sprig_platform::PlatformFacts;
use sprig_resolver::{Resolver, ResolverOptions};
use sprig_spec::{ConcreteDag, Spec};
use sprig_types::{ArchSpec, CompilerSpec, DepTypes, VariantValue, Version};
use std::collections::BTreeMap;

fn index(recipes: &[(&str, &str)]) -> PackageIndex {
    PackageIndex::from_descriptors(
        recipes
            .iter()
            .map(|(name, body)| PackageRecipeDescriptor::from_toml(name, body).unwrap()),
    )
    .unwrap()
}

fn facts() -> PlatformFacts {
    PlatformFacts::new(
        ArchSpec::new("linux", "ubuntu22.04", "x86_64"),
        vec![
            CompilerSpec::exact("gcc", Version::parse("12.3").unwrap()),
            CompilerSpec::exact("clang", Version::parse("15").unwrap()),
        ],
    )
}

fn specs(input: &[&str]) -> Vec<Spec> {
    input.iter().map(|s| s.parse().unwrap()).collect()
}

fn version_of(dag: &ConcreteDag, name: &str) -> String {
    let id = dag.find_name(name).unwrap();
    dag.node(id).version.to_string()
}

fn dependency_names(dag: &ConcreteDag, name: &str) -> Vec<String> {
    let id = dag.find_name(name).unwrap();
    dag.dependencies(id, DepTypes::all())
        .map(|dep| dag.node(dep).name.clone())
        .collect()
}

const LIBFOO: &str = r#"
[[versions]]
version = "2.1"
[[versions]]
version = "2.0"
[[versions]]
version = "1.6"
[[versions]]
version = "1.4"
deprecated = true

[variants.shared]
default = true

[[dependencies]]
spec = "libz"

[[dependencies]]
spec = "libz@1.2:"
when = "@2:"
"#;

const LIBZ: &str = r#"
[[versions]]
version = "1.3"
[[versions]]
version = "1.2"
[[versions]]
version = "1.0"

[variants.shared]
default = true
"#;

fn shared_index() -> PackageIndex {
    index(&[
        (
            "app",
            "[[versions]]\nversion = \"1.0\"\n[[dependencies]]\nspec = \"libfoo@1.5:\"\n",
        ),
        (
            "tool",
            "[[versions]]\nversion = \"0.9\"\n[[dependencies]]\nspec = \"libfoo@:2.0\"\n",
        ),
        ("libfoo", LIBFOO),
        ("libz", LIBZ),
    ])
}

#[test]
fn test_shared_dependency_single_node() {
    let index = shared_index();
    let facts = facts();
    let dag = Resolver::new(&index, &facts)
        .concretize(&specs(&["app", "tool"]))
        .unwrap();

    assert_eq!(dag.len(), 4);
    assert_eq!(dag.roots().len(), 2);
    assert_eq!(version_of(&dag, "libfoo"), "2.0");
    assert_eq!(version_of(&dag, "libz"), "1.3");
    assert_eq!(dependency_names(&dag, "app"), ["libfoo"]);
    assert_eq!(dependency_names(&dag, "tool"), ["libfoo"]);

    let libfoo = dag.node(dag.find_name("libfoo").unwrap());
    assert_eq!(libfoo.compiler.name, "gcc");
    assert_eq!(libfoo.arch.to_string(), "linux-ubuntu22.04-x86_64");
    assert_eq!(libfoo.variants["shared"], VariantValue::Bool(true));
}

/// app needs libfoo@:2.0 and libbar, libbar needs libfoo@1.5:
fn diamond_index() -> PackageIndex {
    let libfoo = r#"
[[versions]]
version = "2.1"
[[versions]]
version = "2.0"
[[versions]]
version = "1.6"
[[versions]]
version = "1.4"
"#;
    index(&[
        (
            "app",
            r#"
[[versions]]
version = "1.0"
[[dependencies]]
spec = "libfoo@:2.0"
[[dependencies]]
spec = "libbar"
"#,
        ),
        (
            "libbar",
            "[[versions]]\nversion = \"3.1\"\n[[dependencies]]\nspec = \"libfoo@1.5:\"\n",
        ),
        ("libfoo", libfoo),
    ])
}

#[test]
fn test_diamond_picks_newest_common_version() {
    let index = diamond_index();
    let facts = facts();
    let dag = Resolver::new(&index, &facts)
        .concretize(&specs(&["app"]))
        .unwrap();

    assert_eq!(dag.len(), 3);
    assert_eq!(version_of(&dag, "libfoo"), "2.0");
    assert_eq!(dependency_names(&dag, "app"), ["libbar", "libfoo"]);
    assert_eq!(dependency_names(&dag, "libbar"), ["libfoo"]);
}

#[test]
fn test_dependency_constraint_order_keeps_hashes() {
    let index = diamond_index();
    let facts = facts();
    let resolver = Resolver::new(&index, &facts);
    let first = resolver
        .concretize(&specs(&["app ^libfoo ^libbar"]))
        .unwrap();
    let second = resolver
        .concretize(&specs(&["app ^libbar ^libfoo"]))
        .unwrap();
    for name in ["app", "libbar", "libfoo"] {
        assert_eq!(
            first.node(first.find_name(name).unwrap()).hash,
            second.node(second.find_name(name).unwrap()).hash,
            "{name}"
        );
    }
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

/// x@2 caps y below 2, so taking the newest y first forces an older x
fn competing_index() -> PackageIndex {
    index(&[
        (
            "x",
            r#"
[[versions]]
version = "2"
[[versions]]
version = "1"
[[dependencies]]
spec = "y@:1"
when = "@2:"
"#,
        ),
        (
            "y",
            "[[versions]]\nversion = \"2\"\n[[versions]]\nversion = \"1\"\n",
        ),
    ])
}

#[test]
fn test_root_order_does_not_change_result() {
    let index = competing_index();
    let facts = facts();
    let resolver = Resolver::new(&index, &facts);
    let forward = resolver.concretize(&specs(&["x", "y"])).unwrap();
    let backward = resolver.concretize(&specs(&["y", "x"])).unwrap();

    assert_eq!(version_of(&forward, "x"), "2");
    assert_eq!(version_of(&forward, "y"), "1");
    assert_eq!(forward.to_json().unwrap(), backward.to_json().unwrap());
}

#[test]
fn test_concretize_is_deterministic() {
    let index = shared_index();
    let facts = facts();
    let resolver = Resolver::new(&index, &facts);
    let first = resolver.concretize(&specs(&["app", "tool"])).unwrap();
    let second = resolver.concretize(&specs(&["app", "tool"])).unwrap();
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn test_backtracks_to_older_version() {
    let index = shared_index();
    let facts = facts();
    let dag = Resolver::new(&index, &facts)
        .concretize(&specs(&["app ^libz@1.0"]))
        .unwrap();
    assert_eq!(version_of(&dag, "libfoo"), "1.6");
    assert_eq!(version_of(&dag, "libz"), "1.0");
}

#[test]
fn test_deprecated_version_only_when_pinned() {
    let index = shared_index();
    let facts = facts();
    let resolver = Resolver::new(&index, &facts);

    let dag = resolver.concretize(&specs(&["libfoo@:1.5"]));
    assert!(matches!(
        dag,
        Err(Error::Resolve(ResolveError::UnsatisfiableConstraints { .. }))
    ));

    let dag = resolver.concretize(&specs(&["tool ^libfoo@1.4"])).unwrap();
    assert_eq!(version_of(&dag, "libfoo"), "1.4");
}

#[test]
fn test_disjoint_requirements_report_every_origin() {
    let index = index(&[
        (
            "a",
            "[[versions]]\nversion = \"1\"\n[[dependencies]]\nspec = \"libz@1.2:\"\n",
        ),
        (
            "b",
            "[[versions]]\nversion = \"1\"\n[[dependencies]]\nspec = \"libz@:1.0\"\n",
        ),
        ("libz", LIBZ),
    ]);
    let facts = facts();
    let err = Resolver::new(&index, &facts)
        .concretize(&specs(&["a", "b"]))
        .unwrap_err();

    let Error::Resolve(ResolveError::UnsatisfiableConstraints { conflicts }) = err else {
        panic!("expected unsatisfiable constraints, got {err:?}");
    };
    let libz = conflicts.iter().find(|c| c.package == "libz").unwrap();
    assert_eq!(libz.origins, ["a", "b"]);
}

#[test]
fn test_unknown_root() {
    let index = shared_index();
    let facts = facts();
    let err = Resolver::new(&index, &facts)
        .concretize(&specs(&["nosuch"]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::UnknownPackage { ref name }) if name == "nosuch"
    ));
}

#[test]
fn test_unknown_dependency_is_fatal() {
    let index = index(&[
        (
            "app",
            "[[versions]]\nversion = \"1.0\"\n[[dependencies]]\nspec = \"ghost\"\n",
        ),
        ("libz", LIBZ),
    ]);
    let facts = facts();
    let resolver = Resolver::new(&index, &facts);

    let dag = resolver.concretize(&specs(&["libz"])).unwrap();
    assert_eq!(version_of(&dag, "libz"), "1.3");

    let err = resolver.concretize(&specs(&["app"])).unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::UnknownPackage { ref name }) if name == "ghost"
    ));
}

#[test]
fn test_build_cycle_is_reported() {
    let index = index(&[
        (
            "x",
            "[[versions]]\nversion = \"1\"\n[[dependencies]]\nspec = \"y\"\ntypes = [\"build\"]\n",
        ),
        (
            "y",
            "[[versions]]\nversion = \"1\"\n[[dependencies]]\nspec = \"x\"\ntypes = [\"link\"]\n",
        ),
    ]);
    let facts = facts();
    let err = Resolver::new(&index, &facts)
        .concretize(&specs(&["x"]))
        .unwrap_err();
    let Error::Resolve(ResolveError::CyclicDependency { cycle }) = err else {
        panic!("expected a cycle, got {err:?}");
    };
    assert_eq!(cycle, ["x", "y", "x"]);
}

fn two_node_cycle(x_types: &str, y_types: &str) -> PackageIndex {
    let x = format!(
        "[[versions]]\nversion = \"1\"\n[[dependencies]]\nspec = \"y\"\ntypes = [{x_types}]\n"
    );
    let y = format!(
        "[[versions]]\nversion = \"1\"\n[[dependencies]]\nspec = \"x\"\ntypes = [{y_types}]\n"
    );
    index(&[("x", x.as_str()), ("y", y.as_str())])
}

#[test]
fn test_run_cycle_is_reported() {
    let index = two_node_cycle("\"run\"", "\"run\"");
    let facts = facts();
    let err = Resolver::new(&index, &facts)
        .concretize(&specs(&["x"]))
        .unwrap_err();
    let Error::Resolve(ResolveError::CyclicDependency { cycle }) = err else {
        panic!("expected a cycle, got {err:?}");
    };
    assert_eq!(cycle, ["x", "y", "x"]);
}

#[test]
fn test_cross_type_cycle_is_allowed() {
    let index = two_node_cycle("\"build\"", "\"run\"");
    let facts = facts();
    let dag = Resolver::new(&index, &facts)
        .concretize(&specs(&["x"]))
        .unwrap();
    assert_eq!(dag.len(), 2);
    assert_eq!(dependency_names(&dag, "x"), ["y"]);
    assert_eq!(dependency_names(&dag, "y"), ["x"]);
}

#[test]
fn test_conditional_run_cycle_is_reported() {
    let index = index(&[
        (
            "x",
            "[[versions]]\nversion = \"1\"\n[[dependencies]]\nspec = \"y\"\ntypes = [\"run\"]\n",
        ),
        (
            "y",
            r#"
[[versions]]
version = "1"
[variants.tools]
default = true
[[dependencies]]
spec = "x"
types = ["run"]
when = "+tools"
"#,
        ),
    ]);
    let facts = facts();
    let resolver = Resolver::new(&index, &facts);

    let err = resolver.concretize(&specs(&["x ^y+tools"])).unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::CyclicDependency { .. })
    ));

    let dag = resolver.concretize(&specs(&["x ^y~tools"])).unwrap();
    assert_eq!(dag.len(), 2);
}

fn mpi_index() -> PackageIndex {
    index(&[
        (
            "hdf5",
            r#"
[[versions]]
version = "1.14"
[variants.shared]
default = true
[[dependencies]]
spec = "mpi"
[[dependencies]]
spec = "libz"
propagate = ["shared"]
"#,
        ),
        (
            "mpich",
            "[[versions]]\nversion = \"4.1\"\n[[provides]]\nvirtual = \"mpi\"\n",
        ),
        (
            "openmpi",
            "[[versions]]\nversion = \"5.0\"\n[[provides]]\nvirtual = \"mpi\"\n",
        ),
        ("libz", LIBZ),
    ])
}

#[test]
fn test_virtual_provider_choice() {
    let index = mpi_index();
    let facts = facts();

    let dag = Resolver::new(&index, &facts)
        .concretize(&specs(&["hdf5"]))
        .unwrap();
    assert_eq!(dependency_names(&dag, "hdf5"), ["libz", "mpich"]);
    assert!(dag.find_name("openmpi").is_none());

    let options = ResolverOptions {
        providers: BTreeMap::from([("mpi".to_string(), vec!["openmpi".to_string()])]),
        ..ResolverOptions::default()
    };
    let dag = Resolver::new(&index, &facts)
        .with_options(options)
        .concretize(&specs(&["hdf5"]))
        .unwrap();
    assert_eq!(dependency_names(&dag, "hdf5"), ["libz", "openmpi"]);

    let dag = Resolver::new(&index, &facts)
        .concretize(&specs(&["hdf5 ^openmpi"]))
        .unwrap();
    assert_eq!(dependency_names(&dag, "hdf5"), ["libz", "openmpi"]);
    assert!(dag.find_name("mpich").is_none());
}

#[test]
fn test_variant_propagation() {
    let index = mpi_index();
    let facts = facts();
    let dag = Resolver::new(&index, &facts)
        .concretize(&specs(&["hdf5~shared"]))
        .unwrap();
    let libz = dag.node(dag.find_name("libz").unwrap());
    assert_eq!(libz.variants["shared"], VariantValue::Bool(false));
}

#[test]
fn test_required_dependency_must_be_reached() {
    let index = mpi_index();
    let facts = facts();
    let err = Resolver::new(&index, &facts)
        .concretize(&specs(&["libz ^mpich"]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::UnsatisfiableConstraints { .. })
    ));
}

#[test]
fn test_recipe_conflict_moves_to_next_compiler() {
    let index = index(&[(
        "kokkos",
        r#"
[[versions]]
version = "4.2"
[[conflicts]]
when = "%gcc"
message = "needs clang"
"#,
    )]);
    let facts = facts();
    let dag = Resolver::new(&index, &facts)
        .concretize(&specs(&["kokkos"]))
        .unwrap();
    let node = dag.node(dag.find_name("kokkos").unwrap());
    assert_eq!(node.compiler.name, "clang");
}

#[test]
fn test_compiler_inherited_from_dependent() {
    let index = shared_index();
    let facts = facts();
    let dag = Resolver::new(&index, &facts)
        .concretize(&specs(&["app %clang"]))
        .unwrap();
    for name in ["app", "libfoo", "libz"] {
        let node = dag.node(dag.find_name(name).unwrap());
        assert_eq!(node.compiler.name, "clang", "{name}");
    }
}

#[test]
fn test_search_limit() {
    let index = shared_index();
    let facts = facts();
    let err = Resolver::new(&index, &facts)
        .with_options(ResolverOptions {
            max_steps: 1,
            ..ResolverOptions::default()
        })
        .concretize(&specs(&["app"]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::SearchLimitExceeded { limit: 1 })
    ));
}

#[test]
fn test_events_bracket_the_search() {
    let index = shared_index();
    let facts = facts();
    let (tx, mut rx) = sprig_events::channel();
    Resolver::new(&index, &facts)
        .with_event_sender(tx)
        .concretize(&specs(&["app"]))
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(
        events.first(),
        Some(AppEvent::Resolver(ResolverEvent::Started { .. }))
    ));
    assert!(matches!(
        events.last(),
        Some(AppEvent::Resolver(ResolverEvent::Completed { nodes: 3, .. }))
    ));
}

proptest! {
    #[test]
    fn prop_competing_roots_ignore_order(
        order in Just(vec!["x", "y", "x@1:", "y@1:"]).prop_shuffle()
    ) {
        let index = competing_index();
        let facts = facts();
        let resolver = Resolver::new(&index, &facts);
        let baseline = resolver.concretize(&specs(&["x", "y"])).unwrap();
        let other = resolver.concretize(&specs(&order)).unwrap();
        prop_assert_eq!(baseline.to_json().unwrap(), other.to_json().unwrap());
    }

    #[test]
    fn prop_hashes_ignore_request_order(reverse in any::<bool>(), shared in any::<bool>()) {
        let index = shared_index();
        let facts = facts();
        let resolver = Resolver::new(&index, &facts);
        let variant = if shared { "+shared" } else { "~shared" };
        let mut request = specs(&["app", "tool"]);
        request.push(format!("libfoo{variant}").parse().unwrap());
        let baseline = resolver.concretize(&request).unwrap();
        if reverse {
            request.reverse();
        }
        let other = resolver.concretize(&request).unwrap();
        for name in ["app", "tool", "libfoo", "libz"] {
            let a = baseline.node(baseline.find_name(name).unwrap()).hash.clone();
            let b = other.node(other.find_name(name).unwrap()).hash.clone();
            prop_assert_eq!(a, b);
        }
    }
}
