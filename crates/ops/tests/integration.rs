//! Integration tests for ops crate

use async_trait::async_trait;
use sprig_builder::{BuildExecutor, BuildReport, BuildRequest, SourceProvider};
use sprig_errors::{Error, ResolveError, SpecError};
use sprig_events::{AppEvent, GeneralEvent};
use sprig_index::{PackageIndex, PackageRecipeDescriptor};
use sprig_install::{ExecuteOptions, NodeStatus};
use sprig_ops::{OperationResult, OpsContextBuilder, OpsCtx};
use sprig_platform::PlatformFacts;
use sprig_spec::ConcreteNode;
use sprig_store::{InstallStatus, InstallStore};
use sprig_types::{ArchSpec, CompilerSpec, Version};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

struct EmptySource;

#[async_trait]
impl SourceProvider for EmptySource {
    async fn obtain_source(&self, _node: &ConcreteNode, dest: &Path) -> Result<PathBuf, Error> {
        tokio::fs::create_dir_all(dest).await?;
        Ok(dest.to_path_buf())
    }
}

/// Creates the prefix and remembers what it built
#[derive(Default)]
struct TouchExecutor {
    built: Mutex<Vec<String>>,
}

#[async_trait]
impl BuildExecutor for TouchExecutor {
    async fn run_phases(&self, request: &BuildRequest, _source_dir: &Path) -> Result<BuildReport, Error> {
        tokio::fs::create_dir_all(&request.prefix).await?;
        self.built.lock().unwrap().push(request.node.name.clone());
        Ok(BuildReport {
            prefix: request.prefix.clone(),
            log_path: request.log_path.clone(),
            duration: Duration::ZERO,
        })
    }
}

const APP: &str = r#"
[[versions]]
version = "1.0"

[[dependencies]]
spec = "libz@1.2:"
"#;

const LIBZ: &str = r#"
[[versions]]
version = "1.3"
[[versions]]
version = "1.2"
"#;

fn index() -> PackageIndex {
    PackageIndex::from_descriptors([
        PackageRecipeDescriptor::from_toml("app", APP).unwrap(),
        PackageRecipeDescriptor::from_toml("libz", LIBZ).unwrap(),
    ])
    .unwrap()
}

fn facts() -> PlatformFacts {
    PlatformFacts::new(
        ArchSpec::new("linux", "ubuntu22.04", "x86_64"),
        vec![CompilerSpec::exact("gcc", Version::parse("12.3").unwrap())],
    )
}

struct Harness {
    ctx: OpsCtx,
    executor: Arc<TouchExecutor>,
    events: tokio::sync::mpsc::UnboundedReceiver<AppEvent>,
    _root: TempDir,
}

fn harness() -> Harness {
    let root = tempdir().unwrap();
    let executor = Arc::new(TouchExecutor::default());
    let (tx, events) = sprig_events::channel();
    let ctx = OpsContextBuilder::new()
        .with_index(index())
        .with_facts(facts())
        .with_store(InstallStore::new(root.path()))
        .with_source(Arc::new(EmptySource))
        .with_executor(executor.clone())
        .with_event_sender(tx)
        .build()
        .unwrap();
    Harness {
        ctx,
        executor,
        events,
        _root: root,
    }
}

fn built(h: &Harness) -> Vec<String> {
    h.executor.built.lock().unwrap().clone()
}

#[tokio::test]
async fn test_install_builds_dependencies_first_then_nothing() {
    let h = harness();
    let specs = sprig_ops::parse_specs(&["app"]).unwrap();

    let report = sprig_ops::install(&h.ctx, &specs, &ExecuteOptions::default())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.count(NodeStatus::Installed), 2);
    assert_eq!(built(&h), ["libz", "app"]);

    let again = sprig_ops::install(&h.ctx, &specs, &ExecuteOptions::default())
        .await
        .unwrap();
    assert!(again.is_success());
    assert_eq!(again.count(NodeStatus::AlreadyInstalled), 2);
    assert_eq!(built(&h).len(), 2);
}

#[tokio::test]
async fn test_find_filters_by_name_and_version() {
    let h = harness();
    let specs = sprig_ops::parse_specs(&["app", "libz@1.2"]).unwrap();
    // app pins nothing below 1.2, so both roots share one libz
    let report = sprig_ops::install(&h.ctx, &specs, &ExecuteOptions::default())
        .await
        .unwrap();
    assert!(report.is_success());

    let all = sprig_ops::find(&h.ctx, None).await.unwrap();
    let names: Vec<&str> = all.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["app", "libz"]);
    assert!(all.iter().all(|p| p.status == InstallStatus::Installed));
    assert!(all.iter().all(|p| p.explicit));

    let query = "libz@1.2".parse().unwrap();
    let libz = sprig_ops::find(&h.ctx, Some(&query)).await.unwrap();
    assert_eq!(libz.len(), 1);
    assert_eq!(libz[0].version.to_string(), "1.2");

    let newer = "libz@1.3".parse().unwrap();
    assert!(sprig_ops::find(&h.ctx, Some(&newer)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plan_then_execute_matches_install() {
    let h = harness();
    let specs = sprig_ops::parse_specs(&["app"]).unwrap();
    let dag = Arc::new(sprig_ops::concretize(&h.ctx, &specs).unwrap());
    assert_eq!(dag.node(dag.find_name("libz").unwrap()).version.to_string(), "1.3");

    let plan = sprig_ops::plan(&h.ctx, dag).await.unwrap();
    assert_eq!(plan.names().collect::<Vec<_>>(), ["libz", "app"]);
    assert_eq!(plan.to_build(), 2);

    let report = sprig_ops::execute(&h.ctx, &plan, &ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(report.by_name("app").unwrap().status, NodeStatus::Installed);
    assert!(!report.by_name("libz").unwrap().explicit);
}

#[tokio::test]
async fn test_unknown_package_is_reported_and_emitted() {
    let mut h = harness();
    let specs = sprig_ops::parse_specs(&["nosuch"]).unwrap();
    let err = sprig_ops::install(&h.ctx, &specs, &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::UnknownPackage { ref name }) if name == "nosuch"
    ));
    assert!(built(&h).is_empty());

    let mut failed = false;
    while let Ok(event) = h.events.try_recv() {
        if let AppEvent::General(GeneralEvent::OperationFailed { operation, .. }) = event {
            failed |= operation == "concretize";
        }
    }
    assert!(failed);
}

#[test]
fn test_parse_specs_requires_input() {
    let none: [&str; 0] = [];
    assert!(matches!(
        sprig_ops::parse_specs(&none),
        Err(Error::Spec(SpecError::Parse { .. }))
    ));
    assert!(matches!(
        sprig_ops::parse_specs(&["app@"]),
        Err(Error::Spec(_))
    ));
}

#[test]
fn test_builder_names_missing_component() {
    let (tx, _rx) = sprig_events::channel();
    let err = OpsContextBuilder::new()
        .with_index(index())
        .with_facts(facts())
        .with_event_sender(tx)
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("store"));
}

#[test]
fn test_operation_result_json_is_tagged() {
    let result = OperationResult::Specs(vec!["app@1.0".to_string()]);
    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["type"], "Specs");
    assert_eq!(json["data"][0], "app@1.0");
    assert!(result.is_success());
}

#[tokio::test]
async fn test_saved_dag_installs_without_resolving() {
    let h = harness();
    let specs = sprig_ops::parse_specs(&["app"]).unwrap();
    let dag = sprig_ops::concretize(&h.ctx, &specs).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("app.json");
    let result = OperationResult::ConcreteDag(Arc::new(dag.clone()));
    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    tokio::fs::write(&path, serde_json::to_string(&json["data"]).unwrap())
        .await
        .unwrap();

    let loaded = sprig_ops::load_dag(&path).await.unwrap();
    assert_eq!(loaded.len(), dag.len());
    let plan = sprig_ops::plan(&h.ctx, Arc::new(loaded)).await.unwrap();
    let report = sprig_ops::execute(&h.ctx, &plan, &ExecuteOptions::default())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(built(&h), ["libz", "app"]);
}

#[tokio::test]
async fn test_load_dag_rejects_garbage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    tokio::fs::write(&path, "{\"nodes\": 3}").await.unwrap();
    assert!(matches!(
        sprig_ops::load_dag(&path).await,
        Err(Error::Spec(SpecError::MalformedGraph { .. }))
    ));
    assert!(matches!(
        sprig_ops::load_dag(&dir.path().join("missing.json")).await,
        Err(Error::Io { .. })
    ));
}
