//! Operations context for dependency injection

use sprig_builder::{BuildExecutor, MirrorSourceProvider, PhaseExecutor, SourceProvider};
use sprig_config::Config;
use sprig_errors::Error;
use sprig_events::{EventEmitter, EventSender};
use sprig_index::{IndexCache, PackageIndex};
use sprig_install::{BuildGraphScheduler, ExecuteOptions};
use sprig_platform::{HostProcess, PlatformFacts};
use sprig_resolver::{Resolver, ResolverOptions};
use sprig_store::InstallStore;
use std::sync::Arc;

/// Everything an operation needs, wired once per process
pub struct OpsCtx {
    /// Read-only recipe corpus
    pub index: Arc<PackageIndex>,
    /// Host arch and compilers
    pub facts: PlatformFacts,
    pub store: InstallStore,
    pub scheduler: BuildGraphScheduler,
    pub config: Config,
    /// Event sender for progress reporting
    pub tx: EventSender,
}

impl EventEmitter for OpsCtx {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(&self.tx)
    }
}

impl OpsCtx {
    /// Wire the default collaborators from `config`
    ///
    /// Loads the recipe index (through its snapshot cache), probes the host
    /// for compilers and serves sources from the configured mirror.
    ///
    /// # Errors
    ///
    /// Returns an error if the recipe directory cannot be loaded.
    pub async fn load(config: Config, tx: EventSender) -> Result<Self, Error> {
        let recipes = config.recipes_path();
        let cache = IndexCache::new(config.cache_path());
        let index = PackageIndex::load_dir_cached(&recipes, &cache).await?;
        tracing::debug!(recipes = %recipes.display(), packages = index.package_names().count(), "recipe index loaded");

        let facts = PlatformFacts::detect(&HostProcess::new())
            .await
            .with_compiler_preference(&config.resolver.compilers);
        let source = MirrorSourceProvider::new(config.mirror_path()).with_checksums_from(&index);

        OpsContextBuilder::new()
            .with_index(index)
            .with_facts(facts)
            .with_store(InstallStore::new(config.install_root()))
            .with_source(Arc::new(source))
            .with_executor(Arc::new(PhaseExecutor::new().with_event_sender(tx.clone())))
            .with_event_sender(tx)
            .with_config(config)
            .build()
    }

    /// Resolver over this context's index and facts
    #[must_use]
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.index, &self.facts)
            .with_options(ResolverOptions {
                max_steps: self.config.resolver.max_steps,
                providers: self.config.resolver.providers.clone(),
            })
            .with_event_sender(self.tx.clone())
    }

    /// Execution options from configuration
    #[must_use]
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions::from_config(&self.config)
    }
}

/// Builder for [`OpsCtx`]
#[derive(Default)]
pub struct OpsContextBuilder {
    index: Option<PackageIndex>,
    facts: Option<PlatformFacts>,
    store: Option<InstallStore>,
    source: Option<Arc<dyn SourceProvider>>,
    executor: Option<Arc<dyn BuildExecutor>>,
    tx: Option<EventSender>,
    config: Option<Config>,
}

impl OpsContextBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_index(mut self, index: PackageIndex) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn with_facts(mut self, facts: PlatformFacts) -> Self {
        self.facts = Some(facts);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: InstallStore) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn SourceProvider>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn BuildExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the context
    ///
    /// The configuration defaults when unset; every other component is
    /// required.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing component.
    pub fn build(self) -> Result<OpsCtx, Error> {
        let missing = |component: &str| Error::internal(format!("ops context is missing {component}"));

        let index = Arc::new(self.index.ok_or_else(|| missing("index"))?);
        let facts = self.facts.ok_or_else(|| missing("platform facts"))?;
        let tx = self.tx.ok_or_else(|| missing("event sender"))?;
        let store = self
            .store
            .ok_or_else(|| missing("store"))?
            .with_event_sender(tx.clone());
        let source = self.source.ok_or_else(|| missing("source provider"))?;
        let executor = self.executor.ok_or_else(|| missing("build executor"))?;

        let scheduler = BuildGraphScheduler::new(store.clone(), Arc::clone(&index), source, executor)
            .with_event_sender(tx.clone());

        Ok(OpsCtx {
            index,
            facts,
            store,
            scheduler,
            config: self.config.unwrap_or_default(),
            tx,
        })
    }
}
