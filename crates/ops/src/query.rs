//! Store queries

use crate::{InstalledPackage, OpsCtx};
use sprig_errors::Error;
use sprig_spec::Spec;

/// List store records, optionally narrowed by a spec's name and versions
///
/// Records come back sorted by name, then version.
///
/// # Errors
///
/// Returns an error if the record directory cannot be read.
pub async fn find(ctx: &OpsCtx, query: Option<&Spec>) -> Result<Vec<InstalledPackage>, Error> {
    let packages: Vec<InstalledPackage> = ctx
        .store
        .list()
        .await?
        .into_iter()
        .filter(|record| {
            query.is_none_or(|q| {
                (q.is_anonymous() || q.name == record.name) && q.versions.contains(&record.version)
            })
        })
        .map(InstalledPackage::from)
        .collect();
    tracing::debug!(matches = packages.len(), "store query");
    Ok(packages)
}
