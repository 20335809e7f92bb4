use std::sync::Arc;

use gauge_store::{
    collect_keys, paginate, sweep_descendants, Page, PageRequest, Query, Store, StoreError,
    UnitOfWork,
};
use gauge_types::{find_latest_version, timestamp, try_slug, Key, KeyBuilder, PaginationConfig};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::merge::{merge_version, new_component};
use crate::models::{
    ComponentQuery, ComponentRecord, GroupRecord, PublishRequest, Published, TagOptions,
    VersionRecord,
};

/// Group, component, and version bookkeeping over a shared store.
#[derive(Clone)]
pub struct ComponentRegistry {
    store: Arc<dyn Store>,
    keys: KeyBuilder,
    limits: PaginationConfig,
}

fn require_version(version: &str) -> RegistryResult<()> {
    if version.trim().is_empty() {
        return Err(RegistryError::Validation("version must not be empty".into()));
    }
    Ok(())
}

/// Stage the removal of `version` and the matching component update.
fn stage_version_removal(
    uow: &mut UnitOfWork,
    version_key: &Key,
    component_key: &Key,
    parent: Option<ComponentRecord>,
    version: &str,
) -> RegistryResult<()> {
    uow.delete(version_key.clone())?;
    if let Some(mut parent) = parent {
        parent.versions.retain(|v| v != version);
        parent.version = find_latest_version(&parent.versions);
        uow.put_record(component_key.clone(), &parent)?;
    }
    Ok(())
}

impl ComponentRegistry {
    /// Registry over `store`. Keys come from `keys`; listings are capped by `limits`.
    pub fn new(store: Arc<dyn Store>, keys: KeyBuilder, limits: PaginationConfig) -> Self {
        Self {
            store,
            keys,
            limits,
        }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    async fn get_record<T: serde::de::DeserializeOwned>(
        &self,
        key: &Key,
    ) -> RegistryResult<Option<T>> {
        match self.store().get(key).await? {
            Some(entity) => Ok(Some(gauge_store::to_record(entity)?)),
            None => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // Groups
    // -------------------------------------------------------------------------

    /// Get or create a group. Idempotent.
    pub async fn ensure_group(&self, name: &str) -> RegistryResult<GroupRecord> {
        let key = self.keys.group(name)?;
        let mut uow = UnitOfWork::begin(self.store(), "ensure-group").await?;
        if let Some(existing) = uow.get_record::<GroupRecord>(&key).await? {
            uow.rollback().await?;
            return Ok(existing);
        }

        let record = GroupRecord {
            id: key.name().to_string(),
            name: name.to_string(),
        };
        uow.put_record(key.clone(), &record)?;
        match uow.commit().await {
            Ok(()) => {
                info!(group = %key.name(), "group created");
                Ok(record)
            }
            Err(StoreError::Conflict { .. }) => {
                debug!(group = %key.name(), "group created concurrently");
                self.get_record(&key).await?.ok_or_else(|| {
                    RegistryError::Store(StoreError::Conflict {
                        key: key.to_string(),
                    })
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Look up a group by name. Names that do not slug resolve to `None`.
    pub async fn get_group(&self, name: &str) -> RegistryResult<Option<GroupRecord>> {
        let Ok(key) = self.keys.group(name) else {
            return Ok(None);
        };
        self.get_record(&key).await
    }

    /// Groups ordered by name.
    pub async fn list_groups(&self, page: &PageRequest) -> RegistryResult<Page<GroupRecord>> {
        let query = Query::kind(
            Some(self.keys.namespaces().registry.as_str()),
            &self.keys.kinds().group,
        )
        .order_asc("name");
        Ok(paginate(self.store(), query, page, &self.limits).await?)
    }

    /// Delete a group and everything under it. Returns `false` if absent.
    pub async fn delete_group(&self, name: &str) -> RegistryResult<bool> {
        let key = self.keys.group(name)?;
        self.delete_tree(key).await
    }

    // -------------------------------------------------------------------------
    // Components
    // -------------------------------------------------------------------------

    /// Get or create a component. An existing component has `version`
    /// merged in instead.
    pub async fn ensure_component(
        &self,
        version: &str,
        name: &str,
        group: &str,
        pkg: &str,
        org: &str,
        tags: &TagOptions,
    ) -> RegistryResult<ComponentRecord> {
        require_version(version)?;
        let key = self.keys.component(group, name)?;

        let mut uow = UnitOfWork::begin(self.store(), "ensure-component").await?;
        if let Some(existing) = uow.get_record::<ComponentRecord>(&key).await? {
            let outcome = self.merge_in(&mut uow, &key, existing, version, tags);
            return uow.complete(outcome).await;
        }

        let mut record = new_component(group, name, pkg, org, version, tags);
        record.id = key.name().to_string();
        uow.put_record(key.clone(), &record)?;
        match uow.commit().await {
            Ok(()) => {
                info!(component = %key, version, "component created");
                Ok(record)
            }
            Err(StoreError::Conflict { .. }) => {
                debug!(component = %key, "component created concurrently; merging");
                self.add_component_version(&record, version, tags).await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Merge `version` into the stored component that `record` names.
    ///
    /// The current stored record is re-read inside the unit of work; `record`
    /// is only used when none is stored yet. The write happens only if the
    /// merge changed something.
    pub async fn add_component_version(
        &self,
        record: &ComponentRecord,
        version: &str,
        tags: &TagOptions,
    ) -> RegistryResult<ComponentRecord> {
        require_version(version)?;
        let key = self.keys.component(&record.group, &record.name)?;
        let mut uow = UnitOfWork::begin(self.store(), "add-component-version").await?;
        let current = match uow.get_record::<ComponentRecord>(&key).await? {
            Some(current) => current,
            None => record.clone(),
        };
        let outcome = self.merge_in(&mut uow, &key, current, version, tags);
        uow.complete(outcome).await
    }

    fn merge_in(
        &self,
        uow: &mut UnitOfWork,
        key: &Key,
        current: ComponentRecord,
        version: &str,
        tags: &TagOptions,
    ) -> RegistryResult<ComponentRecord> {
        match merge_version(&current, version, tags) {
            Some(mut merged) => {
                merged.id = key.name().to_string();
                uow.put_record(key.clone(), &merged)?;
                debug!(
                    component = %key,
                    version,
                    latest = merged.version.as_deref().unwrap_or("-"),
                    "component version merged"
                );
                Ok(merged)
            }
            None => Ok(current),
        }
    }

    /// Look up a component. Names that do not slug resolve to `None`.
    pub async fn get_component(
        &self,
        group: &str,
        name: &str,
    ) -> RegistryResult<Option<ComponentRecord>> {
        let Ok(key) = self.keys.component(group, name) else {
            return Ok(None);
        };
        self.get_record(&key).await
    }

    /// Components ordered by name, optionally scoped to a group and
    /// filtered by tags (all must match).
    pub async fn list_components(
        &self,
        filter: &ComponentQuery,
    ) -> RegistryResult<Page<ComponentRecord>> {
        let mut query = Query::kind(
            Some(self.keys.namespaces().registry.as_str()),
            &self.keys.kinds().component,
        );
        if let Some(group) = &filter.group {
            query = query.with_ancestor(self.keys.group(group)?);
        }
        for tag in &filter.tags {
            query = query.filter("tags", tag.as_str());
        }
        let query = query.order_asc("name");
        Ok(paginate(self.store(), query, &filter.page, &self.limits).await?)
    }

    /// Delete a component and all its versions. Returns `false` if absent.
    pub async fn delete_component(&self, group: &str, name: &str) -> RegistryResult<bool> {
        let key = self.keys.component(group, name)?;
        self.delete_tree(key).await
    }

    // -------------------------------------------------------------------------
    // Versions
    // -------------------------------------------------------------------------

    /// Get or create a version record under `parent`.
    ///
    /// An existing record is fully replaced: `created`, `docs`, `tags`
    /// (mirrored from the parent), and `changelog` (removed when `None`).
    pub async fn ensure_version(
        &self,
        parent: &ComponentRecord,
        version: &str,
        docs: &str,
        changelog: Option<&str>,
    ) -> RegistryResult<VersionRecord> {
        require_version(version)?;
        let key = self.keys.version(&parent.group, &parent.name, version)?;
        let record = VersionRecord {
            id: key.name().to_string(),
            name: version.to_string(),
            docs: docs.to_string(),
            created: timestamp::now(),
            changelog: changelog.map(str::to_string),
            tags: parent.tags.clone(),
        };

        // Blind write: a concurrent publisher of the same version is replaced.
        let mut uow = UnitOfWork::begin(self.store(), "ensure-version").await?;
        uow.put_record(key.clone(), &record)?;
        uow.commit().await?;
        info!(version = %key, "version written");
        Ok(record)
    }

    /// Look up one version record. Unkeyable input resolves to `None`.
    pub async fn get_version(
        &self,
        group: &str,
        component: &str,
        version: &str,
    ) -> RegistryResult<Option<VersionRecord>> {
        let Ok(key) = self.keys.version(group, component, version) else {
            return Ok(None);
        };
        self.get_record(&key).await
    }

    /// Versions of one component, newest first.
    pub async fn list_versions(
        &self,
        group: &str,
        component: &str,
        page: &PageRequest,
    ) -> RegistryResult<Page<VersionRecord>> {
        let parent = self.keys.component(group, component)?;
        let query = Query::kind(
            Some(self.keys.namespaces().registry.as_str()),
            &self.keys.kinds().version,
        )
        .with_ancestor(parent)
        .order_desc("created");
        Ok(paginate(self.store(), query, page, &self.limits).await?)
    }

    /// Delete one version and drop it from the component's bookkeeping.
    ///
    /// The component's `version` is recomputed as the latest remaining
    /// release. Returns `false` if the version record does not exist.
    pub async fn delete_version(
        &self,
        group: &str,
        component: &str,
        version: &str,
    ) -> RegistryResult<bool> {
        require_version(version)?;
        let component_key = self.keys.component(group, component)?;
        let version_key = self.keys.version(group, component, version)?;

        let mut uow = UnitOfWork::begin(self.store(), "delete-version").await?;
        if uow.get(&version_key).await?.is_none() {
            uow.rollback().await?;
            return Ok(false);
        }
        let parent = uow.get_record::<ComponentRecord>(&component_key).await?;
        let outcome =
            stage_version_removal(&mut uow, &version_key, &component_key, parent, version);
        uow.complete(outcome).await?;
        info!(version = %version_key, "version deleted");
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Publishing
    // -------------------------------------------------------------------------

    /// Ensure the group, the component, and the version, in that order.
    pub async fn publish(&self, req: &PublishRequest) -> RegistryResult<Published> {
        require_version(&req.version)?;
        try_slug(&req.group)?;
        try_slug(&req.name)?;

        let group = self.ensure_group(&req.group).await?;
        let component = self
            .ensure_component(
                &req.version,
                &req.name,
                &req.group,
                &req.pkg,
                &req.org,
                &req.tags,
            )
            .await?;
        let version = self
            .ensure_version(&component, &req.version, &req.docs, req.changelog.as_deref())
            .await?;
        info!(
            group = %group.name,
            component = %component.name,
            version = %version.name,
            "component published"
        );
        Ok(Published {
            group,
            component,
            version,
        })
    }

    /// Delete `root` and every descendant.
    ///
    /// Descendants written between the sweep and the batch delete are
    /// caught by re-sweeping until the subtree is empty.
    async fn delete_tree(&self, root: Key) -> RegistryResult<bool> {
        let mut keys = collect_keys(self.store(), Query::descendants(&root)).await?;
        let existed = self.store().get(&root).await?.is_some();
        if !existed && keys.is_empty() {
            return Ok(false);
        }
        keys.push(root.clone());
        let mut removed = self.store().delete_many(&keys).await?;
        removed += sweep_descendants(self.store(), &root).await?;
        info!(root = %root, removed, "registry subtree deleted");
        Ok(existed)
    }
}
