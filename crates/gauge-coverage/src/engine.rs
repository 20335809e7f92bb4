use std::sync::Arc;

use gauge_store::{paginate, to_entity, to_record, Page, PageRequest, Query, Store, UnitOfWork};
use gauge_types::{
    is_newer, is_release, parse_version, timestamp, Key, KeyBuilder, PaginationConfig, TypeError,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoverageError, CoverageResult};
use crate::models::{
    ComponentCoverageRecord, CoverageReport, CoverageRunRecord, FileCoverageRecord,
    NewCoverageRun, RunQuery, RunStatus, VersionCoverageRecord,
};

/// Coverage run lifecycle and rollups.
///
/// A run moves `queued → running → finished`. Finishing a run writes the
/// per-file, per-version, and (when the tag is the newest release seen)
/// per-component aggregates in the same unit of work as the status change.
#[derive(Clone)]
pub struct CoverageEngine {
    store: Arc<dyn Store>,
    keys: KeyBuilder,
    limits: PaginationConfig,
}

fn require(field: &str, value: &str) -> CoverageResult<()> {
    if value.trim().is_empty() {
        return Err(CoverageError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl CoverageEngine {
    /// Engine over `store`, keyed and paged per the given config.
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

    fn namespace(&self) -> Option<&str> {
        Some(self.keys.namespaces().coverage.as_str())
    }

    /// Read the record at `key`; an unbuildable key reads as absent.
    async fn lookup<T: serde::de::DeserializeOwned>(
        &self,
        key: Result<Key, TypeError>,
    ) -> CoverageResult<Option<T>> {
        let Ok(key) = key else {
            return Ok(None);
        };
        match self.store().get(&key).await? {
            Some(entity) => Ok(Some(to_record(entity)?)),
            None => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Create a `queued` run.
    pub async fn insert(&self, def: &NewCoverageRun) -> CoverageResult<CoverageRunRecord> {
        require("component", &def.component)?;
        require("org", &def.org)?;
        require("tag", &def.tag)?;
        require("branch", &def.branch)?;

        let id = Uuid::now_v7().to_string();
        let key = self.keys.coverage_run(&id)?;
        let record = CoverageRunRecord {
            id: id.clone(),
            component: def.component.clone(),
            org: def.org.clone(),
            tag: def.tag.clone(),
            branch: def.branch.clone(),
            status: RunStatus::Queued,
            created: timestamp::now(),
            start_time: None,
            end_time: None,
            coverage: None,
            error: false,
            message: None,
            creator: def.creator.clone(),
        };
        self.store().put(to_entity(key, &record)?).await?;
        info!(
            run = %id,
            component = %record.component,
            tag = %record.tag,
            "coverage run queued"
        );
        Ok(record)
    }

    /// Look up a run. Ids that cannot form a key resolve to `None`.
    pub async fn get_run(&self, run_id: &str) -> CoverageResult<Option<CoverageRunRecord>> {
        self.lookup(self.keys.coverage_run(run_id)).await
    }

    /// `queued → running`.
    pub async fn start(&self, run_id: &str) -> CoverageResult<Option<CoverageRunRecord>> {
        self.transition(
            run_id,
            "start-coverage-run",
            &[RunStatus::Queued],
            RunStatus::Running,
            |run| run.start_time = Some(timestamp::now()),
        )
        .await
    }

    /// Finish a `queued` or `running` run as failed.
    pub async fn run_error(
        &self,
        run_id: &str,
        message: &str,
    ) -> CoverageResult<Option<CoverageRunRecord>> {
        self.transition(
            run_id,
            "fail-coverage-run",
            &[RunStatus::Queued, RunStatus::Running],
            RunStatus::Finished,
            |run| {
                run.end_time = Some(timestamp::now());
                run.error = true;
                run.message = Some(message.to_string());
            },
        )
        .await
    }

    async fn transition<F>(
        &self,
        run_id: &str,
        label: &'static str,
        from: &[RunStatus],
        to: RunStatus,
        apply: F,
    ) -> CoverageResult<Option<CoverageRunRecord>>
    where
        F: FnOnce(&mut CoverageRunRecord),
    {
        let Ok(key) = self.keys.coverage_run(run_id) else {
            return Ok(None);
        };
        let mut uow = UnitOfWork::begin(self.store(), label).await?;
        let Some(mut run) = uow.get_record::<CoverageRunRecord>(&key).await? else {
            uow.rollback().await?;
            return Ok(None);
        };
        if !from.contains(&run.status) {
            let err = CoverageError::InvalidStateTransition {
                from: run.status,
                to,
            };
            return uow.complete(Err(err)).await;
        }

        let previous = run.status;
        run.status = to;
        apply(&mut run);
        let outcome = uow.put_record(key, &run).map_err(CoverageError::from);
        let run = uow.complete(outcome.map(|()| run)).await?;
        info!(run = %run_id, from = %previous, to = %to, "coverage run transitioned");
        Ok(Some(run))
    }

    /// Finish a `running` run and roll its report up.
    ///
    /// The status change and every rollup write commit together; if any of
    /// them fails nothing is written and the run stays `running`.
    pub async fn finish_run(
        &self,
        run_id: &str,
        report: &CoverageReport,
    ) -> CoverageResult<Option<CoverageRunRecord>> {
        let Ok(key) = self.keys.coverage_run(run_id) else {
            return Ok(None);
        };
        let mut uow = UnitOfWork::begin(self.store(), "finish-coverage-run").await?;
        let Some(run) = uow.get_record::<CoverageRunRecord>(&key).await? else {
            uow.rollback().await?;
            return Ok(None);
        };
        if run.status != RunStatus::Running {
            let err = CoverageError::InvalidStateTransition {
                from: run.status,
                to: RunStatus::Finished,
            };
            return uow.complete(Err(err)).await;
        }

        let outcome = self.stage_rollup(&mut uow, key, run, report).await;
        let run = uow.complete(outcome).await?;
        info!(
            run = %run_id,
            component = %run.component,
            tag = %run.tag,
            files = report.files.len(),
            "coverage run finished"
        );
        Ok(Some(run))
    }

    async fn stage_rollup(
        &self,
        uow: &mut UnitOfWork,
        run_key: Key,
        mut run: CoverageRunRecord,
        report: &CoverageReport,
    ) -> CoverageResult<CoverageRunRecord> {
        run.status = RunStatus::Finished;
        run.end_time = Some(timestamp::now());
        run.coverage = Some(report.summary.clone());
        uow.put_record(run_key, &run)?;

        for file in &report.files {
            let key = self
                .keys
                .file_coverage(&run.component, &run.org, &run.tag, &file.file)?;
            let record = FileCoverageRecord {
                id: file.file.clone(),
                file: file.file.clone(),
                title: file.title.clone(),
                functions: file.functions.clone(),
                lines: file.lines.clone(),
                branches: file.branches.clone(),
                coverage: file.coverage,
                coverage_id: run.id.clone(),
            };
            uow.put_record(key, &record)?;
        }

        let version_key = self
            .keys
            .coverage_version(&run.component, &run.org, &run.tag)?;
        let version = VersionCoverageRecord {
            id: run.tag.clone(),
            coverage: report.summary.clone(),
            version: run.tag.clone(),
            coverage_id: run.id.clone(),
        };
        uow.put_record(version_key, &version)?;

        if !is_release(&run.tag) {
            if parse_version(&run.tag).is_none() {
                warn!(
                    run = %run.id,
                    tag = %run.tag,
                    "tag is not semver; component aggregate left unchanged"
                );
            } else {
                debug!(
                    run = %run.id,
                    tag = %run.tag,
                    "prerelease tag; component aggregate left unchanged"
                );
            }
            return Ok(run);
        }

        let component_key = self.keys.coverage_component(&run.component, &run.org)?;
        let current = uow
            .get_record::<ComponentCoverageRecord>(&component_key)
            .await?;
        if let Some(current) = &current {
            if is_newer(&current.version, &run.tag) {
                debug!(
                    run = %run.id,
                    tag = %run.tag,
                    stored = %current.version,
                    "older tag; component aggregate left unchanged"
                );
                return Ok(run);
            }
        }
        let aggregate = ComponentCoverageRecord {
            id: run.component.clone(),
            coverage: report.summary.clone(),
            version: run.tag.clone(),
            coverage_id: run.id.clone(),
        };
        uow.put_record(component_key, &aggregate)?;
        debug!(run = %run.id, version = %run.tag, "component aggregate advanced");
        Ok(run)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// File entries of the version a run reported on.
    ///
    /// Returns `None` if the run does not exist.
    pub async fn query_run_files(
        &self,
        run_id: &str,
        page: &PageRequest,
    ) -> CoverageResult<Option<Page<FileCoverageRecord>>> {
        let Some(run) = self.get_run(run_id).await? else {
            return Ok(None);
        };
        let version_key = self
            .keys
            .coverage_version(&run.component, &run.org, &run.tag)?;
        let query = Query::kind(self.namespace(), &self.keys.kinds().file_coverage)
            .with_ancestor(version_key);
        Ok(Some(paginate(self.store(), query, page, &self.limits).await?))
    }

    /// Newest-release aggregate of a component.
    pub async fn get_component_coverage(
        &self,
        component: &str,
        org: &str,
    ) -> CoverageResult<Option<ComponentCoverageRecord>> {
        self.lookup(self.keys.coverage_component(component, org))
            .await
    }

    /// Summary of one reported version.
    pub async fn get_version_coverage(
        &self,
        component: &str,
        org: &str,
        version: &str,
    ) -> CoverageResult<Option<VersionCoverageRecord>> {
        self.lookup(self.keys.coverage_version(component, org, version))
            .await
    }

    /// Version summaries of one component, in key order.
    pub async fn list_version_coverage(
        &self,
        component: &str,
        org: &str,
        page: &PageRequest,
    ) -> CoverageResult<Page<VersionCoverageRecord>> {
        let Ok(parent) = self.keys.coverage_component(component, org) else {
            return Ok(Page::empty());
        };
        let query = Query::kind(self.namespace(), &self.keys.kinds().coverage_version)
            .with_ancestor(parent);
        Ok(paginate(self.store(), query, page, &self.limits).await?)
    }

    /// Runs, newest first.
    pub async fn list_runs(&self, filter: &RunQuery) -> CoverageResult<Page<CoverageRunRecord>> {
        let mut query = Query::kind(self.namespace(), &self.keys.kinds().coverage_run);
        if let Some(component) = &filter.component {
            query = query.filter("component", component.as_str());
        }
        if let Some(org) = &filter.org {
            query = query.filter("org", org.as_str());
        }
        let query = query.order_desc("created");
        Ok(paginate(self.store(), query, &filter.page, &self.limits).await?)
    }

    /// Remove the run record only. Rollups stay as history.
    pub async fn delete(&self, run_id: &str) -> CoverageResult<bool> {
        let Ok(key) = self.keys.coverage_run(run_id) else {
            return Ok(false);
        };
        let existed = self.store().delete(&key).await?;
        if existed {
            info!(run = %run_id, "coverage run deleted");
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoverageMetric, CoverageSummary, FileCoverage};
    use gauge_store::InMemoryStore;
    use gauge_types::GaugeConfig;

    fn engine() -> (CoverageEngine, InMemoryStore) {
        let store = InMemoryStore::new();
        let config = GaugeConfig::default();
        let engine = CoverageEngine::new(
            Arc::new(store.clone()),
            KeyBuilder::new(&config),
            config.pagination,
        );
        (engine, store)
    }

    fn new_run(tag: &str) -> NewCoverageRun {
        NewCoverageRun {
            component: "button".into(),
            org: "acme".into(),
            tag: tag.into(),
            branch: "main".into(),
            creator: Some("ci".into()),
        }
    }

    fn report(covered: u64, files: &[&str]) -> CoverageReport {
        CoverageReport {
            summary: CoverageSummary {
                lines: Some(CoverageMetric::from_counts(covered, 100)),
                ..CoverageSummary::default()
            },
            files: files
                .iter()
                .map(|file| FileCoverage {
                    file: file.to_string(),
                    title: None,
                    functions: None,
                    lines: Some(CoverageMetric::from_counts(covered, 100)),
                    branches: None,
                    coverage: covered as f64,
                })
                .collect(),
        }
    }

    /// Insert, start, and finish a run for `tag`.
    async fn run_to_finish(engine: &CoverageEngine, tag: &str, covered: u64) -> CoverageRunRecord {
        let run = engine.insert(&new_run(tag)).await.unwrap();
        engine.start(&run.id).await.unwrap().unwrap();
        engine
            .finish_run(&run.id, &report(covered, &["src/button.ts"]))
            .await
            .unwrap()
            .unwrap()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[tokio::test]
    async fn lifecycle_moves_forward_only() {
        let (engine, _) = engine();
        let run = engine.insert(&new_run("1.0.0")).await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);

        let started = engine.start(&run.id).await.unwrap().unwrap();
        assert_eq!(started.status, RunStatus::Running);
        assert!(started.start_time.is_some());

        let err = engine.start(&run.id).await.unwrap_err();
        assert!(matches!(
            err,
            CoverageError::InvalidStateTransition {
                from: RunStatus::Running,
                to: RunStatus::Running
            }
        ));

        let finished = engine
            .finish_run(&run.id, &report(80, &[]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finished.status, RunStatus::Finished);
        assert!(engine.run_error(&run.id, "late").await.is_err());
    }

    #[tokio::test]
    async fn finish_requires_running() {
        let (engine, _) = engine();
        let run = engine.insert(&new_run("1.0.0")).await.unwrap();
        let err = engine.finish_run(&run.id, &report(50, &[])).await.unwrap_err();
        assert!(matches!(err, CoverageError::InvalidStateTransition { .. }));
        let stored = engine.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Queued);
    }

    #[tokio::test]
    async fn run_error_marks_finished_with_message() {
        let (engine, _) = engine();
        let run = engine.insert(&new_run("1.0.0")).await.unwrap();
        let failed = engine
            .run_error(&run.id, "jest exited with 1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, RunStatus::Finished);
        assert!(failed.error);
        assert_eq!(failed.message.as_deref(), Some("jest exited with 1"));
        assert!(failed.end_time.is_some());
    }

    #[tokio::test]
    async fn missing_runs_are_none() {
        let (engine, _) = engine();
        assert!(engine.get_run("nope").await.unwrap().is_none());
        assert!(engine.start("nope").await.unwrap().is_none());
        assert!(engine.run_error("nope", "x").await.unwrap().is_none());
        assert!(engine
            .finish_run("nope", &CoverageReport::default())
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .query_run_files("nope", &PageRequest::default())
            .await
            .unwrap()
            .is_none());
        assert!(!engine.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn unkeyable_ids_are_missing() {
        let (engine, store) = engine();
        assert!(engine.get_run("").await.unwrap().is_none());
        assert!(engine.start("").await.unwrap().is_none());
        assert!(engine
            .finish_run("", &CoverageReport::default())
            .await
            .unwrap()
            .is_none());
        assert!(engine.get_component_coverage("", "acme").await.unwrap().is_none());
        assert!(engine
            .get_version_coverage("button", "", "1.0.0")
            .await
            .unwrap()
            .is_none());
        let versions = engine
            .list_version_coverage("", "acme", &PageRequest::default())
            .await
            .unwrap();
        assert!(versions.entities.is_empty());
        assert!(!engine.delete("").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn insert_validates_before_writing() {
        let (engine, store) = engine();
        let mut def = new_run("1.0.0");
        def.branch = " ".into();
        assert!(matches!(
            engine.insert(&def).await,
            Err(CoverageError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    // =========================================================================
    // Rollups
    // =========================================================================

    #[tokio::test]
    async fn component_aggregate_never_regresses() {
        let (engine, _) = engine();
        let first = run_to_finish(&engine, "2.0.0", 70).await;
        let aggregate = engine
            .get_component_coverage("button", "acme")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aggregate.version, "2.0.0");
        assert_eq!(aggregate.coverage_id, first.id);

        run_to_finish(&engine, "1.5.0", 90).await;
        let aggregate = engine
            .get_component_coverage("button", "acme")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aggregate.version, "2.0.0");
        assert_eq!(aggregate.coverage_id, first.id);
        // The older version's own summary is still recorded.
        let older = engine
            .get_version_coverage("button", "acme", "1.5.0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(older.coverage.lines.unwrap().covered, 90);

        let newest = run_to_finish(&engine, "3.0.0", 75).await;
        let aggregate = engine
            .get_component_coverage("button", "acme")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aggregate.version, "3.0.0");
        assert_eq!(aggregate.coverage_id, newest.id);
    }

    #[tokio::test]
    async fn prerelease_tag_leaves_component_aggregate() {
        let (engine, _) = engine();
        let release = run_to_finish(&engine, "2.0.0", 70).await;
        let rc = run_to_finish(&engine, "3.0.0-rc1", 95).await;

        let aggregate = engine
            .get_component_coverage("button", "acme")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aggregate.version, "2.0.0");
        assert_eq!(aggregate.coverage_id, release.id);

        let version = engine
            .get_version_coverage("button", "acme", "3.0.0-rc1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(version.coverage_id, rc.id);
    }

    #[tokio::test]
    async fn prerelease_first_creates_no_aggregate() {
        let (engine, _) = engine();
        run_to_finish(&engine, "1.0.0-beta.1", 50).await;
        run_to_finish(&engine, "nightly", 50).await;
        assert!(engine
            .get_component_coverage("button", "acme")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rollup_failure_rolls_back_status() {
        let (engine, store) = engine();
        let run = engine.insert(&new_run("1.0.0")).await.unwrap();
        engine.start(&run.id).await.unwrap();

        store.fail_writes_to_kind("ComponentVersionCoverageResult");
        let err = engine
            .finish_run(&run.id, &report(80, &["src/a.ts", "src/b.ts"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoverageError::Store(_)));

        let stored = engine.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Running);
        assert!(stored.coverage.is_none());
        assert!(engine
            .get_version_coverage("button", "acme", "1.0.0")
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .get_component_coverage("button", "acme")
            .await
            .unwrap()
            .is_none());

        store.clear_faults();
        let finished = engine
            .finish_run(&run.id, &report(80, &["src/a.ts"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finished.status, RunStatus::Finished);
    }

    #[tokio::test]
    async fn run_files_page_through_version_rollup() {
        let (engine, _) = engine();
        let run = engine.insert(&new_run("1.0.0")).await.unwrap();
        engine.start(&run.id).await.unwrap();
        let files = ["src/a.ts", "src/b.ts", "src/c.ts"];
        engine.finish_run(&run.id, &report(60, &files)).await.unwrap();

        let first = engine
            .query_run_files(&run.id, &PageRequest::first(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.entities.len(), 2);
        let token = first.page_token.clone().unwrap();
        let second = engine
            .query_run_files(&run.id, &PageRequest::first(2).next(token))
            .await
            .unwrap()
            .unwrap();
        assert!(second.is_last());

        let seen: Vec<String> = first
            .entities
            .iter()
            .chain(second.entities.iter())
            .map(|f| f.file.clone())
            .collect();
        assert_eq!(seen, files);
        assert!(first.entities.iter().all(|f| f.coverage_id == run.id));
    }

    #[tokio::test]
    async fn list_version_coverage_under_component() {
        let (engine, _) = engine();
        run_to_finish(&engine, "1.0.0", 50).await;
        run_to_finish(&engine, "1.1.0", 60).await;

        let page = engine
            .list_version_coverage("button", "acme", &PageRequest::default())
            .await
            .unwrap();
        let versions: Vec<&str> = page.entities.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(versions, vec!["1.0.0", "1.1.0"]);
    }

    // =========================================================================
    // Listing and deletion
    // =========================================================================

    #[tokio::test]
    async fn list_runs_filters_and_orders_newest_first() {
        let (engine, _) = engine();
        let older = engine.insert(&new_run("1.0.0")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let newer = engine.insert(&new_run("1.1.0")).await.unwrap();
        let mut other = new_run("1.0.0");
        other.component = "chart".into();
        engine.insert(&other).await.unwrap();

        let page = engine
            .list_runs(&RunQuery {
                component: Some("button".into()),
                ..RunQuery::default()
            })
            .await
            .unwrap();
        let ids: Vec<&str> = page.entities.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
    }

    #[tokio::test]
    async fn delete_keeps_rollups() {
        let (engine, _) = engine();
        let run = run_to_finish(&engine, "1.0.0", 50).await;
        assert!(engine.delete(&run.id).await.unwrap());
        assert!(engine.get_run(&run.id).await.unwrap().is_none());
        assert!(engine
            .get_version_coverage("button", "acme", "1.0.0")
            .await
            .unwrap()
            .is_some());
        assert!(engine
            .get_component_coverage("button", "acme")
            .await
            .unwrap()
            .is_some());
    }
}
