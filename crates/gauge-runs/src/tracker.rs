use std::sync::Arc;

use gauge_store::{
    collect_keys, paginate, sweep_descendants, to_entity, to_record, Page, PageRequest, Query,
    Record, Store, UnitOfWork,
};
use gauge_types::{timestamp, Key, KeyBuilder, PaginationConfig};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RunError, RunResult};
use crate::models::{
    NewRun, RunComponentInput, RunComponentRecord, RunKind, RunLogRecord, RunOutcome, RunRecord,
    RunStatus,
};

/// Test and build runs with their component and log sub-records.
///
/// Sub-records live under the run's key, so one ancestor query finds all
/// of them and deleting a run removes them in the same batch.
#[derive(Clone)]
pub struct RunTracker {
    store: Arc<dyn Store>,
    keys: KeyBuilder,
    limits: PaginationConfig,
}

impl RunTracker {
    /// Tracker over `store`, keyed and paged per the given config.
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
        Some(self.keys.namespaces().runs.as_str())
    }

    fn run_key(&self, kind: RunKind, run_id: &str) -> RunResult<Key> {
        Ok(self.keys.run(kind.store_kind(self.keys.kinds()), run_id)?)
    }

    /// Key of an existing-or-not run; `None` if `run_id` cannot name one.
    fn lookup_key(&self, kind: RunKind, run_id: &str) -> Option<Key> {
        self.keys.run(kind.store_kind(self.keys.kinds()), run_id).ok()
    }

    /// Create a queued run with a fresh time-ordered id.
    pub async fn insert(&self, kind: RunKind, def: &NewRun) -> RunResult<RunRecord> {
        let id = Uuid::now_v7().to_string();
        let key = self.run_key(kind, &id)?;
        let record = RunRecord {
            id: id.clone(),
            kind,
            component: def.component.clone(),
            branch: def.branch.clone(),
            commit: def.commit.clone(),
            creator: def.creator.clone(),
            status: RunStatus::Queued,
            result: None,
            message: None,
            created: timestamp::now(),
            start_time: None,
            end_time: None,
        };
        self.store().put(to_entity(key, &record)?).await?;
        info!(run = %id, %kind, "run queued");
        Ok(record)
    }

    /// Look up a run. Returns `None` if absent.
    pub async fn get(&self, kind: RunKind, run_id: &str) -> RunResult<Option<RunRecord>> {
        let Some(key) = self.lookup_key(kind, run_id) else {
            return Ok(None);
        };
        match self.store().get(&key).await? {
            Some(entity) => Ok(Some(to_record(entity)?)),
            None => Ok(None),
        }
    }

    /// `queued → running`.
    pub async fn start(&self, kind: RunKind, run_id: &str) -> RunResult<Option<RunRecord>> {
        self.transition(kind, run_id, RunStatus::Queued, RunStatus::Running, |run| {
            run.start_time = Some(timestamp::now());
        })
        .await
    }

    /// `running → finished`, recording the outcome.
    pub async fn complete(
        &self,
        kind: RunKind,
        run_id: &str,
        passed: bool,
        message: Option<&str>,
    ) -> RunResult<Option<RunRecord>> {
        self.transition(kind, run_id, RunStatus::Running, RunStatus::Finished, |run| {
            run.end_time = Some(timestamp::now());
            run.result = Some(RunOutcome::from_passed(passed));
            run.message = message.map(str::to_string);
        })
        .await
    }

    async fn transition<F>(
        &self,
        kind: RunKind,
        run_id: &str,
        from: RunStatus,
        to: RunStatus,
        apply: F,
    ) -> RunResult<Option<RunRecord>>
    where
        F: FnOnce(&mut RunRecord),
    {
        let Some(key) = self.lookup_key(kind, run_id) else {
            return Ok(None);
        };
        let mut uow = UnitOfWork::begin(self.store(), "run-transition").await?;
        let Some(mut run) = uow.get_record::<RunRecord>(&key).await? else {
            uow.rollback().await?;
            return Ok(None);
        };
        if run.status != from {
            let err = RunError::InvalidStateTransition {
                from: run.status,
                to,
            };
            return uow.complete(Err(err)).await;
        }
        run.status = to;
        apply(&mut run);
        let outcome = uow.put_record(key, &run).map_err(RunError::from);
        let run = uow.complete(outcome.map(|()| run)).await?;
        info!(run = %run_id, %kind, %from, %to, "run transitioned");
        Ok(Some(run))
    }

    /// Attach a component to a run. Returns `None` if the run does not exist.
    pub async fn add_component(
        &self,
        kind: RunKind,
        run_id: &str,
        input: &RunComponentInput,
    ) -> RunResult<Option<RunComponentRecord>> {
        if input.name.trim().is_empty() {
            return Err(RunError::Validation("component name must not be empty".into()));
        }
        let Some(run_key) = self.lookup_key(kind, run_id) else {
            return Ok(None);
        };
        let key = self.keys.run_component(&run_key, &input.name)?;
        let record = RunComponentRecord {
            id: input.name.clone(),
            name: input.name.clone(),
            version: input.version.clone(),
            result: input.passed.map(RunOutcome::from_passed),
        };
        if !self.stage_child(run_key, key, &record, "add-run-component").await? {
            return Ok(None);
        }
        debug!(run = %run_id, component = %record.name, "run component added");
        Ok(Some(record))
    }

    /// Append a log line to a run. Returns `None` if the run does not exist.
    pub async fn add_log(
        &self,
        kind: RunKind,
        run_id: &str,
        line: &str,
    ) -> RunResult<Option<RunLogRecord>> {
        let Some(run_key) = self.lookup_key(kind, run_id) else {
            return Ok(None);
        };
        let id = Uuid::now_v7().to_string();
        let key = self.keys.run_log(&run_key, &id)?;
        let record = RunLogRecord {
            id,
            line: line.to_string(),
            created: timestamp::now(),
        };
        if !self.stage_child(run_key, key, &record, "add-run-log").await? {
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Write `record` under `run_key` if the run exists.
    async fn stage_child<T: Record>(
        &self,
        run_key: Key,
        key: Key,
        record: &T,
        label: &'static str,
    ) -> RunResult<bool> {
        let entity = to_entity(key, record)?;
        UnitOfWork::run(self.store(), label, move |uow| {
            Box::pin(async move {
                if uow.get(&run_key).await?.is_none() {
                    return Ok(false);
                }
                uow.put(entity)?;
                Ok::<bool, RunError>(true)
            })
        })
        .await
    }

    /// Runs of one kind, newest first.
    pub async fn list_runs(&self, kind: RunKind, page: &PageRequest) -> RunResult<Page<RunRecord>> {
        let query =
            Query::kind(self.namespace(), kind.store_kind(self.keys.kinds())).order_desc("created");
        Ok(paginate(self.store(), query, page, &self.limits).await?)
    }

    /// Components attached to a run, by name.
    pub async fn list_components(
        &self,
        kind: RunKind,
        run_id: &str,
        page: &PageRequest,
    ) -> RunResult<Page<RunComponentRecord>> {
        let Some(run_key) = self.lookup_key(kind, run_id) else {
            return Ok(Page::empty());
        };
        let query = Query::kind(self.namespace(), &self.keys.kinds().run_component)
            .with_ancestor(run_key);
        Ok(paginate(self.store(), query, page, &self.limits).await?)
    }

    /// Log lines of a run, oldest first.
    pub async fn list_logs(
        &self,
        kind: RunKind,
        run_id: &str,
        page: &PageRequest,
    ) -> RunResult<Page<RunLogRecord>> {
        let Some(run_key) = self.lookup_key(kind, run_id) else {
            return Ok(Page::empty());
        };
        let query = Query::kind(self.namespace(), &self.keys.kinds().run_log)
            .with_ancestor(run_key)
            .order_asc("created");
        Ok(paginate(self.store(), query, page, &self.limits).await?)
    }

    /// Delete a run and every record under it in one batch.
    ///
    /// Sub-records committed between the sweep and the batch are removed by
    /// a follow-up sweep. Returns `false` if neither the run nor any
    /// sub-record existed.
    pub async fn delete(&self, kind: RunKind, run_id: &str) -> RunResult<bool> {
        let Some(run_key) = self.lookup_key(kind, run_id) else {
            return Ok(false);
        };
        let mut keys = collect_keys(self.store(), Query::descendants(&run_key)).await?;
        let children = keys.len();
        keys.push(run_key.clone());
        let mut removed = self.store().delete_many(&keys).await?;
        removed += sweep_descendants(self.store(), &run_key).await?;
        if removed > 0 {
            info!(run = %run_id, %kind, children, "run deleted");
        }
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauge_store::InMemoryStore;
    use gauge_types::GaugeConfig;

    fn tracker() -> (RunTracker, InMemoryStore) {
        let store = InMemoryStore::new();
        let config = GaugeConfig::default();
        let tracker = RunTracker::new(
            Arc::new(store.clone()),
            KeyBuilder::new(&config),
            config.pagination,
        );
        (tracker, store)
    }

    fn component(name: &str) -> RunComponentInput {
        RunComponentInput {
            name: name.into(),
            version: Some("1.0.0".into()),
            passed: Some(true),
        }
    }

    #[tokio::test]
    async fn lifecycle() {
        let (tracker, _) = tracker();
        let run = tracker.insert(RunKind::Test, &NewRun::default()).await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);

        let err = tracker
            .complete(RunKind::Test, &run.id, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::InvalidStateTransition { .. }));

        tracker.start(RunKind::Test, &run.id).await.unwrap().unwrap();
        let done = tracker
            .complete(RunKind::Test, &run.id, false, Some("2 failures"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, RunStatus::Finished);
        assert_eq!(done.result, Some(RunOutcome::Failed));
        assert_eq!(done.message.as_deref(), Some("2 failures"));
    }

    #[tokio::test]
    async fn kinds_are_separate() {
        let (tracker, _) = tracker();
        let run = tracker.insert(RunKind::Build, &NewRun::default()).await.unwrap();
        assert!(tracker.get(RunKind::Build, &run.id).await.unwrap().is_some());
        assert!(tracker.get(RunKind::Test, &run.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sub_records_need_a_run() {
        let (tracker, store) = tracker();
        assert!(tracker
            .add_component(RunKind::Test, "missing", &component("button"))
            .await
            .unwrap()
            .is_none());
        assert!(tracker
            .add_log(RunKind::Test, "missing", "hello")
            .await
            .unwrap()
            .is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn logs_list_in_order() {
        let (tracker, _) = tracker();
        let run = tracker.insert(RunKind::Build, &NewRun::default()).await.unwrap();
        for line in ["compiling", "linking", "done"] {
            tracker.add_log(RunKind::Build, &run.id, line).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        let page = tracker
            .list_logs(RunKind::Build, &run.id, &PageRequest::default())
            .await
            .unwrap();
        let lines: Vec<&str> = page.entities.iter().map(|l| l.line.as_str()).collect();
        assert_eq!(lines, vec!["compiling", "linking", "done"]);
    }

    #[tokio::test]
    async fn delete_cascades_to_sub_records() {
        let (tracker, store) = tracker();
        let run = tracker.insert(RunKind::Test, &NewRun::default()).await.unwrap();
        for name in ["button", "chart"] {
            tracker
                .add_component(RunKind::Test, &run.id, &component(name))
                .await
                .unwrap()
                .unwrap();
        }
        for line in ["start", "end"] {
            tracker.add_log(RunKind::Test, &run.id, line).await.unwrap().unwrap();
        }
        assert_eq!(store.len(), 5);

        assert!(tracker.delete(RunKind::Test, &run.id).await.unwrap());
        assert!(store.is_empty());
        assert!(!tracker.delete(RunKind::Test, &run.id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_leaves_unrelated_runs() {
        let (tracker, _) = tracker();
        let run_a = tracker.insert(RunKind::Test, &NewRun::default()).await.unwrap();
        let run_b = tracker.insert(RunKind::Test, &NewRun::default()).await.unwrap();
        tracker
            .add_component(RunKind::Test, &run_a.id, &component("button"))
            .await
            .unwrap();
        tracker
            .add_component(RunKind::Test, &run_b.id, &component("button"))
            .await
            .unwrap();

        tracker.delete(RunKind::Test, &run_a.id).await.unwrap();

        let remaining = tracker
            .list_components(RunKind::Test, &run_b.id, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(remaining.entities.len(), 1);
        let gone = tracker
            .list_components(RunKind::Test, &run_a.id, &PageRequest::default())
            .await
            .unwrap();
        assert!(gone.entities.is_empty());
    }

    #[tokio::test]
    async fn delete_catches_logs_written_mid_delete() {
        let (tracker, store) = tracker();
        let run = tracker.insert(RunKind::Test, &NewRun::default()).await.unwrap();
        tracker.add_log(RunKind::Test, &run.id, "start").await.unwrap().unwrap();

        let run_key = tracker.run_key(RunKind::Test, &run.id).unwrap();
        let late = RunLogRecord {
            id: String::new(),
            line: "late".into(),
            created: timestamp::now(),
        };
        let key = tracker.keys.run_log(&run_key, "late").unwrap();
        store.interleave_on_next_write(to_entity(key, &late).unwrap());

        assert!(tracker.delete(RunKind::Test, &run.id).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unkeyable_run_ids_are_missing() {
        let (tracker, store) = tracker();
        assert!(tracker.get(RunKind::Test, "").await.unwrap().is_none());
        assert!(tracker.start(RunKind::Test, "").await.unwrap().is_none());
        assert!(tracker
            .add_log(RunKind::Test, "", "hello")
            .await
            .unwrap()
            .is_none());
        let page = tracker
            .list_logs(RunKind::Test, "", &PageRequest::default())
            .await
            .unwrap();
        assert!(page.entities.is_empty());
        assert!(!tracker.delete(RunKind::Test, "").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_runs_newest_first() {
        let (tracker, _) = tracker();
        let first = tracker.insert(RunKind::Test, &NewRun::default()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = tracker.insert(RunKind::Test, &NewRun::default()).await.unwrap();
        tracker.insert(RunKind::Build, &NewRun::default()).await.unwrap();

        let page = tracker
            .list_runs(RunKind::Test, &PageRequest::default())
            .await
            .unwrap();
        let ids: Vec<&str> = page.entities.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }
}
