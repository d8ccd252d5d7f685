use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::cache::{FetchCache, Lookup, fingerprint};
use crate::datetime::midnight;
use crate::task::{BulkCompleteRequest, Task};

const TASKS_FILE: &str = "tasks.json";

/// Local stand-in for the task API: a JSON snapshot of `GET /tasks`.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    cache: FetchCache<Vec<Task>>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        Self::open_with_ttl(data_dir, Duration::seconds(2))
    }

    #[tracing::instrument(skip(data_dir))]
    pub fn open_with_ttl(data_dir: &Path, ttl: Duration) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join(TASKS_FILE);
        if !tasks_path.exists() {
            fs::write(&tasks_path, "[]\n")
                .with_context(|| format!("failed to create {}", tasks_path.display()))?;
        }

        let cache = FetchCache::new(ttl);
        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            ttl_secs = cache.ttl().num_seconds(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            cache,
        })
    }

    fn fetch_key(&self) -> String {
        let path = self.tasks_path.to_string_lossy();
        fingerprint(&["GET", "/tasks", path.as_ref()])
    }

    /// Current task snapshot with every date at local midnight.
    #[tracing::instrument(skip(self, now))]
    pub fn load_tasks(&mut self, now: DateTime<Utc>) -> anyhow::Result<Vec<Task>> {
        let key = self.fetch_key();
        if let Lookup::Fresh(tasks) = self.cache.lookup(&key, now) {
            debug!(count = tasks.len(), "serving tasks from cache");
            return Ok(tasks.clone());
        }

        if !self.cache.begin(&key, now) {
            debug!("previous fetch still pending; reading anyway");
        }

        match load_json(&self.tasks_path) {
            Ok(tasks) => {
                self.cache.fulfill(&key, tasks.clone(), now);
                debug!(cached = self.cache.len(), "task snapshot cached");
                Ok(tasks)
            }
            Err(err) => {
                self.cache.abandon(&key);
                Err(err).context("failed to load tasks.json")
            }
        }
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        let key = self.fetch_key();
        self.cache.invalidate(&key);
        save_json_atomic(&self.tasks_path, tasks).context("failed to save tasks.json")
    }

    #[tracing::instrument(skip(self, now))]
    pub fn find_task(&mut self, id: &str, now: DateTime<Utc>) -> anyhow::Result<Task> {
        self.load_tasks(now)?
            .into_iter()
            .find(|task| task.id == id)
            .ok_or_else(|| anyhow!("task not found: {id}"))
    }

    /// Applies a bulk-complete request and returns the updated records.
    ///
    /// Only open tasks whose type matches the request are touched.
    #[tracing::instrument(skip(self, request, now), fields(count = request.task_ids.len(), kind = %request.kind))]
    pub fn bulk_complete(
        &mut self,
        request: &BulkCompleteRequest,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Task>> {
        let mut tasks = self.load_tasks(now)?;
        let wanted: HashSet<&str> = request.task_ids.iter().map(String::as_str).collect();
        let completed_on = midnight(request.date);

        let mut updated = Vec::new();
        let mut seen = HashSet::new();
        for task in &mut tasks {
            if !wanted.contains(task.id.as_str()) {
                continue;
            }
            seen.insert(task.id.clone());

            if task.kind != request.kind {
                warn!(id = %task.id, kind = %task.kind, "task type does not match request; skipping");
                continue;
            }
            if task.completed_on.is_some() {
                debug!(id = %task.id, "task already completed; skipping");
                continue;
            }

            task.completed_on = Some(completed_on);
            updated.push(task.clone());
        }

        for id in &request.task_ids {
            if !seen.contains(id) {
                warn!(id = %id, "task not found; skipping");
            }
        }

        if !updated.is_empty() {
            self.save_tasks(&tasks)?;
        }

        info!(updated = updated.len(), "bulk complete applied");
        Ok(updated)
    }
}

#[tracing::instrument(skip(path))]
fn load_json(path: &Path) -> anyhow::Result<Vec<Task>> {
    debug!(file = %path.display(), "loading tasks");
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;

    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut tasks: Vec<Task> = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing {}", path.display()))?;
    for task in &mut tasks {
        task.normalize_dates();
    }

    debug!(count = tasks.len(), "loaded tasks");
    Ok(tasks)
}

#[tracing::instrument(skip(path, tasks))]
fn save_json_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving tasks atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, tasks)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
