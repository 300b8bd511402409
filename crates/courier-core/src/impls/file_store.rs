//! FileTaskStore - ディレクトリ 1 つに JSON で永続化するストア
//!
//! レイアウト:
//! - `<dir>/tasks/<task-id>.json` 遷移のたびに temp + rename で丸ごと書き直す
//! - `<dir>/dead-letter/<task-id>.json` `create_new` で一度だけ書く

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::{StoreError, Task, TaskId};
use crate::ports::TaskStore;

const TASKS_DIR: &str = "tasks";
const DEAD_LETTER_DIR: &str = "dead-letter";

#[derive(Debug, Clone)]
pub struct FileTaskStore {
    root: PathBuf,
}

impl FileTaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn task_path(&self, id: TaskId) -> PathBuf {
        self.root.join(TASKS_DIR).join(format!("{id}.json"))
    }

    fn dead_letter_path(&self, id: TaskId) -> PathBuf {
        self.root.join(DEAD_LETTER_DIR).join(format!("{id}.json"))
    }
}

fn encode(task: &Task) -> Result<String, StoreError> {
    let mut buf = serde_json::to_string_pretty(task)?;
    buf.push('\n');
    Ok(buf)
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Every `*.json` record in `dir`. A missing directory reads as empty.
async fn read_records(dir: &Path) -> Result<Vec<Task>, StoreError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut tasks = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let contents = fs::read_to_string(&path).await?;
        match serde_json::from_str::<Task>(&contents) {
            Ok(task) => tasks.push(task),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable task record"),
        }
    }
    Ok(tasks)
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        let path = self.task_path(task.id);
        debug!(task_id = %task.id, status = %task.status, path = %path.display(), "writing task record");
        write_atomic(&path, &encode(task)?).await
    }

    async fn load(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let contents = match fs::read_to_string(self.task_path(id)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        read_records(&self.root.join(TASKS_DIR)).await
    }

    async fn dead_letter(&self, task: &Task) -> Result<(), StoreError> {
        let path = self.dead_letter_path(task.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let contents = encode(task)?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyDeadLettered(task.id));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        debug!(task_id = %task.id, path = %path.display(), "dead letter written");
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<Task>, StoreError> {
        read_records(&self.root.join(DEAD_LETTER_DIR)).await
    }
}
