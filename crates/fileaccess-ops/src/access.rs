//! Host-facing facade.
//!
//! [`FileAccess`] bundles the executor, the transfer engine and the event
//! bridge behind the call names a host binding exposes. One-shot operations
//! run on Tokio's blocking pool so the caller's thread never performs file
//! I/O itself.

use std::path::PathBuf;
use std::sync::Arc;

use fileaccess_core::{
    AccessConfig, Encoding, FileAccessError, FileStat, HashAlgorithm, PathResolver, Result,
    RootTable, SymbolicRoot,
};
use tracing::{debug, warn};

use crate::event::{EventBridge, EventSink, ListenerId};
use crate::executor::Executor;
use crate::operation::{Operation, OperationOutput, WriteOptions};
use crate::registry::TransferHandle;
use crate::transfer::{FetchOptions, TransferEngine};

/// File access engine: operations, transfers and event delivery.
#[derive(Debug)]
pub struct FileAccess {
    executor: Arc<Executor>,
    transfers: TransferEngine,
    events: Arc<EventBridge>,
    write_options: WriteOptions,
}

impl FileAccess {
    /// Build an engine from configuration.
    ///
    /// Writable root directories are created if missing, so a fresh install
    /// can write `Cache/a.txt` without creating parents.
    pub fn new(config: &AccessConfig) -> Result<Self> {
        let executor = Executor::from_config(config)?;
        create_root_dirs(executor.resolver().roots());

        let events = Arc::new(EventBridge::new());
        let sink: Arc<dyn EventSink> = events.clone();
        Ok(Self {
            executor: Arc::new(executor),
            transfers: TransferEngine::from_config(config, sink)?,
            events,
            write_options: WriteOptions {
                create_parents: config.create_parents,
            },
        })
    }

    /// The synchronous executor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The transfer engine.
    pub fn transfers(&self) -> &TransferEngine {
        &self.transfers
    }

    /// The path resolver shared by every operation.
    pub fn resolver(&self) -> &PathResolver {
        self.executor.resolver()
    }

    /// Register an event listener.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> ListenerId {
        self.events.subscribe(sink)
    }

    /// Remove an event listener.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Run any operation on the blocking pool.
    pub async fn execute(&self, operation: Operation) -> Result<OperationOutput> {
        self.blocking(move |exec| exec.execute(operation)).await
    }

    pub async fn read_file(&self, path: &str, encoding: Encoding) -> Result<String> {
        let path = path.to_string();
        self.blocking(move |exec| exec.read_text(&path, encoding))
            .await
    }

    /// Read `length` bytes at `offset`, encoded as text.
    pub async fn read_file_chunk(
        &self,
        path: &str,
        offset: u64,
        length: usize,
        encoding: Encoding,
    ) -> Result<String> {
        let path = path.to_string();
        self.blocking(move |exec| {
            exec.read_chunk(&path, offset, length)
                .map(|bytes| encoding.encode(&bytes))
        })
        .await
    }

    pub async fn write_file(&self, path: &str, data: &str, encoding: Encoding) -> Result<()> {
        let (path, data, options) = (path.to_string(), data.to_string(), self.write_options);
        self.blocking(move |exec| exec.write_encoded(&path, &data, encoding, options))
            .await
    }

    pub async fn append_file(&self, path: &str, data: &str, encoding: Encoding) -> Result<()> {
        let (path, data, options) = (path.to_string(), data.to_string(), self.write_options);
        self.blocking(move |exec| exec.append(&path, &encoding.decode(&data)?, options))
            .await
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        let path = path.to_string();
        self.blocking(move |exec| exec.exists(&path)).await
    }

    pub async fn is_dir(&self, path: &str) -> Result<bool> {
        let path = path.to_string();
        self.blocking(move |exec| exec.is_dir(&path)).await
    }

    pub async fn stat(&self, path: &str) -> Result<FileStat> {
        let path = path.to_string();
        self.blocking(move |exec| exec.stat(&path)).await
    }

    pub async fn stat_dir(&self, path: &str) -> Result<Vec<FileStat>> {
        let path = path.to_string();
        self.blocking(move |exec| exec.stat_dir(&path)).await
    }

    pub async fn ls(&self, path: &str) -> Result<Vec<String>> {
        let path = path.to_string();
        self.blocking(move |exec| exec.list(&path)).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<PathBuf> {
        let path = path.to_string();
        self.blocking(move |exec| exec.mkdir(&path)).await
    }

    /// Remove a path; missing paths are ignored.
    pub async fn unlink(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.blocking(move |exec| exec.delete(&path, false)).await
    }

    pub async fn cp(&self, source: &str, destination: &str) -> Result<u64> {
        let (source, destination) = (source.to_string(), destination.to_string());
        self.blocking(move |exec| exec.copy(&source, &destination))
            .await
    }

    pub async fn mv(&self, source: &str, destination: &str, overwrite: bool) -> Result<()> {
        let (source, destination) = (source.to_string(), destination.to_string());
        self.blocking(move |exec| exec.move_to(&source, &destination, overwrite))
            .await
    }

    /// Hex digest of a file; `algorithm` is a host-side name such as `"SHA-256"`.
    pub async fn hash(&self, path: &str, algorithm: &str) -> Result<String> {
        let algorithm = HashAlgorithm::parse(algorithm)?;
        let path = path.to_string();
        self.blocking(move |exec| exec.hash(&path, algorithm)).await
    }

    pub async fn concat_files(&self, source: &str, target: &str) -> Result<u64> {
        let (source, target) = (source.to_string(), target.to_string());
        self.blocking(move |exec| exec.concat(&source, &target))
            .await
    }

    pub async fn unzip(&self, source: &str, target: &str) -> Result<u64> {
        let (source, target) = (source.to_string(), target.to_string());
        self.blocking(move |exec| exec.unzip(&source, &target))
            .await
    }

    /// Start a download; progress and the outcome arrive as events.
    pub fn fetch(
        &self,
        url: &str,
        destination: &str,
        options: FetchOptions,
    ) -> Result<TransferHandle> {
        self.transfers.fetch(url, destination, options)
    }

    /// Start a streamed local copy reported through events.
    pub fn copy_with_progress(&self, source: &str, destination: &str) -> Result<TransferHandle> {
        self.transfers.copy(source, destination)
    }

    /// Cancel a transfer. A no-op returning `false` once it has finished.
    pub fn cancel_fetch(&self, handle: TransferHandle) -> bool {
        self.transfers.cancel(handle)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Executor) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let executor = Arc::clone(&self.executor);
        tokio::task::spawn_blocking(move || f(&executor))
            .await
            .map_err(|e| FileAccessError::read_at("blocking task", e))?
    }
}

/// Create every root except the read-only bundle. Failures are logged; the
/// first operation under that root reports them properly.
fn create_root_dirs(roots: &RootTable) {
    for (root, dir) in roots.iter() {
        if root == SymbolicRoot::MainBundle {
            continue;
        }
        match std::fs::create_dir_all(dir) {
            Ok(()) => debug!(%root, path = %dir.display(), "root ready"),
            Err(e) => warn!(%root, path = %dir.display(), error = %e, "failed to create root"),
        }
    }
}
