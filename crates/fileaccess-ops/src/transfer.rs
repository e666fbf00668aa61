//! Cancellable, progress-reporting transfers.
//!
//! A transfer streams bytes from a source (a local file or an HTTP
//! response) into a destination file on its own task. The caller gets a
//! [`TransferHandle`] back immediately; everything after that is reported
//! through the engine's [`EventSink`]:
//!
//! - zero or more `FileAccess.progress` events with non-decreasing `written`
//! - exactly one terminal event, `FileAccess.complete` or `FileAccess.error`
//!
//! Cancellation is cooperative. [`TransferEngine::cancel`] raises a flag
//! that the task checks before every chunk.
//!
//! Output is written to a temp file in the destination's directory and
//! renamed over the destination only when the transfer succeeds, so a
//! failed or cancelled transfer never clobbers an existing file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fileaccess_core::{
    AccessConfig, DEFAULT_CHUNK_SIZE, FileAccessError, IoFault, PathResolver, Result,
};
use futures::StreamExt;
use indexmap::IndexMap;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::copy::inherit_permissions;
use crate::event::{CompleteEvent, ErrorEvent, EventSink, FetchResponse, TransferEvent};
use crate::progress::TransferProgress;
use crate::registry::{OperationRegistry, TransferHandle, TransferState};

/// Options for an HTTP fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// HTTP method; `GET` when unset.
    pub method: Option<String>,
    pub headers: IndexMap<String, String>,
    pub body: Option<Vec<u8>>,
    /// Override the engine's partial-output policy for this transfer.
    pub keep_partial: Option<bool>,
}

/// What a transfer should move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferRequest {
    /// Download `url` into the logical path `destination`.
    Fetch {
        url: String,
        destination: String,
        options: FetchOptions,
    },
    /// Stream a local file into another, chunk by chunk.
    Copy {
        source: String,
        destination: String,
        keep_partial: Option<bool>,
    },
}

impl TransferRequest {
    /// A GET fetch with default options.
    pub fn fetch(url: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            destination: destination.into(),
            options: FetchOptions::default(),
        }
    }

    /// A local streamed copy.
    pub fn copy(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::Copy {
            source: source.into(),
            destination: destination.into(),
            keep_partial: None,
        }
    }
}

/// Starts transfers and tracks them until they finish.
pub struct TransferEngine {
    resolver: PathResolver,
    registry: Arc<OperationRegistry>,
    sink: Arc<dyn EventSink>,
    client: Client,
    chunk_size: usize,
    progress_interval: Option<Duration>,
    keep_partial: bool,
    create_parents: bool,
}

impl TransferEngine {
    /// Create an engine with default settings.
    pub fn new(resolver: PathResolver, sink: Arc<dyn EventSink>) -> Self {
        Self {
            resolver,
            registry: Arc::new(OperationRegistry::new()),
            sink,
            client: Client::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: None,
            keep_partial: false,
            create_parents: false,
        }
    }

    /// Create an engine from configuration.
    pub fn from_config(config: &AccessConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let resolver = PathResolver::new(config.root_table()?);
        Ok(Self {
            chunk_size: config.chunk_size,
            progress_interval: config.progress_interval(),
            keep_partial: config.keep_partial,
            create_parents: config.create_parents,
            ..Self::new(resolver, sink)
        })
    }

    /// Set the chunk size used for local copies.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the minimum interval between progress events of one transfer.
    pub fn with_progress_interval(mut self, interval: Option<Duration>) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Keep partially written output on cancellation or failure.
    pub fn with_keep_partial(mut self, keep_partial: bool) -> Self {
        self.keep_partial = keep_partial;
        self
    }

    /// Create missing destination directories.
    pub fn with_create_parents(mut self, create_parents: bool) -> Self {
        self.create_parents = create_parents;
        self
    }

    /// Use a specific HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// The registry of live transfers.
    pub fn registry(&self) -> Arc<OperationRegistry> {
        Arc::clone(&self.registry)
    }

    /// Start a transfer and return its handle.
    ///
    /// Paths and the URL are validated before anything is registered, so
    /// invalid input is returned here and produces no events. Must be called
    /// from within a Tokio runtime.
    pub fn start(&self, request: TransferRequest) -> Result<TransferHandle> {
        let (job, keep_partial) = match request {
            TransferRequest::Copy {
                source,
                destination,
                keep_partial,
            } => {
                let source = self.resolver.resolve(&source)?.into_path_buf();
                let destination = self.resolver.resolve(&destination)?.into_path_buf();
                (
                    Job::Copy {
                        source,
                        destination,
                    },
                    keep_partial,
                )
            }
            TransferRequest::Fetch {
                url,
                destination,
                options,
            } => {
                let destination = self.resolver.resolve(&destination)?.into_path_buf();
                let request = self.build_request(&url, &options)?;
                (
                    Job::Fetch {
                        request,
                        destination,
                    },
                    options.keep_partial,
                )
            }
        };

        let (handle, token) = self.registry.register();
        let task = TransferTask {
            handle,
            token,
            registry: Arc::clone(&self.registry),
            sink: Arc::clone(&self.sink),
            client: self.client.clone(),
            chunk_size: self.chunk_size,
            progress_interval: self.progress_interval,
            keep_partial: keep_partial.unwrap_or(self.keep_partial),
            create_parents: self.create_parents,
        };

        info!(%handle, job = job.name(), "starting transfer");
        tokio::spawn(task.run(job));
        Ok(handle)
    }

    /// Start downloading `url` into `destination`.
    pub fn fetch(
        &self,
        url: impl Into<String>,
        destination: impl Into<String>,
        options: FetchOptions,
    ) -> Result<TransferHandle> {
        self.start(TransferRequest::Fetch {
            url: url.into(),
            destination: destination.into(),
            options,
        })
    }

    /// Start a streamed local copy.
    pub fn copy(
        &self,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<TransferHandle> {
        self.start(TransferRequest::copy(source, destination))
    }

    /// Request cancellation. Returns `false` if the transfer already finished.
    pub fn cancel(&self, handle: TransferHandle) -> bool {
        self.registry.cancel(handle)
    }

    /// State of a live transfer; `None` once it has finished.
    pub fn state(&self, handle: TransferHandle) -> Option<TransferState> {
        self.registry.lookup(handle)
    }

    /// Handles of all live transfers.
    pub fn active(&self) -> Vec<TransferHandle> {
        self.registry.handles()
    }

    fn build_request(&self, url: &str, options: &FetchOptions) -> Result<reqwest::Request> {
        let parsed = Url::parse(url).map_err(|e| FileAccessError::invalid_path(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FileAccessError::unsupported(format!(
                "URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let method = match options.method.as_deref() {
            Some(name) => Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                .map_err(|_| FileAccessError::unsupported(format!("HTTP method '{name}'")))?,
            None => Method::GET,
        };

        let mut builder = self.client.request(method, parsed);
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }
        builder
            .build()
            .map_err(|e| FileAccessError::unsupported(format!("request for {url}: {e}")))
    }
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("resolver", &self.resolver)
            .field("active", &self.registry.len())
            .field("chunk_size", &self.chunk_size)
            .field("progress_interval", &self.progress_interval)
            .field("keep_partial", &self.keep_partial)
            .finish()
    }
}

enum Job {
    Copy {
        source: PathBuf,
        destination: PathBuf,
    },
    Fetch {
        request: reqwest::Request,
        destination: PathBuf,
    },
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "copy",
            Self::Fetch { .. } => "fetch",
        }
    }
}

/// Successful end of a transfer.
struct Outcome {
    written: u64,
    response: Option<FetchResponse>,
}

/// Everything a running transfer needs, detached from the engine.
struct TransferTask {
    handle: TransferHandle,
    token: CancellationToken,
    registry: Arc<OperationRegistry>,
    sink: Arc<dyn EventSink>,
    client: Client,
    chunk_size: usize,
    progress_interval: Option<Duration>,
    keep_partial: bool,
    create_parents: bool,
}

impl TransferTask {
    async fn run(self, job: Job) {
        let result = if self.token.is_cancelled() {
            Err(FileAccessError::Cancelled)
        } else {
            self.registry.transition(self.handle, TransferState::Running);
            match job {
                Job::Copy {
                    source,
                    destination,
                } => self.run_copy(source, destination).await,
                Job::Fetch {
                    request,
                    destination,
                } => self.run_fetch(request, destination).await,
            }
        };
        self.finish(result);
    }

    /// Record the terminal state, then emit the single terminal event.
    fn finish(&self, result: Result<Outcome>) {
        let (state, event) = match result {
            Ok(outcome) => {
                info!(handle = %self.handle, written = outcome.written, "transfer complete");
                (
                    TransferState::Completed,
                    TransferEvent::Complete(CompleteEvent {
                        handle: self.handle,
                        written: outcome.written,
                        response: outcome.response,
                    }),
                )
            }
            Err(err) => {
                let state = match err {
                    FileAccessError::Cancelled => TransferState::Cancelled,
                    _ => TransferState::Failed,
                };
                if state == TransferState::Failed {
                    warn!(handle = %self.handle, error = %err, "transfer failed");
                } else {
                    info!(handle = %self.handle, "transfer cancelled");
                }
                (
                    state,
                    TransferEvent::Error(ErrorEvent {
                        handle: self.handle,
                        kind: err.kind(),
                        message: err.to_string(),
                    }),
                )
            }
        };

        self.registry.transition(self.handle, state);
        self.sink.emit_event(&event);
    }

    async fn run_copy(&self, source: PathBuf, destination: PathBuf) -> Result<Outcome> {
        let chunk = ChunkCopy {
            handle: self.handle,
            token: self.token.clone(),
            sink: Arc::clone(&self.sink),
            chunk_size: self.chunk_size,
            progress_interval: self.progress_interval,
            keep_partial: self.keep_partial,
            create_parents: self.create_parents,
        };
        let location = source.display().to_string();

        let written = tokio::task::spawn_blocking(move || chunk.run(&source, &destination))
            .await
            .map_err(|e| FileAccessError::read_at(location, e))??;

        Ok(Outcome {
            written,
            response: None,
        })
    }

    async fn run_fetch(&self, request: reqwest::Request, destination: PathBuf) -> Result<Outcome> {
        let requested = request.url().clone();
        let location = requested.to_string();

        let response = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(FileAccessError::Cancelled),
            response = self.client.execute(request) => {
                response.map_err(|e| FileAccessError::read_at(&location, e))?
            }
        };
        let metadata = response_metadata(&response, &requested);
        debug!(handle = %self.handle, status = metadata.status, "response received");

        let (file, staged) = {
            let target = destination.clone();
            let (create_parents, keep_partial) = (self.create_parents, self.keep_partial);
            tokio::task::spawn_blocking(move || {
                StagedOutput::create(&target, create_parents, keep_partial)
            })
            .await
            .map_err(|e| FileAccessError::io(&destination, io::Error::other(e), IoFault::Write))??
        };
        let mut file = tokio::fs::File::from_std(file);
        let mut progress =
            TransferProgress::new(self.handle, response.content_length(), self.progress_interval);

        let streamed = self
            .stream_body(response, &mut file, &mut progress, &location, &destination)
            .await;
        drop(file);
        staged.settle(streamed)?;

        if let Some(event) = progress.finish() {
            self.sink.emit_event(&TransferEvent::Progress(event));
        }

        Ok(Outcome {
            written: progress.written,
            response: Some(metadata),
        })
    }

    /// Write a response body into `file`, one chunk-sized slice at a time.
    ///
    /// Network reads may hand back arbitrarily large buffers; slicing them
    /// keeps cancellation and progress on the same granularity as local
    /// copies.
    async fn stream_body(
        &self,
        response: reqwest::Response,
        file: &mut tokio::fs::File,
        progress: &mut TransferProgress,
        location: &str,
        destination: &Path,
    ) -> Result<()> {
        let write_err = |e| FileAccessError::io(destination, e, IoFault::Write);
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(FileAccessError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| FileAccessError::read_at(location, e))?;

            for piece in chunk.chunks(self.chunk_size) {
                if self.token.is_cancelled() {
                    return Err(FileAccessError::Cancelled);
                }
                file.write_all(piece).await.map_err(write_err)?;
                if let Some(event) = progress.advance(piece.len() as u64) {
                    self.sink.emit_event(&TransferEvent::Progress(event));
                }
            }
        }

        file.flush().await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)
    }
}

/// Blocking half of a local streamed copy.
struct ChunkCopy {
    handle: TransferHandle,
    token: CancellationToken,
    sink: Arc<dyn EventSink>,
    chunk_size: usize,
    progress_interval: Option<Duration>,
    keep_partial: bool,
    create_parents: bool,
}

impl ChunkCopy {
    fn run(&self, source: &Path, destination: &Path) -> Result<u64> {
        let read_err = |e| FileAccessError::io(source, e, IoFault::Read);

        let mut input = File::open(source).map_err(read_err)?;
        let total = input.metadata().map_err(read_err)?.len();

        let (mut output, staged) =
            StagedOutput::create(destination, self.create_parents, self.keep_partial)?;
        let mut progress = TransferProgress::new(self.handle, Some(total), self.progress_interval);

        let streamed = self.pump(&mut input, &mut output, &mut progress, source, destination);
        drop(output);
        staged.settle(streamed)?;

        if let Some(event) = progress.finish() {
            self.sink.emit_event(&TransferEvent::Progress(event));
        }
        Ok(progress.written)
    }

    fn pump(
        &self,
        input: &mut File,
        output: &mut File,
        progress: &mut TransferProgress,
        source: &Path,
        destination: &Path,
    ) -> Result<()> {
        let write_err = |e| FileAccessError::io(destination, e, IoFault::Write);
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            if self.token.is_cancelled() {
                return Err(FileAccessError::Cancelled);
            }
            let read = match input.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FileAccessError::io(source, e, IoFault::Read)),
            };
            output.write_all(&buffer[..read]).map_err(write_err)?;
            if let Some(event) = progress.advance(read as u64) {
                self.sink.emit_event(&TransferEvent::Progress(event));
            }
        }

        output.sync_all().map_err(write_err)
    }
}

/// Transfer output staged in a temp file beside its destination.
///
/// The destination is only replaced by [`StagedOutput::settle`]. Dropping
/// the stage deletes the temp file and leaves the destination untouched.
struct StagedOutput {
    temp: TempPath,
    destination: PathBuf,
    keep_partial: bool,
}

impl StagedOutput {
    fn create(
        destination: &Path,
        create_parents: bool,
        keep_partial: bool,
    ) -> Result<(File, Self)> {
        let write_err = |e| FileAccessError::io(destination, e, IoFault::Write);
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if create_parents {
            std::fs::create_dir_all(parent)
                .map_err(|e| FileAccessError::io(parent, e, IoFault::Write))?;
        }

        let temp = NamedTempFile::new_in(parent).map_err(write_err)?;
        inherit_permissions(temp.as_file(), destination).map_err(write_err)?;
        let (file, temp) = temp.into_parts();

        Ok((
            file,
            Self {
                temp,
                destination: destination.to_path_buf(),
                keep_partial,
            },
        ))
    }

    /// Publish the output of a finished transfer.
    ///
    /// On success the temp file replaces the destination. On failure it is
    /// discarded, unless partial output was requested, in which case
    /// whatever was written replaces the destination. The original error
    /// is returned either way.
    fn settle(self, streamed: Result<()>) -> Result<()> {
        match streamed {
            Ok(()) => self.temp.persist(&self.destination).map_err(|e| {
                FileAccessError::io(&self.destination, e.error, IoFault::Write)
            }),
            Err(err) => {
                if self.keep_partial {
                    match self.temp.persist(&self.destination) {
                        Ok(()) => {
                            debug!(path = %self.destination.display(), "kept partial output")
                        }
                        Err(e) => warn!(
                            path = %self.destination.display(),
                            error = %e.error,
                            "failed to keep partial output"
                        ),
                    }
                } else {
                    debug!(path = %self.destination.display(), "discarded partial output");
                }
                Err(err)
            }
        }
    }
}

fn response_metadata(response: &reqwest::Response, requested: &Url) -> FetchResponse {
    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect::<BTreeMap<_, _>>();

    FetchResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        ok: status.is_success(),
        redirected: response.url() != requested,
        url: response.url().to_string(),
        headers,
    }
}
