//! File operations and progress-reporting transfers for fileaccess.
//!
//! This crate provides:
//! - [`Executor`]: one-shot operations (read, write, copy, move, hash, ...)
//!   on logical paths
//! - [`TransferEngine`]: cancellable fetches and streamed copies that report
//!   through named events
//! - [`EventBridge`]: fan-out of those events to host listeners
//! - [`OperationRegistry`]: lifecycle of in-flight transfers
//! - [`FileAccess`]: a facade bundling all of the above

mod access;
mod archive;
mod copy;
mod event;
mod executor;
mod hash;
mod move_op;
mod operation;
mod progress;
mod registry;
mod transfer;

pub use access::FileAccess;
pub use event::{
    COMPLETE_EVENT, ChannelSink, CompleteEvent, ERROR_EVENT, EmittedEvent, ErrorEvent,
    EventBridge, EventSink, FetchResponse, ListenerId, PROGRESS_EVENT, ProgressEvent,
    TransferEvent,
};
pub use executor::Executor;
pub use hash::{hash_file, hash_reader};
pub use operation::{Operation, OperationOutput, WriteOptions};
pub use progress::TransferProgress;
pub use registry::{OperationRegistry, TransferHandle, TransferState};
pub use transfer::{FetchOptions, TransferEngine, TransferRequest};
