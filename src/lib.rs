//! Flowgate: Workflow Query and Lifecycle Control Plane
//!
//! Serves reads over live and archived workflows as one ordered, paginated view, and
//! drives workflow lifecycle operations (retry, resubmit, resume, suspend, terminate,
//! stop, set) against an orchestration substrate.

pub mod alias;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod fields;
pub mod hydrator;
pub mod instanceid;
pub mod lifecycle;
pub mod logging;
pub mod logs;
pub mod offload;
pub mod paginator;
pub mod query;
pub mod selector;
pub mod server;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod stream;
pub mod submit;
pub mod validate;
pub mod workflow;
