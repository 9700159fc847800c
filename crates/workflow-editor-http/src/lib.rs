//! HTTP adapter for the workflow editor
//!
//! Implements [`workflow_editor::WorkflowBackend`] against the workflow
//! service's REST API using `reqwest`. Non-2xx answers become
//! `BackendError::Rejected`, network failures and timeouts
//! `BackendError::Transport`, and bodies that do not decode
//! `BackendError::InvalidResponse`.

pub mod client;
pub mod config;

pub use client::HttpWorkflowBackend;
pub use config::{HttpBackendConfig, DEFAULT_TIMEOUT_MS};
