//! Agents, their lifecycle, and the directory the coordinator queries.
//!
//! # Main types
//!
//! - [`Worker`]: Execution extension point implemented per capability.
//! - [`Agent`]: Lifecycle wrapper (start / pause / resume / shutdown) around a worker.
//! - [`AgentDescriptor`]: Name, type, capabilities and priority of an agent.
//! - [`AgentDirectory`]: Lookup interface used by the coordinator.
//! - [`AgentRegistry`]: In-memory [`AgentDirectory`].

/// Agent lifecycle wrapper and descriptor.
pub mod agent;
/// Agent directory trait and in-memory registry.
pub mod directory;
/// Worker extension trait.
pub mod worker;

pub use agent::{Agent, AgentDescriptor};
pub use directory::{AgentDirectory, AgentRegistry};
pub use worker::Worker;
