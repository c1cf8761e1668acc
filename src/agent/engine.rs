//! Turn engine: the seam where a model backend plugs in.
//!
//! The protocol engine does not care where reply text comes from. A
//! [`TurnEngine`] turns the rendered prompt into a plan and a reply; the
//! in-tree [`EchoEngine`] is deterministic and dependency-free, which keeps
//! the protocol loop fully testable without a backend.

use serde::Serialize;

/// Priority of a plan entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPriority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

/// Status of a plan entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Not started.
    Pending,
    /// Currently being worked.
    InProgress,
    /// Done.
    Completed,
}

/// One entry of the plan update emitted at the start of a prompt turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// What the entry covers.
    pub content: String,
    /// Priority shown by the host.
    pub priority: PlanPriority,
    /// Progress state shown by the host.
    pub status: PlanStatus,
}

/// Produces the plan and reply for one prompt turn.
pub trait TurnEngine: Send + Sync {
    /// Plan entries streamed before the reply.
    fn plan(&self, prompt: &str) -> Vec<PlanEntry>;

    /// Reply text for the rendered prompt. Must not be empty.
    fn reply(&self, prompt: &str) -> String;
}

/// Deterministic default engine: echoes the rendered prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoEngine;

impl TurnEngine for EchoEngine {
    fn plan(&self, _prompt: &str) -> Vec<PlanEntry> {
        vec![PlanEntry {
            content: "Review the prompt and compose a reply".into(),
            priority: PlanPriority::Medium,
            status: PlanStatus::InProgress,
        }]
    }

    fn reply(&self, prompt: &str) -> String {
        if prompt.trim().is_empty() {
            "I received an empty prompt.".into()
        } else {
            prompt.to_owned()
        }
    }
}
