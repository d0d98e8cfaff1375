//! What a run produces.
//!
//! [`crate::McpAgent::run`] returns a [`RunOutcome`];
//! [`crate::McpAgent::astream`] yields [`AgentEvent`]s as the run progresses,
//! ending with [`AgentEvent::Finished`].

use mcpeer_common::tools::ToolCall;

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model answered without requesting tools.
    Completed { answer: String, steps: usize },
    /// `max_steps` was reached while the model still requested tools.
    Aborted {
        /// Last non-empty text the model produced.
        partial: Option<String>,
        steps: usize,
    },
}

impl RunOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub const fn steps(&self) -> usize {
        match self {
            Self::Completed { steps, .. } | Self::Aborted { steps, .. } => *steps,
        }
    }

    /// The final answer, or the partial answer of an aborted run.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Completed { answer, .. } => Some(answer),
            Self::Aborted { partial, .. } => partial.as_deref(),
        }
    }
}

/// Incremental output of a streamed run.
///
/// Every event carries the step it belongs to; steps never decrease along a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The model is about to be asked for step `step`.
    StepStarted {
        step: usize,
        /// Names of the tools offered at this step.
        tools: Vec<String>,
    },
    /// Text generated by the model.
    TextDelta { step: usize, text: String },
    /// The model requested a tool.
    ToolCall {
        step: usize,
        call: ToolCall,
        /// Server that will run it; `None` for server manager tools.
        server: Option<String>,
    },
    /// A tool returned.
    ToolResult {
        step: usize,
        tool: String,
        output: String,
        is_error: bool,
    },
    /// The run is over.
    Finished(RunOutcome),
}

impl AgentEvent {
    #[must_use]
    pub const fn step(&self) -> usize {
        match self {
            Self::StepStarted { step, .. }
            | Self::TextDelta { step, .. }
            | Self::ToolCall { step, .. }
            | Self::ToolResult { step, .. } => *step,
            Self::Finished(outcome) => outcome.steps(),
        }
    }
}
