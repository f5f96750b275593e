//! Agent loop state management
//!
//! Tracks where the orchestrator is in a send and how many provider turns the
//! tool loop has used.

use tracing::debug;

/// Where the agent is within a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    #[default]
    Idle,
    AwaitingProvider,
    ExecutingTools,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AgentState::Idle => "idle",
            AgentState::AwaitingProvider => "awaiting_provider",
            AgentState::ExecutingTools => "executing_tools",
        })
    }
}

/// Progress of one send through the tool loop
#[derive(Debug, Clone)]
pub struct LoopState {
    state: AgentState,
    /// Provider turns taken so far
    pub iteration: usize,
    /// Maximum provider turns for this send
    pub max_iterations: usize,
    /// Tool calls executed across all turns
    pub tool_calls: usize,
}

impl LoopState {
    /// Create a new loop state with the given iteration cap
    pub fn new(max_iterations: usize) -> Self {
        Self {
            state: AgentState::Idle,
            iteration: 0,
            max_iterations,
            tool_calls: 0,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Move to `next`, logging the transition
    pub fn transition(&mut self, next: AgentState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, iteration = self.iteration, "agent state");
            self.state = next;
        }
    }

    /// Whether another provider turn is allowed
    pub fn can_continue(&self) -> bool {
        self.iteration < self.max_iterations
    }

    /// Start the next provider turn; returns its 1-based number
    pub fn next_iteration(&mut self) -> usize {
        self.iteration += 1;
        self.transition(AgentState::AwaitingProvider);
        self.iteration
    }

    pub fn record_tools(&mut self, count: usize) {
        self.tool_calls += count;
    }
}
