use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::controller::build::Build;

/// Agent identity: the address the controller dispatches to and probes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentAddr {
    pub host: String,
    pub port: u16,
}

impl AgentAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for AgentAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    /// Idle and eligible for dispatch
    Waiting,
    /// Reserved by a scheduler pass; held only until the dispatch attempt
    /// resolves to Working or Waiting
    Trying,
    /// Executing a build
    Working,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Waiting => write!(f, "waiting"),
            AgentStatus::Trying => write!(f, "trying"),
            AgentStatus::Working => write!(f, "working"),
        }
    }
}

/// Per-agent state. `build` is set exactly while the agent is Working.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub status: AgentStatus,
    pub build: Option<Build>,
}

impl AgentState {
    fn waiting() -> Self {
        Self {
            status: AgentStatus::Waiting,
            build: None,
        }
    }
}

/// Registry of known agents, keyed by advertised address.
///
/// The registry is the only writer of agent status. Entries appear through
/// `register` and disappear through `remove` (after a failed liveness
/// probe); a dispatch failure alone never evicts an agent.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentAddr, AgentState>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent or reset an existing one to Waiting, clearing
    /// any assignment. Idempotent, so a restarted agent never duplicates.
    pub fn register(&mut self, addr: AgentAddr) {
        self.agents.insert(addr, AgentState::waiting());
    }

    /// Update one agent's status and assignment. Returns false for unknown
    /// agents (e.g. evicted between reservation and this update) without
    /// re-inserting them.
    pub fn set_status(
        &mut self,
        addr: &AgentAddr,
        status: AgentStatus,
        build: Option<Build>,
    ) -> bool {
        match self.agents.get_mut(addr) {
            Some(state) => {
                state.status = status;
                state.build = build;
                true
            }
            None => false,
        }
    }

    /// Find one Waiting agent and reserve it by moving it to Trying before
    /// returning. The transition happens inside this call, so two
    /// interleaved scheduler passes can never select the same agent.
    pub fn reserve_idle(&mut self) -> Option<AgentAddr> {
        let addr = self
            .agents
            .iter()
            .find(|(_, state)| state.status == AgentStatus::Waiting)
            .map(|(addr, _)| addr.clone())?;
        if let Some(state) = self.agents.get_mut(&addr) {
            state.status = AgentStatus::Trying;
        }
        Some(addr)
    }

    /// Delete an agent. Returns its assigned build only if it was Working,
    /// so the caller can requeue work that would otherwise be lost. A
    /// Trying agent yields nothing here: the scheduler pass that reserved
    /// it still owns the build and requeues on its own failure path.
    pub fn remove(&mut self, addr: &AgentAddr) -> Option<Build> {
        let state = self.agents.remove(addr)?;
        match state.status {
            AgentStatus::Working => state.build,
            _ => None,
        }
    }

    pub fn get(&self, addr: &AgentAddr) -> Option<&AgentState> {
        self.agents.get(addr)
    }

    /// Addresses of all registered agents, for the health-check sweep.
    pub fn addrs(&self) -> Vec<AgentAddr> {
        self.agents.keys().cloned().collect()
    }

    pub fn waiting_count(&self) -> usize {
        self.agents
            .values()
            .filter(|state| state.status == AgentStatus::Waiting)
            .count()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Clone of the current registry contents, for the status API.
    pub fn snapshot(&self) -> Vec<(AgentAddr, AgentState)> {
        self.agents
            .iter()
            .map(|(addr, state)| (addr.clone(), state.clone()))
            .collect()
    }
}
