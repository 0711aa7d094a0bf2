//! Command Queue (§4.7): executes a disruption Command end to end — taint,
//! provision replacements, wait for readiness, delete originals — with
//! rollback on failure.

use crate::clock::SharedClock;
use crate::disruption::candidate::Candidate;
use crate::provisioning::Provisioner;
use crate::util::Error;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// How long the queue waits for replacements to become `Initialized` before
/// failing the command.
pub const REPLACEMENT_READY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Executing,
    Terminating,
    Done,
    Failed,
}

#[derive(Clone, Debug)]
pub struct Command {
    pub method: String,
    pub reason: String,
    pub candidates: Vec<Candidate>,
    pub replacements: Vec<String>,
    pub creation_time: DateTime<Utc>,
    pub state: CommandState,
    /// Set by the proposing method: whether the queue should request
    /// replacement NodeClaims before deleting the originals. `false` for a
    /// pure deletion (Empty, or a consolidation/drift/expiration decision
    /// whose simulation found existing capacity for every displaced pod).
    pub needs_replacement: bool,
}

impl Command {
    pub fn new(method: impl Into<String>, reason: impl Into<String>, candidates: Vec<Candidate>, clock: &SharedClock) -> Self {
        Self {
            method: method.into(),
            reason: reason.into(),
            candidates,
            replacements: Vec::new(),
            creation_time: clock.now(),
            state: CommandState::Pending,
            needs_replacement: false,
        }
    }

    pub fn with_replacement(mut self, needs_replacement: bool) -> Self {
        self.needs_replacement = needs_replacement;
        self
    }

    fn candidate_key(&self) -> String {
        let mut ids: Vec<&str> = self.candidates.iter().map(|c| c.provider_id.as_str()).collect();
        ids.sort_unstable();
        ids.join(",")
    }
}

/// Durable in-memory queue keyed by candidate set. FIFO per candidate set;
/// independent commands proceed concurrently.
pub struct CommandQueue {
    commands: RwLock<HashMap<String, Command>>,
    queued_providers: RwLock<std::collections::HashSet<String>>,
    replacement_ready_timeout: Duration,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self {
            commands: RwLock::default(),
            queued_providers: RwLock::default(),
            replacement_ready_timeout: REPLACEMENT_READY_TIMEOUT,
        }
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides how long [`Self::execute`] waits for replacements to become
    /// ready, configurable via `ControllerArgs::replacement_ready_timeout`.
    pub fn with_replacement_ready_timeout(mut self, timeout: Duration) -> Self {
        self.replacement_ready_timeout = timeout;
        self
    }

    pub fn is_queued(&self, provider_id: &str) -> bool {
        self.queued_providers.read().unwrap().contains(provider_id)
    }

    /// Fails if any candidate is already being processed by another command.
    pub fn start_command(&self, command: Command) -> Result<(), Error> {
        let mut queued = self.queued_providers.write().unwrap();
        if command
            .candidates
            .iter()
            .any(|c| queued.contains(&c.provider_id))
        {
            return Err(Error::AlreadyDisrupting);
        }
        for c in &command.candidates {
            queued.insert(c.provider_id.clone());
        }
        drop(queued);
        let key = command.candidate_key();
        self.commands.write().unwrap().insert(key, command);
        Ok(())
    }

    pub fn get_commands(&self) -> Vec<Command> {
        self.commands.read().unwrap().values().cloned().collect()
    }

    fn remove(&self, command: &Command) {
        let key = command.candidate_key();
        self.commands.write().unwrap().remove(&key);
        let mut queued = self.queued_providers.write().unwrap();
        for c in &command.candidates {
            queued.remove(&c.provider_id);
        }
    }

    fn update(&self, command: &Command) {
        let key = command.candidate_key();
        self.commands.write().unwrap().insert(key, command.clone());
    }

    /// Drives `command` through its full lifecycle against `provisioner`:
    /// taint + set `DisruptionReason` → request replacements → wait for
    /// `Initialized` → delete originals. On any failure the taints and
    /// condition are rolled back and candidates return to service.
    pub async fn execute(
        &self,
        mut command: Command,
        provisioner: &dyn Provisioner,
    ) -> Result<(), Error> {
        command.state = CommandState::Executing;
        self.update(&command);

        for candidate in &command.candidates {
            provisioner.taint_disrupted(&candidate.provider_id).await?;
        }

        if provisioner.wants_replacement(&command) {
            match provisioner.create_replacements(&command).await {
                Ok(names) => command.replacements = names,
                Err(e) => {
                    self.rollback(&command, provisioner).await;
                    return Err(e);
                }
            }
            self.update(&command);

            match provisioner
                .wait_for_ready(&command.replacements, self.replacement_ready_timeout)
                .await
            {
                Ok(()) => {}
                Err(e) => {
                    self.rollback(&command, provisioner).await;
                    return Err(e);
                }
            }
        }

        command.state = CommandState::Terminating;
        self.update(&command);

        for candidate in &command.candidates {
            provisioner.delete_candidate(&candidate.provider_id).await?;
        }

        command.state = CommandState::Done;
        self.remove(&command);
        Ok(())
    }

    async fn rollback(&self, command: &Command, provisioner: &dyn Provisioner) {
        for candidate in &command.candidates {
            let _ = provisioner.untaint_disrupted(&candidate.provider_id).await;
        }
        let mut failed = command.clone();
        failed.state = CommandState::Failed;
        self.remove(&failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruption::candidate::Class;
    use crate::state::StateNode;
    use std::sync::Arc;

    fn candidate(id: &str) -> Candidate {
        Candidate {
            provider_id: id.to_string(),
            node: StateNode::new(id),
            pool_name: "pool-a".to_string(),
            class: Class::Graceful,
        }
    }

    #[test]
    fn start_command_rejects_overlapping_candidates() {
        let queue = CommandQueue::new();
        let clock: SharedClock = Arc::new(crate::clock::SystemClock);
        let cmd1 = Command::new("drift", "Drifted", vec![candidate("a")], &clock);
        queue.start_command(cmd1).unwrap();

        let cmd2 = Command::new("drift", "Drifted", vec![candidate("a")], &clock);
        assert!(matches!(queue.start_command(cmd2), Err(Error::AlreadyDisrupting)));
    }

    #[test]
    fn is_queued_reflects_active_commands() {
        let queue = CommandQueue::new();
        let clock: SharedClock = Arc::new(crate::clock::SystemClock);
        assert!(!queue.is_queued("a"));
        let cmd = Command::new("drift", "Drifted", vec![candidate("a")], &clock);
        queue.start_command(cmd).unwrap();
        assert!(queue.is_queued("a"));
    }
}
