//! Tracks a freshly launched (or re-discovered) fleet until enough
//! instances report "running".
//!
//! The poller itself performs no I/O. The driver re-queries every
//! candidate instance once per pass, feeds the snapshots into
//! [`ReadinessPoller::observe_pass`], and routes any
//! [`PassOutcome::PromptOperator`] to an interactive yes/no decision.

use serde::{Deserialize, Serialize};

/// One instance's status as observed by a single describe call.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct InstanceSnapshot {
    pub instance_id: String,
    /// First security group the instance belongs to.
    pub group: String,
    /// Lifecycle state string as reported by the provider.
    pub state_name: String,
    pub public_dns: String,
    pub private_dns: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PollState {
    Polling,
    AwaitingOperatorDecision,
    Satisfied,
    GivenUp,
}

/// Result of feeding one classification pass into the poller.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PassOutcome {
    /// Enough instances are running; proceed with the fleet.
    Satisfied,
    /// Below target and the opt-out countdown has not expired yet.
    KeepWaiting { running: usize, pending: usize },
    /// Below target; ask the operator whether to proceed with
    /// the partial set.
    PromptOperator { running: usize, pending: usize },
}

/// Waits for a target count of instances to report "running".
///
/// Instances whose group does not match are ignored entirely, even
/// when running. There is no pass limit; a fleet that never reaches
/// the target keeps prompting until the operator accepts or aborts.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    group: String,
    target: usize,
    checks_before_prompt: u32,
    checks_remaining: u32,
    state: PollState,
    running: Vec<InstanceSnapshot>,
    pending: Vec<InstanceSnapshot>,
    other: Vec<InstanceSnapshot>,
}

impl ReadinessPoller {
    pub fn new(group: &str, target: usize) -> Self {
        Self::with_prompt_countdown(group, target, 1)
    }

    pub fn with_prompt_countdown(group: &str, target: usize, checks_before_prompt: u32) -> Self {
        Self {
            group: group.to_string(),
            target,
            checks_before_prompt,
            checks_remaining: checks_before_prompt,
            state: PollState::Polling,
            running: Vec::new(),
            pending: Vec::new(),
            other: Vec::new(),
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Confirmed-running instances in discovery order.
    pub fn running(&self) -> &[InstanceSnapshot] {
        &self.running
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Classifies one full pass of instance snapshots.
    ///
    /// Each pass is a complete re-query of every candidate, so the
    /// previous pass's classification is discarded first. An instance
    /// is counted once per pass, never across passes.
    pub fn observe_pass(&mut self, snapshots: Vec<InstanceSnapshot>) -> PassOutcome {
        assert!(
            self.state == PollState::Polling,
            "observe_pass in state {:?}",
            self.state
        );

        self.running.clear();
        self.pending.clear();
        self.other.clear();

        for snap in snapshots {
            if snap.group != self.group {
                continue;
            }
            match snap.state_name.as_str() {
                "running" => self.running.push(snap),
                "pending" => self.pending.push(snap),
                _ => self.other.push(snap),
            }
        }

        if self.running.len() >= self.target {
            log::info!("started {} instances", self.running.len());
            self.state = PollState::Satisfied;
            return PassOutcome::Satisfied;
        }

        log::info!(
            "started {} instances, {} still pending",
            self.running.len(),
            self.pending.len()
        );
        self.checks_remaining = self.checks_remaining.saturating_sub(1);
        if self.checks_remaining == 0 {
            self.state = PollState::AwaitingOperatorDecision;
            return PassOutcome::PromptOperator {
                running: self.running.len(),
                pending: self.pending.len(),
            };
        }
        PassOutcome::KeepWaiting {
            running: self.running.len(),
            pending: self.pending.len(),
        }
    }

    /// Applies the operator's yes/no answer to a prompt.
    ///
    /// Accepting proceeds with the partial running set. Declining
    /// clears all three buckets and re-queries from scratch, so
    /// previously confirmed running instances are re-discovered on
    /// the next pass.
    pub fn operator_decision(&mut self, accept: bool) {
        assert!(
            self.state == PollState::AwaitingOperatorDecision,
            "operator_decision in state {:?}",
            self.state
        );
        if accept {
            log::info!(
                "operator accepted partial set of {} instances",
                self.running.len()
            );
            self.state = PollState::Satisfied;
            return;
        }
        log::info!(
            "operator declined; waiting for {} more instances",
            self.target.saturating_sub(self.running.len())
        );
        self.running.clear();
        self.pending.clear();
        self.other.clear();
        self.checks_remaining = self.checks_before_prompt;
        self.state = PollState::Polling;
    }

    /// Abandons the wait without accepting any instances.
    pub fn give_up(&mut self) {
        self.state = PollState::GivenUp;
    }
}

#[cfg(test)]
fn snapshot(id: &str, group: &str, state: &str) -> InstanceSnapshot {
    InstanceSnapshot {
        instance_id: id.to_string(),
        group: group.to_string(),
        state_name: state.to_string(),
        public_dns: format!("{}.compute.amazonaws.com", id),
        private_dns: format!("{}.eu-west-1.compute.internal", id),
    }
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- poller::test_satisfied_single_pass --exact --show-output
#[test]
fn test_satisfied_single_pass() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    // 3 of 5 running, target 3: must stop after one pass, no prompt
    let mut poller = ReadinessPoller::new("hive-dev", 3);
    let pass = vec![
        snapshot("i-1", "hive-dev", "running"),
        snapshot("i-2", "hive-dev", "running"),
        snapshot("i-3", "hive-dev", "pending"),
        snapshot("i-4", "hive-dev", "running"),
        snapshot("i-5", "hive-dev", "pending"),
    ];
    assert_eq!(poller.observe_pass(pass), PassOutcome::Satisfied);
    assert_eq!(poller.state(), PollState::Satisfied);

    let ids: Vec<&str> = poller
        .running()
        .iter()
        .map(|s| s.instance_id.as_str())
        .collect();
    assert_eq!(ids, vec!["i-1", "i-2", "i-4"]);
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- poller::test_decline_discards_pass --exact --show-output
#[test]
fn test_decline_discards_pass() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let mut poller = ReadinessPoller::new("hive-dev", 3);

    // first pass: 2 running, below target, operator prompted
    let first = vec![
        snapshot("i-1", "hive-dev", "running"),
        snapshot("i-2", "hive-dev", "running"),
        snapshot("i-3", "hive-dev", "pending"),
    ];
    assert_eq!(
        poller.observe_pass(first),
        PassOutcome::PromptOperator {
            running: 2,
            pending: 1
        }
    );
    assert_eq!(poller.state(), PollState::AwaitingOperatorDecision);

    // operator declines: every bucket is discarded
    poller.operator_decision(false);
    assert_eq!(poller.state(), PollState::Polling);
    assert!(poller.running().is_empty());
    assert_eq!(poller.pending_count(), 0);

    // second pass re-discovers a different partial set; operator accepts
    let second = vec![
        snapshot("i-2", "hive-dev", "running"),
        snapshot("i-3", "hive-dev", "pending"),
        snapshot("i-1", "hive-dev", "stopped"),
    ];
    assert_eq!(
        poller.observe_pass(second),
        PassOutcome::PromptOperator {
            running: 1,
            pending: 1
        }
    );
    poller.operator_decision(true);
    assert_eq!(poller.state(), PollState::Satisfied);

    let ids: Vec<&str> = poller
        .running()
        .iter()
        .map(|s| s.instance_id.as_str())
        .collect();
    assert_eq!(ids, vec!["i-2"]);
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- poller::test_foreign_group_ignored --exact --show-output
#[test]
fn test_foreign_group_ignored() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let mut poller = ReadinessPoller::new("hive-dev", 1);
    let pass = vec![
        snapshot("i-1", "other-group", "running"),
        snapshot("i-2", "hive-dev", "pending"),
    ];
    // the running instance belongs to another group; not counted
    assert_eq!(
        poller.observe_pass(pass),
        PassOutcome::PromptOperator {
            running: 0,
            pending: 1
        }
    );
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- poller::test_give_up --exact --show-output
#[test]
fn test_give_up() {
    let mut poller = ReadinessPoller::new("hive-dev", 2);
    assert_eq!(
        poller.observe_pass(vec![snapshot("i-1", "hive-dev", "pending")]),
        PassOutcome::PromptOperator {
            running: 0,
            pending: 1
        }
    );
    poller.give_up();
    assert_eq!(poller.state(), PollState::GivenUp);
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- poller::test_prompt_countdown --exact --show-output
#[test]
fn test_prompt_countdown() {
    let mut poller = ReadinessPoller::with_prompt_countdown("hive-dev", 2, 2);
    assert_eq!(
        poller.observe_pass(vec![snapshot("i-1", "hive-dev", "pending")]),
        PassOutcome::KeepWaiting {
            running: 0,
            pending: 1
        }
    );
    // countdown expires on the second failing pass; the instance moved
    // from pending to running and is counted in one bucket only
    assert_eq!(
        poller.observe_pass(vec![snapshot("i-1", "hive-dev", "running")]),
        PassOutcome::PromptOperator {
            running: 1,
            pending: 0
        }
    );
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- poller::test_repeat_passes_count_distinct_instances --exact --show-output
#[test]
fn test_repeat_passes_count_distinct_instances() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    // one real instance re-observed across passes must never satisfy
    // a target of two
    let mut poller = ReadinessPoller::with_prompt_countdown("hive-dev", 2, 3);
    assert_eq!(
        poller.observe_pass(vec![snapshot("i-1", "hive-dev", "running")]),
        PassOutcome::KeepWaiting {
            running: 1,
            pending: 0
        }
    );
    assert_eq!(
        poller.observe_pass(vec![snapshot("i-1", "hive-dev", "running")]),
        PassOutcome::KeepWaiting {
            running: 1,
            pending: 0
        }
    );
    assert_eq!(poller.state(), PollState::Polling);

    let ids: Vec<&str> = poller
        .running()
        .iter()
        .map(|s| s.instance_id.as_str())
        .collect();
    assert_eq!(ids, vec!["i-1"]);

    // a second distinct instance appearing in the pass does satisfy it
    assert_eq!(
        poller.observe_pass(vec![
            snapshot("i-1", "hive-dev", "running"),
            snapshot("i-2", "hive-dev", "running"),
        ]),
        PassOutcome::Satisfied
    );
    assert_eq!(poller.running().len(), 2);
}
