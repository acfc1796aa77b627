//! Preparation run state machine.
//!
//! `PipelineRun` is a value object. Every mutation goes through a named
//! transition (`start`, `begin_step`, `advance_step`, `record_failure`,
//! `retry_step`, `finalize`, `reset`) so the ordering and retry rules hold no
//! matter who drives it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Automatic attempts per step before it is blocked.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Idle,
    Script,
    Voice,
    Subtitle,
    MaterialSearch,
    Selection,
    Finalize,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 7] = [
        PipelineStep::Idle,
        PipelineStep::Script,
        PipelineStep::Voice,
        PipelineStep::Subtitle,
        PipelineStep::MaterialSearch,
        PipelineStep::Selection,
        PipelineStep::Finalize,
    ];

    /// Steps the scheduler runs on its own, in order.
    pub const AUTOMATIC: [PipelineStep; 4] = [
        PipelineStep::Script,
        PipelineStep::Voice,
        PipelineStep::Subtitle,
        PipelineStep::MaterialSearch,
    ];

    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Idle => "idle",
            PipelineStep::Script => "script",
            PipelineStep::Voice => "voice",
            PipelineStep::Subtitle => "subtitle",
            PipelineStep::MaterialSearch => "material_search",
            PipelineStep::Selection => "selection",
            PipelineStep::Finalize => "finalize",
        }
    }

    pub fn next(&self) -> PipelineStep {
        Self::from_index(self.index() + 1).unwrap_or(PipelineStep::Finalize)
    }

    pub fn previous(&self) -> Option<PipelineStep> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn is_automatic(&self) -> bool {
        Self::AUTOMATIC.contains(self)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PipelineStep {
    type Err = EngineError;

    /// Accepts either the step index ("4") or its name ("material_search").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<u8>() {
            return Self::from_index(index)
                .ok_or_else(|| EngineError::invalid_input(format!("unknown step index {}", index)));
        }
        Self::ALL
            .iter()
            .find(|step| step.as_str() == s)
            .copied()
            .ok_or_else(|| EngineError::invalid_input(format!("unknown step {}", s)))
    }
}

/// Result tag of a step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    Ok,
    RecoverableDegraded,
    RetryableError,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    run_id: Uuid,
    generation: u64,
    max_retries: u32,
    current_step: PipelineStep,
    completed_steps: BTreeSet<PipelineStep>,
    in_flight: BTreeSet<PipelineStep>,
    errors_by_step: BTreeMap<PipelineStep, String>,
    retry_count_by_step: BTreeMap<PipelineStep, u32>,
    blocked: BTreeSet<PipelineStep>,
    outcomes: BTreeMap<PipelineStep, StepOutcome>,
    is_ready: bool,
}

impl Default for PipelineRun {
    fn default() -> Self {
        PipelineRun::new(MAX_RETRIES)
    }
}

impl PipelineRun {
    pub fn new(max_retries: u32) -> Self {
        PipelineRun {
            run_id: Uuid::new_v4(),
            generation: 0,
            max_retries: max_retries.max(1),
            current_step: PipelineStep::Idle,
            completed_steps: BTreeSet::new(),
            in_flight: BTreeSet::new(),
            errors_by_step: BTreeMap::new(),
            retry_count_by_step: BTreeMap::new(),
            blocked: BTreeSet::new(),
            outcomes: BTreeMap::new(),
            is_ready: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn current_step(&self) -> PipelineStep {
        self.current_step
    }

    pub fn is_started(&self) -> bool {
        self.current_step != PipelineStep::Idle
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn is_completed(&self, step: PipelineStep) -> bool {
        step == PipelineStep::Idle || self.completed_steps.contains(&step)
    }

    pub fn is_in_flight(&self, step: PipelineStep) -> bool {
        self.in_flight.contains(&step)
    }

    pub fn is_blocked(&self, step: PipelineStep) -> bool {
        self.blocked.contains(&step)
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn retry_count(&self, step: PipelineStep) -> u32 {
        self.retry_count_by_step.get(&step).copied().unwrap_or(0)
    }

    pub fn last_error(&self, step: PipelineStep) -> Option<&str> {
        self.errors_by_step.get(&step).map(String::as_str)
    }

    pub fn outcome(&self, step: PipelineStep) -> Option<StepOutcome> {
        self.outcomes.get(&step).copied()
    }

    pub fn blocked_steps(&self) -> impl Iterator<Item = PipelineStep> + '_ {
        self.blocked.iter().copied()
    }

    /// Leave Idle for a fresh run.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.is_started() {
            return Err(EngineError::invalid_transition(
                PipelineStep::Idle,
                "run already started; reset first",
            ));
        }
        self.current_step = PipelineStep::Script;
        Ok(())
    }

    /// Discard all progress and open a new generation.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = PipelineRun::new(self.max_retries);
        self.generation = generation;
    }

    /// The automatic step whose preconditions are met and which is neither
    /// running, finished nor blocked. At most one such step exists.
    pub fn runnable_step(&self) -> Option<PipelineStep> {
        if !self.is_started() {
            return None;
        }
        let step = PipelineStep::AUTOMATIC
            .iter()
            .copied()
            .find(|step| !self.is_completed(*step))?;
        if self.is_in_flight(step) || self.is_blocked(step) {
            return None;
        }
        Some(step)
    }

    fn check_can_begin(&self, step: PipelineStep) -> EngineResult<()> {
        if !self.is_started() {
            return Err(EngineError::invalid_transition(step, "run not started"));
        }
        if !step.is_automatic() {
            return Err(EngineError::invalid_transition(step, "step is user-paced"));
        }
        if self.is_completed(step) {
            return Err(EngineError::invalid_transition(step, "already completed"));
        }
        if self.is_in_flight(step) {
            return Err(EngineError::invalid_transition(step, "already in flight"));
        }
        if self.is_blocked(step) {
            return Err(EngineError::invalid_transition(step, "blocked until retried"));
        }
        if let Some(previous) = step.previous() {
            if !self.is_completed(previous) {
                return Err(EngineError::invalid_transition(
                    step,
                    format!("waiting for {}", previous),
                ));
            }
        }
        Ok(())
    }

    pub fn begin_step(&mut self, step: PipelineStep) -> EngineResult<()> {
        self.check_can_begin(step)?;
        self.in_flight.insert(step);
        self.current_step = self.current_step.max(step);
        Ok(())
    }

    /// Mark an in-flight step finished and move on to the next one.
    pub fn advance_step(&mut self, step: PipelineStep, outcome: StepOutcome) -> EngineResult<()> {
        if !self.in_flight.remove(&step) {
            return Err(EngineError::invalid_transition(step, "not in flight"));
        }
        self.completed_steps.insert(step);
        self.errors_by_step.remove(&step);
        self.outcomes.insert(step, outcome);
        self.current_step = self.current_step.max(step.next());
        Ok(())
    }

    /// Count a failed attempt. Returns `Blocked` once the retry budget is spent.
    pub fn record_failure(
        &mut self,
        step: PipelineStep,
        message: impl Into<String>,
    ) -> EngineResult<StepOutcome> {
        if !self.in_flight.remove(&step) {
            return Err(EngineError::invalid_transition(step, "not in flight"));
        }
        let attempts = self.retry_count_by_step.entry(step).or_insert(0);
        *attempts += 1;
        let attempts = *attempts;
        self.errors_by_step.insert(step, message.into());

        let outcome = if attempts >= self.max_retries {
            self.blocked.insert(step);
            StepOutcome::Blocked
        } else {
            StepOutcome::RetryableError
        };
        self.outcomes.insert(step, outcome);
        Ok(outcome)
    }

    /// Fail an in-flight step without spending the remaining retries.
    pub fn block_step(&mut self, step: PipelineStep, message: impl Into<String>) -> EngineResult<()> {
        if !self.in_flight.remove(&step) {
            return Err(EngineError::invalid_transition(step, "not in flight"));
        }
        *self.retry_count_by_step.entry(step).or_insert(0) += 1;
        self.errors_by_step.insert(step, message.into());
        self.blocked.insert(step);
        self.outcomes.insert(step, StepOutcome::Blocked);
        Ok(())
    }

    /// User-triggered retry: clears the retry count, blocked flag and error.
    pub fn retry_step(&mut self, step: PipelineStep) -> EngineResult<()> {
        if !self.is_started() {
            return Err(EngineError::invalid_transition(step, "run not started"));
        }
        if !step.is_automatic() {
            return Err(EngineError::invalid_transition(step, "step is user-paced"));
        }
        if self.is_in_flight(step) {
            return Err(EngineError::invalid_transition(step, "already in flight"));
        }
        if self.is_completed(step) {
            return Err(EngineError::invalid_transition(step, "already completed"));
        }
        self.retry_count_by_step.remove(&step);
        self.blocked.remove(&step);
        self.errors_by_step.remove(&step);
        self.outcomes.remove(&step);
        Ok(())
    }

    /// True once material search has finished and the run waits on the user.
    pub fn awaiting_selection(&self) -> bool {
        self.is_completed(PipelineStep::MaterialSearch) && !self.is_ready
    }

    /// Close the user-paced steps. The caller checks selection completeness first.
    pub fn finalize(&mut self) -> EngineResult<()> {
        if self.is_ready {
            return Err(EngineError::invalid_transition(
                PipelineStep::Finalize,
                "already finalized",
            ));
        }
        if !self.is_completed(PipelineStep::MaterialSearch) {
            return Err(EngineError::invalid_transition(
                PipelineStep::Finalize,
                "material search has not completed",
            ));
        }
        for step in [PipelineStep::Selection, PipelineStep::Finalize] {
            self.completed_steps.insert(step);
            self.outcomes.insert(step, StepOutcome::Ok);
        }
        self.current_step = PipelineStep::Finalize;
        self.is_ready = true;
        Ok(())
    }
}
