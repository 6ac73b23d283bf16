//! Periodic background workers.
//!
//! A worker sleeps its nominal period in `poll_granularity` slices,
//! re-checking the shutdown gate after each slice, then runs one unit of
//! work. The first failing unit ends the worker for good.

use std::io;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::{debug, warn};

use crate::error::WorkerConfigError;
use crate::handle::WorkerHandle;
use crate::signals::SignalGate;

/// One bounded piece of work run once per period.
pub trait UnitOfWork: Send + 'static {
    fn run_once(&mut self) -> Result<()>;
}

impl<F> UnitOfWork for F
where
    F: FnMut() -> Result<()> + Send + 'static,
{
    fn run_once(&mut self) -> Result<()> {
        self()
    }
}

/// Timing of a periodic worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicWorkerConfig {
    name: String,
    nominal_period: Duration,
    poll_granularity: Duration,
    polls: u64,
}

impl PeriodicWorkerConfig {
    /// Validates that `poll_granularity` is non-zero and evenly divides
    /// `nominal_period`, and that the poll count fits in a `u64`.
    pub fn new(
        name: impl Into<String>,
        nominal_period: Duration,
        poll_granularity: Duration,
    ) -> Result<Self, WorkerConfigError> {
        let name = name.into();
        if nominal_period.is_zero() {
            return Err(WorkerConfigError::ZeroPeriod { name });
        }
        if poll_granularity.is_zero() {
            return Err(WorkerConfigError::ZeroGranularity { name });
        }
        if nominal_period.as_nanos() % poll_granularity.as_nanos() != 0 {
            return Err(WorkerConfigError::UnevenGranularity {
                name,
                period: nominal_period,
                granularity: poll_granularity,
            });
        }
        let Ok(polls) = u64::try_from(nominal_period.as_nanos() / poll_granularity.as_nanos())
        else {
            return Err(WorkerConfigError::TooManyPolls { name });
        };
        Ok(Self {
            name,
            nominal_period,
            poll_granularity,
            polls,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nominal_period(&self) -> Duration {
        self.nominal_period
    }

    pub fn poll_granularity(&self) -> Duration {
        self.poll_granularity
    }

    /// Number of shutdown checks per period.
    pub fn polls_per_period(&self) -> u64 {
        self.polls
    }
}

/// Why a worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Shutdown,
    Failed,
}

pub struct PeriodicWorker<W> {
    config: PeriodicWorkerConfig,
    unit: W,
}

impl<W: UnitOfWork> PeriodicWorker<W> {
    pub fn new(config: PeriodicWorkerConfig, unit: W) -> Self {
        Self { config, unit }
    }

    pub fn config(&self) -> &PeriodicWorkerConfig {
        &self.config
    }

    /// Run the loop on the calling thread until shutdown or first failure.
    pub fn run(mut self, gate: &SignalGate) -> WorkerExit {
        let name = self.config.name.as_str();
        let polls = self.config.polls_per_period();
        debug!(
            "{name} worker started (period {:?}, poll {:?})",
            self.config.nominal_period, self.config.poll_granularity
        );

        while !gate.should_shutdown() {
            for _ in 0..polls {
                if gate.should_shutdown() {
                    break;
                }
                thread::sleep(self.config.poll_granularity);
            }
            if gate.should_shutdown() {
                break;
            }

            if let Err(e) = self.unit.run_once() {
                if !gate.should_shutdown() {
                    warn!("{name} worker failed and will not run again: {e:#}");
                }
                return WorkerExit::Failed;
            }
        }

        debug!("{name} worker exiting on shutdown");
        WorkerExit::Shutdown
    }

    /// Run the loop on its own thread, named after the worker.
    pub fn spawn(self, gate: &'static SignalGate) -> io::Result<WorkerHandle<WorkerExit>> {
        let name = self.config.name.clone();
        WorkerHandle::spawn(name, move || self.run(gate))
    }
}
