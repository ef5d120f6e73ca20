use crate::config::BATCH_SIZE;
use crate::index::ProbeTask;

/// Cooperative round-robin scheduler over one batch's in-flight probes.
///
/// Each pass advances every live task once, in spawn order; tasks reporting
/// completion are dropped at the end of the pass. Single-threaded and
/// non-preemptive: a task that never completes starves its batch, which is a
/// contract on the index's resumable probes, not on the scheduler.
pub(crate) struct RoundRobin {
    tasks: Vec<Box<dyn ProbeTask>>,
}

impl RoundRobin {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Vec::with_capacity(BATCH_SIZE),
        }
    }

    pub(crate) fn spawn(&mut self, task: Box<dyn ProbeTask>) {
        self.tasks.push(task);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Drives every task to completion. Returns the total number of advance
    /// steps taken across the batch.
    pub(crate) fn run(&mut self) -> u64 {
        let mut steps = 0u64;
        while !self.tasks.is_empty() {
            self.tasks.retain_mut(|task| {
                steps += 1;
                task.advance()
            });
        }
        steps
    }
}
