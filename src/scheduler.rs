//! The cooperative task scheduler, modeled as a trait rather than a concrete run loop
//! — the host owns the actual add/cancel primitive (a priority queue, an RTOS timer
//! list, whatever fits the target), and `Stack` only ever asks it to (re)schedule one
//! of the two recurring activities below.

/// The only two activities this core ever schedules. There is no general-purpose
/// `task_periodic` pump to model here; that belongs to the host loop outside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Re-invoke [`crate::stack::Stack::tick`] after the given delay.
    Tick,
    /// Re-invoke [`crate::stack::Stack::upstream`] after the given delay.
    Upstream,
}

/// The scheduler contract a host implements to give `Stack` somewhere to post delayed
/// work. Re-scheduling a task that already has a pending instance replaces it rather
/// than duplicating it: a cancel-then-add idiom folded into a single call here so no
/// emit is ever starved by a stale, later-delayed invocation.
pub trait Scheduler {
    fn schedule(&mut self, task: Task, delay_ticks: u32);

    fn cancel(&mut self, task: Task);

    /// Cancel any pending instance of `task` and schedule a fresh one at zero delay, so
    /// that no emit is starved by a previously queued later-delayed invocation.
    fn reschedule_now(&mut self, task: Task) {
        self.cancel(task);
        self.schedule(task, 0);
    }
}
