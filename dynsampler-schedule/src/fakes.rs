// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    fmt, io, mem,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{Schedule, Task};

struct Registered {
    period: Duration,
    elapsed: Duration,
    task: Task,
}

/// Schedule that never fires on its own.
///
/// Tasks registered with it only run when the test calls [`ManualSchedule::tick`] or
/// [`ManualSchedule::advance`]. Clones share the same set of registered tasks, so a test can keep
/// one handle while passing another to the code under test.
#[derive(Clone, Default)]
pub struct ManualSchedule(Arc<Mutex<Vec<Registered>>>);

impl fmt::Debug for ManualSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualSchedule")
            .field("tasks", &self.task_count())
            .finish()
    }
}

impl ManualSchedule {
    /// Create a new [`ManualSchedule`] with no registered tasks.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::ops::ControlFlow;
    /// use std::time::Duration;
    /// use dynsampler_schedule::{Schedule, fakes::ManualSchedule};
    ///
    /// let schedule = ManualSchedule::new();
    /// schedule
    ///     .every(Duration::from_secs(30), Box::new(|| ControlFlow::Break(())))
    ///     .unwrap();
    /// assert_eq!(schedule.task_count(), 1);
    ///
    /// schedule.tick();
    /// assert_eq!(schedule.task_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every registered task exactly once, regardless of its period.
    pub fn tick(&self) {
        self.run(|registered| {
            registered.elapsed = Duration::ZERO;
            (registered.task)().is_continue()
        });
    }

    /// Move virtual time forward by `by`, firing each task once for every full period that
    /// elapsed.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::ops::ControlFlow;
    /// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
    /// use std::time::Duration;
    /// use dynsampler_schedule::{Schedule, fakes::ManualSchedule};
    ///
    /// let schedule = ManualSchedule::new();
    /// let fired = Arc::new(AtomicUsize::new(0));
    /// let counter = fired.clone();
    /// schedule
    ///     .every(
    ///         Duration::from_secs(30),
    ///         Box::new(move || {
    ///             counter.fetch_add(1, Ordering::Relaxed);
    ///             ControlFlow::Continue(())
    ///         }),
    ///     )
    ///     .unwrap();
    ///
    /// schedule.advance(Duration::from_secs(29));
    /// assert_eq!(fired.load(Ordering::Relaxed), 0);
    /// schedule.advance(Duration::from_secs(61));
    /// assert_eq!(fired.load(Ordering::Relaxed), 3);
    /// ```
    pub fn advance(&self, by: Duration) {
        self.run(|registered| {
            registered.elapsed += by;
            while registered.elapsed >= registered.period {
                registered.elapsed -= registered.period;
                if (registered.task)().is_break() {
                    return false;
                }
            }
            true
        });
    }

    /// Number of tasks that are still registered.
    pub fn task_count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    // Tasks run without the lock held so they are free to register more tasks.
    fn run(&self, mut retain: impl FnMut(&mut Registered) -> bool) {
        let mut tasks = mem::take(&mut *self.0.lock().unwrap());
        tasks.retain_mut(|registered| retain(registered));

        let mut guard = self.0.lock().unwrap();
        let added = mem::replace(&mut *guard, tasks);
        guard.extend(added);
    }
}

impl Schedule for ManualSchedule {
    fn every(&self, period: Duration, task: Task) -> io::Result<()> {
        crate::check_period(period)?;
        self.0.lock().unwrap().push(Registered {
            period,
            elapsed: Duration::ZERO,
            task,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        ops::ControlFlow,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use assert2::check;

    use super::ManualSchedule;
    use crate::Schedule;

    fn counting_task(counter: &Arc<AtomicUsize>, stop_after: usize) -> crate::Task {
        let counter = counter.clone();
        Box::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 >= stop_after {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
    }

    #[test]
    fn nothing_fires_without_tick() {
        let schedule = ManualSchedule::new();
        let fired = Arc::new(AtomicUsize::new(0));
        schedule
            .every(Duration::from_secs(1), counting_task(&fired, usize::MAX))
            .unwrap();
        check!(fired.load(Ordering::SeqCst) == 0);
        schedule.tick();
        schedule.tick();
        check!(fired.load(Ordering::SeqCst) == 2);
    }

    #[test]
    fn advance_respects_each_period() {
        let schedule = ManualSchedule::new();
        let fast = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(AtomicUsize::new(0));
        schedule
            .every(Duration::from_secs(10), counting_task(&fast, usize::MAX))
            .unwrap();
        schedule
            .every(Duration::from_secs(30), counting_task(&slow, usize::MAX))
            .unwrap();

        schedule.advance(Duration::from_secs(25));
        check!(fast.load(Ordering::SeqCst) == 2);
        check!(slow.load(Ordering::SeqCst) == 0);

        schedule.advance(Duration::from_secs(5));
        check!(fast.load(Ordering::SeqCst) == 3);
        check!(slow.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn break_unregisters_task() {
        let schedule = ManualSchedule::new();
        let fired = Arc::new(AtomicUsize::new(0));
        schedule
            .every(Duration::from_secs(1), counting_task(&fired, 2))
            .unwrap();

        schedule.advance(Duration::from_secs(100));
        check!(fired.load(Ordering::SeqCst) == 2);
        check!(schedule.task_count() == 0);

        schedule.tick();
        check!(fired.load(Ordering::SeqCst) == 2);
    }

    #[test]
    fn tasks_can_register_more_tasks() {
        let schedule = ManualSchedule::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let inner_schedule = schedule.clone();
        let inner_fired = fired.clone();
        schedule
            .every(
                Duration::from_secs(1),
                Box::new(move || {
                    inner_schedule
                        .every(Duration::from_secs(1), counting_task(&inner_fired, 1))
                        .unwrap();
                    ControlFlow::Break(())
                }),
            )
            .unwrap();

        schedule.tick();
        check!(schedule.task_count() == 1);
        schedule.tick();
        check!(fired.load(Ordering::SeqCst) == 1);
        check!(schedule.task_count() == 0);
    }

    #[test]
    fn zero_period_is_rejected_without_registering() {
        let schedule = ManualSchedule::new();
        let err = schedule
            .every(Duration::ZERO, Box::new(|| ControlFlow::Continue(())))
            .unwrap_err();
        check!(err.kind() == std::io::ErrorKind::InvalidInput);
        check!(schedule.task_count() == 0);
    }

    #[test]
    fn clones_share_tasks() {
        let schedule = ManualSchedule::new();
        let fired = Arc::new(AtomicUsize::new(0));
        schedule
            .clone()
            .every(Duration::from_secs(1), counting_task(&fired, usize::MAX))
            .unwrap();
        check!(schedule.task_count() == 1);
        check!(format!("{schedule:?}") == "ManualSchedule { tasks: 1 }");
    }
}
