// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::{
    io,
    ops::ControlFlow,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

/// Module containing fake schedules for testing
///
/// To enable this module, you must enable the `test-util` feature.
#[cfg(feature = "test-util")]
pub mod fakes;

/// A repeating unit of work registered with a [`Schedule`].
///
/// Returning [`ControlFlow::Break`] unregisters the task; it will not be invoked again.
pub type Task = Box<dyn FnMut() -> ControlFlow<()> + Send>;

/// Capability to run a [`Task`] repeatedly on a fixed period.
///
/// The first invocation happens one full `period` after registration, not immediately.
/// Implementations run the task until it returns [`ControlFlow::Break`].
pub trait Schedule {
    /// Register `task` to run every `period`.
    ///
    /// Returns an error if the schedule could not arm the task at all, for example if a
    /// background thread could not be spawned. A zero `period` is rejected with
    /// [`io::ErrorKind::InvalidInput`].
    fn every(&self, period: Duration, task: Task) -> io::Result<()>;
}

impl<S: Schedule + ?Sized> Schedule for &S {
    fn every(&self, period: Duration, task: Task) -> io::Result<()> {
        (**self).every(period, task)
    }
}

impl<S: Schedule + ?Sized> Schedule for Arc<S> {
    fn every(&self, period: Duration, task: Task) -> io::Result<()> {
        (**self).every(period, task)
    }
}

impl<S: Schedule + ?Sized> Schedule for Box<S> {
    fn every(&self, period: Duration, task: Task) -> io::Result<()> {
        (**self).every(period, task)
    }
}

/// A [`Schedule`] that runs every task on its own dedicated OS thread.
///
/// The thread exits once its task returns [`ControlFlow::Break`]. Ticks are deadline based, so a
/// slow task does not push every later tick back; a tick that overruns the following deadline is
/// coalesced with it rather than replayed.
#[derive(Debug, Clone)]
pub struct ThreadSchedule {
    thread_name: String,
}

impl Default for ThreadSchedule {
    fn default() -> Self {
        Self {
            thread_name: "dynsampler-recompute".to_string(),
        }
    }
}

impl ThreadSchedule {
    /// Create a new [`ThreadSchedule`] with the default thread name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of threads spawned by this schedule.
    ///
    /// Defaults to `dynsampler-recompute`.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

impl Schedule for ThreadSchedule {
    fn every(&self, period: Duration, task: Task) -> io::Result<()> {
        check_period(period)?;
        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run_every(period, task))?;
        Ok(())
    }
}

pub(crate) fn check_period(period: Duration) -> io::Result<()> {
    if period.is_zero() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "schedule period must be positive",
        ));
    }
    Ok(())
}

fn run_every(period: Duration, mut task: Task) {
    let _span = tracing::span!(tracing::Level::TRACE, "dynsampler schedule", ?period).entered();
    let mut deadline = Instant::now() + period;
    loop {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }

        if task().is_break() {
            tracing::debug!("scheduled task finished, stopping schedule thread");
            return;
        }

        deadline += period;
        let now = Instant::now();
        if deadline <= now {
            tracing::debug!(?period, "scheduled task overran its period, skipping missed ticks");
            deadline = now + period;
        }
    }
}

/// Tokio-backed schedule
///
/// This module provides a [`Schedule`] that runs tasks on a tokio runtime, including support for
/// tokio's time pause/advance functionality for testing.
///
/// This requires that the `tokio` feature be enabled.
#[cfg(feature = "tokio")]
pub mod tokio {
    use std::{io, time::Duration};

    use ::tokio::{
        runtime::Handle,
        time::{Instant, MissedTickBehavior},
    };

    use crate::{Schedule, Task};

    /// A [`Schedule`] that spawns each task onto a tokio runtime.
    ///
    /// Tasks are driven by [`tokio::time::interval`](::tokio::time::interval), so a runtime with
    /// paused time only fires them as time is advanced.
    #[derive(Debug, Clone)]
    pub struct TokioSchedule {
        handle: Handle,
    }

    impl TokioSchedule {
        /// Create a schedule that spawns onto the runtime the caller is running in.
        ///
        /// # Panics
        ///
        /// Panics if called outside the context of a tokio runtime.
        ///
        /// # Examples
        ///
        /// ```
        /// # #[tokio::main(flavor = "current_thread")]
        /// # async fn main() {
        /// use std::ops::ControlFlow;
        /// use std::time::Duration;
        /// use dynsampler_schedule::{Schedule, tokio::TokioSchedule};
        ///
        /// let schedule = TokioSchedule::current();
        /// schedule
        ///     .every(Duration::from_secs(30), Box::new(|| ControlFlow::Break(())))
        ///     .unwrap();
        /// # }
        /// ```
        pub fn current() -> Self {
            Self::new(Handle::current())
        }

        /// Create a schedule that spawns onto the runtime behind `handle`.
        pub fn new(handle: Handle) -> Self {
            Self { handle }
        }
    }

    impl Schedule for TokioSchedule {
        fn every(&self, period: Duration, mut task: Task) -> io::Result<()> {
            crate::check_period(period)?;
            self.handle.spawn(async move {
                let mut interval = ::tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if task().is_break() {
                        tracing::debug!("scheduled task finished, stopping tokio schedule");
                        break;
                    }
                }
            });
            Ok(())
        }
    }

    #[cfg(test)]
    mod test {
        use std::{
            ops::ControlFlow,
            sync::{
                Arc,
                atomic::{AtomicUsize, Ordering},
            },
            time::Duration,
        };

        use assert2::check;

        use super::TokioSchedule;
        use crate::Schedule;

        #[tokio::test]
        async fn fires_once_per_period_with_paused_time() {
            tokio::time::pause();
            let fired = Arc::new(AtomicUsize::new(0));
            let counter = fired.clone();
            TokioSchedule::current()
                .every(
                    Duration::from_secs(30),
                    Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        ControlFlow::Continue(())
                    }),
                )
                .unwrap();

            tokio::time::sleep(Duration::from_secs(29)).await;
            check!(fired.load(Ordering::SeqCst) == 0);
            tokio::time::sleep(Duration::from_secs(2)).await;
            check!(fired.load(Ordering::SeqCst) == 1);
            tokio::time::sleep(Duration::from_secs(60)).await;
            check!(fired.load(Ordering::SeqCst) == 3);
        }

        #[tokio::test]
        async fn rejects_zero_period() {
            let err = TokioSchedule::current()
                .every(Duration::ZERO, Box::new(|| ControlFlow::Continue(())))
                .unwrap_err();
            check!(err.kind() == std::io::ErrorKind::InvalidInput);
        }

        #[tokio::test]
        async fn stops_after_break() {
            tokio::time::pause();
            let fired = Arc::new(AtomicUsize::new(0));
            let counter = fired.clone();
            TokioSchedule::current()
                .every(
                    Duration::from_secs(1),
                    Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        ControlFlow::Break(())
                    }),
                )
                .unwrap();

            tokio::time::sleep(Duration::from_secs(10)).await;
            check!(fired.load(Ordering::SeqCst) == 1);
        }
    }
}
