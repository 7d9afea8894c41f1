//! Automatic flush triggers
//!
//! Two kinds of triggers: a periodic tick running on the tokio runtime, and
//! host lifecycle events (pause, focus loss, quit) pushed in through
//! [`SaveService::notify`](crate::SaveService::notify).

use crate::settings::Settings;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Host lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Paused,
    Resumed,
    FocusLost,
    FocusGained,
    Quit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Triggers {
    on_pause: bool,
    on_focus_lost: bool,
    on_quit: bool,
}

/// Periodic flush task plus event trigger policy
///
/// Starting an already running scheduler stops the previous task first.
#[derive(Debug, Default)]
pub(crate) struct AutoSaveScheduler {
    task: Option<JoinHandle<()>>,
    period: Option<Duration>,
    triggers: Triggers,
    armed: bool,
}

impl AutoSaveScheduler {
    /// Arm the event triggers configured in `settings`
    pub(crate) fn arm(&mut self, settings: &Settings) {
        self.triggers = Triggers {
            on_pause: settings.save_on_pause,
            on_focus_lost: settings.save_on_focus_lost,
            on_quit: settings.save_on_quit,
        };
        self.armed = true;
    }

    /// Whether `event` should cause a flush right now
    pub(crate) fn should_flush(&self, event: LifecycleEvent) -> bool {
        if !self.armed {
            return false;
        }
        match event {
            LifecycleEvent::Paused => self.triggers.on_pause,
            LifecycleEvent::FocusLost => self.triggers.on_focus_lost,
            LifecycleEvent::Quit => self.triggers.on_quit,
            LifecycleEvent::Resumed | LifecycleEvent::FocusGained => false,
        }
    }

    /// Run `tick` every `period` until stopped or until it returns `None`
    pub(crate) fn start<F, Fut>(&mut self, runtime: &Handle, period: Duration, mut tick: F)
    where
        F: FnMut() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop_timer();

        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(flush) = tick() else {
                    debug!("auto-save target dropped; stopping timer");
                    break;
                };
                flush.await;
            }
        });

        self.task = Some(task);
        self.period = Some(period);
        info!(period_secs = period.as_secs_f64(), "auto-save timer started");
    }

    fn stop_timer(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("auto-save timer stopped");
        }
        self.period = None;
    }

    /// Stop the timer and disarm event triggers
    pub(crate) fn stop(&mut self) {
        self.stop_timer();
        self.armed = false;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub(crate) fn period(&self) -> Option<Duration> {
        self.period
    }
}

impl Drop for AutoSaveScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
