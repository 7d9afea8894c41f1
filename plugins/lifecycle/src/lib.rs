//! Lifecycle adapter for Iced applications
//!
//! Turns window focus changes and close requests into
//! [`LifecycleEvent`]s and forwards them to a [`SaveService`], which decides
//! from its settings whether they cause a flush.
//!
//! When the service was initialized outside a tokio runtime (typically in
//! `main`, before the iced application starts) its own auto-save timer can't
//! run, so the plugin drives periodic flushes from an iced subscription
//! instead.
//!
//! # Example
//!
//! ```ignore
//! use iced_savestate_plugin::{LifecycleMessage, LifecyclePlugin};
//! use savestate::{AppName, SaveService};
//!
//! let service = SaveService::new(AppName::new("com", "example", "game"));
//! service.initialize();
//! let lifecycle = LifecyclePlugin::new(service.clone());
//!
//! // In your app:
//! fn subscription(&self) -> Subscription<Message> {
//!     self.lifecycle.subscription().map(Message::Lifecycle)
//! }
//!
//! fn update(&mut self, message: Message) -> Task<Message> {
//!     match message {
//!         Message::Lifecycle(msg) => {
//!             let (task, _output) = self.lifecycle.update(msg);
//!             task.map(Message::Lifecycle)
//!         }
//!     }
//! }
//! ```

use iced::Event::Window;
use iced::event::listen_with;
use iced::time::every;
use iced::window::Event;
use iced::{Subscription, Task};
use tracing::debug;

pub use savestate::{AppName, LifecycleEvent, SaveService};

/// Messages handled by [`LifecyclePlugin::update`]
#[derive(Clone, Debug)]
pub enum LifecycleMessage {
    /// A host lifecycle event arrived
    Event(LifecycleEvent),
    /// Periodic flush driven by the subscription timer
    Tick,
    /// A lifecycle event was handled; `flushed` tells whether it wrote
    Notified {
        event: LifecycleEvent,
        flushed: bool,
    },
    /// A periodic flush finished
    Flushed,
}

/// Output messages for the host application
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum LifecycleOutput {
    /// A lifecycle event caused the save data to be flushed
    SavedOn(LifecycleEvent),
    /// The periodic timer flushed the save data
    AutoSaved,
}

/// Map an iced event to the lifecycle event it represents
pub fn lifecycle_event(event: &iced::Event) -> Option<LifecycleEvent> {
    match event {
        Window(Event::Unfocused) => Some(LifecycleEvent::FocusLost),
        Window(Event::Focused) => Some(LifecycleEvent::FocusGained),
        Window(Event::CloseRequested) => Some(LifecycleEvent::Quit),
        _ => None,
    }
}

/// Forwards window lifecycle events to a save service
#[derive(Debug, Clone)]
pub struct LifecyclePlugin {
    service: SaveService,
}

impl LifecyclePlugin {
    /// Create the plugin for an already built service
    pub fn new(service: SaveService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &SaveService {
        &self.service
    }

    /// Interval the subscription timer should tick at, if the service can't
    pub fn fallback_period(&self) -> Option<std::time::Duration> {
        if self.service.auto_save_period().is_some() {
            return None;
        }
        self.service
            .settings()
            .and_then(|settings| settings.auto_save_interval())
    }

    /// Handle a plugin message, returning follow-up work and host output
    pub fn update(
        &self,
        message: LifecycleMessage,
    ) -> (Task<LifecycleMessage>, Option<LifecycleOutput>) {
        match message {
            LifecycleMessage::Event(event) => {
                let service = self.service.clone();
                let task = Task::perform(
                    async move {
                        let flushed = service.notify_async(event).await;
                        (event, flushed)
                    },
                    |(event, flushed)| LifecycleMessage::Notified { event, flushed },
                );
                (task, None)
            }
            LifecycleMessage::Tick => {
                let service = self.service.clone();
                let task = Task::perform(
                    async move { service.save_all_async().await },
                    |_| LifecycleMessage::Flushed,
                );
                (task, None)
            }
            LifecycleMessage::Notified { event, flushed } => {
                debug!(?event, flushed, "lifecycle event handled");
                let output = flushed.then_some(LifecycleOutput::SavedOn(event));
                (Task::none(), output)
            }
            LifecycleMessage::Flushed => (Task::none(), Some(LifecycleOutput::AutoSaved)),
        }
    }

    /// Window lifecycle events, plus the fallback timer when one is needed
    pub fn subscription(&self) -> Subscription<LifecycleMessage> {
        let events = window_events();
        match self.fallback_period() {
            Some(period) => Subscription::batch([
                events,
                every(period).map(|_| LifecycleMessage::Tick),
            ]),
            None => events,
        }
    }
}

/// Subscription for window focus and close events
fn window_events() -> Subscription<LifecycleMessage> {
    listen_with(|event, _, _| lifecycle_event(&event)).map(LifecycleMessage::Event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use savestate::{BackendKind, Settings};

    fn service(dir: &std::path::Path, settings: Settings) -> SaveService {
        SaveService::builder(AppName::new("com", "example", "lifecycle"))
            .with_data_dir(dir)
            .with_settings(settings)
            .build()
    }

    #[test]
    fn window_events_map_to_lifecycle_events() {
        assert_eq!(
            lifecycle_event(&Window(Event::Unfocused)),
            Some(LifecycleEvent::FocusLost)
        );
        assert_eq!(
            lifecycle_event(&Window(Event::Focused)),
            Some(LifecycleEvent::FocusGained)
        );
        assert_eq!(
            lifecycle_event(&Window(Event::CloseRequested)),
            Some(LifecycleEvent::Quit)
        );
        assert_eq!(lifecycle_event(&Window(Event::Closed)), None);
    }

    #[test]
    fn notified_flush_is_reported_to_the_host() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = LifecyclePlugin::new(service(dir.path(), Settings::default()));

        let (_, output) = plugin.update(LifecycleMessage::Notified {
            event: LifecycleEvent::Quit,
            flushed: true,
        });
        assert_eq!(output, Some(LifecycleOutput::SavedOn(LifecycleEvent::Quit)));

        let (_, output) = plugin.update(LifecycleMessage::Notified {
            event: LifecycleEvent::FocusGained,
            flushed: false,
        });
        assert_eq!(output, None);
    }

    #[test]
    fn timer_falls_back_to_subscription_without_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            backend: BackendKind::File,
            auto_save_interval: 5.0,
            ..Settings::default()
        };
        let service = service(dir.path(), settings);
        service.initialize();

        let plugin = LifecyclePlugin::new(service);
        assert_eq!(
            plugin.fallback_period(),
            Some(std::time::Duration::from_secs(5))
        );
    }

    #[test]
    fn no_fallback_when_auto_save_is_off() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Settings::default());
        service.initialize();

        assert_eq!(LifecyclePlugin::new(service).fallback_period(), None);
    }
}
