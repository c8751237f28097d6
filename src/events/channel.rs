//! Event channel on top of crossbeam-channel.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::Event;

/// Engine side of the channel. Cheap to clone into worker threads.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Never blocks. Events sent after the receiver is gone are dropped, so
    /// nobody has to listen.
    pub fn send(&self, event: Event) {
        let _ = self.inner.send(event);
    }
}

/// UI side of the channel
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Blocks for each event; ends once every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// Constructor for a connected sender/receiver pair
pub struct EventChannel;

impl EventChannel {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// Sender for headless runs; everything it sends is discarded
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::organize::RunStatistics;
    use crate::events::{OrganizeEvent, RunEvent};
    use std::thread;

    #[test]
    fn progress_crosses_threads_and_iteration_ends_with_the_sender() {
        let (sender, receiver) = EventChannel::new();

        thread::spawn(move || {
            sender.send(Event::Organize(OrganizeEvent::Progress {
                percent: 42,
                processed: 42,
                total: 100,
                stats: RunStatistics::default(),
            }));
        })
        .join()
        .unwrap();

        let events: Vec<Event> = receiver.iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::Organize(OrganizeEvent::Progress { percent: 42, .. })
        ));
    }

    #[test]
    fn sending_without_a_listener_is_harmless() {
        null_sender().send(Event::Run(RunEvent::Started));
    }
}
