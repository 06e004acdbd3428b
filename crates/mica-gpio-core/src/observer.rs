//! Observer notifications delivered by the polling engine

use crate::pins::{Channel, State};

/// Notification delivered on the polling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The polling thread started; first event an observer sees
    Attached,
    /// A continuously enabled input changed its sensed state
    Changed {
        /// Channel that changed
        channel: Channel,
        /// New logical state
        state: State,
    },
    /// The polling thread is about to exit; last event an observer sees
    Detached,
}

impl Event {
    /// Numeric id as seen by a foreign callback
    ///
    /// `0` marks the attach sentinel, `-1` the detach sentinel, anything
    /// else is the channel id of a state change.
    pub fn raw_id(&self) -> i32 {
        match self {
            Event::Attached => 0,
            Event::Changed { channel, .. } => i32::from(channel.id()),
            Event::Detached => -1,
        }
    }

    /// Numeric state as seen by a foreign callback, `-1` for sentinels
    pub fn raw_state(&self) -> i32 {
        match self {
            Event::Changed { state, .. } => *state as i32,
            Event::Attached | Event::Detached => -1,
        }
    }
}

/// Receiver of polling engine events
///
/// Runs on the polling thread. An observer must not register a new observer
/// from inside [`Observer::notify`], since that joins the very thread it runs
/// on.
pub trait Observer: Send + 'static {
    /// Handle one event
    fn notify(&mut self, event: Event);
}

impl<F> Observer for F
where
    F: FnMut(Event) + Send + 'static,
{
    fn notify(&mut self, event: Event) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_ids() {
        let channel = Channel::new(3).unwrap();
        let changed = Event::Changed {
            channel,
            state: State::High,
        };

        assert_eq!(Event::Attached.raw_id(), 0);
        assert_eq!(Event::Detached.raw_id(), -1);
        assert_eq!(changed.raw_id(), 3);
        assert_eq!(changed.raw_state(), 1);
        assert_eq!(Event::Attached.raw_state(), -1);
    }

    #[test]
    fn test_closure_observer() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut observer: Box<dyn Observer> = Box::new(move |event: Event| {
            tx.send(event.raw_id()).unwrap();
        });
        observer.notify(Event::Attached);
        observer.notify(Event::Detached);
        drop(observer);

        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![0, -1]);
    }
}
