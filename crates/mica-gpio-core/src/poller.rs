//! Background polling engine
//!
//! One engine thread runs per registered observer. Every iteration re-arms
//! diagnosis with the live enable mask, takes a snapshot, serves a pending
//! synchronous read and reports edges of continuously enabled inputs.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::gpio::Shared;
use crate::observer::{Event, Observer};
use crate::pins::Channel;
use crate::registers::DiagnosisSnapshot;
use crate::rendezvous::Rendezvous;

const THREAD_NAME: &str = "mica-gpio-poll";

/// Handle of a running engine thread
pub(crate) struct Poller {
    handle: JoinHandle<Box<dyn Observer>>,
    running: Arc<AtomicBool>,
    rendezvous: Arc<Rendezvous>,
}

impl Poller {
    /// Spawn an engine thread bound to `observer`
    pub(crate) fn start(shared: Arc<Shared>, observer: Box<dyn Observer>) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let rendezvous = Arc::new(Rendezvous::new());

        let handle = thread::Builder::new().name(THREAD_NAME.to_string()).spawn({
            let running = Arc::clone(&running);
            let rendezvous = Arc::clone(&rendezvous);
            move || run(&shared, observer, &running, &rendezvous)
        })?;

        log::info!("Polling engine started");
        Ok(Self {
            handle,
            running,
            rendezvous,
        })
    }

    /// Rendezvous of this engine run
    pub(crate) fn rendezvous(&self) -> Arc<Rendezvous> {
        Arc::clone(&self.rendezvous)
    }

    /// Whether the caller runs on this engine's thread (inside a callback)
    pub(crate) fn is_current_thread(&self) -> bool {
        self.handle.thread().id() == thread::current().id()
    }

    /// Clear the running flag, join the thread and hand the observer back
    ///
    /// The observer has received [`Event::Detached`] by the time this
    /// returns. Returns `None` if the observer panicked.
    pub(crate) fn stop(self) -> Option<Box<dyn Observer>> {
        self.running.store(false, Ordering::Release);
        match self.handle.join() {
            Ok(observer) => {
                log::info!("Polling engine stopped");
                Some(observer)
            }
            Err(_) => {
                log::error!("Polling engine panicked");
                None
            }
        }
    }
}

fn run(
    shared: &Shared,
    mut observer: Box<dyn Observer>,
    running: &AtomicBool,
    rendezvous: &Arc<Rendezvous>,
) -> Box<dyn Observer> {
    let _close = rendezvous.close_on_drop();
    observer.notify(Event::Attached);

    let mut previous = DiagnosisSnapshot::default();
    while running.load(Ordering::Acquire) {
        let current = shared.measure(previous);
        rendezvous.service(current);

        let continuous = shared.continuous_mask();
        let edges = current
            .changed_since(previous)
            .filter(|&index| continuous & (1 << index) != 0)
            .filter_map(Channel::from_index);
        for channel in edges {
            let state = current.state(channel.index());
            log::debug!("Channel {} changed to {}", channel, state);
            observer.notify(Event::Changed { channel, state });
        }

        previous = current;
        thread::sleep(shared.config.poll_interval);
    }

    // Release a reader before the final notification
    rendezvous.close();
    observer.notify(Event::Detached);
    observer
}
