//! Deferred completion delivery
//!
//! Models the controller's interrupt: completions are raised on a separate
//! thread after a fixed latency instead of inside the issuing call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tandem_hal::{EventSink, TransferEvent};
use tracing::trace;

type Pending<'a> = (&'a dyn EventSink, TransferEvent);

/// Interrupt line thread
///
/// `'a` is the lifetime of the sinks it delivers to; only `'static` sinks can
/// cross to the interrupt thread.
pub struct IrqLine<'a> {
    tx: Option<Sender<Pending<'a>>>,
    handle: Option<JoinHandle<()>>,
}

impl IrqLine<'static> {
    /// Spawn the interrupt thread
    ///
    /// `in_flight` is cleared before each notification is delivered.
    pub fn spawn(latency: Duration, in_flight: Arc<AtomicBool>) -> Self {
        let (tx, rx) = mpsc::channel::<Pending<'static>>();

        let handle = thread::Builder::new()
            .name("i3c-irq".into())
            .spawn(move || {
                for (sink, event) in rx {
                    thread::sleep(latency);
                    trace!(?event, "irq");
                    in_flight.store(false, Ordering::Release);
                    sink.notify(event);
                }
            })
            .ok();

        Self {
            tx: Some(tx),
            handle,
        }
    }
}

impl<'a> IrqLine<'a> {
    /// Queue a completion for delivery
    ///
    /// Returns `false` if the interrupt thread is gone.
    pub fn raise(&self, sink: &'a dyn EventSink, event: TransferEvent) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send((sink, event)).is_ok())
    }
}

impl Drop for IrqLine<'_> {
    fn drop(&mut self) {
        // Closing the channel ends the thread once the queue drains
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<std::vec::Vec<TransferEvent>>);

    impl EventSink for Recorder {
        fn notify(&self, event: TransferEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_delivers_in_order() {
        static RECORDER: Recorder = Recorder(Mutex::new(std::vec::Vec::new()));
        let in_flight = Arc::new(AtomicBool::new(true));

        let irq = IrqLine::spawn(Duration::from_micros(100), in_flight.clone());
        assert!(irq.raise(&RECORDER, TransferEvent::Done));
        assert!(irq.raise(&RECORDER, TransferEvent::Error));
        drop(irq);

        assert_eq!(
            *RECORDER.0.lock().unwrap(),
            [TransferEvent::Done, TransferEvent::Error]
        );
        assert!(!in_flight.load(Ordering::Acquire));
    }
}
