use std::{
    marker::PhantomData,
    time::{Duration, Instant},
};

/// Action executed on the thread owning requesters.
pub type Delivery = Box<dyn FnOnce() + Send>;

/// Posts deliveries onto the thread that owns requester objects.
///
/// Deliveries must run in the order they were posted.
pub trait Dispatcher: Send + Sync + 'static {
    fn post(&self, delivery: Delivery);
}

impl<F> Dispatcher for F
where
    F: Fn(Delivery) + Send + Sync + 'static,
{
    fn post(&self, delivery: Delivery) {
        self(delivery)
    }
}

/// Returns connected dispatcher and queue.
/// The queue should stay on the thread that owns requesters
/// and be pumped by its event loop.
pub fn main_thread() -> (MainThreadDispatcher, MainThreadQueue) {
    let (tx, rx) = flume::unbounded();
    (
        MainThreadDispatcher { tx },
        MainThreadQueue {
            rx,
            _not_send: PhantomData,
        },
    )
}

#[derive(Clone)]
pub struct MainThreadDispatcher {
    tx: flume::Sender<Delivery>,
}

impl Dispatcher for MainThreadDispatcher {
    fn post(&self, delivery: Delivery) {
        if self.tx.send(delivery).is_err() {
            tracing::debug!("Main thread queue is gone. Delivery dropped");
        }
    }
}

/// Receiving end of the main thread queue.
pub struct MainThreadQueue {
    rx: flume::Receiver<Delivery>,
    _not_send: PhantomData<*const ()>,
}

impl MainThreadQueue {
    /// Runs all deliveries already posted.
    /// Returns number of deliveries executed.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        for delivery in self.rx.try_iter() {
            delivery();
            count += 1;
        }
        count
    }

    /// Waits for one delivery and runs it.
    /// Returns `false` on timeout.
    pub fn run_one(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(delivery) => {
                delivery();
                true
            }
            Err(_) => false,
        }
    }

    /// Runs deliveries until `done` returns `true` or timeout expires.
    /// Returns final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            if !self.run_one(left) && self.rx.is_disconnected() {
                return done();
            }
        }
        true
    }

    /// Runs deliveries arriving within the given period.
    pub fn run_for(&self, period: Duration) -> usize {
        let deadline = Instant::now() + period;
        let mut count = 0;
        while let Ok(delivery) = self.rx.recv_deadline(deadline) {
            delivery();
            count += 1;
        }
        count
    }
}
