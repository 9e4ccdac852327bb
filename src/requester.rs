use {
    crate::{drawable::Drawable, loader::Loader},
    parking_lot::Mutex,
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

/// Object that asked for a load and receives its result.
///
/// Loader keeps only weak references to requesters,
/// so pending loads never extend their lifetime.
/// Both methods are called on the thread that pumps the dispatcher.
pub trait Requester: Send + Sync + 'static {
    /// Checks if requester still wants the result.
    fn is_attached(&self) -> bool;

    /// Accepts delivered drawable.
    fn set_result(&self, drawable: Drawable);
}

/// Drawable slot that loads its destination while attached.
pub struct AsyncDrawable {
    destination: Box<str>,
    attached: AtomicBool,
    result: Mutex<Option<Drawable>>,
}

impl AsyncDrawable {
    pub fn new(destination: &str) -> Arc<Self> {
        Arc::new(AsyncDrawable {
            destination: destination.into(),
            attached: AtomicBool::new(false),
            result: Mutex::new(None),
        })
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Attaches drawable and starts loading its destination.
    /// Does nothing if already attached.
    pub fn attach(self: &Arc<Self>, loader: &Loader) {
        if self.attached.swap(true, Ordering::AcqRel) {
            return;
        }

        loader.load(&self.destination, self.requester());
    }

    /// Detaches drawable and cancels its own load.
    /// Other drawables showing the same destination keep loading.
    /// Results delivered afterwards are dropped.
    pub fn detach(self: &Arc<Self>, loader: &Loader) {
        if self.attached.swap(false, Ordering::AcqRel) {
            loader.cancel_request(&self.destination, &self.requester());
        }
    }

    fn requester(self: &Arc<Self>) -> Weak<dyn Requester> {
        let requester: Weak<Self> = Arc::downgrade(self);
        requester
    }

    /// Returns last delivered drawable.
    pub fn result(&self) -> Option<Drawable> {
        self.result.lock().clone()
    }
}

impl Requester for AsyncDrawable {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    fn set_result(&self, drawable: Drawable) {
        if self.is_attached() {
            *self.result.lock() = Some(drawable);
        }
    }
}
