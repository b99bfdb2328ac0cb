/// Holds at most one render request until an asynchronously loaded asset is
/// ready. Later requests overwrite earlier ones; the survivor is released
/// exactly once.
#[derive(Debug, Clone)]
pub struct DeferredSlot<T> {
    ready: bool,
    pending: Option<T>,
}

impl<T> Default for DeferredSlot<T> {
    fn default() -> Self {
        Self {
            ready: false,
            pending: None,
        }
    }
}

impl<T> DeferredSlot<T> {
    /// Returns the request back when it can be served now, otherwise parks it.
    pub fn submit(&mut self, request: T) -> Option<T> {
        if self.ready {
            return Some(request);
        }
        self.pending = Some(request);
        None
    }

    /// Marks the asset ready. Only the first call can yield the parked request.
    pub fn mark_ready(&mut self) -> Option<T> {
        if self.ready {
            return None;
        }
        self.ready = true;
        self.pending.take()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
