//! Single-slot debounce register

/// Holds the latest submitted value until no new value has arrived for the
/// quiet period. Each submit overwrites the slot and restarts the wait.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet_ms: f64,
    slot: Option<(T, f64)>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet_ms: f64) -> Self {
        Self {
            quiet_ms: quiet_ms.max(0.0),
            slot: None,
        }
    }

    pub fn quiet_ms(&self) -> f64 {
        self.quiet_ms
    }

    pub fn submit(&mut self, value: T, now_ms: f64) {
        self.slot = Some((value, now_ms + self.quiet_ms));
    }

    /// Take the value once its deadline has passed
    pub fn poll(&mut self, now_ms: f64) -> Option<T> {
        match &self.slot {
            Some((_, deadline)) if now_ms >= *deadline => self.slot.take().map(|(value, _)| value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn deadline(&self) -> Option<f64> {
        self.slot.as_ref().map(|(_, deadline)| *deadline)
    }

    /// Drop a pending value without firing it
    pub fn cancel(&mut self) -> Option<T> {
        self.slot.take().map(|(value, _)| value)
    }
}
