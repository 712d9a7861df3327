use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag asking the event loop to stop.
///
/// Requesting shutdown only stores to an atomic, so it may be called from a
/// signal handler context. The loop reads it between steps.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let signal = ShutdownSignal::new();
        let handler_side = signal.clone();
        assert!(!signal.is_requested());

        std::thread::spawn(move || handler_side.request())
            .join()
            .unwrap();
        assert!(signal.is_requested());
    }
}
