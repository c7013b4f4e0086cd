use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::time::Ticks;

/// The ambient state every operation of a host reads.
///
/// Several hosts of one simulation usually share the tick counter and the cancellation flag,
/// cloning a context shares both.
#[derive(Clone, Debug, Default)]
pub struct Context {
    /// Identifies the host in diagnostics.
    pub host_id: usize,
    /// The tick counter sessions and neighbor entries age by.
    pub ticks: Ticks,
    /// Raised to abort every blocking operation.
    pub cancel: Arc<AtomicBool>,
}

impl Context {
    /// A context with its own counter and flag.
    pub fn new(host_id: usize) -> Self {
        Context {
            host_id,
            ..Context::default()
        }
    }

    /// The same shared state for another host.
    pub fn for_host(&self, host_id: usize) -> Self {
        Context {
            host_id,
            ..self.clone()
        }
    }

    /// Whether blocking operations are currently aborted.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shared_between_hosts() {
        let first = Context::new(1);
        let second = first.for_host(2);
        assert_eq!(second.host_id, 2);

        first.ticks.advance(5);
        assert_eq!(second.ticks.now().0, 5);

        first.cancel.store(true, Ordering::Release);
        assert!(second.is_cancelled());
        assert!(!Context::new(3).is_cancelled());
    }
}
