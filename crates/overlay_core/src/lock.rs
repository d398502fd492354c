//! Shared-state locking for stores, the registry and the shake detector. A producer that
//! panicked mid-update leaves its data readable; the overlay logs and keeps going.

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(context, "overlay state lock poisoned; continuing with inner value");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    use super::lock_or_recover;

    #[test]
    fn panicking_writer_does_not_lock_out_later_readers() {
        let events = Arc::new(Mutex::new(vec!["boot"]));
        let writer = {
            let events = Arc::clone(&events);
            thread::spawn(move || {
                let mut guard = lock_or_recover(&events, "writer");
                guard.push("half-written");
                panic!("producer crashed while appending");
            })
        };
        assert!(writer.join().is_err());
        assert!(events.is_poisoned());

        lock_or_recover(&events, "reader").push("after crash");
        assert_eq!(
            *lock_or_recover(&events, "reader"),
            vec!["boot", "half-written", "after crash"]
        );
    }
}
