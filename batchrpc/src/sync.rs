//! Blocking async adapter.
//!
//! Bridges a one-shot, callback-delivered operation into a synchronous
//! wait. The callback side posts its outcome through a [`CompletionHandle`]
//! — success flag first, then `done` under the mutex, then a kick into the
//! waiter's mailbox. The waiter loops doing one unit of mailbox poll-work
//! at a time with the mutex released, so the callback can always get in to
//! post.
//!
//! A failed poll (the mailbox sender side is gone and nothing was posted)
//! sets `done` directly: the loop must make forward progress rather than
//! hang. That races benignly with a real completion — whichever sets `done`
//! first wins, and the success flag keeps the callback's value if it ran.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

struct Flags {
    done: bool,
    success: bool,
}

/// Waiter half: blocks the calling thread until the outcome is posted.
pub struct Synchronizer {
    flags: Arc<Mutex<Flags>>,
    mailbox: Receiver<()>,
}

/// Callback half: posts the outcome and wakes the waiter. Cloneable and
/// sendable into whatever execution context invokes the callback.
#[derive(Clone)]
pub struct CompletionHandle {
    flags: Arc<Mutex<Flags>>,
    kick: Sender<()>,
}

impl Synchronizer {
    /// Create the waiter/callback pair. The success flag defaults to
    /// failure until a callback posts otherwise.
    pub fn new() -> (Synchronizer, CompletionHandle) {
        let flags = Arc::new(Mutex::new(Flags {
            done: false,
            success: false,
        }));
        let (kick, mailbox) = mpsc::channel();
        (
            Synchronizer {
                flags: flags.clone(),
                mailbox,
            },
            CompletionHandle { flags, kick },
        )
    }

    /// Block until the outcome is posted (or the poll primitive fails),
    /// returning the success flag. Consumes the synchronizer; teardown
    /// happens exactly once.
    pub fn wait(self) -> bool {
        let mut flags = self.flags.lock().unwrap();
        while !flags.done {
            drop(flags);
            // One unit of poll-work: block on the mailbox until kicked.
            let poll = self.mailbox.recv();
            flags = self.flags.lock().unwrap();
            if poll.is_err() {
                // Unrecoverable poll failure; complete instead of hanging.
                flags.done = true;
            }
        }
        flags.success
    }
}

impl CompletionHandle {
    /// Post the outcome: set the success flag, mark done under the mutex,
    /// then kick the waiter.
    pub fn post(&self, success: bool) {
        let mut flags = self.flags.lock().unwrap();
        flags.success = success;
        flags.done = true;
        let _ = self.kick.send(());
        drop(flags);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn callback_from_another_thread_completes_wait() {
        let (sync, handle) = Synchronizer::new();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            handle.post(true);
        });
        assert!(sync.wait());
    }

    #[test]
    fn failure_outcome_is_reported() {
        let (sync, handle) = Synchronizer::new();
        thread::spawn(move || handle.post(false));
        assert!(!sync.wait());
    }

    #[test]
    fn dropped_handle_unblocks_wait_as_failure() {
        let (sync, handle) = Synchronizer::new();
        thread::spawn(move || drop(handle));
        // Poll error path: loop terminates, success keeps its default.
        assert!(!sync.wait());
    }

    #[test]
    fn post_before_wait_is_observed() {
        let (sync, handle) = Synchronizer::new();
        handle.post(true);
        assert!(sync.wait());
    }
}
