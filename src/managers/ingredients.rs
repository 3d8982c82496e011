//! Process-lifetime accumulator for detected ingredient names.
//!
//! Names are deduplicated case-insensitively after trimming, insertion order
//! is preserved, and the display form is whatever casing was seen first.
//! Listeners receive full snapshots on one dedicated notifier thread, so
//! callers never need their own synchronization.

use log::debug;
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread;

pub type IngredientListener = Box<dyn Fn(&[String]) + Send + 'static>;

enum NotifierMsg {
    Register {
        listener: IngredientListener,
        snapshot: Vec<String>,
    },
    Changed(Vec<String>),
}

pub struct IngredientAccumulator {
    /// (normalized key, display form) pairs in insertion order. One lock
    /// covers every read-modify-write, which makes add/add_all linearizable
    /// and keeps snapshots free of torn reads.
    entries: Mutex<Vec<(String, String)>>,
    notify_tx: Sender<NotifierMsg>,
}

impl IngredientAccumulator {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = mpsc::channel::<NotifierMsg>();

        // All listener callbacks run here, in registration order. The thread
        // exits when the accumulator (and with it the sender) is dropped.
        thread::spawn(move || {
            let mut listeners: Vec<IngredientListener> = Vec::new();
            while let Ok(msg) = notify_rx.recv() {
                match msg {
                    NotifierMsg::Register { listener, snapshot } => {
                        listener(&snapshot);
                        listeners.push(listener);
                    }
                    NotifierMsg::Changed(snapshot) => {
                        for listener in &listeners {
                            listener(&snapshot);
                        }
                    }
                }
            }
        });

        Self {
            entries: Mutex::new(Vec::new()),
            notify_tx,
        }
    }

    /// Insert a single name. Returns whether a new entry was added.
    pub fn add(&self, name: &str) -> bool {
        self.add_all(std::iter::once(name.to_string()))
    }

    /// Insert a batch of names with a single change notification.
    /// Returns whether any new entry was added.
    pub fn add_all<I>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let mut entries = self.entries.lock().unwrap();
        let mut changed = false;
        for name in names {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                continue;
            }
            let key = trimmed.to_lowercase();
            if !entries.iter().any(|(k, _)| *k == key) {
                entries.push((key, trimmed.to_string()));
                changed = true;
            }
        }
        if changed {
            // Send while holding the lock so notification order matches
            // mutation order across threads.
            let snapshot = snapshot_of(&entries);
            debug!("ingredients now: {:?}", snapshot);
            let _ = self.notify_tx.send(NotifierMsg::Changed(snapshot));
        }
        changed
    }

    /// Point-in-time copy of the display forms, in insertion order.
    pub fn snapshot(&self) -> Vec<String> {
        snapshot_of(&self.entries.lock().unwrap())
    }

    /// Empty the set. Always notifies, even when already empty; callers rely
    /// on the notification for explicit resets.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
        let _ = self.notify_tx.send(NotifierMsg::Changed(Vec::new()));
    }

    /// Register a listener. It immediately receives a catch-up snapshot on
    /// the notifier thread, then every subsequent change.
    pub fn register(&self, listener: IngredientListener) {
        let entries = self.entries.lock().unwrap();
        let _ = self.notify_tx.send(NotifierMsg::Register {
            listener,
            snapshot: snapshot_of(&entries),
        });
    }
}

impl Default for IngredientAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_of(entries: &[(String, String)]) -> Vec<String> {
    entries.iter().map(|(_, display)| display.clone()).collect()
}
