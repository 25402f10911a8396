//! Playback queue
//!
//! Ordered pending entries plus a single looping slot, guarded by one internal
//! mutex that is independent of the player's state lock.
//!
//! **Preloading:** at most one entry has a decoder spawned ahead of time: the
//! looping slot while loop mode is on, otherwise the head of the queue.
//! Preloads run on a background task and only attach their decoder if the
//! entry they were started for is still the preload target; otherwise the
//! decoder is disposed.
//!
//! Indices are zero-based from the head. The HTTP layer converts from the
//! 1-based numbering users see.

use crate::audio::StreamLoader;
use crate::error::{Error, Result};
use crate::playback::entry::{EntryInfo, QueueEntry};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use voxjuke_common::events::PlayerEvent;
use voxjuke_common::time;

use crate::state::EventBus;

#[derive(Default)]
struct QueueInner {
    entries: VecDeque<QueueEntry>,
    looping: Option<QueueEntry>,
    /// Entry a background preload is currently running for
    preloading: Option<Uuid>,
}

impl QueueInner {
    /// Entry that should carry the preloaded decoder
    fn preload_target_mut(&mut self) -> Option<&mut QueueEntry> {
        match self.looping {
            Some(ref mut slot) => Some(slot),
            None => self.entries.front_mut(),
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.entries.len(),
            })
        }
    }
}

/// Per-guild queue of pending entries
///
/// Cloning shares the same queue.
#[derive(Clone)]
pub struct PlaybackQueue {
    guild_id: u64,
    inner: Arc<Mutex<QueueInner>>,
    loader: StreamLoader,
    events: EventBus,
}

impl PlaybackQueue {
    pub fn new(guild_id: u64, loader: StreamLoader, events: EventBus) -> Self {
        Self {
            guild_id,
            inner: Arc::new(Mutex::new(QueueInner::default())),
            loader,
            events,
        }
    }

    /// Append an entry, returning the new queue length
    pub async fn enqueue(&self, entry: QueueEntry) -> usize {
        let mut inner = self.inner.lock().await;
        debug!(guild = self.guild_id, media_id = %entry.track.media_id, "Enqueue");
        inner.entries.push_back(entry);
        self.schedule_preload(&mut inner);
        let len = inner.entries.len();
        drop(inner);

        self.notify_changed(len);
        len
    }

    /// Pop the next entry to play
    ///
    /// In loop mode this returns the looping slot and refills it with a fresh
    /// copy of the same media, so looping never ends on its own.
    pub async fn try_dequeue(&self) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().await;

        if let Some(slot) = inner.looping.take() {
            inner.looping = Some(slot.fresh_copy());
            self.schedule_preload(&mut inner);
            return Some(slot);
        }

        let entry = inner.entries.pop_front()?;
        self.schedule_preload(&mut inner);
        let len = inner.entries.len();
        drop(inner);

        self.notify_changed(len);
        Some(entry)
    }

    /// True if [`try_dequeue`](Self::try_dequeue) would return an entry
    pub async fn has_next(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.looping.is_some() || !inner.entries.is_empty()
    }

    /// Remove the entry at `index`
    pub async fn remove(&self, index: usize) -> Result<EntryInfo> {
        let mut inner = self.inner.lock().await;
        inner.check_index(index)?;

        let mut removed = inner
            .entries
            .remove(index)
            .ok_or(Error::IndexOutOfRange { index, len: 0 })?;
        removed.dispose_decoder();
        let info = removed.info();

        self.schedule_preload(&mut inner);
        let len = inner.entries.len();
        drop(inner);

        self.notify_changed(len);
        Ok(info)
    }

    /// Exchange the entries at `a` and `b`; equal indices are a no-op
    pub async fn swap(&self, a: usize, b: usize) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_index(a)?;
        inner.check_index(b)?;
        if a == b {
            return Ok(());
        }

        inner.entries.swap(a, b);

        // The old head moved away from the front; its decoder goes with it
        if a == 0 || b == 0 {
            let moved = if a == 0 { b } else { a };
            if let Some(entry) = inner.entries.get_mut(moved) {
                entry.dispose_decoder();
            }
            self.schedule_preload(&mut inner);
        }
        let len = inner.entries.len();
        drop(inner);

        self.notify_changed(len);
        Ok(())
    }

    /// Drop every entry before `index` ("skip to"), returning how many were removed
    ///
    /// An index at or beyond the queue length clears the whole queue.
    pub async fn truncate_before(&self, index: usize) -> usize {
        let mut inner = self.inner.lock().await;
        let count = index.min(inner.entries.len());
        if count == 0 {
            return 0;
        }

        for entry in inner.entries.drain(..count) {
            entry.dispose();
        }
        self.schedule_preload(&mut inner);
        let len = inner.entries.len();
        drop(inner);

        self.notify_changed(len);
        count
    }

    /// Remove all pending entries; the looping slot is left alone
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.entries.len();
        for entry in inner.entries.drain(..) {
            entry.dispose();
        }
        drop(inner);

        if count > 0 {
            self.notify_changed(0);
        }
        count
    }

    /// Ordered snapshot of pending entries
    pub async fn snapshot(&self) -> Vec<EntryInfo> {
        let inner = self.inner.lock().await;
        inner.entries.iter().map(QueueEntry::info).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    pub async fn is_looping(&self) -> bool {
        self.inner.lock().await.looping.is_some()
    }

    /// Loop `entry` until [`disable_loop`](Self::disable_loop)
    ///
    /// Suspends head preloading: the head's decoder is disposed and the
    /// looping slot is preloaded instead.
    pub async fn enable_loop(&self, entry: QueueEntry) {
        let mut inner = self.inner.lock().await;
        if let Some(head) = inner.entries.front_mut() {
            head.dispose_decoder();
        }
        if let Some(old) = inner.looping.replace(entry) {
            old.dispose();
        }
        self.schedule_preload(&mut inner);
    }

    /// Leave loop mode and resume preloading the head
    pub async fn disable_loop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(slot) = inner.looping.take() {
            slot.dispose();
        }
        self.schedule_preload(&mut inner);
    }

    /// Start a background preload for the current target if it has no decoder
    fn schedule_preload(&self, inner: &mut QueueInner) {
        let (entry_id, track) = match inner.preload_target_mut() {
            Some(target) if !target.is_preloaded() => (target.entry_id, target.track.clone()),
            _ => return,
        };
        if inner.preloading == Some(entry_id) {
            return;
        }
        inner.preloading = Some(entry_id);

        let queue = Arc::clone(&self.inner);
        let loader = self.loader.clone();
        let guild_id = self.guild_id;

        tokio::spawn(async move {
            let decoder = loader.load(&track, Duration::ZERO).await;

            let mut inner = queue.lock().await;
            if inner.preloading == Some(entry_id) {
                inner.preloading = None;
            }

            let Some(decoder) = decoder else {
                warn!(guild = guild_id, media_id = %track.media_id, "Preload failed");
                return;
            };

            match inner.preload_target_mut() {
                Some(target) if target.entry_id == entry_id && !target.is_preloaded() => {
                    debug!(guild = guild_id, media_id = %track.media_id, "Preloaded");
                    target.attach_decoder(decoder);
                }
                // Target moved on while the decoder was starting
                _ => decoder.dispose(),
            }
        });
    }

    fn notify_changed(&self, length: usize) {
        self.events.broadcast_event(PlayerEvent::QueueChanged {
            guild_id: self.guild_id,
            length,
            timestamp: time::now(),
        });
    }
}
