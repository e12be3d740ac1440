//! Event capture buffers
//!
//! Bounded, append-only logs of raw keystroke and pointer events. Recording is
//! O(1) amortized and never fails: the host calls these from input callbacks
//! and must never be slowed down or interrupted by them.
//!
//! Memory is bounded by a high-water mark. When a buffer grows past the mark
//! it drops its oldest half. This is lossy: in a very long unflushed window the
//! dropped events are gone and extraction only sees the retained tail.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use tracing::trace;

use crate::config::DEFAULT_HIGH_WATER_MARK;
use crate::types::{PointerKind, RawKeyEvent, RawPointerEvent};

/// Append-only event log with a high-water mark
#[derive(Debug, Clone)]
pub struct EventBuffer<T> {
    events: Vec<T>,
    high_water_mark: usize,
    /// Events discarded by trimming since creation
    trimmed: u64,
}

impl<T: Clone> EventBuffer<T> {
    /// Create a buffer; marks below 2 are raised to 2
    pub fn new(high_water_mark: usize) -> Self {
        let high_water_mark = high_water_mark.max(2);
        Self {
            events: Vec::with_capacity(high_water_mark.min(256)),
            high_water_mark,
            trimmed: 0,
        }
    }

    /// Append an event, trimming to the most recent half past the mark
    pub fn push(&mut self, event: T) {
        self.events.push(event);
        if self.events.len() > self.high_water_mark {
            let keep = self.high_water_mark / 2;
            let drop = self.events.len() - keep;
            self.events.drain(..drop);
            self.trimmed += drop as u64;
            trace!(dropped = drop, kept = keep, "capture buffer trimmed");
        }
    }

    /// Owned copy of the current contents
    pub fn snapshot(&self) -> Vec<T> {
        self.events.clone()
    }

    /// Move the contents out, leaving the buffer empty
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.events)
    }

    pub fn reset(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn trimmed(&self) -> u64 {
        self.trimmed
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.events.iter()
    }
}

impl<T: Clone> Default for EventBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_WATER_MARK)
    }
}

/// Pending key-down timestamps, at most one per key identity
#[derive(Debug, Clone, Default)]
pub struct KeyDownTimestampMap {
    pending: HashMap<String, f64>,
}

impl KeyDownTimestampMap {
    /// Register a Down. Returns the timestamp of a Down it orphaned, if any.
    pub fn press(&mut self, key: &str, timestamp: f64) -> Option<f64> {
        self.pending.insert(key.to_string(), timestamp)
    }

    /// Register an Up. Returns the hold duration when a Down was pending.
    pub fn release(&mut self, key: &str, timestamp: f64) -> Option<f64> {
        let down = self.pending.remove(key)?;
        Some((timestamp - down).max(0.0))
    }

    pub fn pending(&self, key: &str) -> Option<f64> {
        self.pending.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Immutable copy of both buffers
#[derive(Debug, Clone, Default)]
pub struct CaptureSnapshot {
    pub keys: Vec<RawKeyEvent>,
    pub pointer: Vec<RawPointerEvent>,
}

impl CaptureSnapshot {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.pointer.is_empty()
    }
}

/// Keystroke and pointer buffers plus key-down correlation
#[derive(Debug, Clone)]
pub struct CaptureBuffers {
    keys: EventBuffer<RawKeyEvent>,
    pointer: EventBuffer<RawPointerEvent>,
    pending: KeyDownTimestampMap,
    /// Hold samples matched at capture time, bounded like the key buffer
    live_holds: EventBuffer<f64>,
    active: bool,
}

impl Default for CaptureBuffers {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_WATER_MARK)
    }
}

impl CaptureBuffers {
    /// Create active buffers with the given high-water mark
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            keys: EventBuffer::new(high_water_mark),
            pointer: EventBuffer::new(high_water_mark),
            pending: KeyDownTimestampMap::default(),
            live_holds: EventBuffer::new(high_water_mark),
            active: true,
        }
    }

    /// Record a key Down. Returns whether the event was accepted.
    pub fn record_key_down(&mut self, key: &str, timestamp: f64) -> bool {
        if !self.accepts(timestamp) {
            return false;
        }
        if let Some(orphan) = self.pending.press(key, timestamp) {
            trace!(key, orphan, "key down overwrote pending down");
        }
        self.keys.push(RawKeyEvent::down(key, timestamp));
        true
    }

    pub fn record_key_up(&mut self, key: &str, timestamp: f64) -> bool {
        if !self.accepts(timestamp) {
            return false;
        }
        if let Some(hold) = self.pending.release(key, timestamp) {
            self.live_holds.push(hold);
        }
        self.keys.push(RawKeyEvent::up(key, timestamp));
        true
    }

    /// Record a pointer, clipboard or visibility event.
    ///
    /// Coordinates are optional; events without them make no spatial contribution.
    pub fn record_pointer_event(
        &mut self,
        kind: PointerKind,
        x: Option<f64>,
        y: Option<f64>,
        timestamp: f64,
    ) -> bool {
        self.record_pointer(RawPointerEvent::new(kind, x, y, timestamp))
    }

    /// Record a fully-formed pointer event (e.g. a visibility change)
    pub fn record_pointer(&mut self, event: RawPointerEvent) -> bool {
        if !self.accepts(event.timestamp) {
            return false;
        }
        self.pointer.push(event);
        true
    }

    fn accepts(&self, timestamp: f64) -> bool {
        if !self.active {
            trace!("capture stopped; event ignored");
            return false;
        }
        if !timestamp.is_finite() {
            trace!(timestamp, "non-finite timestamp; event ignored");
            return false;
        }
        true
    }

    /// Copy both buffers without mutating them
    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            keys: self.keys.snapshot(),
            pointer: self.pointer.snapshot(),
        }
    }

    /// Move both buffers out and clear all capture state in one step
    pub fn take(&mut self) -> CaptureSnapshot {
        let snapshot = CaptureSnapshot {
            keys: self.keys.take(),
            pointer: self.pointer.take(),
        };
        self.pending.clear();
        self.live_holds.reset();
        snapshot
    }

    /// Clear buffers and pending key-downs
    pub fn reset(&mut self) {
        self.keys.reset();
        self.pointer.reset();
        self.pending.clear();
        self.live_holds.reset();
    }

    /// Resume accepting events
    pub fn start(&mut self) {
        self.active = true;
    }

    /// Stop accepting events and discard everything buffered
    pub fn stop(&mut self) {
        self.active = false;
        self.reset();
    }

    /// Start capture for the lifetime of the returned guard
    pub fn start_guarded(&mut self) -> CaptureGuard<'_> {
        self.start();
        CaptureGuard { buffers: self }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.pointer.is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn pointer_count(&self) -> usize {
        self.pointer.len()
    }

    pub fn pending_downs(&self) -> &KeyDownTimestampMap {
        &self.pending
    }

    /// Hold durations matched while recording (ms)
    pub fn live_holds(&self) -> Vec<f64> {
        self.live_holds.snapshot()
    }

    /// Total events dropped by the high-water mark
    pub fn trimmed(&self) -> u64 {
        self.keys.trimmed() + self.pointer.trimmed()
    }
}

/// Keeps capture running until dropped, then stops it and discards buffers
pub struct CaptureGuard<'a> {
    buffers: &'a mut CaptureBuffers,
}

impl Deref for CaptureGuard<'_> {
    type Target = CaptureBuffers;

    fn deref(&self) -> &Self::Target {
        self.buffers
    }
}

impl DerefMut for CaptureGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffers
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.buffers.stop();
    }
}
