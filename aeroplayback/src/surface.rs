//! Where decoded media ends up.
//!
//! A surface is owned by exactly one session. Engines push fragments into it;
//! the controller drives its transport (resume, seek to start, clear).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Rendering target for a playback engine.
pub trait PlaybackSurface: Send + Sync {
    /// Hands one media fragment to the surface.
    fn render(&self, sequence: u64, data: &[u8]);

    /// Resumes playback. Calling it while already playing is harmless.
    fn resume(&self);

    /// Moves the playback position back to the start of the buffer.
    fn seek_to_start(&self);

    /// Drops everything shown so far and leaves the surface blank.
    fn clear(&self);

    /// False once the surface has been removed from the wall.
    fn is_attached(&self) -> bool;
}

/// Counters collected by [`HeadlessSurface`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    pub fragments: u64,
    pub bytes: u64,
    pub last_sequence: Option<u64>,
    pub resumes: u64,
    pub rewinds: u64,
    pub clears: u64,
    pub playing: bool,
}

/// Surface that renders nothing and records what it was asked to show.
#[derive(Debug)]
pub struct HeadlessSurface {
    attached: AtomicBool,
    stats: Mutex<SurfaceStats>,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self {
            attached: AtomicBool::new(true),
            stats: Mutex::new(SurfaceStats::default()),
        }
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
            .lock()
            .expect("Surface stats mutex poisoned")
            .clone()
    }

    /// Marks the surface as removed; engines can no longer attach to it.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    fn update(&self, f: impl FnOnce(&mut SurfaceStats)) {
        let mut stats = self.stats.lock().expect("Surface stats mutex poisoned");
        f(&mut stats);
    }
}

impl PlaybackSurface for HeadlessSurface {
    fn render(&self, sequence: u64, data: &[u8]) {
        self.update(|s| {
            s.fragments += 1;
            s.bytes += data.len() as u64;
            s.last_sequence = Some(sequence);
        });
    }

    fn resume(&self) {
        self.update(|s| {
            s.resumes += 1;
            s.playing = true;
        });
    }

    fn seek_to_start(&self) {
        self.update(|s| s.rewinds += 1);
    }

    fn clear(&self) {
        self.update(|s| {
            s.clears += 1;
            s.playing = false;
            s.last_sequence = None;
        });
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_surface_records_activity() {
        let surface = HeadlessSurface::new();
        assert!(surface.is_attached());

        surface.render(7, &[0u8; 188]);
        surface.render(8, &[0u8; 376]);
        surface.resume();
        surface.seek_to_start();

        let stats = surface.stats();
        assert_eq!(stats.fragments, 2);
        assert_eq!(stats.bytes, 564);
        assert_eq!(stats.last_sequence, Some(8));
        assert_eq!(stats.resumes, 1);
        assert_eq!(stats.rewinds, 1);
        assert!(stats.playing);

        surface.clear();
        surface.detach();
        let stats = surface.stats();
        assert!(!stats.playing);
        assert_eq!(stats.last_sequence, None);
        assert!(!surface.is_attached());
    }
}
