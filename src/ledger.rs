//! Diagnostic tally of objects and anchors under custody.
//!
//! Every handle constructor and every destroy/release path reports here.
//! Counts are kept per thread; a thread's tally is surrendered to a global
//! ledger when the thread finishes.

#[cfg(feature = "tally")]
use std::cell::Cell;

#[cfg(feature = "tally")]
use lazy_static::lazy_static;
#[cfg(feature = "tally")]
use parking_lot::Mutex;

/// Snapshot of the ledger.
#[cfg(feature = "tally")]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats
{
    /// Objects currently under some owner's custody.
    pub live_objects: usize,
    /// Anchor records whose storage is currently allocated.
    pub live_anchors: usize,
    /// Objects ever taken into custody.
    pub total_objects: u64,
    /// Anchors ever created.
    pub total_anchors: u64,
}

#[cfg(feature = "tally")]
impl Stats
{
    fn absorb(&mut self, other: Stats)
    {
        self.live_objects += other.live_objects;
        self.live_anchors += other.live_anchors;
        self.total_objects += other.total_objects;
        self.total_anchors += other.total_anchors;
    }
}

#[cfg(feature = "tally")]
lazy_static! {
    static ref SURRENDERED: Mutex<Stats> = Mutex::new(Stats::default());
}

#[cfg(feature = "tally")]
struct LocalTally(Cell<Stats>);

#[cfg(feature = "tally")]
impl Drop for LocalTally
{
    fn drop(&mut self) { SURRENDERED.lock().absorb(self.0.get()); }
}

#[cfg(feature = "tally")]
thread_local! {
    static LOCAL: LocalTally = LocalTally(Cell::new(Stats::default()));
}

#[cfg(feature = "tally")]
fn bump(f: fn(&mut Stats))
{
    LOCAL.with(|l| {
        let mut s = l.0.get();
        f(&mut s);
        l.0.set(s);
    });
}

/// Tally of the current thread.
#[cfg(feature = "tally")]
pub fn stats() -> Stats { LOCAL.with(|l| l.0.get()) }

/// Combined tallies surrendered by threads that have finished.
#[cfg(feature = "tally")]
pub fn global_stats() -> Stats { *SURRENDERED.lock() }

pub(crate) fn register_object()
{
    #[cfg(feature = "tally")]
    bump(|s| {
        s.live_objects += 1;
        s.total_objects += 1;
    });
}

pub(crate) fn deregister_object()
{
    #[cfg(feature = "tally")]
    bump(|s| s.live_objects -= 1);
}

pub(crate) fn register_anchor()
{
    #[cfg(feature = "tally")]
    bump(|s| {
        s.live_anchors += 1;
        s.total_anchors += 1;
    });
}

pub(crate) fn deregister_anchor()
{
    #[cfg(feature = "tally")]
    bump(|s| s.live_anchors -= 1);
}
