//! Debug-only busy flag for the chained table.
//!
//! The table calls user `Hash`/`Eq` impls while it walks its chains. A
//! nested call back into the same table from those impls is a bug in the
//! caller (a migration step triggered from inside a probe would move the
//! chain being walked). In debug builds `BusyFlag::hold` panics on such a
//! nested call; in release builds it compiles away.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

#[derive(Debug)]
pub(crate) struct BusyFlag {
    #[cfg(debug_assertions)]
    held: Cell<bool>,
    // Single-threaded: keep the owning table !Send + !Sync.
    _local: PhantomData<*const ()>,
}

impl BusyFlag {
    pub(crate) const fn new() -> Self {
        BusyFlag {
            #[cfg(debug_assertions)]
            held: Cell::new(false),
            _local: PhantomData,
        }
    }

    /// Mark the table busy until the returned guard drops.
    #[inline]
    pub(crate) fn hold(&self) -> Busy<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.held.replace(true),
                "chained table re-entered from Hash/Eq while busy"
            );
        }
        Busy { flag: self }
    }
}

impl Default for BusyFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct Busy<'a> {
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    flag: &'a BusyFlag,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.flag.held.set(false);
    }
}
