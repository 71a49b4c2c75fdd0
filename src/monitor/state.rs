//! `LockState`, the Monitor's per-tick derived view (//! Design Note: "a three-variant tagged enum, not three booleans").
//!
//! Constructed only through the three named constructors below, so
//! `active_lock`'s presence is always correlated with `status`: a
//! `Confirmed` state always carries a lock, a `None`/`Pending` state
//! never does.

use crate::resolver::ValueTimeLock;
use crate::store::SavedLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    None,
    Pending,
    Confirmed,
}

#[derive(Debug, Clone)]
pub struct LockState {
    active_lock: Option<ValueTimeLock>,
    latest_saved: Option<SavedLock>,
    status: LockStatus,
}

impl LockState {
    pub fn none(latest_saved: Option<SavedLock>) -> Self {
        Self {
            active_lock: None,
            latest_saved,
            status: LockStatus::None,
        }
    }

    pub fn pending(latest_saved: SavedLock) -> Self {
        Self {
            active_lock: None,
            latest_saved: Some(latest_saved),
            status: LockStatus::Pending,
        }
    }

    pub fn confirmed(active_lock: ValueTimeLock, latest_saved: SavedLock) -> Self {
        Self {
            active_lock: Some(active_lock),
            latest_saved: Some(latest_saved),
            status: LockStatus::Confirmed,
        }
    }

    pub fn status(&self) -> LockStatus {
        self.status
    }

    pub fn active_lock(&self) -> Option<&ValueTimeLock> {
        self.active_lock.as_ref()
    }

    pub fn latest_saved(&self) -> Option<&SavedLock> {
        self.latest_saved.as_ref()
    }
}
