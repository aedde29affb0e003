//! Host device capabilities consulted before notification-driven fetches.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Answers whether protected data (the health store) is readable right now.
#[async_trait]
pub trait DeviceState: Send + Sync {
    /// Returns false while the device is locked.
    async fn is_protected_data_available(&self) -> bool;
}

/// Device state for hosts without data protection.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAvailable;

#[async_trait]
impl DeviceState for AlwaysAvailable {
    async fn is_protected_data_available(&self) -> bool {
        true
    }
}

/// Device state driven by the host's lock/unlock events.
#[derive(Debug)]
pub struct ProtectedDataFlag {
    available: AtomicBool,
}

impl ProtectedDataFlag {
    #[must_use]
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    /// Records a lock (`false`) or unlock (`true`) transition.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for ProtectedDataFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl DeviceState for ProtectedDataFlag {
    async fn is_protected_data_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
