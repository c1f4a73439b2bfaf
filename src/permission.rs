//! Capture authorization boundary
//!
//! The host environment owns permission prompting; the controller only
//! consults this gate before starting a recording and again before
//! persisting the finished artifact.

/// Authorization gate for capture and persistence
pub trait PermissionGate: Send + Sync {
    /// Whether the capability is currently granted
    fn is_authorized(&self) -> bool;

    /// Prompt for the capability; returns the resulting grant state
    fn request(&self) -> bool;
}

/// Gate that always grants, for hosts that authorize elsewhere
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAllow;

impl PermissionGate for AlwaysAllow {
    fn is_authorized(&self) -> bool {
        true
    }

    fn request(&self) -> bool {
        true
    }
}
