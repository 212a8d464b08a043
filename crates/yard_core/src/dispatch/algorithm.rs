use crate::commands::Command;
use crate::entities::Device;
use crate::store::GlobalStore;

/// Pluggable dispatch decisions for devices that run out of work.
///
/// The engine never decides where devices go. When a device settles into
/// IDLE, a `DispatchRequest` event asks the installed algorithm for commands;
/// they go through the same validation as external commands, and rejected ones
/// are logged and dropped.
pub trait DispatchAlgorithm: Send + Sync {
    /// Commands for `device`, which has just become idle at `now`.
    fn on_device_idle(&self, device: &Device, store: &GlobalStore, now: u64) -> Vec<Command>;
}
