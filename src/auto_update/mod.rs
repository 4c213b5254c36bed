pub mod updater;
pub mod version_manager;

pub use updater::{AutoUpdater, UpdateStatus};
