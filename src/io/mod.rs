pub mod audio;
pub mod dispatch;
pub mod events;
pub mod gpio;
pub mod serial;
pub mod vision;
pub mod watcher;
