pub mod format;
pub mod telegram;

pub use telegram::Notifier;
