pub mod alert_throttler;
pub mod history;

pub use alert_throttler::{AlertMessage, AlertSink, AlertThrottler, LogSink, TelegramSink};
pub use history::HistoryManager;
