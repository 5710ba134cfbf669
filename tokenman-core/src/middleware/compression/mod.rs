pub mod dedup;
pub mod heartbeat;
pub mod history_window;
pub mod rules;

pub use dedup::ContentDedupMiddleware;
pub use heartbeat::HeartbeatMiddleware;
pub use history_window::HistoryWindowMiddleware;
pub use rules::RulesMiddleware;
