pub mod invalidation;
pub mod mail;
pub mod prompt;
pub mod providers;
pub mod reconcile;
pub mod suggestions;
pub mod sweeper;
pub mod watchlist;

pub use invalidation::CacheInvalidator;
pub use mail::{MailSender, SmtpMailer};
pub use suggestions::{Oracle, SuggestionService, SuggestionSettings};
pub use sweeper::{AvailabilitySweeper, SweepReport, SweeperHandle};
pub use watchlist::WatchlistService;
