//! Intent dispatch: slash commands, confirmation admission, rate limiting,
//! and routing classified intent to one-shot Runner calls or the durable
//! task queue.

pub mod classify;
pub mod commands;
pub mod config;
pub mod confirmation;
pub mod dispatcher;
pub mod rate_limiter;

pub use commands::{parse_command, SlashCommand};
pub use config::DispatchConfig;
pub use confirmation::ConfirmationRegistry;
pub use dispatcher::Dispatcher;
pub use rate_limiter::{BucketConfig, RateLimiter};
