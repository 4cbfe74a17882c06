pub mod cancellation;
pub mod config;
pub mod error;
pub mod formatting;
pub mod logging;
pub mod traits;

#[cfg(any(test, feature = "test-util"))]
pub mod test_doubles;

pub use cancellation::CancellationRegistry;
pub use config::PilotConfig;
pub use error::{PilotError, Result};
pub use traits::{Classifier, Messenger, Runner};
