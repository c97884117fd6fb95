pub mod config;
pub mod error;
pub mod html;
pub mod logging;
pub mod paginate;
pub mod persist;
pub mod record;
pub mod retry;
pub mod session;
pub mod site;
pub mod stats;
pub mod text;

pub use config::{DelayWindow, RequestOverrides, RetryPolicy, SessionConfig};
pub use error::{ConfigError, Error, FetchError, ParseError, PersistError};
pub use paginate::{Paginator, paginate};
pub use record::Record;
pub use session::{FetchRequest, Page, Session};
pub use stats::RequestStats;
