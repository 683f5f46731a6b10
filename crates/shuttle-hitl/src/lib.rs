//! Human-in-the-loop coordination (C10): a durable request store, an
//! out-of-band notifier, and the `contact_human` tool that ties them
//! together for the executor.

pub mod model;
pub mod notifier;
pub mod store;
pub mod tool;

pub use model::{HumanRequest, Priority, RequestStatus, RequestType};
pub use notifier::{NoopNotifier, Notifier, WebhookNotifier};
pub use store::{HumanRequestStore, InMemoryHumanRequestStore, SqliteHumanRequestStore};
pub use tool::{Clock, ContactHumanTool, SystemClock};
