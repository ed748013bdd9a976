//! Domain model (message keys, envelopes, context, errors, events).

pub mod context;
pub mod errors;
pub mod events;
pub mod key;
pub mod message;

pub use self::context::{CancelHandle, Context, ContextError};
pub use self::errors::{BoxError, DispatchError};
pub use self::events::DispatchEvent;
pub use self::key::MessageKey;
pub use self::message::{AnyMessage, Batch, Envelope, Message};
