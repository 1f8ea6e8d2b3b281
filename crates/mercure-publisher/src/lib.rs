//! A client for publishing updates to a [Mercure] hub.
//!
//! [Mercure]: https://datatracker.ietf.org/doc/html/draft-dunglas-mercure

pub use self::message::Message;
pub use self::options::{
    OptionsError, OptionsField, OptionsViolation, OptionsViolationKind, PublisherOptions,
};
pub use self::publisher::{Cancelled, PublishError, PublishErrorKind, Publisher, HUB_PATH};
pub use self::transport::Transport;

pub mod message;
pub mod options;
pub mod publisher;
pub mod transport;
