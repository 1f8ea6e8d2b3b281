use serde::Serialize;

/// An update to publish to the Mercure hub.
///
/// [The Mercure Protocol, Section 5](https://datatracker.ietf.org/doc/html/draft-dunglas-mercure#section-5)
///
/// The payload is serialized to JSON by its concrete type `P`, so every field
/// declared on `P` ends up in the `data` of the update.
///
/// # Example
///
/// ```
/// use mercure_publisher::Message;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct BookUpdated {
///     isbn: String,
/// }
///
/// let message = Message::new("https://example.com/books/1", BookUpdated {
///     isbn: "9780735218789".to_owned(),
/// })
/// .with_id("urn:uuid:1b1d8a3b-0f0e-4c1e-9a55-3f1c0bde7c21");
/// assert_eq!(message.id(), Some("urn:uuid:1b1d8a3b-0f0e-4c1e-9a55-3f1c0bde7c21"));
/// ```
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Message<P> {
    topic: String,
    id: Option<String>,
    payload: P,
}

impl<P> Message<P>
where
    P: Serialize,
{
    /// Constructs a new `Message` without an id.
    ///
    /// The topic should be non-empty; it is typically an IRI.
    pub fn new(topic: impl Into<String>, payload: P) -> Self {
        Self {
            topic: topic.into(),
            id: None,
            payload,
        }
    }

    /// Sets the id of the update.
    ///
    /// [The Mercure Protocol, Section 5](https://datatracker.ietf.org/doc/html/draft-dunglas-mercure#section-5)
    ///
    /// > The provided id MUST NOT start with the # character.
    ///
    /// An empty id is still sent; leave the id unset to omit it.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets or clears the id of the update.
    pub fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }
}

impl<P> Message<P> {
    /// Returns the topic the update is published to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the id of the update, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the payload of the update.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Consumes the message, returning its payload.
    pub fn into_payload(self) -> P {
        self.payload
    }
}
