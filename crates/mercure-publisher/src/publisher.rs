use std::error::Error;
use std::fmt;
use std::future::Future;

use reqwest::header::{self, HeaderValue};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret as _;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::message::Message;
use crate::options::{
    bearer, OptionsError, OptionsField, OptionsViolation, OptionsViolationKind, PublisherOptions,
};
use crate::transport::Transport;

/// [The Mercure Protocol, Section 2](https://datatracker.ietf.org/doc/html/draft-dunglas-mercure#section-2)
///
/// > The URL of the hub MUST be the "well-known" [[RFC5785]] fixed path
/// > "/.well-known/mercure".
///
/// [RFC5785]: https://datatracker.ietf.org/doc/html/rfc5785
pub const HUB_PATH: &str = "/.well-known/mercure";

/// Publishes updates to a Mercure hub.
///
/// The publisher holds no per-call state and may be shared between tasks.
#[derive(Clone, Debug)]
pub struct Publisher<T = reqwest::Client> {
    transport: T,
    hub_url: Url,
    authorization: HeaderValue,
}

/// An error returned from [`Publisher::publish`].
///
/// Hub rejections carry no source. For every other failure, the underlying
/// cause is available from [`Error::source`]: a transport error, [`Cancelled`],
/// or a serialization error.
#[derive(Debug)]
#[non_exhaustive]
pub struct PublishError {
    kind: PublishErrorKind,
    inner: Option<Box<dyn Error + Send + Sync + 'static>>,
}

/// The various types of errors that can cause [`Publisher::publish`] to fail.
#[derive(Debug)]
#[non_exhaustive]
pub enum PublishErrorKind {
    /// Failed to serialize the payload to JSON.
    SerializePayload,
    /// Failed to serialize parameters to application/x-www-form-urlencoded.
    SerializeParameters,
    /// Failed to send publish request to Mercure hub.
    SendRequest,
    /// The publish was cancelled before the Mercure hub replied.
    Cancelled,
    /// Failed to read the error response from Mercure hub.
    ReadResponse,
    /// The Mercure hub replied with a non-successful status.
    Rejected { status: StatusCode, content: String },
}

/// The error used as the source of a [`PublishError`] when the publish was
/// cancelled.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
#[non_exhaustive]
pub struct Cancelled;

#[derive(Debug, Serialize)]
struct PublishParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    topic: &'a str,
    data: &'a str,
}

impl Publisher<reqwest::Client> {
    /// Constructs a new `Publisher` sending requests with a default
    /// [`reqwest::Client`].
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError`] if the options are not valid.
    pub fn from_options(options: &PublisherOptions) -> Result<Self, OptionsError> {
        Self::new(options, reqwest::Client::new())
    }
}

impl<T> Publisher<T>
where
    T: Transport,
{
    /// Constructs a new `Publisher`.
    ///
    /// The options are validated, then the hub URL and credentials are
    /// captured.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError`] with every violation found if the options are
    /// not valid.
    ///
    /// # Example
    ///
    /// ```
    /// # use std::error::Error;
    /// #
    /// use mercure_publisher::{Publisher, PublisherOptions};
    ///
    /// # fn main() -> Result<(), Box<dyn Error>> {
    /// let options = PublisherOptions::new("https://localhost", "publisher-jwt");
    /// let publisher = Publisher::new(&options, reqwest::Client::new())?;
    /// assert_eq!(
    ///     publisher.hub_url().as_str(),
    ///     "https://localhost/.well-known/mercure"
    /// );
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(options: &PublisherOptions, transport: T) -> Result<Self, OptionsError> {
        let violations = options.validate();
        if !violations.is_empty() {
            return Err(OptionsError::new(violations));
        }

        let hub_url = format!("{host}{HUB_PATH}", host = options.host())
            .parse::<Url>()
            .map_err(|_| {
                OptionsError::new(vec![OptionsViolation::new(
                    OptionsField::Host,
                    OptionsViolationKind::InvalidUrl,
                )])
            })?;
        let mut authorization = HeaderValue::from_str(&bearer(options.token().expose_secret()))
            .map_err(|_| {
                OptionsError::new(vec![OptionsViolation::new(
                    OptionsField::Token,
                    OptionsViolationKind::InvalidHeaderValue,
                )])
            })?;
        authorization.set_sensitive(true);

        Ok(Self {
            transport,
            hub_url,
            authorization,
        })
    }

    /// Publishes an update to the Mercure hub.
    ///
    /// [The Mercure Protocol, Section 5](https://datatracker.ietf.org/doc/html/draft-dunglas-mercure#section-5)
    ///
    /// Exactly one POST request is sent. Passing `None` for `cancel` means the
    /// publish is never cancelled. A token which is already cancelled does not
    /// prevent the request from being built and handed to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the hub replies with a non-2xx status, if
    /// the request cannot be delivered, or if `cancel` is cancelled before the
    /// hub replies.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use std::error::Error;
    /// #
    /// use mercure_publisher::{Message, Publisher, PublisherOptions};
    /// use serde::Serialize;
    ///
    /// #[derive(Serialize)]
    /// struct BookUpdated {
    ///     isbn: &'static str,
    /// }
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn Error>> {
    /// # let options = PublisherOptions::new("https://localhost", "publisher-jwt");
    /// let publisher = Publisher::from_options(&options)?;
    /// let message = Message::new("https://example.com/books/1", BookUpdated {
    ///     isbn: "9780735218789",
    /// });
    ///
    /// publisher.publish(&message, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn publish<P>(
        &self,
        message: &Message<P>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), PublishError>
    where
        P: Serialize,
    {
        let data = serde_json::to_string(message.payload())
            .map_err(|err| PublishError::wrap(PublishErrorKind::SerializePayload, err))?;
        let params = PublishParams {
            id: message.id(),
            topic: message.topic(),
            data: &data,
        };
        let body = serde_html_form::to_string(params)
            .map_err(|err| PublishError::wrap(PublishErrorKind::SerializeParameters, err))?;

        let mut request = reqwest::Request::new(Method::POST, self.hub_url.clone());
        let headers = request.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(header::AUTHORIZATION, self.authorization.clone());
        *request.body_mut() = Some(body.into());

        info!(
            topic = message.topic(),
            id = message.id(),
            "Sending message to Mercure"
        );

        let res = until_cancelled(cancel, self.transport.send(request))
            .await?
            .map_err(|err| PublishError::wrap(PublishErrorKind::SendRequest, err))?;

        let status = res.status();
        if status.is_success() {
            debug!(body = %data, "Sent to Mercure");
            return Ok(());
        }

        let content = until_cancelled(cancel, res.text())
            .await?
            .map_err(|err| PublishError::wrap(PublishErrorKind::ReadResponse, err))?;
        Err(PublishError {
            kind: PublishErrorKind::Rejected { status, content },
            inner: None,
        })
    }

    /// Returns the URL publish requests are sent to.
    pub fn hub_url(&self) -> &Url {
        &self.hub_url
    }
}

/// Resolves `fut`, unless `cancel` is cancelled first.
///
/// Cancellation is polled first, so an already-cancelled token always wins.
async fn until_cancelled<F>(
    cancel: Option<&CancellationToken>,
    fut: F,
) -> Result<F::Output, PublishError>
where
    F: Future,
{
    let Some(cancel) = cancel else {
        return Ok(fut.await);
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PublishError::wrap(PublishErrorKind::Cancelled, Cancelled)),
        output = fut => Ok(output),
    }
}

impl PublishError {
    /// Wraps `err` as the source of a new `PublishError`, unless it already is
    /// a `PublishError`, in which case it is returned as is.
    fn wrap<E>(kind: PublishErrorKind, err: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        let inner: Box<dyn Error + Send + Sync + 'static> = err.into();
        match inner.downcast::<Self>() {
            Ok(err) => *err,
            Err(inner) => Self {
                kind,
                inner: Some(inner),
            },
        }
    }

    /// Returns the corresponding [`PublishErrorKind`] for this error.
    #[must_use]
    pub const fn kind(&self) -> &PublishErrorKind {
        &self.kind
    }

    /// Returns the status the Mercure hub replied with, if the update was
    /// rejected.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match &self.kind {
            PublishErrorKind::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if the publish failed because it was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner
            .as_deref()
            .is_some_and(|err| err.downcast_ref::<Cancelled>().is_some())
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.inner) {
            (PublishErrorKind::Rejected { status, content }, _) => {
                write!(
                    f,
                    "Failed to send to Mercure. Status: {status}, Content: {content}"
                )
            },
            (_, Some(err)) => write!(f, "Failed to send to Mercure: {err}"),
            (_, None) => write!(f, "Failed to send to Mercure"),
        }
    }
}

impl Error for PublishError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the operation was cancelled")
    }
}

impl Error for Cancelled {}
