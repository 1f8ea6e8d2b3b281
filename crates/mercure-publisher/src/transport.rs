use std::error::Error;
use std::future::Future;
use std::sync::Arc;

/// The HTTP client used by a [`Publisher`] to deliver publish requests.
///
/// Connection pooling, redirects, TLS and timeouts are the responsibility of
/// the transport. Implementations must be safe for concurrent use, as a single
/// publisher may send several requests at once.
///
/// [`Publisher`]: crate::Publisher
pub trait Transport: Send + Sync {
    /// The error returned when a request cannot be delivered.
    type Error: Error + Send + Sync + 'static;

    /// Sends the request and resolves once the response head is received.
    fn send(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response, Self::Error>> + Send;
}

impl Transport for reqwest::Client {
    type Error = reqwest::Error;

    fn send(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response, Self::Error>> + Send {
        self.execute(request)
    }
}

impl<T> Transport for &T
where
    T: Transport + ?Sized,
{
    type Error = T::Error;

    fn send(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response, Self::Error>> + Send {
        (**self).send(request)
    }
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    type Error = T::Error;

    fn send(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response, Self::Error>> + Send {
        (**self).send(request)
    }
}
