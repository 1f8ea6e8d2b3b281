use std::error::Error;
use std::fmt;

use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Deserializer};
use url::Url;

/// The configuration a [`Publisher`] is built from.
///
/// The options are expected to be validated once, when the publisher is
/// constructed. The publisher keeps a snapshot of the values, so later changes
/// to the options are not observed.
///
/// [`Publisher`]: crate::Publisher
///
/// # Example
///
/// ```
/// use mercure_publisher::PublisherOptions;
///
/// let options = PublisherOptions::new("https://mercure.example.com", "publisher-jwt");
/// assert!(options.validate().is_empty());
/// ```
#[derive(Debug, Deserialize)]
pub struct PublisherOptions {
    /// The base URL of the Mercure hub, e.g. `https://mercure.example.com`.
    ///
    /// `/.well-known/mercure` is appended to it verbatim, so a trailing slash
    /// results in a doubled slash in the hub URL.
    #[serde(rename = "Host", alias = "host")]
    host: String,
    /// The bearer token presented to the hub, typically a JWT with a
    /// `mercure.publish` claim.
    #[serde(rename = "Token", alias = "token", deserialize_with = "deserialize_token")]
    token: SecretString,
}

/// An invariant of [`PublisherOptions`] that does not hold.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct OptionsViolation {
    field: OptionsField,
    kind: OptionsViolationKind,
}

/// The field of [`PublisherOptions`] an [`OptionsViolation`] refers to.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum OptionsField {
    Host,
    Token,
}

/// The various invariants that [`PublisherOptions`] must satisfy.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[non_exhaustive]
pub enum OptionsViolationKind {
    /// The value is empty or consists only of whitespace.
    Empty,
    /// The value is not an absolute `http` or `https` URL with a host.
    InvalidUrl,
    /// The value cannot be sent in an HTTP header.
    InvalidHeaderValue,
}

/// The error returned when a [`Publisher`] is constructed from invalid
/// [`PublisherOptions`].
///
/// [`Publisher`]: crate::Publisher
#[derive(Debug)]
#[non_exhaustive]
pub struct OptionsError {
    violations: Vec<OptionsViolation>,
}

impl PublisherOptions {
    /// Constructs a new `PublisherOptions`.
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: SecretString::from(token.into()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Checks every invariant and returns the ones that do not hold.
    ///
    /// All fields are checked; an empty result means the options are valid.
    pub fn validate(&self) -> Vec<OptionsViolation> {
        let host = validate_host(&self.host).map(|kind| OptionsViolation {
            field: OptionsField::Host,
            kind,
        });
        let token = validate_token(self.token.expose_secret()).map(|kind| OptionsViolation {
            field: OptionsField::Token,
            kind,
        });

        host.into_iter().chain(token).collect()
    }
}

fn validate_host(host: &str) -> Option<OptionsViolationKind> {
    if host.trim().is_empty() {
        return Some(OptionsViolationKind::Empty);
    }

    // `Url` is lenient with special schemes (e.g. it accepts `http:/example.com`),
    // so the scheme and authority separator are checked on the raw string.
    let has_http_prefix = ["http://", "https://"].iter().any(|prefix| {
        host.get(..prefix.len())
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case(prefix))
    });
    // The hub path is appended verbatim, so it must not land in a query or fragment.
    match Url::parse(host) {
        Ok(url)
            if has_http_prefix
                && url.has_host()
                && url.query().is_none()
                && url.fragment().is_none() =>
        {
            None
        },
        _ => Some(OptionsViolationKind::InvalidUrl),
    }
}

fn validate_token(token: &str) -> Option<OptionsViolationKind> {
    if token.trim().is_empty() {
        return Some(OptionsViolationKind::Empty);
    }

    if HeaderValue::from_str(&bearer(token)).is_err() {
        return Some(OptionsViolationKind::InvalidHeaderValue);
    }

    None
}

pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn deserialize_token<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl OptionsViolation {
    pub(crate) const fn new(field: OptionsField, kind: OptionsViolationKind) -> Self {
        Self { field, kind }
    }

    /// Returns the field which failed validation.
    #[must_use]
    pub const fn field(&self) -> OptionsField {
        self.field
    }

    /// Returns the corresponding [`OptionsViolationKind`] for this violation.
    #[must_use]
    pub const fn kind(&self) -> OptionsViolationKind {
        self.kind
    }
}

impl fmt::Display for OptionsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.field;
        match self.kind {
            OptionsViolationKind::Empty => write!(f, "{field} must not be empty"),
            OptionsViolationKind::InvalidUrl => {
                write!(f, "{field} must be an absolute http or https URL")
            },
            OptionsViolationKind::InvalidHeaderValue => {
                write!(f, "{field} must be a valid HTTP header value")
            },
        }
    }
}

impl fmt::Display for OptionsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "Host"),
            Self::Token => write!(f, "Token"),
        }
    }
}

impl OptionsError {
    pub(crate) fn new(violations: Vec<OptionsViolation>) -> Self {
        Self { violations }
    }

    /// Returns every [`OptionsViolation`] found.
    #[must_use]
    pub fn violations(&self) -> &[OptionsViolation] {
        &self.violations
    }
}

impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid Mercure publisher options")?;
        for (i, violation) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{violation}")?;
        }
        Ok(())
    }
}

impl Error for OptionsError {}
