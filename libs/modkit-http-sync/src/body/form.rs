use super::ByteArrayBody;
use crate::error::HttpError;
use serde::Serialize;
use std::fmt;
use url::form_urlencoded::byte_serialize;

/// `Content-Type` of bodies produced by [`FormBuilder`]
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Builder for `application/x-www-form-urlencoded` bodies.
///
/// Pairs are joined with `&` in insertion order. [`add`](Self::add) appends
/// its arguments as given; [`encode`](Self::encode) percent-encodes them
/// first, with spaces written as `+`.
///
/// ```ignore
/// let body = FormBuilder::new()
///     .encode("grant_type", "client_credentials")
///     .encode("scope", "read write")
///     .build();
/// assert_eq!(body.as_bytes().as_ref(), b"grant_type=client_credentials&scope=read+write");
/// ```
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct FormBuilder {
    buffer: String,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn separator(&mut self) {
        if !self.buffer.is_empty() {
            self.buffer.push('&');
        }
    }

    /// Append a pair that is already form-encoded
    pub fn add(mut self, name: &str, value: &str) -> Self {
        self.separator();
        self.buffer.push_str(name);
        self.buffer.push('=');
        self.buffer.push_str(value);
        self
    }

    /// Append a pair, form-encoding name and value as UTF-8
    pub fn encode(mut self, name: &str, value: &str) -> Self {
        self.separator();
        self.buffer.extend(byte_serialize(name.as_bytes()));
        self.buffer.push('=');
        self.buffer.extend(byte_serialize(value.as_bytes()));
        self
    }

    /// Append every field of `fields`, serialized with `serde_urlencoded`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::FormEncode`] if `fields` is not a flat sequence of
    /// pairs or a struct of scalar fields.
    pub fn encode_all<T: Serialize + ?Sized>(mut self, fields: &T) -> Result<Self, HttpError> {
        let encoded = serde_urlencoded::to_string(fields)?;
        if !encoded.is_empty() {
            self.separator();
            self.buffer.push_str(&encoded);
        }
        Ok(self)
    }

    /// UTF-8 body carrying the pairs added so far
    #[must_use]
    pub fn build(&self) -> ByteArrayBody {
        ByteArrayBody::encode(&self.buffer).with_content_type(FORM_URLENCODED)
    }
}

impl fmt::Display for FormBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buffer)
    }
}
