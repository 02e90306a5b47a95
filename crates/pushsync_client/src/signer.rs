//! Canonical request signing.
//!
//! The signature covers the method, the URL without its query string or
//! port, and every parameter (query string and body alike):
//!
//! ```text
//! METHOD & enc(scheme://host/path) & enc(n1=v1) %26 enc(n2=v2) ... &
//! ```
//!
//! where each name and value is percent-encoded before the pairs are sorted
//! and joined. The base string is signed with HMAC-SHA1 keyed by the client
//! secret and sent base64 then percent-encoded.

use crate::error::{ClientError, ClientResult};
use crate::query::parse_query;
use crate::request::HttpMethod;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the request signature.
pub const AUTHORIZATION_HEADER: &str = "X-WonderPush-Authorization";

/// RFC 3986 percent-encoding: only `A-Z a-z 0-9 - . _ ~` stay as is, and
/// escapes use uppercase hex.
#[must_use]
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Signs requests with the client secret.
#[derive(Clone)]
pub struct RequestSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Creates a signer for the given client secret.
    pub fn new(client_secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: client_secret.as_ref().to_vec(),
        }
    }

    /// Builds the canonical string that gets signed.
    ///
    /// Parameters already present in `url`'s query string are included
    /// alongside `params`. The order of `params` does not matter.
    #[must_use]
    pub fn base_string(method: HttpMethod, url: &Url, params: &[(String, String)]) -> String {
        let mut out = String::from(method.as_str());
        out.push('&');
        out.push_str(&percent_encode(&format!(
            "{}://{}{}",
            url.scheme(),
            url.host_str().unwrap_or_default(),
            url.path()
        )));
        out.push('&');

        let mut encoded: Vec<(String, String)> = url
            .query()
            .map(parse_query)
            .unwrap_or_default()
            .iter()
            .chain(params)
            .map(|(name, value)| (percent_encode(name), percent_encode(value)))
            .collect();
        encoded.sort();

        let joined = encoded
            .iter()
            .map(|(name, value)| percent_encode(&format!("{name}={value}")))
            .collect::<Vec<_>>()
            .join("%26");
        out.push_str(&joined);

        // Reserved for a body hash, always empty for form bodies.
        out.push('&');
        out
    }

    /// Signs a base string and returns the encoded signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the HMAC cannot be keyed.
    pub fn sign(&self, base_string: &str) -> ClientResult<String> {
        let mut mac = HmacSha1::new_from_slice(&self.secret)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid client secret: {e}")))?;
        mac.update(base_string.as_bytes());
        let digest = mac.finalize().into_bytes();
        Ok(percent_encode(&STANDARD.encode(digest)))
    }

    /// Computes the value of the [`AUTHORIZATION_HEADER`] header.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn authorization_header(
        &self,
        method: HttpMethod,
        url: &Url,
        params: &[(String, String)],
    ) -> ClientResult<String> {
        let signature = self.sign(&Self::base_string(method, url, params))?;
        Ok(format!("WonderPush sig=\"{signature}\", meth=\"0\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn percent_encoding_variant() {
        assert_eq!(percent_encode("a b*c~d-e_f.g"), "a%20b%2Ac~d-e_f.g");
        assert_eq!(percent_encode("é/="), "%C3%A9%2F%3D");
    }

    #[test]
    fn base_string_sorts_and_double_encodes() {
        let base = RequestSigner::base_string(
            HttpMethod::Post,
            &url("https://api.wonderpush.com/v1/installation"),
            &pairs(&[("z", "1"), ("a", "2")]),
        );
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.wonderpush.com%2Fv1%2Finstallation&a%3D2%26z%3D1&"
        );
    }

    #[test]
    fn base_string_includes_query_and_drops_port() {
        let base = RequestSigner::base_string(
            HttpMethod::Get,
            &url("https://api.wonderpush.com:443/v1/events?q=1"),
            &pairs(&[("x", "a b"), ("accessToken", "tok*~"), ("sdkVersion", "Rust-0.4.0")]),
        );
        assert_eq!(
            base,
            "GET&https%3A%2F%2Fapi.wonderpush.com%2Fv1%2Fevents&accessToken%3Dtok%252A~%26q%3D1%26sdkVersion%3DRust-0.4.0%26x%3Da%2520b&"
        );
    }

    #[test]
    fn base_string_without_parameters() {
        let base = RequestSigner::base_string(
            HttpMethod::Delete,
            &url("http://localhost:8080/v1/installation"),
            &[],
        );
        assert_eq!(base, "DELETE&http%3A%2F%2Flocalhost%2Fv1%2Finstallation&&");
    }

    #[test]
    fn known_signatures() {
        let signer = RequestSigner::new("secret");
        let header = signer
            .authorization_header(
                HttpMethod::Post,
                &url("https://api.wonderpush.com/v1/installation"),
                &pairs(&[("z", "1"), ("a", "2")]),
            )
            .unwrap();
        assert_eq!(
            header,
            "WonderPush sig=\"eQmiDGKi5MjnmjmwTrU9Kc8rJYE%3D\", meth=\"0\""
        );

        let other = RequestSigner::new("s3cr3t");
        let base = RequestSigner::base_string(
            HttpMethod::Get,
            &url("https://api.wonderpush.com/v1/events?q=1"),
            &pairs(&[("x", "a b"), ("accessToken", "tok*~"), ("sdkVersion", "Rust-0.4.0")]),
        );
        assert_eq!(other.sign(&base).unwrap(), "k%2FkiD6zKabp1fr5FJ05M9TIAhK8%3D");
    }

    #[test]
    fn signature_ignores_parameter_order() {
        let signer = RequestSigner::new("secret");
        let target = url("https://api.wonderpush.com/v1/installation");
        let a = signer
            .authorization_header(HttpMethod::Post, &target, &pairs(&[("z", "1"), ("a", "2")]))
            .unwrap();
        let b = signer
            .authorization_header(HttpMethod::Post, &target, &pairs(&[("a", "2"), ("z", "1")]))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn signature_depends_on_secret_and_method() {
        let target = url("https://api.wonderpush.com/v1/installation");
        let params = pairs(&[("a", "1")]);
        let one = RequestSigner::new("one")
            .authorization_header(HttpMethod::Post, &target, &params)
            .unwrap();
        let two = RequestSigner::new("two")
            .authorization_header(HttpMethod::Post, &target, &params)
            .unwrap();
        let put = RequestSigner::new("one")
            .authorization_header(HttpMethod::Put, &target, &params)
            .unwrap();
        assert_ne!(one, two);
        assert_ne!(one, put);
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", RequestSigner::new("very-secret"));
        assert!(!rendered.contains("very-secret"));
    }
}
