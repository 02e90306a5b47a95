//! Signature test vectors.
//!
//! Each vector pins the base string and the percent-encoded signature of a
//! request, so signer changes that alter the wire format are caught.

use pushsync_client::HttpMethod;

/// A request with its expected signature.
#[derive(Debug, Clone)]
pub struct SignatureVector {
    /// Unique identifier for this vector.
    pub id: &'static str,
    /// Client secret.
    pub secret: &'static str,
    /// HTTP method.
    pub method: HttpMethod,
    /// Full URL, possibly with a query string.
    pub url: &'static str,
    /// Body or form parameters.
    pub params: &'static [(&'static str, &'static str)],
    /// Expected base string.
    pub base_string: &'static str,
    /// Expected signature, percent-encoded.
    pub signature: &'static str,
}

impl SignatureVector {
    /// Parameters as owned pairs.
    pub fn param_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }
}

/// Known-good signatures.
pub fn signature_vectors() -> Vec<SignatureVector> {
    vec![
        SignatureVector {
            id: "post_sorted_params",
            secret: "secret",
            method: HttpMethod::Post,
            url: "https://api.wonderpush.com/v1/installation",
            params: &[("z", "1"), ("a", "2")],
            base_string: "POST&https%3A%2F%2Fapi.wonderpush.com%2Fv1%2Finstallation&a%3D2%26z%3D1&",
            signature: "eQmiDGKi5MjnmjmwTrU9Kc8rJYE%3D",
        },
        SignatureVector {
            id: "get_query_and_reserved_chars",
            secret: "s3cr3t",
            method: HttpMethod::Get,
            url: "https://api.wonderpush.com/v1/events?q=1",
            params: &[("x", "a b"), ("accessToken", "tok*~"), ("sdkVersion", "Rust-0.4.0")],
            base_string: "GET&https%3A%2F%2Fapi.wonderpush.com%2Fv1%2Fevents&accessToken%3Dtok%252A~%26q%3D1%26sdkVersion%3DRust-0.4.0%26x%3Da%2520b&",
            signature: "k%2FkiD6zKabp1fr5FJ05M9TIAhK8%3D",
        },
        SignatureVector {
            id: "patch_custom_body",
            secret: "secret",
            method: HttpMethod::Patch,
            url: "https://api.wonderpush.com/v1/installation",
            params: &[
                ("body", r#"{"custom":{"age":30}}"#),
                ("accessToken", "TOKEN"),
                ("sdkVersion", "test"),
            ],
            base_string: "PATCH&https%3A%2F%2Fapi.wonderpush.com%2Fv1%2Finstallation&accessToken%3DTOKEN%26body%3D%257B%2522custom%2522%253A%257B%2522age%2522%253A30%257D%257D%26sdkVersion%3Dtest&",
            signature: "UpiPpDCl4SHcDuFKZQWN9kNzvIM%3D",
        },
        SignatureVector {
            id: "access_token_fetch",
            secret: "secret",
            method: HttpMethod::Post,
            url: "https://api.wonderpush.com/v1/authentication/accessToken",
            params: &[
                ("clientId", "client"),
                ("devicePlatform", "Android"),
                ("deviceModel", "test"),
                ("sdkVersion", "test"),
            ],
            base_string: "POST&https%3A%2F%2Fapi.wonderpush.com%2Fv1%2Fauthentication%2FaccessToken&clientId%3Dclient%26deviceModel%3Dtest%26devicePlatform%3DAndroid%26sdkVersion%3Dtest&",
            signature: "lbcnrp8ATpEcEj208cOILpxz4PY%3D",
        },
    ]
}
