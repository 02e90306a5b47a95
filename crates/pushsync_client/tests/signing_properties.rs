//! Property tests of the request signer.

use proptest::prelude::*;
use pushsync_client::{percent_encode, HttpMethod, RequestSigner, Url};

fn param_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-zA-Z]{1,8}", "[ -~]{0,12}"), 0..6)
}

proptest! {
    #[test]
    fn percent_encoding_is_unreserved_ascii(input in "\\PC{0,24}") {
        let encoded = percent_encode(&input);
        let mut chars = encoded.chars();
        while let Some(c) = chars.next() {
            if c == '%' {
                let hex: String = chars.by_ref().take(2).collect();
                prop_assert_eq!(hex.len(), 2);
                prop_assert!(hex.chars().all(|h| h.is_ascii_digit() || h.is_ascii_uppercase()));
            } else {
                prop_assert!(c.is_ascii_alphanumeric() || "-._~".contains(c), "unexpected {:?}", c);
            }
        }
    }

    #[test]
    fn signature_ignores_parameter_order(mut params in param_strategy()) {
        let signer = RequestSigner::new("secret");
        let url = Url::parse("https://api.example.com/v1/installation").unwrap();

        let before = signer.authorization_header(HttpMethod::Put, &url, &params).unwrap();
        params.reverse();
        let after = signer.authorization_header(HttpMethod::Put, &url, &params).unwrap();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn query_and_body_parameters_sign_alike(params in param_strategy()) {
        let mut url = Url::parse("https://api.example.com/v1/events").unwrap();
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in &params {
                query.append_pair(name, value);
            }
        }
        let plain = Url::parse("https://api.example.com/v1/events").unwrap();

        prop_assert_eq!(
            RequestSigner::base_string(HttpMethod::Get, &url, &[]),
            RequestSigner::base_string(HttpMethod::Get, &plain, &params)
        );
    }
}
