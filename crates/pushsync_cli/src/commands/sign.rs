//! Sign command implementation.

use super::InputError;
use pushsync_client::{HttpMethod, RequestSigner, Url, AUTHORIZATION_HEADER};
use serde::Serialize;

/// A computed request signature.
#[derive(Debug, Serialize)]
pub struct SignResult {
    /// Method that was signed.
    pub method: String,
    /// URL that was signed.
    pub url: String,
    /// The canonical string fed to the HMAC.
    pub base_string: String,
    /// Name of the header carrying the signature.
    pub header_name: String,
    /// Value of that header.
    pub header_value: String,
}

/// Splits `name=value` arguments. The value may itself contain `=`.
pub fn parse_params(raw: &[String]) -> Result<Vec<(String, String)>, InputError> {
    raw.iter()
        .map(|arg| {
            arg.split_once('=')
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .ok_or_else(|| InputError::Param(arg.clone()))
        })
        .collect()
}

/// Computes the signature of a request.
pub fn compute(
    method: &str,
    url: &str,
    params: &[(String, String)],
    secret: &str,
) -> Result<SignResult, Box<dyn std::error::Error>> {
    let http_method =
        HttpMethod::from_name(method).ok_or_else(|| InputError::Method(method.to_string()))?;
    let parsed = Url::parse(url)?;
    let signer = RequestSigner::new(secret);

    Ok(SignResult {
        method: http_method.as_str().to_string(),
        url: url.to_string(),
        base_string: RequestSigner::base_string(http_method, &parsed, params),
        header_name: AUTHORIZATION_HEADER.to_string(),
        header_value: signer.authorization_header(http_method, &parsed, params)?,
    })
}

/// Runs the sign command.
pub fn run(
    method: &str,
    url: &str,
    params: &[String],
    secret: &str,
    format: &str,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = parse_params(params)?;
    let result = compute(method, url, &params, secret)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if verbose {
            println!("Base string: {}", result.base_string);
        }
        println!("{}: {}", result.header_name, result.header_value);
    }

    Ok(())
}
