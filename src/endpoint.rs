//! Resolution of the S3 endpoint override.

use anyhow::{Context, Result};
use http::Uri;
use std::env;
use std::str::FromStr;

/// Construct the endpoint URI to use instead of the default AWS endpoint.
///
/// An `explicit` endpoint always wins. Otherwise a LocalStack endpoint is
/// constructed if the `LOCALSTACK_HOSTNAME` env var has been set, using
/// `EDGE_PORT` (default `4566`) as the port.
///
/// Ref: https://docs.localstack.cloud/localstack/configuration/
///
pub(crate) fn get_endpoint_uri(explicit: Option<&str>) -> Result<Option<Uri>> {
    if let Some(endpoint) = explicit {
        let uri = Uri::from_str(endpoint)
            .with_context(|| format!("Failed to parse endpoint URI: {}", endpoint))?;
        return Ok(Some(uri));
    }
    match env::var("LOCALSTACK_HOSTNAME") {
        Ok(host) => {
            let port = env::var("EDGE_PORT").unwrap_or_else(|_| "4566".to_string());
            let uri = format!("http://{}:{}", host, port);
            let uri =
                Uri::from_str(&uri).context(format!("Failed to parse LocalStack URI: {}", uri))?;
            Ok(Some(uri))
        }
        Err(_) => Ok(None),
    }
}
