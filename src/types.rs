use aws_smithy_runtime_api::client::orchestrator::HttpResponse;

/// Convenience wrapper for SDK errors carrying the raw http response
pub(crate) type SdkError<E, R = HttpResponse> =
    aws_smithy_runtime_api::client::result::SdkError<E, R>;
