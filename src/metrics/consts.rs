pub(crate) const HTTP_REQUEST_DURATION_SECS: &str =
    "http_request_duration_seconds";
pub(crate) const HTTP_REQUEST_SIZE_BYTES: &str = "http_request_size_bytes";
pub(crate) const HTTP_RESPONSE_SUCCESS: &str = "http_response_success";
pub(crate) const HTTP_RESPONSE_FAILURE: &str = "http_response_failure";
pub(crate) const UPSTREAM_REQUEST_DURATION_SECS: &str =
    "upstream_request_duration_seconds";
pub(crate) const PROXY_PROCESSING_DURATION_SECS: &str =
    "proxy_processing_duration_seconds";
pub(crate) const PROXY_HTTP_SERVER_ERROR: &str = "proxy_http_server_error";
pub(crate) const PROXY_REJECTED: &str = "proxy_rejected_total";
