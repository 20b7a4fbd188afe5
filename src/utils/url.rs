//! URL utilities for consistent endpoint construction
//!
//! Base URLs come from config or the command line and may carry trailing
//! slashes; these helpers normalize them before endpoints are appended.

/// Normalize a base URL by removing trailing slashes.
///
/// # Examples
///
/// ```
/// use confab::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:11434"), "http://localhost:11434");
/// assert_eq!(normalize_base_url("http://localhost:11434/"), "http://localhost:11434");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete endpoint URL from a base URL and endpoint path.
///
/// # Examples
///
/// ```
/// use confab::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:11434", "api/chat"),
///     "http://localhost:11434/api/chat"
/// );
/// assert_eq!(
///     construct_api_url("http://localhost:11434/", "/api/tags"),
///     "http://localhost:11434/api/tags"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
