use url::Url;

/// Tooltip text for a link whose `href` does not parse.
pub const INVALID_URL_LABEL: &str = "Invalid URL";

/// Hostname of an absolute URL with a leading `www.` removed.
///
/// Relative references and URLs without a host return `None`.
pub fn display_hostname(href: &str) -> Option<String> {
    let url = Url::parse(href.trim()).ok()?;
    let host = url.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    Some(host.to_string())
}

/// [`display_hostname`], or [`INVALID_URL_LABEL`].
pub fn hostname_label(href: Option<&str>) -> String {
    href.and_then(display_hostname)
        .unwrap_or_else(|| INVALID_URL_LABEL.to_string())
}
