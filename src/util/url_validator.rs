use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Reasons a URL is refused as a feed source.
#[derive(Error, Debug)]
pub enum FeedUrlError {
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    Scheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Localhost not allowed")]
    Loopback,
    #[error("Private IP address not allowed: {0}")]
    PrivateAddress(IpAddr),
}

/// Check a URL before it is registered as a feed.
///
/// Only public `http`/`https` hosts pass. The poller fetches registered feeds
/// unattended, so loopback, private, link-local and unspecified addresses are
/// refused up front. Hostnames are not resolved.
///
/// ```
/// use gator::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://wagslane.dev/index.xml").is_ok());
/// assert!(validate_feed_url("http://localhost:8080/rss").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(input: &str) -> Result<Url, FeedUrlError> {
    let url = Url::parse(input.trim())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FeedUrlError::Scheme(url.scheme().to_owned()));
    }

    match url.host() {
        None => return Err(FeedUrlError::MissingHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(FeedUrlError::Loopback);
            }
        }
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip))?,
    }

    Ok(url)
}

fn check_ip(ip: IpAddr) -> Result<(), FeedUrlError> {
    // ::ffff:a.b.c.d reaches the same host as a.b.c.d
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        v4 => v4,
    };
    if ip.is_loopback() {
        return Err(FeedUrlError::Loopback);
    }
    let private = match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    };
    if private {
        return Err(FeedUrlError::PrivateAddress(ip));
    }
    Ok(())
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    ip.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
