//! Decides whether a candidate URL is a page on one of a platform's domains.

use url::Url;

/// Path suffixes that are never profile pages.
const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".map", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".woff",
    ".woff2", ".ttf", ".otf", ".eot", ".mp4", ".webm", ".mp3",
];

/// Accepts `url` when its host is one of `domains` or a subdomain of one.
pub fn accepts<S: AsRef<str>>(url: &str, domains: &[S]) -> bool {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };
    if is_static_asset(&parsed) {
        return false;
    }
    match parsed.host_str() {
        Some(host) => host_matches(host, domains),
        None => false,
    }
}

/// Host equality or dot-boundary suffix match. `host` may carry a port.
pub fn host_matches<S: AsRef<str>>(host: &str, domains: &[S]) -> bool {
    let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();
    let host = host.trim_end_matches('.');
    domains.iter().any(|domain| {
        let domain = domain.as_ref().trim().to_ascii_lowercase();
        if domain.is_empty() {
            return false;
        }
        host == domain
            || (host.len() > domain.len()
                && host.ends_with(domain.as_str())
                && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
    })
}

fn is_static_asset(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACEBOOK: &[&str] = &["facebook.com"];

    #[test]
    fn accepts_exact_and_subdomains() {
        assert!(accepts("https://www.facebook.com/x", FACEBOOK));
        assert!(accepts("https://m.facebook.com/x", FACEBOOK));
        assert!(accepts("https://facebook.com/jane.doe", FACEBOOK));
        assert!(accepts("http://FACEBOOK.com:8080/jane", FACEBOOK));
    }

    #[test]
    fn rejects_lookalike_hosts_and_path_fragments() {
        assert!(!accepts("https://notfacebook.com/x", FACEBOOK));
        assert!(!accepts("https://example.com/facebook.com", FACEBOOK));
        assert!(!accepts("https://facebook.com.evil.net/x", FACEBOOK));
    }

    #[test]
    fn rejects_non_absolute_urls() {
        assert!(!accepts("/l/?uddg=x", FACEBOOK));
        assert!(!accepts("//www.facebook.com/x", FACEBOOK));
        assert!(!accepts("ftp://facebook.com/x", FACEBOOK));
        assert!(!accepts("", FACEBOOK));
    }

    #[test]
    fn rejects_static_assets() {
        assert!(!accepts("https://static.facebook.com/rsrc/app.js", FACEBOOK));
        assert!(!accepts("https://www.facebook.com/images/logo.PNG", FACEBOOK));
        assert!(!accepts("https://www.facebook.com/fonts/a.woff2?v=3", FACEBOOK));
        assert!(accepts("https://www.facebook.com/jane.js.fan", FACEBOOK));
    }

    #[test]
    fn any_of_several_domains() {
        let twitter = ["twitter.com", "x.com"];
        assert!(accepts("https://x.com/jane", &twitter));
        assert!(accepts("https://mobile.twitter.com/jane", &twitter));
        assert!(!accepts("https://box.com/jane", &twitter));
    }

    #[test]
    fn host_match_strips_port() {
        assert!(host_matches("www.reddit.com:443", &["reddit.com"]));
        assert!(!host_matches("reddit.com.co", &["reddit.com"]));
        assert!(!host_matches("reddit.com", &[""]));
    }
}
