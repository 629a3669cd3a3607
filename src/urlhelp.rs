//! Utilities for working with endpoint URLs.

/// Prefix `http://` to a URL that has no scheme.
///
/// Strings that already look like a scheme, or like a mistyped one
/// (`http//host`, `https:host`), are returned unchanged rather than guessed at.
pub fn protocolise(url: &str) -> String {
    if has_scheme(url) || looks_like_http(url) {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// `scheme:rest`, where `rest` is not a bare port number (`localhost:8080`).
fn has_scheme(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return false;
    }
    let port = rest.split('/').next().unwrap_or_default();
    port.is_empty() || !port.chars().all(|c| c.is_ascii_digit())
}

/// Matches `https?:?/{1,2}` anywhere in the string.
fn looks_like_http(url: &str) -> bool {
    url.match_indices("http").any(|(idx, _)| {
        let mut rest = &url[idx + 4..];
        rest = rest.strip_prefix('s').unwrap_or(rest);
        rest = rest.strip_prefix(':').unwrap_or(rest);
        rest.starts_with('/')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leave_it_alone() {
        for case in ["http://example.com", "https://example.com"] {
            assert_eq!(protocolise(case), case);
        }
    }

    #[test]
    fn test_protocolise() {
        let cases = [
            ("localhost/urlhelp", "http://localhost/urlhelp"),
            ("example.com", "http://example.com"),
            ("localhost:7890", "http://localhost:7890"),
            ("127.0.0.1:7890/rpc", "http://127.0.0.1:7890/rpc"),
        ];
        for (case, expected) in cases {
            assert_eq!(protocolise(case), expected);
        }
    }

    #[test]
    fn test_typo_dont_guess() {
        for case in [
            "http//example.com",
            "http:/example.com",
            "https:example.com",
            "jttp://example.com",
        ] {
            assert_eq!(protocolise(case), case);
        }
    }
}
