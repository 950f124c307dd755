//! Decides whether a portal page actually lets a citizen file an RTI
//! application, as opposed to merely answering the HTTP request.

use regex::Regex;
use std::sync::LazyLock;

// Phrases that block application submission no matter what the status
// code claims. Matched against the lower-cased title and visible body text.
pub const BLOCKING_PHRASES: &[&str] = &[
    "404",
    "not found",
    "page not found",
    "server error",
    "server down",
    "service unavailable",
    "internal server error",
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway timeout",
    "this site can't be reached",
    "connection refused",
    "access denied",
    "forbidden",
    "error 404",
    "error 500",
    "error 502",
    "error 503",
    "maintenance mode",
    "under maintenance",
    "site is down",
    "temporarily unavailable",
    "database error",
    "connection error",
    "application not available",
    "service temporarily unavailable",
    "server maintenance",
];

// A page with none of these anywhere in its HTML is not recognizable as an
// RTI portal at all.
pub const RTI_KEYWORDS: &[&str] = &[
    "rti",
    "right to information",
    "application",
    "apply",
    "submit",
    "file application",
    "new application",
    "rti application",
    "online application",
    "application form",
    "information commission",
    "public authority",
    "citizen charter",
];

macro_rules! html_pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect("pattern compiles"));
    };
}

html_pattern!(TITLE_RE, r"(?i)<title[^>]*>([^<]*)</title>");
html_pattern!(BODY_RE, r"(?is)<body[^>]*>(.*?)</body>");
html_pattern!(SCRIPT_RE, r"(?is)<script[^>]*>.*?</script>");
html_pattern!(STYLE_RE, r"(?is)<style[^>]*>.*?</style>");
html_pattern!(TAG_RE, r"<[^>]+>");
html_pattern!(PASSWORD_INPUT_RE, r#"(?i)<input[^>]*type=["']password["'][^>]*>"#);

fn title_text(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|c| c[1].to_lowercase())
}

fn visible_body_text(html: &str) -> Option<String> {
    let body = BODY_RE.captures(html)?;
    let stripped = SCRIPT_RE.replace_all(&body[1], "");
    let stripped = STYLE_RE.replace_all(&stripped, "");
    let text = TAG_RE.replace_all(&stripped, " ");
    Some(text.to_lowercase())
}

fn keyword_count(lower_html: &str) -> usize {
    RTI_KEYWORDS
        .iter()
        .filter(|k| lower_html.contains(*k))
        .count()
}

fn has_login(html: &str, lower_html: &str) -> bool {
    lower_html.contains("login")
        || lower_html.contains("sign in")
        || lower_html.contains("user name")
        || lower_html.contains("password")
        || PASSWORD_INPUT_RE.is_match(html)
}

/// Verdict on whether a citizen could use this page to apply for RTI.
///
/// `status` of `None` means the HTML came from somewhere other than a plain
/// HTTP exchange (no status line was observed).
pub fn can_user_apply(html: &str, status: Option<u16>) -> bool {
    if html.is_empty() {
        return false;
    }

    let lower = html.to_lowercase();

    if let Some(title) = title_text(html) {
        if BLOCKING_PHRASES.iter().any(|p| title.contains(p)) {
            return false;
        }
    }

    if let Some(body) = visible_body_text(html) {
        if BLOCKING_PHRASES.iter().any(|p| body.contains(p)) {
            return false;
        }
    }

    let keywords = keyword_count(&lower);
    if keywords == 0 {
        return false;
    }

    match status {
        // Error status: a login wall is still an acceptable access point.
        Some(s) if s >= 400 => has_login(html, &lower) && keywords >= 1,
        Some(s) if (200..400).contains(&s) => {
            if keywords >= 1 {
                return true;
            }
            // Large government pages count as working even when the RTI
            // signal hides in keyword-free markup.
            if html.len() >= 1000 && lower.contains("gov.in") {
                return true;
            }
            html.len() >= 500
        }
        _ => keywords >= 1 && html.len() >= 500,
    }
}

/// Short machine label for a page the classifier rejected. Status-code
/// buckets win over content-derived labels.
pub fn failure_reason(html: &str, status: Option<u16>) -> String {
    if let Some(status) = status {
        match status {
            404 => return "404 - Page Not Found".into(),
            500 => return "500 - Server Error".into(),
            503 => return "503 - Service Unavailable".into(),
            400..=499 => return format!("{status} - Client Error"),
            s if s >= 500 => return format!("{status} - Server Error"),
            _ => {}
        }
    }

    let lower = html.to_lowercase();
    if lower.contains("404") || lower.contains("not found") {
        "404 - Page Not Found".into()
    } else if lower.contains("server error") || lower.contains("500") {
        "Server Error".into()
    } else if lower.contains("server down") || lower.contains("service unavailable") {
        "Server Down".into()
    } else if lower.contains("maintenance") {
        "Under Maintenance".into()
    } else {
        "Page Not Functional".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rti_page(padding: usize) -> String {
        format!(
            "<html><head><title>RTI Online</title></head><body>\
             Welcome to RTI Online. Apply for RTI application here.{}</body></html>",
            "x".repeat(padding)
        )
    }

    #[test]
    fn empty_html_is_never_functional() {
        assert!(!can_user_apply("", Some(200)));
        assert!(!can_user_apply("", None));
    }

    #[test]
    fn every_blocking_phrase_in_title_blocks_regardless_of_status() {
        for phrase in BLOCKING_PHRASES {
            let html = format!(
                "<html><head><title>{phrase}</title></head>\
                 <body>Apply for RTI application here</body></html>"
            );
            for status in [Some(200), Some(302), Some(404), Some(500), None] {
                assert!(
                    !can_user_apply(&html, status),
                    "phrase {phrase:?} with status {status:?} should block"
                );
            }
        }
    }

    #[test]
    fn every_blocking_phrase_in_visible_body_blocks() {
        for phrase in BLOCKING_PHRASES {
            let html = format!(
                "<html><body><p>{phrase}</p><p>rti application form</p></body></html>"
            );
            assert!(!can_user_apply(&html, Some(200)), "phrase {phrase:?}");
        }
    }

    #[test]
    fn blocking_phrase_inside_script_is_ignored() {
        let html = "<html><body>\
                    <script>trackError('service unavailable');</script>\
                    <p>Apply for RTI application here</p></body></html>";
        assert!(can_user_apply(html, Some(200)));
    }

    #[test]
    fn zero_rti_keywords_is_never_functional() {
        let html = format!(
            "<html><body>Welcome to the weather bureau portal.{}</body></html>",
            "x".repeat(2000)
        );
        for status in [Some(200), Some(302), Some(404), None] {
            assert!(!can_user_apply(&html, status), "status {status:?}");
        }
    }

    #[test]
    fn every_rti_keyword_counts_on_a_loading_page() {
        for keyword in RTI_KEYWORDS {
            let html = format!("<html><body>State portal: {keyword}</body></html>");
            assert!(can_user_apply(&html, Some(200)), "keyword {keyword:?}");
        }
    }

    #[test]
    fn status_200_with_rti_content_is_functional() {
        // Scenario: 600-char body mentioning RTI application.
        let html = rti_page(520);
        assert!(html.len() >= 500);
        assert!(can_user_apply(&html, Some(200)));
    }

    #[test]
    fn error_status_needs_a_login_wall() {
        let with_login = "<html><body>RTI portal. Please login to continue.\
                          <input type=\"password\" name=\"pwd\"></body></html>";
        let without_login = "<html><body>RTI portal information page.</body></html>";
        assert!(can_user_apply(with_login, Some(404)));
        assert!(can_user_apply(with_login, Some(500)));
        assert!(!can_user_apply(without_login, Some(404)));
    }

    #[test]
    fn error_title_blocks_even_when_status_is_200() {
        // Scenario: soft-404 page served with a success status.
        let html = "<html><head><title>404 Not Found</title></head>\
                    <body>Apply for RTI here</body></html>";
        assert!(!can_user_apply(html, Some(200)));
        assert_eq!(failure_reason(html, Some(200)), "404 - Page Not Found");
    }

    #[test]
    fn unknown_status_requires_keywords_and_substance() {
        let short = "<html><body>rti</body></html>";
        assert!(!can_user_apply(short, None));
        let long = rti_page(600);
        assert!(can_user_apply(&long, None));
    }

    #[test]
    fn redirect_status_is_treated_like_success() {
        let html = rti_page(0);
        assert!(can_user_apply(&html, Some(302)));
    }

    #[test]
    fn failure_reason_prefers_status_buckets() {
        assert_eq!(failure_reason("", Some(404)), "404 - Page Not Found");
        assert_eq!(failure_reason("", Some(500)), "500 - Server Error");
        assert_eq!(failure_reason("", Some(503)), "503 - Service Unavailable");
        assert_eq!(failure_reason("", Some(418)), "418 - Client Error");
        assert_eq!(failure_reason("", Some(502)), "502 - Server Error");
    }

    #[test]
    fn failure_reason_falls_back_to_content_labels() {
        assert_eq!(
            failure_reason("<body>page not found</body>", Some(200)),
            "404 - Page Not Found"
        );
        assert_eq!(
            failure_reason("<body>internal server error</body>", Some(200)),
            "Server Error"
        );
        assert_eq!(
            failure_reason("<body>server down for now</body>", Some(200)),
            "Server Down"
        );
        assert_eq!(
            failure_reason("<body>scheduled maintenance tonight</body>", Some(200)),
            "Under Maintenance"
        );
        assert_eq!(failure_reason("<body>blank page</body>", Some(200)), "Page Not Functional");
    }

    #[test]
    fn classify_is_pure() {
        let html = rti_page(100);
        let first = can_user_apply(&html, Some(200));
        let second = can_user_apply(&html, Some(200));
        assert_eq!(first, second);
        assert_eq!(
            failure_reason(&html, Some(404)),
            failure_reason(&html, Some(404))
        );
    }
}
