//! Minimal HTML bodies for the messages this crate sends.

use super::MailMessage;

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn link(base_url: &str, path: &str, token: &str) -> String {
    format!("{}/{}?token={}", base_url.trim_end_matches('/'), path, token)
}

fn layout(heading: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body><h2>{}</h2>{}</body></html>",
        escape_html(heading),
        body
    )
}

/// Email-ownership proof message
pub fn verification_email(to: &str, username: &str, base_url: &str, token: &str) -> MailMessage {
    let url = link(base_url, "verify-email", token);
    let body = format!(
        "<p>Hi {},</p><p>Confirm this address by opening the link below. \
         It expires in 24 hours.</p><p><a href=\"{url}\">{url}</a></p>",
        escape_html(username)
    );
    MailMessage::new(to, "Verify your email address", layout("Verify your email", &body))
}

/// Password reset message
pub fn password_reset_email(to: &str, username: &str, base_url: &str, token: &str) -> MailMessage {
    let url = link(base_url, "reset-password", token);
    let body = format!(
        "<p>Hi {},</p><p>Someone asked to reset the password for this account. \
         The link below expires in 1 hour.</p><p><a href=\"{url}\">{url}</a></p>\
         <p>If this wasn't you, ignore this email.</p>",
        escape_html(username)
    );
    MailMessage::new(to, "Reset your password", layout("Password reset", &body))
}

/// Details shown in a suspicious-login notice
#[derive(Debug, Clone)]
pub struct LoginNotice<'a> {
    pub username: &'a str,
    pub ip_address: &'a str,
    pub user_agent: &'a str,
    pub location: Option<&'a str>,
    pub risk_score: u8,
    pub reasons: &'a [String],
}

/// Notice for a login that scored at or above the alert threshold
pub fn suspicious_login_email(to: &str, notice: &LoginNotice<'_>) -> MailMessage {
    let reasons: String = notice
        .reasons
        .iter()
        .map(|r| format!("<li>{}</li>", escape_html(r)))
        .collect();
    let body = format!(
        "<p>Hi {},</p><p>We noticed a sign-in that looks unusual.</p>\
         <ul><li>IP address: {}</li><li>Device: {}</li><li>Location: {}</li>\
         <li>Risk score: {}</li></ul><p>Why it was flagged:</p><ul>{}</ul>\
         <p>If this wasn't you, change your password and sign out of all sessions.</p>",
        escape_html(notice.username),
        escape_html(notice.ip_address),
        escape_html(notice.user_agent),
        escape_html(notice.location.unwrap_or("Unknown")),
        notice.risk_score,
        reasons
    );
    MailMessage::new(to, "Unusual sign-in to your account", layout("New sign-in", &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::extract_token;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"a\" & 'b'</b>"), "&lt;b&gt;&quot;a&quot; &amp; &#39;b&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_links_carry_token() {
        let message = password_reset_email("a@example.com", "ann", "https://app.test/", "abc123");
        assert!(message.html.contains("https://app.test/reset-password?token=abc123"));
        assert_eq!(extract_token(&message.html).as_deref(), Some("abc123"));

        let message = verification_email("a@example.com", "<ann>", "https://app.test", "ff00");
        assert!(message.html.contains("https://app.test/verify-email?token=ff00"));
        assert!(message.html.contains("&lt;ann&gt;"));
    }

    #[test]
    fn test_suspicious_login_lists_reasons() {
        let reasons = vec!["New device".to_string(), "New location: FR".to_string()];
        let notice = LoginNotice {
            username: "ann",
            ip_address: "203.0.113.9",
            user_agent: "curl/8",
            location: None,
            risk_score: 50,
            reasons: &reasons,
        };
        let message = suspicious_login_email("a@example.com", &notice);
        assert!(message.html.contains("<li>New location: FR</li>"));
        assert!(message.html.contains("Location: Unknown"));
    }
}
