//! HTML summary of scan hits.
//!
//! ```
//! use threat_sweep::report::render;
//! use threat_sweep::Hit;
//!
//! let html = render(&[Hit::new("AAMk1", "<script>alert(1)</script>", "2024-05-01T10:00:00Z")]);
//! assert!(html.contains("&lt;script&gt;"));
//! assert!(!html.contains("<script>"));
//! ```

use crate::scan::Hit;

/// Placeholder entry rendered when there are no hits.
pub const NO_MATCHES: &str = "No matches";

/// Escapes the five HTML-reserved characters.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Renders hits as an HTML list, one entry per hit, in the given order.
///
/// An empty slice renders a single placeholder entry.
#[must_use]
pub fn render(hits: &[Hit]) -> String {
    let mut html = String::from("<h3>Messages matching threat indicators</h3>\n<ul>\n");

    if hits.is_empty() {
        html.push_str(&format!("<li>{NO_MATCHES}</li>\n"));
    }

    for hit in hits {
        html.push_str(&format!(
            "<li><b>{}</b> ({}) <code>{}</code></li>\n",
            escape_html(&hit.subject),
            escape_html(&hit.received_date_time),
            escape_html(&hit.message_id),
        ));
    }

    html.push_str("</ul>\n");
    html
}

/// Renders the full summary body: the hit list plus a footer naming the
/// category and generation time.
#[must_use]
pub fn render_summary(
    hits: &[Hit],
    category: &str,
    generated_at: chrono::DateTime<chrono::Utc>,
) -> String {
    let mut html = render(hits);
    html.push_str(&format!(
        "<p>Tagged with category <b>{}</b>. Generated {}.</p>\n",
        escape_html(category),
        generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    ));
    html
}

/// Subject line of the summary email.
#[must_use]
pub fn summary_subject(hit_count: usize, category: &str) -> String {
    let noun = if hit_count == 1 { "message" } else { "messages" };
    format!("[threat-sweep] {hit_count} {noun} tagged '{category}'")
}
