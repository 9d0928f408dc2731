//! Service-exception handling.
//!
//! Some services answer a tile request with an XML error document and HTTP
//! 200. The engine sniffs the first bytes of every successful body for an
//! XML prologue and, when found, parses it as a service exception report
//! instead of an image.

use url::Url;

use crate::error::ReadError;

/// How many leading bytes are inspected for an XML prologue.
const SNIFF_LEN: usize = 20;

/// Whether the body starts like an XML/service-exception document.
pub fn looks_like_exception(body: &[u8]) -> bool {
    if body.len() < SNIFF_LEN {
        return false;
    }
    let head = &body[..SNIFF_LEN];
    starts_with_ci(head, b"<?xml ")
        || starts_with_ci(head, b"<!DOCTYPE ")
        || starts_with_ci(head, b"<ServiceException")
}

fn starts_with_ci(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len()
        && data
            .iter()
            .zip(prefix)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// Parse a service exception report out of a sniffed body.
///
/// Returns the first reported exception on a successful parse, and
/// `UnknownException` when the body is XML-ish but carries no recognizable
/// exception report.
pub fn parse_exception(body: &[u8], url: &Url) -> ReadError {
    let text = match std::str::from_utf8(body) {
        Ok(t) => t,
        Err(_) => return ReadError::UnknownException { url: url.clone() },
    };
    let doc = match roxmltree::Document::parse(text) {
        Ok(d) => d,
        Err(_) => return ReadError::UnknownException { url: url.clone() },
    };

    let root = doc.root_element();
    if root.tag_name().name() != "ServiceExceptionReport" {
        return ReadError::UnknownException { url: url.clone() };
    }

    for node in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "ServiceException")
    {
        let code = node
            .attribute("code")
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let message = node.text().map(str::trim).unwrap_or("").to_string();
        if !message.is_empty() || code.is_some() {
            return ReadError::ServiceException { code, message };
        }
    }

    ReadError::UnknownException { url: url.clone() }
}

/// Wrap a feature-info response body in a `<LocationInfo>` envelope.
///
/// Well-formed XML is embedded verbatim with any XML declaration stripped;
/// anything else is embedded as escaped text.
pub fn wrap_location_info(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 32);
    out.push_str("<LocationInfo>");

    if roxmltree::Document::parse(body).is_ok() {
        let trimmed = body.trim_start();
        if trimmed.starts_with("<?") {
            if let Some(end) = trimmed.find("?>") {
                out.push_str(trimmed[end + 2..].trim_start());
            } else {
                out.push_str(&escape_xml_text(body));
            }
        } else {
            out.push_str(trimmed.trim_end());
        }
    } else {
        out.push_str(&escape_xml_text(body));
    }

    out.push_str("</LocationInfo>");
    out
}

/// Escape `&`, `<` and `>` (quotes stay literal inside text content).
fn escape_xml_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
