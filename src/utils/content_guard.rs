/// MIME type the URL probe looks for.
pub const PDF_MIME: &str = "application/pdf";

/// Magic signature at the start of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Returns true if a probe's Content-Type admits the resource as a PDF.
///
/// The header must contain `application/pdf`, compared case-insensitively as a
/// substring so parameters such as `; charset=binary` pass. An empty header is
/// accepted.
pub fn is_pdf_content_type(content_type: &str) -> bool {
    content_type.is_empty() || content_type.to_ascii_lowercase().contains(PDF_MIME)
}

/// Returns true if the first bytes of an upload carry the `%PDF-` signature.
pub fn looks_like_pdf(head: &[u8]) -> bool {
    head.starts_with(PDF_MAGIC)
}

/// Cuts `s` to at most `max` bytes on a char boundary, appending `suffix`
/// when it was shortened. Without room for the suffix the text is cut bare.
pub fn safe_truncate_utf8(s: &str, max: usize, suffix: &str) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    if max <= suffix.len() {
        return s[..floor_char_boundary(s, max)].to_string();
    }

    let kept = &s[..floor_char_boundary(s, max - suffix.len())];
    let mut result = String::with_capacity(kept.len() + suffix.len());
    result.push_str(kept);
    result.push_str(suffix);
    result
}

/// Largest char boundary of `s` not after `index`.
fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
