//! Script nonce rewriting for HTML fragments.
//!
//! This is a tag scanner, not a tree builder. It walks the fragment once, skips
//! comments and raw-text element bodies, parses tag attributes with quoting in
//! mind, and touches nothing but the `nonce` attribute of `<script>` start tags.
//! Input that does not form a complete tag is copied through as text.

use crate::nonce::Nonce;

const NONCE_ATTR: &str = "nonce";

/// Elements whose content is text up to the matching end tag.
/// `noscript` is included because pages are rendered with scripting enabled.
const RAW_TEXT_ELEMENTS: [&str; 9] = [
    "script", "style", "textarea", "title", "iframe", "xmp", "noembed", "noframes", "noscript",
];

/// Everything after this start tag is text, with no way out.
const PLAINTEXT_ELEMENT: &str = "plaintext";

/// Set `nonce` on every `<script>` start tag in `html`.
pub fn rewrite(html: &str, nonce: &Nonce) -> String {
    rewrite_with_count(html, nonce).0
}

/// Same as [`rewrite`], also returning how many script tags were annotated.
pub fn rewrite_with_count(html: &str, nonce: &Nonce) -> (String, usize) {
    let bytes = html.as_bytes();
    let value = escape_attr_value(nonce.as_str());
    let mut out = String::with_capacity(html.len() + 32);
    // Everything before `copied` has already been written to `out`
    let mut copied = 0;
    let mut pos = 0;
    let mut count = 0;

    while let Some(lt) = find_byte(bytes, pos, b'<') {
        let rest = &bytes[lt..];

        if rest.starts_with(b"<!--") {
            pos = comment_end(bytes, lt);
            continue;
        }
        match rest.get(1) {
            // End tags, doctypes, processing instructions
            Some(b'/' | b'!' | b'?') => {
                pos = find_byte(bytes, lt + 1, b'>').map_or(bytes.len(), |gt| gt + 1);
                continue;
            }
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => {
                pos = lt + 1;
                continue;
            }
        }

        let name_end = lt + 1 + bytes[lt + 1..].iter().take_while(|b| is_name_byte(**b)).count();
        let name = &html[lt + 1..name_end];

        let Some(tag) = scan_tag(bytes, name_end) else {
            // Unterminated tag: the remainder is plain text
            break;
        };

        if name.eq_ignore_ascii_case("script") {
            out.push_str(&html[copied..name_end]);
            write_script_attributes(&mut out, html, name_end, &tag, &value);
            copied = tag.end;
            count += 1;
        }

        pos = tag.end;
        if name.eq_ignore_ascii_case(PLAINTEXT_ELEMENT) {
            break;
        }
        if RAW_TEXT_ELEMENTS
            .iter()
            .any(|raw| name.eq_ignore_ascii_case(raw))
        {
            // Without a matching end tag, keep scanning right after the start tag
            if let Some(end_tag) = find_end_tag(bytes, tag.end, name) {
                pos = end_tag;
            }
        }
    }

    out.push_str(&html[copied..]);
    (out, count)
}

/// Byte span of one attribute inside a start tag.
#[derive(Debug)]
struct AttrSpan {
    start: usize,
    name_end: usize,
    end: usize,
}

#[derive(Debug)]
struct TagScan {
    attrs: Vec<AttrSpan>,
    /// Index just past the closing `>`
    end: usize,
}

/// Parse attributes from just after the tag name up to the closing `>`.
/// Returns `None` when the input ends before the tag does.
fn scan_tag(bytes: &[u8], start: usize) -> Option<TagScan> {
    let len = bytes.len();
    let mut attrs = Vec::new();
    let mut i = start;

    loop {
        while i < len && (is_space(bytes[i]) || bytes[i] == b'/') {
            i += 1;
        }
        if i >= len {
            return None;
        }
        if bytes[i] == b'>' {
            return Some(TagScan { attrs, end: i + 1 });
        }

        let name_start = i;
        // A leading '=' belongs to the name
        i += 1;
        while i < len && !is_space(bytes[i]) && !matches!(bytes[i], b'/' | b'>' | b'=') {
            i += 1;
        }
        let name_end = i;

        let mut j = skip_spaces(bytes, i);
        if j < len && bytes[j] == b'=' {
            j = skip_spaces(bytes, j + 1);
            if j >= len {
                return None;
            }
            i = match bytes[j] {
                quote @ (b'"' | b'\'') => find_byte(bytes, j + 1, quote)? + 1,
                b'>' => j,
                _ => {
                    while j < len && !is_space(bytes[j]) && bytes[j] != b'>' {
                        j += 1;
                    }
                    j
                }
            };
        }

        attrs.push(AttrSpan {
            start: name_start,
            name_end,
            end: i,
        });
    }
}

/// Write the attribute section of a script start tag with the nonce applied.
fn write_script_attributes(
    out: &mut String,
    html: &str,
    name_end: usize,
    tag: &TagScan,
    value: &str,
) {
    let nonce_attrs: Vec<&AttrSpan> = tag
        .attrs
        .iter()
        .filter(|a| html[a.start..a.name_end].eq_ignore_ascii_case(NONCE_ATTR))
        .collect();

    let Some((first, duplicates)) = nonce_attrs.split_first() else {
        out.push_str(" nonce=\"");
        out.push_str(value);
        out.push('"');
        out.push_str(&html[name_end..tag.end]);
        return;
    };

    let mut cursor = name_end;
    out.push_str(&html[cursor..first.start]);
    out.push_str("nonce=\"");
    out.push_str(value);
    out.push('"');
    cursor = first.end;

    for dup in duplicates {
        // Drop the duplicate together with the whitespace separating it
        let mut drop_from = dup.start;
        while drop_from > cursor && is_space(html.as_bytes()[drop_from - 1]) {
            drop_from -= 1;
        }
        out.push_str(&html[cursor..drop_from]);
        cursor = dup.end;
    }
    out.push_str(&html[cursor..tag.end]);
}

/// Index just past the comment starting at `lt`, or the end of input.
fn comment_end(bytes: &[u8], lt: usize) -> usize {
    let rest = &bytes[lt..];
    // `<!-->` and `<!--->` close immediately
    if rest.starts_with(b"<!-->") {
        return lt + 5;
    }
    if rest.starts_with(b"<!--->") {
        return lt + 6;
    }
    find_subslice(bytes, lt + 4, b"-->").map_or(bytes.len(), |end| end + 3)
}

/// Find the `</name` that ends a raw-text element, matched case-insensitively.
fn find_end_tag(bytes: &[u8], from: usize, name: &str) -> Option<usize> {
    let name = name.as_bytes();
    let mut pos = from;
    while let Some(start) = find_subslice(bytes, pos, b"</") {
        let name_start = start + 2;
        let name_stop = name_start + name.len();
        if let Some(candidate) = bytes.get(name_start..name_stop) {
            let boundary = bytes
                .get(name_stop)
                .is_none_or(|b| is_space(*b) || matches!(b, b'/' | b'>'));
            if candidate.eq_ignore_ascii_case(name) && boundary {
                return Some(start);
            }
        }
        pos = start + 2;
    }
    None
}

fn escape_attr_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[inline]
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0C')
}

#[inline]
fn is_name_byte(b: u8) -> bool {
    !is_space(b) && b != b'/' && b != b'>'
}

#[inline]
fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && is_space(bytes[i]) {
        i += 1;
    }
    i
}

#[inline]
fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|b| *b == needle)
        .map(|p| p + from)
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
