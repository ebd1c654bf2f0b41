use encoding_rs::{Encoding, EUC_KR, UTF_8, WINDOWS_1252};

/// One attempted decoding of a payload.
#[derive(Debug)]
pub struct Decoded {
    pub text: String,
    pub label: &'static str,
    pub had_errors: bool,
}

/// Returns candidate decodings in preference order: the charset announced in
/// the Content-Type header, then the one declared inside the document (XML
/// declaration or meta charset), then the byte-sniff chain UTF-8 → EUC-KR →
/// Latin-1. EUC-KR and CP949 share a decoder (windows-949 is the CP949
/// superset). Callers try candidates until one parses.
pub fn candidates(body: &[u8], content_type: Option<&str>) -> Vec<Decoded> {
    let mut encodings: Vec<&'static Encoding> = Vec::new();

    if let Some(encoding) = content_type
        .and_then(charset_from_content_type)
        .and_then(|c| encoding_for(&c))
    {
        encodings.push(encoding);
    }
    if let Some(encoding) = declared_charset(body).and_then(|c| encoding_for(&c)) {
        encodings.push(encoding);
    }
    encodings.push(UTF_8);
    encodings.push(EUC_KR);
    encodings.push(WINDOWS_1252);

    let mut seen = Vec::new();
    let mut decoded = Vec::new();
    for encoding in encodings {
        if seen.contains(&encoding.name()) {
            continue;
        }
        seen.push(encoding.name());
        let (text, _, had_errors) = encoding.decode(body);
        decoded.push(Decoded {
            text: text.into_owned(),
            label: encoding.name(),
            had_errors,
        });
    }
    decoded
}

/// Korean servers announce CP949 under names the WHATWG label registry does
/// not know; they all mean windows-949.
fn encoding_for(label: &str) -> Option<&'static Encoding> {
    match label {
        "cp949" | "ms949" | "x-windows-949" | "uhc" => Some(EUC_KR),
        _ => Encoding::for_label(label.as_bytes()),
    }
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let idx = lower.find("charset=")?;
    let rest = &lower[idx + "charset=".len()..];
    let value = rest
        .split(|c: char| c == ';' || c.is_whitespace())
        .next()?
        .trim_matches(|c| c == '"' || c == '\'');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Scans the first kilobyte for an XML declaration encoding or an HTML meta
/// charset. Both are ASCII-compatible in every encoding we care about.
fn declared_charset(body: &[u8]) -> Option<String> {
    let head: String = body
        .iter()
        .take(1024)
        .map(|&b| if b.is_ascii() { b as char } else { ' ' })
        .collect();
    let lower = head.to_ascii_lowercase();

    for marker in ["encoding=", "charset="] {
        if let Some(idx) = lower.find(marker) {
            let rest = &lower[idx + marker.len()..];
            let rest = rest.trim_start_matches(|c| c == '"' || c == '\'');
            let value: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}
