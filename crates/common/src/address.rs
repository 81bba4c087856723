/// Suffixes WhatsApp Web uses on JIDs.
const JID_SUFFIXES: &[&str] = &["@s.whatsapp.net", "@c.us"];

/// Normalize a phone-style address to E.164-ish `+<digits>`.
///
/// Strips a `whatsapp:` channel prefix, JID suffixes (including the device
/// part `:NN` before the `@`), and every character other than digits.
/// Returns `None` when no digits remain.
pub fn normalize_address(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("whatsapp:") {
        s = rest;
    }
    for suffix in JID_SUFFIXES {
        if let Some(rest) = s.strip_suffix(suffix) {
            s = rest;
            break;
        }
    }
    if let Some((user, _device)) = s.split_once(':') {
        s = user;
    }
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(format!("+{digits}"))
}

/// Convert an E.164 number into a WhatsApp user JID.
pub fn to_whatsapp_jid(number: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}@s.whatsapp.net")
}
