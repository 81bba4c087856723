use relay_common::address::normalize_address;

/// Check if a sender is allowed to trigger replies.
///
/// An empty allowlist means everyone is allowed (open policy).
/// Phone-style entries and senders are compared after normalization, so
/// `whatsapp:+1555` matches `+1555`. Entries are matched case-insensitively
/// and support glob-style `*` wildcards.
pub fn is_allowed(sender: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let raw = sender.to_lowercase();
    let normalized = normalize_address(sender);
    allowlist.iter().any(|pattern| {
        let pat = pattern.trim().to_lowercase();
        if pat.contains('*') {
            return glob_match(&pat, &raw)
                || normalized.as_deref().is_some_and(|n| glob_match(&pat, n));
        }
        if pat == raw {
            return true;
        }
        match (normalize_address(&pat), normalized.as_deref()) {
            (Some(p), Some(n)) => p == n,
            _ => false,
        }
    })
}

/// Simple glob matching supporting `*` as a wildcard for any sequence of chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => {
                // First segment must match at start
                if i == 0 && idx != 0 {
                    return false;
                }
                pos += idx + part.len();
            },
            None => return false,
        }
    }
    // Last segment must match at end (unless pattern ends with *)
    if !parts.last().unwrap_or(&"").is_empty() {
        pos == text.len()
    } else {
        true
    }
}
