use std::collections::BTreeMap;

/// Expands `@{name}` tokens with the bound argument values and collapses `@@` to `@`.
///
/// Unbound tokens are kept verbatim. Substituted values are not scanned again.
pub fn bind_parameters(text: &str, arguments: &BTreeMap<String, String>) -> String {
    if !text.contains('@') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];

        if tail.starts_with("@@") {
            out.push('@');
            rest = &tail[2..];
            continue;
        }

        if let Some((name, token_len)) = parameter_token(tail) {
            match arguments.get(name) {
                Some(value) => out.push_str(value),
                None => out.push_str(&tail[..token_len]),
            }
            rest = &tail[token_len..];
            continue;
        }

        out.push('@');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

/// Recognises `@{name}` at the start of `tail`; returns the name and the token length.
fn parameter_token(tail: &str) -> Option<(&str, usize)> {
    let body = tail.strip_prefix("@{")?;
    let end = body.find('}')?;
    let name = &body[..end];
    if name.is_empty()
        || name
            .chars()
            .any(|ch| ch.is_whitespace() || ch == '{' || ch == '@')
    {
        return None;
    }
    Some((name, end + 3))
}
