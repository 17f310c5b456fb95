//! Splitting outgoing text to fit the protocol line limit.

/// Longest line a server accepts, excluding the trailing CRLF.
pub const MAX_LINE: usize = 510;

/// Bytes of text that fit in one `command` to `target`, as relayed to other
/// clients with our `nick!user@host` prefix of `mask_len` bytes.
///
/// `:mask COMMAND target :text`
pub fn payload_limit(mask_len: usize, command: &str, target: &str) -> usize {
    let framing = 1 + mask_len + 1 + command.len() + 1 + target.len() + 2;
    MAX_LINE.saturating_sub(framing).max(1)
}

/// Split `text` into pieces of at most `limit` bytes, on character
/// boundaries. Concatenating the pieces gives back `text`.
pub fn split_payload(text: &str, limit: usize) -> Vec<&str> {
    let limit = limit.max(1);
    let mut pieces = Vec::new();
    let mut rest = text;

    while rest.len() > limit {
        let mut end = limit;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // a single character wider than the limit still has to go out
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(end);
        pieces.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}
