//! Greedy word wrapping for setting descriptions.

/// Splits `text` into lines of at most `width` characters, breaking on
/// whitespace.
///
/// A word longer than `width` first fills what is left of the current line and
/// is then cut into `width`-sized pieces.
pub(crate) fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();
        let separator = usize::from(!current.is_empty());
        if current_len + separator + word_len <= width {
            if separator == 1 {
                current.push(' ');
            }
            current.push_str(word);
            continue;
        }
        if word_len <= width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(word);
            continue;
        }

        let mut remaining: Vec<char> = word.chars().collect();
        let space_left = width.saturating_sub(current_len + separator);
        if !current.is_empty() && space_left > 0 {
            current.push(' ');
            current.extend(remaining.drain(..space_left));
        }
        for piece in remaining.chunks(width.max(1)) {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.extend(piece);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
