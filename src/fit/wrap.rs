use crate::fonts::FontAsset;

use super::FittedLine;

/// Width comparisons tolerate float noise from summing advances.
pub(crate) const WIDTH_EPSILON: f32 = 0.01;

/// Greedy left-to-right word wrap at `size`. Explicit newlines start a new
/// line; a word wider than `max_width` on its own is split at the last
/// character boundary that still fits.
pub fn wrap_text(text: &str, max_width: f32, font: &FontAsset, size: f32) -> Vec<FittedLine> {
    let space = font.advance(' ', size);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0.0f32;
        let mut any_word = false;

        for word in paragraph.split_whitespace() {
            any_word = true;
            let word_width = font.measure(word, size);
            if !current.is_empty() {
                if current_width + space + word_width <= max_width + WIDTH_EPSILON {
                    current.push(' ');
                    current.push_str(word);
                    current_width += space + word_width;
                    continue;
                }
                lines.push(FittedLine::new(std::mem::take(&mut current), current_width));
                current_width = 0.0;
            }
            if word_width <= max_width + WIDTH_EPSILON {
                current.push_str(word);
                current_width = word_width;
                continue;
            }
            let mut chunks = split_word(word, max_width, font, size);
            if let Some(last) = chunks.pop() {
                lines.extend(chunks);
                current = last.text;
                current_width = last.width;
            }
        }

        if !current.is_empty() || !any_word {
            lines.push(FittedLine::new(current, current_width));
        }
    }

    // A trailing newline should not cost a whole line.
    while lines.len() > 1 && lines.last().is_some_and(|line| line.text.is_empty()) {
        lines.pop();
    }
    lines
}

fn split_word(word: &str, max_width: f32, font: &FontAsset, size: f32) -> Vec<FittedLine> {
    let mut chunks = Vec::new();
    let mut chunk = String::new();
    let mut width = 0.0f32;
    for ch in word.chars() {
        let advance = font.advance(ch, size);
        if !chunk.is_empty() && width + advance > max_width + WIDTH_EPSILON {
            chunks.push(FittedLine::new(std::mem::take(&mut chunk), width));
            width = 0.0;
        }
        chunk.push(ch);
        width += advance;
    }
    if !chunk.is_empty() {
        chunks.push(FittedLine::new(chunk, width));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontStyle;

    fn texts(lines: &[FittedLine]) -> Vec<&str> {
        lines.iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn wraps_greedily_on_word_boundaries() {
        let font = FontAsset::builtin(FontStyle::Regular);
        // "Hello" is 27.336 wide at 12pt, a space 3.336.
        let lines = wrap_text("Hello Hello Hello", 60.0, &font, 12.0);
        assert_eq!(texts(&lines), vec!["Hello Hello", "Hello"]);
        assert!((lines[0].width - 58.008).abs() < 0.01);
    }

    #[test]
    fn hard_splits_words_wider_than_the_box() {
        let font = FontAsset::builtin(FontStyle::Regular);
        // Each "o" is 5.56 wide at 10pt: four fit in 23.
        let lines = wrap_text("oooooooooo", 23.0, &font, 10.0);
        assert_eq!(texts(&lines), vec!["oooo", "oooo", "oo"]);
    }

    #[test]
    fn keeps_explicit_line_breaks() {
        let font = FontAsset::builtin(FontStyle::Regular);
        let lines = wrap_text("a\n\nb\n", 100.0, &font, 10.0);
        assert_eq!(texts(&lines), vec!["a", "", "b"]);
    }
}
