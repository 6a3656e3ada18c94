use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Spans that must reach the output byte for byte, in matching priority.
/// Earlier patterns win; later ones run over the already-masked text.
static PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("CODE_BLOCK", r"(?s)```.*?```"),
        ("MATH_DISP", r"(?s)\$\$.+?\$\$"),
        ("MATH_DISP", r"(?s)\\\[.+?\\\]"),
        ("LATEX_ENV", r"(?s)\\begin\{[A-Za-z*]+\}.*?\\end\{[A-Za-z*]+\}"),
        ("CODE_INLINE", r"`[^`\n]+`"),
        ("MATH_INLINE", r"\$[^$\n]+?\$"),
        ("MATH_INLINE", r"\\\(.+?\\\)"),
        ("SYM", r"[©®™]"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("Invalid protection regex")))
    .collect()
});

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[A-Z_]+_\d+\]").expect("Invalid placeholder regex"));

/// A source string with its technical spans swapped for placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protected {
    pub text: String,
    /// `(placeholder, original)` in the order they were taken.
    pub spans: Vec<(String, String)>,
}

impl Protected {
    /// Text left after the placeholders is only whitespace, digits or
    /// punctuation, so there is nothing for a translator to do.
    pub fn is_inert(&self) -> bool {
        PLACEHOLDER
            .replace_all(&self.text, "")
            .chars()
            .all(|ch| ch.is_whitespace() || ch.is_ascii_digit() || ch.is_ascii_punctuation())
    }

    /// Puts the original spans back into `translated`. A placeholder the
    /// translator dropped is simply not restored.
    pub fn restore(&self, translated: &str) -> String {
        // Later spans may contain earlier placeholders, so unwind in reverse.
        let mut out = translated.to_string();
        for (placeholder, original) in self.spans.iter().rev() {
            out = out.replace(placeholder.as_str(), original);
        }
        out
    }
}

pub fn protect(text: &str) -> Protected {
    let mut masked = text.to_string();
    let mut spans = Vec::new();
    let mut counters: HashMap<&str, usize> = HashMap::new();

    for (name, regex) in PATTERNS.iter() {
        if !regex.is_match(&masked) {
            continue;
        }
        masked = regex
            .replace_all(&masked, |caps: &regex::Captures| {
                let counter = counters.entry(*name).or_insert(0usize);
                *counter += 1;
                let placeholder = format!("[{}_{}]", name, counter);
                spans.push((placeholder.clone(), caps[0].to_string()));
                placeholder
            })
            .into_owned();
    }

    Protected { text: masked, spans }
}

/// Leaves the text untouched; used when protection is switched off.
pub fn passthrough(text: &str) -> Protected {
    Protected {
        text: text.to_string(),
        spans: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_and_code_become_placeholders() {
        let protected = protect("Solve $x^2 = 4$ with `solve()` first.");
        insta::assert_snapshot!(protected.text, @"Solve [MATH_INLINE_1] with [CODE_INLINE_1] first.");
        assert_eq!(
            protected.spans,
            vec![
                ("[CODE_INLINE_1]".to_string(), "`solve()`".to_string()),
                ("[MATH_INLINE_1]".to_string(), "$x^2 = 4$".to_string()),
            ]
        );
    }

    #[test]
    fn restore_survives_reworded_text() {
        let protected = protect("Solve $x^2 = 4$ with `solve()` first.");
        let translated = "D'abord, résolvez [MATH_INLINE_1] avec [CODE_INLINE_1].";
        assert_eq!(
            protected.restore(translated),
            "D'abord, résolvez $x^2 = 4$ avec `solve()`."
        );
    }

    #[test]
    fn display_math_wins_over_inline_math() {
        let protected = protect("Energy: $$E = mc^2$$ and \\[a+b\\]");
        assert_eq!(protected.text, "Energy: [MATH_DISP_1] and [MATH_DISP_2]");
        assert_eq!(protected.restore(&protected.text), "Energy: $$E = mc^2$$ and \\[a+b\\]");
    }

    #[test]
    fn fenced_code_keeps_inner_backticks() {
        let text = "Run:\n```\nlet s = `x`;\n```\ndone";
        let protected = protect(text);
        assert_eq!(protected.text, "Run:\n[CODE_BLOCK_1]\ndone");
        assert_eq!(protected.restore("Lancez :\n[CODE_BLOCK_1]\nfini"), "Lancez :\n```\nlet s = `x`;\n```\nfini");
    }

    #[test]
    fn latex_environments_and_symbols() {
        let protected = protect("Acme™ shows \\begin{align}a &= b\\end{align} here ©");
        assert_eq!(protected.text, "Acme[SYM_1] shows [LATEX_ENV_1] here [SYM_2]");
        assert_eq!(protected.restore(&protected.text), "Acme™ shows \\begin{align}a &= b\\end{align} here ©");
    }

    #[test]
    fn dropped_placeholders_are_not_an_error() {
        let protected = protect("Price in $USD$ only");
        assert_eq!(protected.restore("Prix uniquement"), "Prix uniquement");
    }

    #[test]
    fn inert_strings_are_detected() {
        assert!(protect("$x$ + $y$ = 12").is_inert());
        assert!(protect("  42. ").is_inert());
        assert!(!protect("Total: $x$ apples").is_inert());
        assert!(!passthrough("Hello").is_inert());
    }

    #[test]
    fn many_spans_restore_without_prefix_clashes() {
        let text = (1..=11).map(|n| format!("`c{}`", n)).collect::<Vec<_>>().join(" and ");
        let protected = protect(&text);
        assert!(protected.text.contains("[CODE_INLINE_11]"));
        assert_eq!(protected.restore(&protected.text), text);
    }
}
