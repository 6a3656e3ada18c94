//! Fits a translated string into a fixed box: wrap, shrink to a floor size,
//! then truncate or clip according to the configured overflow policy.

mod wrap;

pub use wrap::wrap_text;

use serde::Serialize;

use crate::fonts::FontAsset;
use crate::model::BBox;
use wrap::WIDTH_EPSILON;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Keep the lines that fit and end the last one with the ellipsis.
    /// A box too short for a single line keeps no text at all.
    Truncate,
    /// Keep one line past the box and let the renderer clip it.
    Clip,
}

impl OverflowPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "truncate" => Some(OverflowPolicy::Truncate),
            "clip" => Some(OverflowPolicy::Clip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitPolicy {
    /// Baseline-to-baseline distance as a multiple of the font size.
    pub line_height: f32,
    pub min_font_size: f32,
    pub step: f32,
    /// Used when the source unit carries no usable size.
    pub default_font_size: f32,
    pub overflow: OverflowPolicy,
    pub ellipsis: String,
}

impl Default for FitPolicy {
    fn default() -> Self {
        Self {
            line_height: 1.2,
            min_font_size: 4.0,
            step: 1.0,
            default_font_size: 11.0,
            overflow: OverflowPolicy::Truncate,
            ellipsis: "…".to_string(),
        }
    }
}

/// Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitQuality {
    Exact,
    Shrunk,
    OverflowedTruncated,
    OverflowedClipped,
}

impl FitQuality {
    pub fn is_overflow(self) -> bool {
        matches!(
            self,
            FitQuality::OverflowedTruncated | FitQuality::OverflowedClipped
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedLine {
    pub text: String,
    pub width: f32,
}

impl FittedLine {
    pub fn new(text: String, width: f32) -> Self {
        Self { text, width }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub font_size: f32,
    /// Absolute baseline-to-baseline distance.
    pub line_height: f32,
    pub lines: Vec<FittedLine>,
    pub quality: FitQuality,
}

impl FitResult {
    pub fn text_height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height
    }
}

/// Lays `text` out inside `bbox`.
///
/// Starts at `base_size` and steps down by `policy.step` until the wrapped
/// lines fit, so the largest fitting size wins. Below `policy.min_font_size`
/// (or `base_size`, if that is smaller) the overflow policy applies.
/// `max_lines` caps the line count on top of the box height.
pub fn fit(
    text: &str,
    bbox: &BBox,
    font: &FontAsset,
    base_size: f32,
    max_lines: Option<usize>,
    policy: &FitPolicy,
) -> FitResult {
    let base = if base_size.is_finite() && base_size > 0.0 {
        base_size
    } else {
        policy.default_font_size
    };
    let floor = policy.min_font_size.min(base).max(0.1);
    let step = if policy.step > 0.0 { policy.step } else { 1.0 };
    let factor = policy.line_height.max(0.1);

    if text.trim().is_empty() {
        return FitResult {
            font_size: base,
            line_height: base * factor,
            lines: Vec::new(),
            quality: FitQuality::Exact,
        };
    }

    let capacity = |size: f32| -> usize {
        let by_height = ((bbox.height + WIDTH_EPSILON) / (size * factor)).floor().max(0.0) as usize;
        max_lines.map_or(by_height, |cap| by_height.min(cap))
    };
    let fits_width =
        |lines: &[FittedLine]| lines.iter().all(|line| line.width <= bbox.width + WIDTH_EPSILON);

    let mut size = base;
    loop {
        let lines = wrap_text(text, bbox.width, font, size);
        let cap = capacity(size);
        if lines.len() <= cap && fits_width(&lines) {
            let quality = if size < base {
                FitQuality::Shrunk
            } else {
                FitQuality::Exact
            };
            return FitResult {
                font_size: size,
                line_height: size * factor,
                lines,
                quality,
            };
        }
        if size <= floor {
            return overflow(lines, cap, size, factor, bbox.width, font, policy);
        }
        size = (size - step).max(floor);
    }
}

fn overflow(
    mut lines: Vec<FittedLine>,
    capacity: usize,
    size: f32,
    factor: f32,
    max_width: f32,
    font: &FontAsset,
    policy: &FitPolicy,
) -> FitResult {
    let quality = match policy.overflow {
        OverflowPolicy::Truncate => {
            let cut = lines.len() > capacity;
            lines.truncate(capacity);
            let last = lines.len().saturating_sub(1);
            for (index, line) in lines.iter_mut().enumerate() {
                if (cut && index == last) || line.width > max_width + WIDTH_EPSILON {
                    *line = with_ellipsis(&line.text, max_width, font, size, &policy.ellipsis);
                }
            }
            FitQuality::OverflowedTruncated
        }
        OverflowPolicy::Clip => {
            lines.truncate((capacity + 1).max(1));
            FitQuality::OverflowedClipped
        }
    };

    FitResult {
        font_size: size,
        line_height: size * factor,
        lines,
        quality,
    }
}

/// Drops trailing characters until `text` plus the ellipsis fits. The
/// ellipsis itself is left out when it is wider than the box.
fn with_ellipsis(text: &str, max_width: f32, font: &FontAsset, size: f32, ellipsis: &str) -> FittedLine {
    let suffix = if font.measure(ellipsis, size) <= max_width + WIDTH_EPSILON {
        ellipsis
    } else {
        ""
    };
    let mut kept: String = text.to_string();
    loop {
        let candidate = format!("{}{}", kept.trim_end(), suffix);
        let width = font.measure(&candidate, size);
        if width <= max_width + WIDTH_EPSILON || kept.is_empty() {
            return FittedLine::new(candidate, width);
        }
        kept.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontStyle;

    fn builtin() -> FontAsset {
        FontAsset::builtin(FontStyle::Regular)
    }

    #[test]
    fn short_text_fits_exactly_at_base_size() {
        let result = fit(
            "Hello",
            &BBox::new(0.0, 0.0, 200.0, 20.0),
            &builtin(),
            12.0,
            None,
            &FitPolicy::default(),
        );
        assert_eq!(result.quality, FitQuality::Exact);
        assert_eq!(result.font_size, 12.0);
        assert_eq!(result.lines.len(), 1);
    }

    #[test]
    fn three_times_longer_text_wraps_or_shrinks_before_overflowing() {
        let result = fit(
            "Hello Hello Hello",
            &BBox::new(0.0, 0.0, 30.0, 20.0),
            &builtin(),
            12.0,
            None,
            &FitPolicy::default(),
        );
        assert_eq!(result.quality, FitQuality::Shrunk);
        assert_eq!(result.font_size, 6.0);
        assert_eq!(result.lines.len(), 2);
    }

    #[test]
    fn largest_fitting_size_wins() {
        // "Hello Hello" is 48.34 wide at 10pt and 53.17 at 11pt.
        let result = fit(
            "Hello Hello",
            &BBox::new(0.0, 0.0, 50.0, 12.0),
            &builtin(),
            14.0,
            None,
            &FitPolicy::default(),
        );
        assert_eq!(result.quality, FitQuality::Shrunk);
        assert_eq!(result.font_size, 10.0);
        assert_eq!(result.lines.len(), 1);
    }

    #[test]
    fn truncates_with_ellipsis_at_the_floor() {
        let text = "word ".repeat(60);
        let result = fit(
            &text,
            &BBox::new(0.0, 0.0, 40.0, 10.0),
            &builtin(),
            12.0,
            None,
            &FitPolicy::default(),
        );
        assert_eq!(result.quality, FitQuality::OverflowedTruncated);
        assert_eq!(result.font_size, 4.0);
        assert_eq!(result.lines.len(), 2);
        let last = result.lines.last().unwrap();
        assert!(last.text.ends_with('…'));
        assert!(last.width <= 40.0 + WIDTH_EPSILON);
    }

    #[test]
    fn clip_policy_keeps_one_extra_line() {
        let policy = FitPolicy {
            overflow: OverflowPolicy::Clip,
            ..FitPolicy::default()
        };
        let text = "word ".repeat(60);
        let result = fit(&text, &BBox::new(0.0, 0.0, 40.0, 10.0), &builtin(), 12.0, None, &policy);
        assert_eq!(result.quality, FitQuality::OverflowedClipped);
        assert_eq!(result.lines.len(), 3);
    }

    #[test]
    fn box_shorter_than_one_line_truncates_to_nothing() {
        let result = fit(
            "Hello world",
            &BBox::new(0.0, 0.0, 100.0, 2.0),
            &builtin(),
            12.0,
            None,
            &FitPolicy::default(),
        );
        assert_eq!(result.quality, FitQuality::OverflowedTruncated);
        assert!(result.lines.is_empty());
    }

    #[test]
    fn box_shorter_than_one_line_clips_under_the_clip_policy() {
        let policy = FitPolicy {
            overflow: OverflowPolicy::Clip,
            ..FitPolicy::default()
        };
        let result = fit("Hello world", &BBox::new(0.0, 0.0, 100.0, 2.0), &builtin(), 12.0, None, &policy);
        assert_eq!(result.quality, FitQuality::OverflowedClipped);
        assert_eq!(result.lines.len(), 1);
    }

    #[test]
    fn ellipsis_is_dropped_when_it_cannot_fit() {
        // At the 4pt floor "…" is 4.0 wide and "W" is 3.78.
        let result = fit("WWWW WWWW", &BBox::new(0.0, 0.0, 3.9, 5.0), &builtin(), 4.0, None, &FitPolicy::default());
        assert_eq!(result.quality, FitQuality::OverflowedTruncated);
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].text, "W");
        assert!(result.lines[0].width <= 3.9 + WIDTH_EPSILON);
    }

    #[test]
    fn max_lines_caps_the_layout() {
        let result = fit(
            "one two three four",
            &BBox::new(0.0, 0.0, 30.0, 200.0),
            &builtin(),
            10.0,
            Some(1),
            &FitPolicy::default(),
        );
        assert_eq!(result.quality, FitQuality::OverflowedTruncated);
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].text, "one two three…");
    }

    #[test]
    fn empty_text_has_no_lines() {
        let result = fit(
            "   ",
            &BBox::new(0.0, 0.0, 30.0, 20.0),
            &builtin(),
            0.0,
            None,
            &FitPolicy::default(),
        );
        assert!(result.lines.is_empty());
        assert_eq!(result.quality, FitQuality::Exact);
        assert_eq!(result.font_size, 11.0);
    }

    #[test]
    fn quality_degrades_monotonically_with_text_length() {
        let font = builtin();
        let bbox = BBox::new(0.0, 0.0, 120.0, 40.0);
        let policy = FitPolicy::default();
        let mut previous_quality = FitQuality::Exact;
        let mut previous_size = f32::MAX;
        for words in 1..120 {
            let text = vec!["lorem"; words].join(" ");
            let result = fit(&text, &bbox, &font, 12.0, None, &policy);
            assert!(result.quality >= previous_quality, "quality improved at {words} words");
            assert!(result.font_size <= previous_size, "font grew at {words} words");
            previous_quality = result.quality;
            previous_size = result.font_size;
        }
        assert_eq!(previous_quality, FitQuality::OverflowedTruncated);
    }

    #[test]
    fn line_count_never_drops_at_a_fixed_size() {
        let font = builtin();
        let bbox = BBox::new(0.0, 0.0, 120.0, 40.0);
        let policy = FitPolicy {
            min_font_size: 12.0,
            ..FitPolicy::default()
        };
        let mut previous_lines = 0;
        for words in 1..120 {
            let text = vec!["lorem"; words].join(" ");
            let result = fit(&text, &bbox, &font, 12.0, None, &policy);
            assert!(result.lines.len() >= previous_lines, "line count dropped at {words} words");
            previous_lines = result.lines.len();
        }
    }
}
