//! Markdown rendering for the hint-and-feedback timeline.

use std::fmt::Write;

use hintloop_core::HistoryItem;

/// Renders a reconciled, already-sorted history slice to Markdown.
///
/// Each item gets a numbered heading with its display label, a metadata
/// line with the timestamp and rating, and its content as a blockquote.
/// When the timeline has more than one item the first and last are tagged
/// `(earliest)` and `(latest)`.
pub struct TimelineGenerator<'a> {
    problem_id: &'a str,
    items: &'a [HistoryItem],
}

impl<'a> TimelineGenerator<'a> {
    /// Creates a generator for one problem's timeline.
    #[must_use]
    pub const fn new(problem_id: &'a str, items: &'a [HistoryItem]) -> Self {
        Self { problem_id, items }
    }

    /// Generates the complete Markdown document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "# Hint History: {}\n", self.problem_id);

        if self.items.is_empty() {
            let _ = writeln!(output, "*No hints or feedback yet.*");
            return output;
        }

        let last = self.items.len() - 1;
        for (index, item) in self.items.iter().enumerate() {
            self.write_item(&mut output, index, item, index == 0, index == last);
        }

        output
    }

    fn write_item(
        &self,
        output: &mut String,
        index: usize,
        item: &HistoryItem,
        is_first: bool,
        is_last: bool,
    ) {
        let edge = if self.items.len() < 2 {
            ""
        } else if is_first {
            " (earliest)"
        } else if is_last {
            " (latest)"
        } else {
            ""
        };

        let _ = writeln!(output, "## {}. {}{edge}\n", index + 1, item.label());
        let _ = writeln!(
            output,
            "*{} · {}*\n",
            item.created_at.format("%Y-%m-%d %H:%M UTC"),
            rating_marker(item.helpful)
        );

        match item.content.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(content) => {
                for line in content.lines() {
                    let _ = writeln!(output, "> {line}");
                }
                let _ = writeln!(output);
            }
            None => {
                let _ = writeln!(output, "*(no content)*\n");
            }
        }
    }
}

const fn rating_marker(helpful: Option<bool>) -> &'static str {
    match helpful {
        Some(true) => "rated helpful",
        Some(false) => "rated unhelpful",
        None => "unrated",
    }
}

// ============================================================================
// Tests
// ============================================================================
