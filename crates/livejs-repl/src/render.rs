use colored::{ColoredString, Colorize};
use itertools::Itertools;
use livejs_lang::{Color, ColoredElement, Content, ExecutionResult, flatten};

const GUTTER_WIDTH: usize = 4;

fn paint(text: &str, color: Option<Color>) -> ColoredString {
    match color {
        Some(Color::True) => text.bright_green(),
        Some(Color::False) => text.bright_red(),
        Some(Color::Number) => text.yellow(),
        Some(Color::String) => text.green(),
        Some(Color::Gray) => text.bright_black(),
        Some(Color::Error) => text.red(),
        None => text.normal(),
    }
}

/// Renders an element's leaves with their colours.
pub fn colorize(element: &ColoredElement) -> String {
    flatten(element)
        .iter()
        .filter_map(|leaf| match &leaf.content {
            Content::Text(text) => Some(paint(text, leaf.color).to_string()),
            Content::Elements(_) => None,
        })
        .join("")
}

/// `line │ value`, with continuation lines aligned under the value.
pub fn render_result(result: &ExecutionResult) -> String {
    let line = result
        .line_number
        .map(|line| line.to_string())
        .unwrap_or_default();
    let gutter = format!("{:>width$} │ ", line, width = GUTTER_WIDTH).bright_black();
    let continuation = format!("{:>width$} │ ", "", width = GUTTER_WIDTH).bright_black();

    colorize(&result.element)
        .lines()
        .enumerate()
        .map(|(index, text)| {
            let prefix = if index == 0 { &gutter } else { &continuation };
            format!("{}{}", prefix, text)
        })
        .join("\n")
}
