pub mod detail;

use crate::filter::FilterRow;

/// One line of the filter editor: indentation, check mark, then the last
/// path segment of the event type.
pub fn filter_row_text(row: &FilterRow, separator: char) -> String {
    let mark = if row.checked {
        "[x]"
    } else if row.partial {
        "[-]"
    } else {
        "[ ]"
    };
    let name = row
        .name
        .rsplit_once(separator)
        .map(|(_, last)| last)
        .filter(|last| !last.is_empty())
        .unwrap_or(&row.name);
    let suffix = if row.has_children {
        format!("{}{}*", name, separator)
    } else {
        name.to_string()
    };

    format!("{}{} {}", "  ".repeat(row.depth), mark, suffix)
}
