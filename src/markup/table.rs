//! Pipe-table parsing and rendering

use std::sync::LazyLock;

use regex_lite::Regex;

static DELIMITER_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\|[-:\s|]*\|\s*$").expect("delimiter row pattern is valid")
});

/// Table column alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableAlignment {
    #[default]
    Left,
    Center,
    Right,
}

impl TableAlignment {
    /// Derive the alignment from a delimiter-row cell such as `:---:`
    pub fn from_delimiter(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.starts_with(':') && cell.ends_with(':') {
            TableAlignment::Center
        } else if cell.ends_with(':') {
            TableAlignment::Right
        } else {
            TableAlignment::Left
        }
    }

    /// CSS class name used on `<th>`/`<td>`
    pub fn class(&self) -> &'static str {
        match self {
            TableAlignment::Left => "text-left",
            TableAlignment::Center => "text-center",
            TableAlignment::Right => "text-right",
        }
    }
}

/// A parsed pipe table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLayout {
    pub headers: Vec<String>,
    /// May hold fewer entries than `headers`; missing columns are left-aligned
    pub alignments: Vec<TableAlignment>,
    pub rows: Vec<Vec<String>>,
}

impl TableLayout {
    /// Parse a block as a table
    ///
    /// Returns `None` when the block has fewer than two lines or the second
    /// line is not a delimiter row.
    pub fn parse(block: &str) -> Option<Self> {
        let rows: Vec<&str> = block.trim().split('\n').collect();
        if rows.len() < 2 {
            return None;
        }

        let delimiter = rows[1];
        if !DELIMITER_ROW_RE.is_match(delimiter) {
            return None;
        }

        let alignments = delimiter
            .split('|')
            .filter(|cell| !cell.trim().is_empty())
            .map(TableAlignment::from_delimiter)
            .collect();

        Some(Self {
            headers: split_row(rows[0]),
            alignments,
            rows: rows[2..].iter().map(|row| split_row(row)).collect(),
        })
    }

    /// Alignment of a column, defaulting to left
    pub fn alignment(&self, column: usize) -> TableAlignment {
        self.alignments.get(column).copied().unwrap_or_default()
    }

    /// Render the table fragment
    pub fn to_html(&self) -> String {
        let mut html = String::from("<div class=\"table-wrapper\"><table><thead><tr>");
        for (i, cell) in self.headers.iter().enumerate() {
            html.push_str(&format!("<th class=\"{}\">{}</th>", self.alignment(i).class(), cell));
        }
        html.push_str("</tr></thead><tbody>");
        for row in &self.rows {
            html.push_str("<tr>");
            for (i, cell) in row.iter().enumerate() {
                html.push_str(&format!("<td class=\"{}\">{}</td>", self.alignment(i).class(), cell));
            }
            html.push_str("</tr>");
        }
        html.push_str("</tbody></table></div>");
        html
    }
}

/// Split a table row on `|`, dropping the outermost cells and trimming the rest
fn split_row(row: &str) -> Vec<String> {
    let cells: Vec<&str> = row.split('|').collect();
    if cells.len() < 2 {
        return Vec::new();
    }
    cells[1..cells.len() - 1]
        .iter()
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// Render `block` as a table, or return it verbatim if it is not one
pub fn render_table(block: &str) -> String {
    match TableLayout::parse(block) {
        Some(table) => table.to_html(),
        None => block.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_table() {
        let table = TableLayout::parse("| a | b |\n|---|---|\n| 1 | 2 |").unwrap();
        assert_eq!(table.headers, vec!["a", "b"]);
        assert_eq!(
            table.alignments,
            vec![TableAlignment::Left, TableAlignment::Left]
        );
        assert_eq!(table.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn test_alignment_detection() {
        let table = TableLayout::parse("| a | b | c |\n|:---:|---:|:---|").unwrap();
        assert_eq!(
            table.alignments,
            vec![
                TableAlignment::Center,
                TableAlignment::Right,
                TableAlignment::Left
            ]
        );
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_invalid_delimiter_returns_block_verbatim() {
        let block = "| a | b |\n| not | delimiter |\n| 1 | 2 |";
        assert_eq!(render_table(block), block);

        let block = "a | b\nplain second line";
        assert_eq!(render_table(block), block);
    }

    #[test]
    fn test_ragged_rows_do_not_panic() {
        let html = render_table("| a | b |\n|---|\n| 1 | 2 | 3 |\n| x |");
        assert!(html.contains("<th class=\"text-left\">b</th>"));
        assert!(html.contains("<td class=\"text-left\">3</td>"));
        assert!(html.contains("<tr><td class=\"text-left\">x</td></tr>"));
    }

    #[test]
    fn test_rendered_fragment_structure() {
        let html = render_table("| a | b |\n|---|--:|\n| 1 | 2 |");
        assert_eq!(
            html,
            "<div class=\"table-wrapper\"><table><thead><tr>\
             <th class=\"text-left\">a</th><th class=\"text-right\">b</th>\
             </tr></thead><tbody><tr>\
             <td class=\"text-left\">1</td><td class=\"text-right\">2</td>\
             </tr></tbody></table></div>"
        );
    }
}
