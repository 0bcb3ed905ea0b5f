//! Table Renderers
//!
//! 表ブロックをMarkdownテーブルまたはHTMLテーブルとして出力する。

use std::io::Write;

use unicode_width::UnicodeWidthStr;

use crate::error::XlsxRagError;
use crate::section::TableBlock;

/// Markdownテーブルとして出力
///
/// 結合範囲内のセルにはアンカーセルの内容を複製します（Markdownには結合の表現がないため）。
/// 列幅は表示幅（全角文字は2）で揃え、最小幅は3文字です。
pub(crate) fn render_markdown<W: Write>(table: &TableBlock, writer: &mut W) -> Result<(), XlsxRagError> {
    let matrix = display_matrix(table);
    if matrix.is_empty() {
        return Ok(());
    }

    // 1. 列幅の計算
    let cols = matrix.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![3; cols];
    for row in &matrix {
        for (col, text) in row.iter().enumerate() {
            widths[col] = widths[col].max(text.width());
        }
    }

    // 2. 各行の出力（ヘッダー行の後に区切り行）
    for (row_idx, row) in matrix.iter().enumerate() {
        write!(writer, "|")?;
        for (col, width) in widths.iter().enumerate() {
            let text = row.get(col).map(String::as_str).unwrap_or("");
            let padding = width.saturating_sub(text.width());
            write!(writer, " {}{} |", text, " ".repeat(padding))?;
        }
        writeln!(writer)?;

        if row_idx == 0 {
            write!(writer, "|")?;
            for width in &widths {
                write!(writer, "{}|", "-".repeat(width + 2))?;
            }
            writeln!(writer)?;
        }
    }

    Ok(())
}

/// エスケープ済みの表示文字列（結合範囲は複製済み）
fn display_matrix(table: &TableBlock) -> Vec<Vec<String>> {
    let height = table.rows.len() + 1;
    let width = table.header.len();
    (0..height)
        .map(|row| {
            (0..width)
                .map(|col| {
                    let text = match table.span_covering(row, col) {
                        Some(span) => table.cell_text(span.row, span.col),
                        None => table.cell_text(row, col),
                    };
                    escape_markdown(text)
                })
                .collect()
        })
        .collect()
}

/// HTMLテーブルとして出力
///
/// 結合範囲はアンカーセルの`rowspan`/`colspan`で表現し、範囲内の他のセルは出力しません。
pub(crate) fn render_html<W: Write>(table: &TableBlock, writer: &mut W) -> Result<(), XlsxRagError> {
    writeln!(writer, "<table>")?;

    let height = table.rows.len() + 1;
    for row in 0..height {
        writeln!(writer, "  <tr>")?;
        let tag = if row == 0 { "th" } else { "td" };

        for col in 0..table.header.len() {
            let span = table.span_covering(row, col);
            if let Some(s) = span {
                if s.row != row || s.col != col {
                    continue;
                }
            }

            match span {
                Some(s) => write!(
                    writer,
                    "    <{} rowspan=\"{}\" colspan=\"{}\">",
                    tag, s.rowspan, s.colspan
                )?,
                None => write!(writer, "    <{}>", tag)?,
            }
            writeln!(writer, "{}</{}>", escape_html(table.cell_text(row, col)), tag)?;
        }

        writeln!(writer, "  </tr>")?;
    }

    writeln!(writer, "</table>")?;
    Ok(())
}

/// Markdownテーブル内の特殊文字をエスケープ
pub(crate) fn escape_markdown(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

/// HTMLの特殊文字をエスケープ
pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::TableRegion;
    use crate::section::CellSpan;
    use crate::types::{CellCoord, CellRange};

    fn table(header: &[&str], rows: &[&[&str]], spans: Vec<CellSpan>) -> TableBlock {
        let to_strings = |r: &[&str]| r.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        TableBlock {
            region: TableRegion {
                sheet_id: "S".to_string(),
                range: CellRange::new(
                    CellCoord::new(0, 0),
                    CellCoord::new(rows.len() as u32, header.len() as u32 - 1),
                ),
                header_row_index: 0,
                column_count: header.len() as u32,
                row_count: rows.len() as u32 + 1,
                truncated_columns: 0,
            },
            header: to_strings(header),
            rows: rows.iter().map(|r| to_strings(r)).collect(),
            spans,
            summary: None,
        }
    }

    fn render(f: fn(&TableBlock, &mut Vec<u8>) -> Result<(), XlsxRagError>, t: &TableBlock) -> String {
        let mut buf = Vec::new();
        f(t, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_markdown_padding_and_separator() {
        let t = table(&["Name", "Qty"], &[&["Apple", "3"]], vec![]);
        assert_eq!(
            render(render_markdown, &t),
            "| Name  | Qty |\n|-------|-----|\n| Apple | 3   |\n"
        );
    }

    #[test]
    fn test_markdown_wide_characters() {
        let t = table(&["品目", "数"], &[&["りんご", "3"]], vec![]);
        let out = render(render_markdown, &t);
        assert!(out.starts_with("| 品目   | 数  |\n"));
        assert!(out.contains("| りんご | 3   |"));
    }

    #[test]
    fn test_markdown_escapes_pipes_and_newlines() {
        let t = table(&["A", "B"], &[&["x|y", "line1\nline2"]], vec![]);
        let out = render(render_markdown, &t);
        assert!(out.contains("x\\|y"));
        assert!(out.contains("line1<br>line2"));
    }

    #[test]
    fn test_markdown_duplicates_merged_content() {
        let span = CellSpan { row: 0, col: 0, rowspan: 1, colspan: 2 };
        let t = table(&["Group", "", "C"], &[&["a", "b", "c"]], vec![span]);
        let out = render(render_markdown, &t);
        assert!(out.starts_with("| Group | Group | C   |\n"));
    }

    #[test]
    fn test_html_spans() {
        let span = CellSpan { row: 1, col: 0, rowspan: 2, colspan: 1 };
        let t = table(&["Region", "Sales"], &[&["East", "10"], &["", "20"]], vec![span]);
        let out = render(render_html, &t);
        assert!(out.contains("<th>Region</th>"));
        assert!(out.contains("<td rowspan=\"2\" colspan=\"1\">East</td>"));
        assert_eq!(out.matches("<td").count(), 3);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }
}
