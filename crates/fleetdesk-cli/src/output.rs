use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns, two spaces apart. Widths count characters, not
/// bytes, so names with non-ASCII letters line up.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    for line in render_table(headers, &rows) {
        println!("{line}");
    }
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let pad = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(pad(headers.iter().map(|h| h.to_string()).collect()));
    lines.push(pad(widths.iter().map(|&w| "-".repeat(w)).collect()));
    lines.extend(rows.iter().map(|r| pad(r.clone())));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_to_widest_cell() {
        let lines = render_table(
            &["ID", "NAME"],
            &[
                vec!["1".into(), "Acme".into()],
                vec!["12".into(), "Dhaka Couriers".into()],
            ],
        );
        assert_eq!(lines[0], "ID  NAME");
        assert_eq!(lines[1], "--  --------------");
        assert_eq!(lines[2], "1   Acme");
        assert_eq!(lines[3], "12  Dhaka Couriers");
    }

    #[test]
    fn width_counts_characters() {
        let lines = render_table(&["N"], &[vec!["Ünïcødé".into()]]);
        assert_eq!(lines[1], "-------");
    }
}
