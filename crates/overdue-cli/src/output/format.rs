use serde_json::Value;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
pub struct Column<'a> {
    pub name: &'a str,
    pub align: Align,
}

const INDENT: &str = "  ";
const GAP: &str = "  ";
const NARROWEST_COLUMN: usize = 8;

/// `COLUMNS` when set, otherwise 120. Never narrower than 40.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(120)
        .max(40)
}

pub fn key_value_rows(entries: &[(&str, String)], indent: usize) -> Vec<String> {
    let width = entries.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|(label, value)| format!("{:indent$}{label:<width$}  {value}", ""))
        .collect()
}

/// Renders `rows` as an aligned table, wrapping cells that do not fit.
/// When even the narrowest table would overflow `max_width`, each row is
/// printed as a labelled block instead.
pub fn render_table_or_blocks(
    columns: &[Column<'_>],
    rows: &[Vec<String>],
    max_width: usize,
    block_label: &str,
) -> Vec<String> {
    if columns.is_empty() {
        return Vec::new();
    }

    let floors = columns
        .iter()
        .map(|column| column.name.len().max(NARROWEST_COLUMN))
        .collect::<Vec<_>>();
    let chrome = INDENT.len() + GAP.len() * (columns.len() - 1);
    let budget = max_width.saturating_sub(chrome);

    let wanted = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            rows.iter()
                .filter_map(|row| row.get(index))
                .map(|cell| cell.chars().count())
                .fold(column.name.len(), usize::max)
        })
        .collect::<Vec<_>>();

    let Some(widths) = fit_widths_to_budget(&wanted, &floors, budget) else {
        return render_blocks(columns, rows, block_label);
    };

    let header = columns
        .iter()
        .map(|column| column.name.to_string())
        .collect::<Vec<_>>();
    let mut output = vec![format_row(columns, &header, &widths)];

    for row in rows {
        let wrapped = widths
            .iter()
            .enumerate()
            .map(|(index, width)| wrap_text(row.get(index).map_or("", String::as_str), *width))
            .collect::<Vec<_>>();
        let height = wrapped.iter().map(Vec::len).max().unwrap_or(1);

        for line in 0..height {
            let cells = wrapped
                .iter()
                .map(|chunks| chunks.get(line).cloned().unwrap_or_default())
                .collect::<Vec<_>>();
            output.push(format_row(columns, &cells, &widths));
        }
    }

    output
}

/// Shrinks the widest column one character at a time until the total fits.
/// `None` when the floors alone exceed the budget.
fn fit_widths_to_budget(wanted: &[usize], floors: &[usize], budget: usize) -> Option<Vec<usize>> {
    if wanted.len() != floors.len() || floors.iter().sum::<usize>() > budget {
        return None;
    }

    let mut widths = wanted
        .iter()
        .zip(floors)
        .map(|(want, floor)| (*want).max(*floor))
        .collect::<Vec<_>>();
    let mut total = widths.iter().sum::<usize>();

    while total > budget {
        let widest = widths
            .iter()
            .zip(floors)
            .enumerate()
            .filter(|(_, (width, floor))| width > floor)
            .fold(None::<(usize, usize)>, |best, (index, (width, _))| match best {
                Some((_, best_width)) if best_width >= *width => best,
                _ => Some((index, *width)),
            })
            .map(|(index, _)| index)?;
        widths[widest] -= 1;
        total -= 1;
    }

    Some(widths)
}

fn format_row(columns: &[Column<'_>], cells: &[String], widths: &[usize]) -> String {
    let pieces = columns
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(index, (column, width))| {
            let value = cells.get(index).map_or("", String::as_str);
            match column.align {
                Align::Left => format!("{value:<width$}"),
                Align::Right => format!("{value:>width$}"),
            }
        })
        .collect::<Vec<_>>();

    format!("{INDENT}{}", pieces.join(GAP).trim_end())
}

/// Greedy word wrap; words longer than `width` are cut into chunks.
fn wrap_text(value: &str, width: usize) -> Vec<String> {
    if width == 0 || value.chars().count() <= width {
        return vec![value.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in value.split_whitespace() {
        let pieces = if word.chars().count() > width {
            split_long_token(word, width)
        } else {
            vec![word.to_string()]
        };

        for piece in pieces {
            let joined = current.chars().count() + 1 + piece.chars().count();
            if current.is_empty() {
                current = piece;
            } else if joined <= width {
                current.push(' ');
                current.push_str(&piece);
            } else {
                lines.push(std::mem::replace(&mut current, piece));
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn split_long_token(token: &str, width: usize) -> Vec<String> {
    let chars = token.chars().collect::<Vec<_>>();
    chars
        .chunks(width.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn render_blocks(columns: &[Column<'_>], rows: &[Vec<String>], block_label: &str) -> Vec<String> {
    let label_width = columns.iter().map(|column| column.name.len() + 1).max().unwrap_or(0);

    let mut output = Vec::new();
    for (number, row) in rows.iter().enumerate() {
        if number > 0 {
            output.push(String::new());
        }
        output.push(format!("{INDENT}{block_label} {}:", number + 1));
        for (column, value) in columns.iter().zip(row) {
            let label = format!("{}:", column.name);
            output.push(format!("{INDENT}{INDENT}{label:<label_width$}  {value}"));
        }
    }

    output
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

pub fn text_or_dash(value: &Value, key: &str) -> String {
    str_field(value, key).unwrap_or("-").to_string()
}

pub fn count_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

/// Formats a money amount with two decimals and its currency code.
pub fn money(amount: Option<f64>, currency: Option<&str>) -> String {
    match (amount, currency) {
        (Some(amount), Some(currency)) => format!("{amount:.2} {currency}"),
        (Some(amount), None) => format!("{amount:.2}"),
        (None, _) => "-".to_string(),
    }
}

pub fn money_field(value: &Value, key: &str) -> String {
    money(
        value.get(key).and_then(Value::as_f64),
        str_field(value, "currency"),
    )
}

/// Date part of an RFC 3339 timestamp.
pub fn date_field(value: &Value, key: &str) -> String {
    match str_field(value, key) {
        Some(timestamp) => timestamp.get(..10).unwrap_or(timestamp).to_string(),
        None => "-".to_string(),
    }
}

/// "level2" reads as "2"; a clean invoice reads as "0".
pub fn level_label(value: &Value, key: &str) -> String {
    match str_field(value, key) {
        Some("clean") => "0".to_string(),
        Some(level) => level.trim_start_matches("level").to_string(),
        None => "-".to_string(),
    }
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

pub fn plural(count: i64, singular: &str, many: &str) -> String {
    if count == 1 {
        format!("1 {singular}")
    } else {
        format!("{count} {many}")
    }
}
