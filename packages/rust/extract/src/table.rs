//! Legacy idea-table decoder.
//!
//! Early idea-generation responses were markdown tables:
//!
//! ```text
//! | Stock Ticker | Reasons for Selection |
//! |:-------------|:----------------------|
//! | **AAPL**     | Strong customer loyalty. |
//! ```
//!
//! Each data row becomes an object keyed by the snake-cased column name,
//! with `Stock Ticker` mapped to `ticker` and `Reasons for Selection` to
//! `reason` so the rows line up with the JSON protocol.

use serde_json::{Map, Value};
use tracing::debug;

const TICKER_COLUMN: &str = "Stock Ticker";

/// Decode the first ticker table found in `raw` into an array of rows.
pub(crate) fn decode_table(raw: &str) -> Option<Value> {
    let lines: Vec<&str> = raw.lines().collect();

    let header_idx = lines
        .iter()
        .position(|l| split_row(l).iter().any(|c| c == TICKER_COLUMN))?;

    let separator_idx = (header_idx + 1..lines.len()).find(|&i| is_separator(lines[i]))?;

    let columns: Vec<String> = split_row(lines[header_idx])
        .iter()
        .map(|c| column_key(c))
        .collect();
    let ticker_col = columns.iter().position(|c| c == "ticker")?;

    let mut rows = Vec::new();
    for line in &lines[separator_idx + 1..] {
        if !line.trim_start().starts_with('|') {
            break;
        }
        let cells = split_row(line);
        let Some(ticker) = cells.get(ticker_col).map(|c| c.replace('*', "").trim().to_string())
        else {
            continue;
        };
        if ticker.is_empty() {
            continue;
        }

        let mut row = Map::new();
        for (key, cell) in columns.iter().zip(cells.iter()) {
            let value = if key == "ticker" { ticker.clone() } else { cell.clone() };
            row.insert(key.clone(), Value::String(value));
        }
        rows.push(Value::Object(row));
    }

    if rows.is_empty() {
        debug!("ticker table header found but no rows");
        return None;
    }
    Some(Value::Array(rows))
}

/// Non-empty, trimmed cells of a `| a | b |` row.
fn split_row(line: &str) -> Vec<String> {
    line.split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

/// `|:---|:---|` style separator row.
fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains("---")
        && trimmed.chars().all(|c| matches!(c, '|' | ':' | '-' | ' '))
}

fn column_key(header: &str) -> String {
    match header {
        TICKER_COLUMN => "ticker".into(),
        "Reasons for Selection" => "reason".into(),
        other => other
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_ascii_lowercase)
            .collect::<Vec<_>>()
            .join("_"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_rows_after_separator() {
        let raw = "\
Top ideas:

| Stock Ticker | Reasons for Selection |
|:-------------|:----------------------|
| **AAPL** | Strong customer loyalty. |
| MSFT | Cloud growth. |

Those are my picks.";
        assert_eq!(
            decode_table(raw),
            Some(json!([
                {"ticker": "AAPL", "reason": "Strong customer loyalty."},
                {"ticker": "MSFT", "reason": "Cloud growth."},
            ]))
        );
    }

    #[test]
    fn extra_columns_are_snake_cased() {
        let raw = "| Stock Ticker | Market Cap (B) |\n|---|---|\n| NVDA | 3000 |";
        assert_eq!(decode_table(raw), Some(json!([{"ticker": "NVDA", "market_cap_b": "3000"}])));
    }

    #[test]
    fn missing_separator_declines() {
        let raw = "| Stock Ticker | Reasons for Selection |\n| AAPL | loyal |";
        assert_eq!(decode_table(raw), None);
    }

    #[test]
    fn table_without_ticker_column_declines() {
        let raw = "| Name | Note |\n|:--|:--|\n| a | b |";
        assert_eq!(decode_table(raw), None);
    }

    #[test]
    fn header_only_declines() {
        let raw = "| Stock Ticker | Reasons for Selection |\n|:--|:--|\n";
        assert_eq!(decode_table(raw), None);
    }
}
