//! CLI input and result files.

use crate::error::ApiError;
use crate::types::{Item, ItemId, Outcome};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

#[derive(Deserialize)]
struct InputRecord {
    id: Value,
    text: String,
}

impl InputRecord {
    fn into_item(self, position: usize) -> Result<Item, ApiError> {
        let id = match self.id {
            Value::String(id) => id,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(ApiError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("input record {} has a non-scalar id: {}", position, other),
                )))
            }
        };
        Ok(Item::new(id, self.text))
    }
}

/// Read items from a JSON array (`.json`) or JSON Lines (`.jsonl`) file.
pub fn load_items(path: &Path) -> Result<Vec<Item>, ApiError> {
    let raw = std::fs::read_to_string(path)?;
    let is_jsonl = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"));

    let records: Vec<InputRecord> = if is_jsonl {
        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_no, line)| {
                serde_json::from_str(line).map_err(|e| invalid_input(path, line_no + 1, e))
            })
            .collect::<Result<_, _>>()?
    } else {
        serde_json::from_str(&raw).map_err(|e| invalid_input(path, e.line(), e))?
    };

    records
        .into_iter()
        .enumerate()
        .map(|(position, record)| record.into_item(position))
        .collect()
}

fn invalid_input(path: &Path, line: usize, err: serde_json::Error) -> ApiError {
    ApiError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("{}:{}: {}", path.display(), line, err),
    ))
}

/// `{ id: { ok, summary | error } }` with keys in input order.
struct OrderedOutcomes<'a> {
    items: &'a [Item],
    outcomes: &'a HashMap<ItemId, Outcome>,
}

impl Serialize for OrderedOutcomes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.items.iter().filter_map(|item| {
            self.outcomes
                .get(&item.id)
                .map(|outcome| (item.id.as_str(), outcome))
        }))
    }
}

/// Write collected outcomes as one pretty JSON object.
pub fn write_outcomes(
    writer: &mut dyn Write,
    items: &[Item],
    outcomes: &HashMap<ItemId, Outcome>,
) -> Result<(), ApiError> {
    let ordered = OrderedOutcomes { items, outcomes };
    serde_json::to_writer_pretty(&mut *writer, &ordered)
        .map_err(|e| ApiError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    writeln!(writer)?;
    Ok(())
}
