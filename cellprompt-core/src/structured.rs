//! Structured output: response schemas and grid parsing
//!
//! A structured answer is a JSON object with a single `data` field holding a
//! list (row or column) or a list of lists (range) of strings. Parsing is
//! total: anything that does not match yields `None` and the caller shows the
//! raw text instead.

use crate::protocol::{OutputShape, Prompt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Rectangular grid of cell values, row-major
pub type Grid = Vec<Vec<String>>;

/// JSON schema asking the model for `shape`, or `None` for plain text
pub fn json_schema(shape: OutputShape) -> Option<Value> {
    let data = match shape {
        OutputShape::None => return None,
        OutputShape::Row | OutputShape::Column => json!({
            "type": "array",
            "items": { "type": "string" }
        }),
        OutputShape::Range => json!({
            "type": "array",
            "items": {
                "type": "array",
                "items": { "type": "string" }
            }
        }),
    };

    Some(json!({
        "type": "object",
        "properties": { "data": data },
        "required": ["data"],
        "additionalProperties": false
    }))
}

/// Parse `text` into a grid laid out as `shape`
pub fn parse(text: &str, shape: OutputShape) -> Option<Grid> {
    if shape == OutputShape::None {
        return None;
    }

    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return None;
    }

    let value: Value = serde_json::from_str(trimmed).ok()?;
    let data = value.as_object()?.get("data")?.as_array()?;
    if data.is_empty() {
        return None;
    }

    match shape {
        OutputShape::None => None,
        OutputShape::Row => Some(vec![strings(data)?]),
        OutputShape::Column => Some(strings(data)?.into_iter().map(|cell| vec![cell]).collect()),
        OutputShape::Range => {
            let mut rows = data
                .iter()
                .map(|row| strings(row.as_array()?))
                .collect::<Option<Grid>>()?;
            let width = rows.iter().map(Vec::len).max().unwrap_or(0);
            if width == 0 {
                return None;
            }
            for row in &mut rows {
                row.resize(width, String::new());
            }
            Some(rows)
        }
    }
}

/// Cell text for scalars; nested arrays or objects do not fit a cell
fn cell(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn strings(values: &[Value]) -> Option<Vec<String>> {
    values.iter().map(cell).collect()
}

/// What a cell formula finally displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CellOutput {
    /// Raw text in a single cell
    Text(String),
    /// A spilled grid of cells
    Grid(Grid),
}

impl CellOutput {
    /// Render the last assistant answer of `prompt` for its output shape
    pub fn from_prompt(prompt: &Prompt) -> Self {
        Self::from_text(prompt.last_assistant_text().unwrap_or_default(), prompt.output_shape)
    }

    /// Render `text` for `shape`, falling back to the raw text
    pub fn from_text(text: &str, shape: OutputShape) -> Self {
        match parse(text, shape) {
            Some(grid) => CellOutput::Grid(grid),
            None => CellOutput::Text(text.to_string()),
        }
    }

    /// Render a dispatch result, showing errors as their sentinel
    pub fn from_result(result: &crate::ClientResult<Prompt>) -> Self {
        match result {
            Ok(prompt) => Self::from_prompt(prompt),
            Err(error) => CellOutput::Text(error.sentinel().to_string()),
        }
    }
}
