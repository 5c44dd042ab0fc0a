//! Takeoff line items and table normalization.

use serde::{Deserialize, Serialize};

pub const DESCRIPTION_COLUMN: &str = "Description";
pub const QUANTITY_COLUMN: &str = "Quantity";
pub const SIZE_COLUMN: &str = "Size";

const EMPTY_CELL: &Cell = &Cell::Empty;

/// One row of a cost takeoff.
///
/// Items are addressed by their position in the scope's list; there is no
/// stable identifier, so a re-upload can shift which row an index refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateLineItem {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Quantity", default)]
    pub quantity: f64,
    #[serde(rename = "UOM", default)]
    pub uom: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl EstimateLineItem {
    pub fn new(description: impl Into<String>, quantity: f64, uom: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            quantity,
            uom: uom.into(),
            unit_price: None,
            total: None,
        }
    }

    /// Set the unit price and recompute the line total.
    pub fn set_unit_price(&mut self, unit_price: f64) {
        self.unit_price = Some(unit_price);
        self.total = Some(self.quantity * unit_price);
    }

    /// Priced items are the ones eligible for cost analysis.
    pub fn is_priced(&self) -> bool {
        self.quantity > 0.0 && self.total.is_some()
    }
}

/// A raw cell from an uploaded table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Render the cell as text; whole numbers drop their fractional part.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
        }
    }
}

/// A parsed upload with named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.trim() == name)
    }
}

/// Turn an uploaded takeoff table into line items.
///
/// Requires Description, Quantity and Size columns (names are compared after
/// trimming). Missing cells default to empty text or zero quantity, rows with
/// an empty description are dropped, and Size becomes the item's UOM.
pub fn normalize_takeoff(table: &Table) -> Result<Vec<EstimateLineItem>, String> {
    let required = [DESCRIPTION_COLUMN, QUANTITY_COLUMN, SIZE_COLUMN];
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| table.column_index(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(format!("Missing required columns: {}", missing.join(", ")));
    }

    // Presence checked above
    let [desc_idx, qty_idx, size_idx] =
        required.map(|name| table.column_index(name).unwrap_or_default());

    let mut items = Vec::with_capacity(table.rows.len());
    for (row_no, row) in table.rows.iter().enumerate() {
        let cell = |idx: usize| row.get(idx).unwrap_or(EMPTY_CELL);

        let description = cell(desc_idx).to_text();
        if description.is_empty() {
            continue;
        }

        let quantity = parse_quantity(cell(qty_idx))
            .map_err(|reason| format!("Row {}: {}", row_no + 1, reason))?;

        items.push(EstimateLineItem::new(
            description,
            quantity,
            cell(size_idx).to_text(),
        ));
    }

    Ok(items)
}

fn parse_quantity(cell: &Cell) -> Result<f64, String> {
    let value = match cell {
        Cell::Empty => 0.0,
        Cell::Number(n) => *n,
        Cell::Text(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                0.0
            } else {
                cleaned
                    .parse::<f64>()
                    .map_err(|_| format!("Quantity '{}' is not a number", s.trim()))?
            }
        }
    };

    if !value.is_finite() || value < 0.0 {
        return Err(format!("Quantity {} must be a non-negative number", value));
    }
    Ok(value)
}
