//! Reads the quotité table: one `(syndicat, quotité)` pair per row between the
//! header and the trailing "Total" row.

use crate::error::{GenError, GenResult};
use anyhow::Context;
use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use rust_core::CellValue;
use std::{collections::HashSet, path::Path};
use tracing::{debug, warn};

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub entity: String,
    pub rate: CellValue,
}

impl Allocation {
    pub fn new(entity: impl Into<String>, rate: impl Into<CellValue>) -> Self {
        Self {
            entity: entity.into(),
            rate: rate.into(),
        }
    }
}

/// Allocations in sheet order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingTable {
    rows: Vec<Allocation>,
    skipped: usize,
}

impl MappingTable {
    /// Builds the table from a sheet range.
    ///
    /// Row 1 is the header and the last row holds the totals; both are left out.
    /// Rows are addressed absolutely, so leading blank rows still count.
    pub fn from_range(range: &Range<Data>) -> Self {
        let mut table = Self::default();
        let Some((last_row, _)) = range.end() else {
            return table;
        };

        for row in 1..last_row {
            let entity = range.get_value((row, 0)).map(entity_name).unwrap_or_default();
            if entity.trim().is_empty() {
                warn!(row = row + 1, "mapping row without a name, skipped");
                table.skipped += 1;
                continue;
            }
            let rate = range
                .get_value((row, 1))
                .map(to_cell_value)
                .unwrap_or(CellValue::Empty);
            debug!(row = row + 1, %entity, %rate, "mapping row");
            table.rows.push(Allocation { entity, rate });
        }
        table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.rows.iter()
    }

    /// Rows dropped because their name cell was blank.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Entity names that appear more than once, in order of their second occurrence.
    pub fn duplicates(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for a in &self.rows {
            if !seen.insert(a.entity.as_str()) && !dups.contains(&a.entity.as_str()) {
                dups.push(a.entity.as_str());
            }
        }
        dups
    }
}

impl FromIterator<Allocation> for MappingTable {
    fn from_iter<I: IntoIterator<Item = Allocation>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
            skipped: 0,
        }
    }
}

impl<'a> IntoIterator for &'a MappingTable {
    type Item = &'a Allocation;
    type IntoIter = std::slice::Iter<'a, Allocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Opens the mapping workbook and reads its active sheet.
pub fn load_mapping(path: &Path) -> GenResult<MappingTable> {
    let unreadable = |source: anyhow::Error| GenError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    };

    let sheet = rust_core::active_sheet_index(path).map_err(unreadable)?;
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| unreadable(anyhow::Error::new(e)))?;
    let range = workbook
        .worksheet_range_at(sheet)
        .with_context(|| format!("sheet #{} not found", sheet + 1))
        .map_err(unreadable)?
        .map_err(|e| unreadable(anyhow::Error::new(e)))?;

    Ok(MappingTable::from_range(&range))
}

fn entity_name(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Passes the cell through as-is; dates keep their Excel serial value.
pub fn to_cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
        Data::Empty => CellValue::Empty,
    }
}
