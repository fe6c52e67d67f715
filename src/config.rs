use crate::error::{GenError, GenResult};
use rust_core::{col_to_letters, parse_coord};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// A validated A1 cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    col: u32,
    row: u32,
}

impl CellRef {
    /// 1-based column.
    pub fn col(&self) -> u32 {
        self.col
    }

    /// 1-based row.
    pub fn row(&self) -> u32 {
        self.row
    }
}

impl FromStr for CellRef {
    type Err = GenError;

    fn from_str(s: &str) -> GenResult<Self> {
        let (col, row) = parse_coord(s.trim()).map_err(|e| GenError::InvalidConfig(format!("{e:#}")))?;
        Ok(Self { col, row })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_to_letters(self.col), self.row)
    }
}

/// Where the entity name and its rate go in the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellLayout {
    pub name_cell: CellRef,
    pub rate_cell: CellRef,
}

impl CellLayout {
    pub fn new(name_cell: CellRef, rate_cell: CellRef) -> GenResult<Self> {
        if name_cell == rate_cell {
            return Err(GenError::InvalidConfig(format!(
                "name and rate cannot share cell {name_cell}"
            )));
        }
        Ok(Self {
            name_cell,
            rate_cell,
        })
    }
}

impl Default for CellLayout {
    /// `A64`/`B64`, the layout of the current décharge template.
    fn default() -> Self {
        Self {
            name_cell: CellRef { col: 1, row: 64 },
            rate_cell: CellRef { col: 2, row: 64 },
        }
    }
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub template: PathBuf,
    pub mapping: PathBuf,
    pub export_dir: PathBuf,
    pub layout: CellLayout,
    pub password: Option<String>,
}

impl GeneratorConfig {
    /// Default layout, `export` directory, no protection.
    pub fn new(template: impl AsRef<Path>, mapping: impl AsRef<Path>) -> Self {
        Self {
            template: template.as_ref().to_path_buf(),
            mapping: mapping.as_ref().to_path_buf(),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            layout: CellLayout::default(),
            password: None,
        }
    }

    pub fn with_export_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.export_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_layout(mut self, layout: CellLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// The protection secret, if one was given and is not empty.
    pub fn protection(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

pub const DEFAULT_EXPORT_DIR: &str = "export";
