use crate::{
    config::CellLayout,
    error::{GenError, GenResult},
    mapping::Allocation,
};
use anyhow::bail;
use rust_core::{CellValue, XlsxEditor};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The template workbook, loaded once and never modified.
///
/// Every output starts from a clone of the pristine editor, so one entity's
/// substitution cannot show up in another entity's file.
pub struct Template {
    path: PathBuf,
    pristine: XlsxEditor,
    layout: CellLayout,
}

impl Template {
    /// Opens the template and selects its active sheet.
    pub fn load(path: &Path, layout: CellLayout) -> GenResult<Self> {
        let pristine = XlsxEditor::open_active(path).map_err(|source| GenError::TemplateUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(sheet = pristine.sheet_path(), "template sheet");
        Ok(Self {
            path: path.to_path_buf(),
            pristine,
            layout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &CellLayout {
        &self.layout
    }

    /// A fresh copy of the template carrying `allocation`, protected when `password` is set.
    pub fn render(&self, allocation: &Allocation, password: Option<&str>) -> anyhow::Result<XlsxEditor> {
        let mut sheet = self.pristine.clone();
        debug!(
            name_cell = %self.layout.name_cell,
            rate_cell = %self.layout.rate_cell,
            entity = %allocation.entity,
            "filling template"
        );
        sheet.set_cell(
            &self.layout.name_cell.to_string(),
            CellValue::Text(allocation.entity.clone()),
        )?;
        sheet.set_cell(&self.layout.rate_cell.to_string(), allocation.rate.clone())?;
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            sheet.protect_sheet(password)?;
        }
        Ok(sheet)
    }

    /// Renders `allocation` and writes it to `<dir>/<entity>.xlsx`.
    pub fn export(
        &self,
        dir: &Path,
        allocation: &Allocation,
        password: Option<&str>,
    ) -> GenResult<PathBuf> {
        let write = || -> anyhow::Result<PathBuf> {
            let dst = output_path(dir, &allocation.entity)?;
            self.render(allocation, password)?.save(&dst)?;
            Ok(dst)
        };
        let dst = write().map_err(|source| GenError::ExportWriteFailed {
            entity: allocation.entity.clone(),
            source,
        })?;

        info!(entity = %allocation.entity, rate = %allocation.rate, "{} written", dst.display());
        Ok(dst)
    }
}

/// `<dir>/<entity>.xlsx`; the name must stay a single path component.
pub fn output_path(dir: &Path, entity: &str) -> anyhow::Result<PathBuf> {
    if entity.is_empty() || entity.contains(['/', '\\', '\0']) {
        bail!("`{entity}` cannot be used as a file name");
    }
    Ok(dir.join(format!("{entity}.xlsx")))
}
