//! Top-level flow of a run:
//! `Start → TemplateLoaded → ExportDirPrepared → MappingLoaded → Processing → Done`,
//! with any failure ending in `Failed`.

use crate::{
    config::GeneratorConfig,
    error::{GenError, GenResult},
    mapping::load_mapping,
    template::Template,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    TemplateLoaded,
    ExportDirPrepared,
    MappingLoaded,
    Processing,
    Done,
    Failed,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Files written, in mapping order. A duplicated entity appears once per row.
    pub written: Vec<PathBuf>,
    /// Mapping rows skipped for lack of a name.
    pub skipped: usize,
}

/// Runs the whole batch. The first error stops it; files already written stay.
pub fn run(config: &GeneratorConfig) -> GenResult<RunReport> {
    let mut batch = Batch {
        config,
        stage: Stage::Start,
    };
    batch.drive().inspect_err(|e| {
        debug!(stage = e.stage(), "run failed");
        batch.advance(Stage::Failed);
    })
}

struct Batch<'a> {
    config: &'a GeneratorConfig,
    stage: Stage,
}

impl Batch<'_> {
    fn advance(&mut self, next: Stage) {
        debug!(from = ?self.stage, to = ?next, "stage");
        self.stage = next;
    }

    fn drive(&mut self) -> GenResult<RunReport> {
        let config = self.config;

        let template = Template::load(&config.template, config.layout.clone())?;
        info!("template opened: {}", template.path().display());
        self.advance(Stage::TemplateLoaded);

        prepare_export_dir(&config.export_dir)?;
        self.advance(Stage::ExportDirPrepared);

        let table = load_mapping(&config.mapping)?;
        info!(rows = table.len(), skipped = table.skipped(), "mapping loaded");
        for entity in table.duplicates() {
            warn!(entity, "entity listed more than once, the last row wins");
        }
        self.advance(Stage::MappingLoaded);

        self.advance(Stage::Processing);
        let mut report = RunReport {
            written: Vec::with_capacity(table.len()),
            skipped: table.skipped(),
        };
        for allocation in &table {
            let path = template.export(&config.export_dir, allocation, config.protection())?;
            report.written.push(path);
        }

        self.advance(Stage::Done);
        Ok(report)
    }
}

/// Removes `dir` if it exists and recreates it empty.
pub fn prepare_export_dir(dir: &Path) -> GenResult<()> {
    let failed = |source: std::io::Error| GenError::ExportDirError {
        path: dir.to_path_buf(),
        source,
    };

    if dir.exists() {
        fs::remove_dir_all(dir).map_err(failed)?;
        info!("export directory removed: {}", dir.display());
    }
    fs::create_dir_all(dir).map_err(failed)?;
    info!("export directory created: {}", dir.display());
    Ok(())
}
