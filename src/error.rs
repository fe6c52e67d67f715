use std::path::PathBuf;
use thiserror::Error;

pub type GenResult<T> = Result<T, GenError>;

/// Failures of a generation run. Each one aborts the batch where it is raised.
#[derive(Error, Debug)]
pub enum GenError {
    #[error("cannot open template `{}`", path.display())]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot prepare export directory `{}`", path.display())]
    ExportDirError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read mapping file `{}`", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot write the workbook of `{entity}`")]
    ExportWriteFailed {
        entity: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GenError {
    /// Pipeline stage the error was raised in.
    pub fn stage(&self) -> &'static str {
        match self {
            GenError::TemplateUnreadable { .. } => "template",
            GenError::ExportDirError { .. } => "export directory",
            GenError::SourceUnreadable { .. } => "mapping",
            GenError::ExportWriteFailed { .. } => "export",
            GenError::InvalidConfig(_) => "configuration",
        }
    }

    /// Process exit code; 2 is left to clap usage errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            GenError::TemplateUnreadable { .. } => 3,
            GenError::ExportDirError { .. } => 4,
            GenError::SourceUnreadable { .. } => 5,
            GenError::ExportWriteFailed { .. } => 6,
            GenError::InvalidConfig(_) => 7,
        }
    }
}
