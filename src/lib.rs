//! decharge-gen — one workbook per syndicat from a single `.xlsx` template.
//!
//! The quotité table lists `(syndicat, quotité)` pairs; for each pair the
//! template's name and rate cells are filled in, the sheet is optionally
//! protected, and the result is written to `<export>/<syndicat>.xlsx`.
//!
//! ```no_run
//! use decharge_gen::{GeneratorConfig, run};
//!
//! let config = GeneratorConfig::new("modele.xlsx", "quotites.xlsx")
//!     .with_password(Some("secret".to_owned()));
//! let report = run(&config)?;
//! println!("{} files", report.written.len());
//! # Ok::<(), decharge_gen::GenError>(())
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod mapping;
pub mod template;

pub use batch::{RunReport, Stage, run};
pub use config::{CellLayout, CellRef, GeneratorConfig};
pub use error::{GenError, GenResult};
pub use mapping::{Allocation, MappingTable, load_mapping};
pub use rust_core::CellValue;
pub use template::Template;
