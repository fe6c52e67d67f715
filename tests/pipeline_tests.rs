//! End-to-end runs of the generator against workbooks built on the fly.

mod common;

use anyhow::Result;
use calamine::Data;
use common::{
    EXAMPLE, cell, entry, listing, write_formula_template, write_mapping, write_protected_template,
    write_template,
};
use decharge_gen::{CellLayout, GenError, GeneratorConfig, run};
use pretty_assertions::assert_eq;
use rust_core::XlsxEditor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(rows: &[(&str, f64)]) -> Result<Self> {
        let dir = TempDir::new()?;
        write_template(&dir.path().join("modele.xlsx"))?;
        write_mapping(&dir.path().join("quotites.xlsx"), rows)?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn export(&self) -> PathBuf {
        self.path("export")
    }

    fn config(&self) -> GeneratorConfig {
        GeneratorConfig::new(self.path("modele.xlsx"), self.path("quotites.xlsx"))
            .with_export_dir(self.export())
    }
}

fn sheet_xml(path: &Path) -> Result<Vec<u8>> {
    Ok(XlsxEditor::open_active(path)?.sheet_xml().to_vec())
}

// ═══════════════════════════════════════════════════════════════════════════
// OUTPUT FILES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn one_file_per_row_without_total() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    let report = run(&fx.config())?;

    assert_eq!(listing(&fx.export())?, vec!["Ain (01).xlsx", "Aisne (02).xlsx"]);
    assert_eq!(
        report.written,
        vec![fx.export().join("Ain (01).xlsx"), fx.export().join("Aisne (02).xlsx")]
    );
    assert_eq!(report.skipped, 0);
    Ok(())
}

#[test]
fn each_file_carries_only_its_own_values() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    run(&fx.config())?;

    for (name, rate) in EXAMPLE {
        let out = fx.export().join(format!("{name}.xlsx"));
        assert_eq!(cell(&out, 63, 0)?, Data::String(name.to_owned()));
        assert_eq!(cell(&out, 63, 1)?, Data::Float(rate));
        // untouched template content
        assert_eq!(cell(&out, 0, 0)?, Data::String("Tableau de décharge syndicale".into()));
        assert_eq!(cell(&out, 73, 0)?, Data::String("Syndicat".into()));
    }
    let aisne = String::from_utf8(sheet_xml(&fx.export().join("Aisne (02).xlsx"))?)?;
    assert!(!aisne.contains("Ain (01)") && !aisne.contains("0.567"));
    Ok(())
}

#[test]
fn many_rows_many_files() -> Result<()> {
    let names: Vec<String> = (1..=30).map(|i| format!("Syndicat {i:02}")).collect();
    let rows: Vec<(&str, f64)> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i as f64 / 100.0))
        .collect();
    let fx = Fixture::new(&rows)?;

    let report = run(&fx.config())?;
    assert_eq!(report.written.len(), 30);
    assert_eq!(listing(&fx.export())?.len(), 30);
    assert_eq!(
        cell(&fx.export().join("Syndicat 17.xlsx"), 63, 1)?,
        Data::Float(0.16)
    );
    Ok(())
}

#[test]
fn duplicate_names_keep_the_last_rate() -> Result<()> {
    let fx = Fixture::new(&[("Ain (01)", 0.1), ("Aisne (02)", 0.2), ("Ain (01)", 0.3)])?;
    let report = run(&fx.config())?;

    assert_eq!(report.written.len(), 3);
    assert_eq!(listing(&fx.export())?, vec!["Ain (01).xlsx", "Aisne (02).xlsx"]);
    assert_eq!(cell(&fx.export().join("Ain (01).xlsx"), 63, 1)?, Data::Float(0.3));
    Ok(())
}

#[test]
fn configured_cells_are_used() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    let layout = CellLayout::new("A74".parse()?, "B74".parse()?)?;
    run(&fx.config().with_layout(layout))?;

    let out = fx.export().join("Ain (01).xlsx");
    assert_eq!(cell(&out, 73, 0)?, Data::String("Ain (01)".into()));
    assert_eq!(cell(&out, 73, 1)?, Data::Float(0.567));
    assert_eq!(cell(&out, 63, 0)?, Data::String("Syndicat".into()));
    Ok(())
}

#[test]
fn header_and_total_only_yield_nothing() -> Result<()> {
    let fx = Fixture::new(&[])?;
    let report = run(&fx.config())?;
    assert!(report.written.is_empty());
    assert!(listing(&fx.export())?.is_empty());
    Ok(())
}

#[test]
fn formulas_over_the_rate_are_recalculated_on_open() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    write_formula_template(&fx.path("modele.xlsx"))?;
    assert!(entry(&fx.path("modele.xlsx"), "xl/calcChain.xml")?.is_some());
    run(&fx.config())?;

    let out = fx.export().join("Ain (01).xlsx");
    assert_eq!(cell(&out, 63, 1)?, Data::Float(0.567));
    let workbook = entry(&out, "xl/workbook.xml")?.unwrap_or_default();
    assert!(workbook.contains(r#"fullCalcOnLoad="1""#), "{workbook}");
    assert_eq!(entry(&out, "xl/calcChain.xml")?, None);
    assert!(!entry(&out, "xl/_rels/workbook.xml.rels")?.unwrap_or_default().contains("calcChain"));
    assert!(!entry(&out, "[Content_Types].xml")?.unwrap_or_default().contains("calcChain"));
    Ok(())
}

#[test]
fn control_characters_in_names_survive() -> Result<()> {
    let fx = Fixture::new(&[("Nord\u{7}Est", 0.25)])?;
    run(&fx.config())?;

    let out = fx.export().join("Nord\u{7}Est.xlsx");
    let xml = String::from_utf8(sheet_xml(&out)?)?;
    assert!(xml.contains("<t>Nord_x0007_Est</t>"), "{xml}");
    assert_eq!(cell(&out, 63, 0)?, Data::String("Nord\u{7}Est".into()));
    Ok(())
}

#[test]
fn cells_beyond_the_used_range_widen_it() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    let layout = CellLayout::new("D90".parse()?, "E90".parse()?)?;
    run(&fx.config().with_layout(layout))?;

    let xml = String::from_utf8(sheet_xml(&fx.export().join("Ain (01).xlsx"))?)?;
    assert!(xml.contains(r#"<dimension ref="A1:E90"/>"#), "{xml}");
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// PROTECTION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn password_protects_every_output() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    run(&fx.config().with_password(Some("pandace".into())))?;

    for (name, _) in EXAMPLE {
        let out = fx.export().join(format!("{name}.xlsx"));
        let editor = XlsxEditor::open_active(&out)?;
        assert!(editor.is_protected());
        let xml = String::from_utf8(editor.sheet_xml().to_vec())?;
        assert!(xml.contains(r#"password="EC78""#));
    }
    Ok(())
}

#[test]
fn no_password_leaves_template_protection_as_is() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    run(&fx.config())?;
    assert!(!XlsxEditor::open_active(fx.export().join("Ain (01).xlsx"))?.is_protected());

    write_protected_template(&fx.path("modele.xlsx"))?;
    run(&fx.config().with_password(Some(String::new())))?;
    assert!(XlsxEditor::open_active(fx.export().join("Ain (01).xlsx"))?.is_protected());
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// EXPORT DIRECTORY & REPEATED RUNS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn previous_export_is_wiped() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    std::fs::create_dir_all(fx.export().join("nested"))?;
    std::fs::write(fx.export().join("Old (99).xlsx"), b"stale")?;

    run(&fx.config())?;
    assert_eq!(listing(&fx.export())?, vec!["Ain (01).xlsx", "Aisne (02).xlsx"]);
    Ok(())
}

#[test]
fn second_run_reproduces_the_same_sheets() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    run(&fx.config())?;
    let first: Vec<Vec<u8>> = listing(&fx.export())?
        .iter()
        .map(|f| sheet_xml(&fx.export().join(f)))
        .collect::<Result<_>>()?;

    run(&fx.config())?;
    let second: Vec<Vec<u8>> = listing(&fx.export())?
        .iter()
        .map(|f| sheet_xml(&fx.export().join(f)))
        .collect::<Result<_>>()?;

    assert_eq!(first, second);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// FAILURES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn unreadable_mapping_writes_nothing() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    std::fs::write(fx.path("quotites.xlsx"), "Syndicat;Quotité\nAin (01);0,567\n")?;

    let err = run(&fx.config()).unwrap_err();
    assert!(matches!(err, GenError::SourceUnreadable { .. }), "{err:?}");
    assert_eq!(err.exit_code(), 5);
    // the export directory is prepared before the mapping is read
    assert!(listing(&fx.export())?.is_empty());
    Ok(())
}

#[test]
fn missing_mapping_is_unreadable() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    let config = GeneratorConfig {
        mapping: fx.path("absent.xlsx"),
        ..fx.config()
    };
    assert!(matches!(
        run(&config).unwrap_err(),
        GenError::SourceUnreadable { .. }
    ));
    Ok(())
}

#[test]
fn unreadable_template_stops_before_the_export_dir() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    let config = GeneratorConfig {
        template: fx.path("absent.xlsx"),
        ..fx.config()
    };

    let err = run(&config).unwrap_err();
    assert!(matches!(err, GenError::TemplateUnreadable { .. }), "{err:?}");
    assert!(!fx.export().exists());
    Ok(())
}

#[test]
fn export_dir_that_is_a_file_fails() -> Result<()> {
    let fx = Fixture::new(&EXAMPLE)?;
    std::fs::write(fx.export(), b"not a directory")?;

    let err = run(&fx.config()).unwrap_err();
    assert!(matches!(err, GenError::ExportDirError { .. }), "{err:?}");
    assert_eq!(err.exit_code(), 4);
    Ok(())
}

#[test]
fn bad_entity_name_aborts_the_batch() -> Result<()> {
    let fx = Fixture::new(&[("Ain (01)", 0.1), ("Paris/Nord", 0.2), ("Aisne (02)", 0.3)])?;

    match run(&fx.config()).unwrap_err() {
        GenError::ExportWriteFailed { entity, .. } => assert_eq!(entity, "Paris/Nord"),
        other => panic!("unexpected error: {other:?}"),
    }
    // rows before the failure are kept, rows after it are never processed
    assert_eq!(listing(&fx.export())?, vec!["Ain (01).xlsx"]);
    Ok(())
}
