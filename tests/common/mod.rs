#![allow(dead_code)]

use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::Workbook;
use std::{
    io::{Cursor, Read, Write},
    path::Path,
};

/// A one-sheet template with placeholders in A64/B64 and A74/B74.
pub fn write_template(path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Décharge")?;
    sheet.write_string(0, 0, "Tableau de décharge syndicale")?;
    sheet.write_string(63, 0, "Syndicat")?;
    sheet.write_number(63, 1, 0.0)?;
    sheet.write_string(73, 0, "Syndicat")?;
    sheet.write_number(73, 1, 0.0)?;
    workbook.save(path)?;
    Ok(())
}

/// Template whose C64 multiplies the rate by 1607, cached result 0, saved the way
/// Excel saves it: no `fullCalcOnLoad`, with a calculation chain listing C64.
pub fn write_formula_template(path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(63, 0, "Syndicat")?;
    sheet.write_number(63, 1, 0.0)?;
    sheet.write_formula(63, 2, "=B64*1607")?;
    workbook.save(path)?;

    let mut zin = zip::ZipArchive::new(Cursor::new(std::fs::read(path)?))?;
    let mut zout = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opt = zip::write::SimpleFileOptions::default();
    for i in 0..zin.len() {
        let mut file = zin.by_index(i)?;
        let name = file.name().to_owned();
        let mut body = String::new();
        file.read_to_string(&mut body)?;
        let body = match name.as_str() {
            "xl/workbook.xml" => body.replace(r#" fullCalcOnLoad="1""#, ""),
            "xl/_rels/workbook.xml.rels" => body.replace(
                "</Relationships>",
                r#"<Relationship Id="rId99" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#,
            ),
            "[Content_Types].xml" => body.replace(
                "</Types>",
                r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#,
            ),
            _ => body,
        };
        zout.start_file(name, opt)?;
        zout.write_all(body.as_bytes())?;
    }
    zout.start_file("xl/calcChain.xml", opt)?;
    zout.write_all(
        br#"<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="C64" i="1"/></calcChain>"#,
    )?;
    std::fs::write(path, zout.finish()?.into_inner())?;
    Ok(())
}

/// Text of an archive entry, `None` when absent.
pub fn entry(path: &Path, name: &str) -> Result<Option<String>> {
    let mut zin = zip::ZipArchive::new(std::fs::File::open(path)?)?;
    let Ok(mut file) = zin.by_name(name) else {
        return Ok(None);
    };
    let mut body = String::new();
    file.read_to_string(&mut body)?;
    Ok(Some(body))
}

/// Same template, already protected without a password.
pub fn write_protected_template(path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(63, 0, "Syndicat")?;
    sheet.protect();
    workbook.save(path)?;
    Ok(())
}

/// Header, one row per pair, then a "Total" row.
pub fn write_mapping(path: &Path, rows: &[(&str, f64)]) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Syndicat")?;
    sheet.write_string(0, 1, "Quotité proposée")?;
    for (i, (name, rate)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, *name)?;
        sheet.write_number(row, 1, *rate)?;
    }
    let total_row = rows.len() as u32 + 1;
    sheet.write_string(total_row, 0, "Total")?;
    sheet.write_number(total_row, 1, rows.iter().map(|(_, r)| r).sum::<f64>())?;
    workbook.save(path)?;
    Ok(())
}

pub const EXAMPLE: [(&str, f64); 2] = [("Ain (01)", 0.567), ("Aisne (02)", 0.312)];

/// Value of a cell (0-based row/col) on the first sheet.
pub fn cell(path: &Path, row: u32, col: u32) -> Result<Data> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook.worksheet_range_at(0).context("no sheet")??;
    Ok(range.get_value((row, col)).cloned().unwrap_or(Data::Empty))
}

/// File names in `dir`, sorted.
pub fn listing(dir: &Path) -> Result<Vec<String>> {
    let mut names = std::fs::read_dir(dir)?
        .map(|e| Ok(e?.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}
