// src/report/xlsx.rs
//! Workbook-backed artifact store. Reads with `calamine`, writes with `rust_xlsxwriter`.
//!
//! Saves go to a temp file in the same directory and are renamed over the target.
//! A save is refused with `StoreError::Locked` while an office owner file
//! (`~$NAME.xlsx`, `.~lock.NAME.xlsx#`) or our own `NAME.xlsx.lock` exists.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatUnderline, Workbook, Worksheet, XlsxError};
use tracing::debug;

use super::{Artifact, ArtifactStore, Row, Section, COL_URL};
use crate::error::StoreError;

const HEADER_FILL: u32 = 0x366092;
const MAX_COLUMN_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxStore;

impl XlsxStore {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactStore for XlsxStore {
    fn load(&self, path: &Path) -> Result<Option<Artifact>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let read_err = |message: String| StoreError::Read {
            path: path.to_path_buf(),
            message,
        };
        let mut wb: Xlsx<BufReader<File>> =
            open_workbook(path).map_err(|e: calamine::XlsxError| read_err(e.to_string()))?;

        let mut artifact = Artifact::default();
        for name in wb.sheet_names() {
            let range = wb
                .worksheet_range(&name)
                .map_err(|e| read_err(format!("sheet '{name}': {e}")))?;
            let mut rows = range.rows();
            let header: Vec<String> = match rows.next() {
                Some(cells) => cells.iter().map(cell_text).collect(),
                None => Vec::new(),
            };
            let data = rows
                .map(|cells| {
                    let mut row = Row::default();
                    for (col, cell) in header.iter().zip(cells) {
                        if !col.is_empty() {
                            row.set(col, cell_text(cell));
                        }
                    }
                    row
                })
                .filter(|r| !r.is_blank())
                .collect();
            artifact.sections.push(Section {
                name,
                header,
                rows: data,
            });
        }
        debug!(path = %path.display(), sections = artifact.sections.len(), rows = artifact.row_count(), "artifact loaded");
        Ok(Some(artifact))
    }

    fn save(&self, path: &Path, artifact: &Artifact) -> Result<(), StoreError> {
        if let Some(owner) = office_owner_file(path) {
            debug!(owner = %owner.display(), "artifact open in another application");
            return Err(StoreError::Locked(path.to_path_buf()));
        }
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let _guard = LockFile::acquire(path)?;

        let write_err = |e: XlsxError| StoreError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let mut wb = build_workbook(artifact).map_err(write_err)?;

        let tmp = temp_path(path);
        wb.save(&tmp).map_err(|e| match e {
            XlsxError::IoError(io) if io.kind() == ErrorKind::PermissionDenied => {
                StoreError::Locked(path.to_path_buf())
            }
            other => write_err(other),
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            if e.kind() == ErrorKind::PermissionDenied {
                StoreError::Locked(path.to_path_buf())
            } else {
                StoreError::Io(e)
            }
        })?;
        Ok(())
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn build_workbook(artifact: &Artifact) -> Result<Workbook, XlsxError> {
    let mut wb = Workbook::new();
    let header_fmt = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_align(FormatAlign::Center);
    let link_fmt = Format::new()
        .set_font_color(Color::Blue)
        .set_underline(FormatUnderline::Single);

    for section in &artifact.sections {
        let ws = wb.add_worksheet();
        ws.set_name(&section.name)?;
        write_section(ws, section, &header_fmt, &link_fmt)?;
    }
    Ok(wb)
}

fn write_section(
    ws: &mut Worksheet,
    section: &Section,
    header_fmt: &Format,
    link_fmt: &Format,
) -> Result<(), XlsxError> {
    let mut widths: Vec<usize> = section.header.iter().map(|h| h.chars().count()).collect();

    for (c, name) in section.header.iter().enumerate() {
        ws.write_string_with_format(0, c as u16, name, header_fmt)?;
    }

    for (r, row) in section.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        let fill = row
            .highlight
            .map(|h| Format::new().set_background_color(Color::RGB(h.rgb())));
        for (c, name) in section.header.iter().enumerate() {
            let c16 = c as u16;
            let value = row.get(name);
            widths[c] = widths[c].max(value.chars().count());
            if value.is_empty() && fill.is_none() {
                continue;
            }
            let written = if name == COL_URL && !value.is_empty() {
                let fmt = match &fill {
                    Some(f) => f.clone().set_font_color(Color::Blue).set_underline(FormatUnderline::Single),
                    None => link_fmt.clone(),
                };
                ws.write_url_with_format(r, c16, value, &fmt).map(|_| ())
            } else {
                Err(XlsxError::ParameterError(String::new()))
            };
            // plain text for non-URL columns and links the writer rejects
            if written.is_err() {
                match &fill {
                    Some(f) => ws.write_string_with_format(r, c16, value, f)?,
                    None => ws.write_string(r, c16, value)?,
                };
            }
        }
    }

    for (c, w) in widths.iter().enumerate() {
        ws.set_column_width(c as u16, ((w + 2).min(MAX_COLUMN_WIDTH)) as f64)?;
    }
    Ok(())
}

fn office_owner_file(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    [format!("~${name}"), format!(".~lock.{name}#")]
        .into_iter()
        .map(|n| dir.join(n))
        .find(|p| p.exists())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact.xlsx");
    path.with_file_name(format!(".{name}.{}.tmp.xlsx", std::process::id()))
}

/// Exclusive `<artifact>.lock` held for the duration of a save.
struct LockFile(PathBuf);

impl LockFile {
    fn acquire(artifact: &Path) -> Result<Self, StoreError> {
        let mut p = artifact.as_os_str().to_owned();
        p.push(".lock");
        let lock = PathBuf::from(p);
        match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(_) => Ok(Self(lock)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::Locked(artifact.to_path_buf()))
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(StoreError::Locked(artifact.to_path_buf()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Highlight, COL_TITLE};

    fn row(title: &str, url: &str) -> Row {
        let mut r = Row::default();
        r.set(COL_TITLE, title);
        r.set(COL_URL, url);
        r
    }

    fn sample() -> Artifact {
        let header = vec![COL_TITLE.to_string(), COL_URL.to_string(), "Notes".to_string()];
        let mut flagged = row("Second", "not a url");
        flagged.highlight = Some(Highlight::Completed);
        Artifact {
            sections: vec![
                Section {
                    name: "2025-W01".into(),
                    header: header.clone(),
                    rows: vec![row("First", "https://a.example/1"), flagged],
                },
                Section {
                    name: "2025-W02".into(),
                    header,
                    rows: vec![row("Third", "https://a.example/3")],
                },
            ],
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(XlsxStore.load(&dir.path().join("none.xlsx")).unwrap().is_none());
    }

    #[test]
    fn sections_and_cells_survive_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("EMEA.xlsx");
        XlsxStore.save(&path, &sample()).unwrap();

        let back = XlsxStore.load(&path).unwrap().unwrap();
        let names: Vec<_> = back.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["2025-W01", "2025-W02"]);
        assert_eq!(back.row_count(), 3);
        let first = &back.sections[0];
        assert_eq!(first.header[2], "Notes");
        assert_eq!(first.rows[0].get(COL_URL), "https://a.example/1");
        assert_eq!(first.rows[1].get(COL_URL), "not a url");
        assert_eq!(first.rows[1].get("Notes"), "");
        // lock released, temp file renamed away
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn owner_file_or_held_lock_reports_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("UK_NA.xlsx");

        fs::write(dir.path().join("~$UK_NA.xlsx"), b"").unwrap();
        assert!(XlsxStore.save(&path, &sample()).unwrap_err().is_locked());
        fs::remove_file(dir.path().join("~$UK_NA.xlsx")).unwrap();

        let held = LockFile::acquire(&path).unwrap();
        assert!(XlsxStore.save(&path, &sample()).unwrap_err().is_locked());
        drop(held);
        XlsxStore.save(&path, &sample()).unwrap();
    }
}
