// Worksheet XML patching
//
// Edited cells are replaced in place or inserted in row/column order; every
// other event of the worksheet part is copied through untouched. Replaced
// cells keep their `s` (style) attribute. Text is written as inline strings
// so the shared string table never changes.

use std::collections::{BTreeMap, BTreeSet};

use distmerge_recon::dates::date_to_serial;
use distmerge_recon::grid::{cell_ref, parse_cell_ref, CellValue};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Zero-indexed (row, col) -> new value.
pub type CellEdits = BTreeMap<(usize, usize), CellValue>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetPatchStats {
    /// Existing `<c>` elements rewritten.
    pub replaced: usize,
    /// New `<c>` elements.
    pub inserted: usize,
    /// New `<row>` elements.
    pub rows_inserted: usize,
}

/// Current position while walking `sheetData`; rows and cells may omit
/// their `r` attribute, in which case they follow the previous one.
#[derive(Debug, Default)]
struct Position {
    row: Option<usize>,
    col: Option<usize>,
}

impl Position {
    fn enter_row(&mut self, e: &BytesStart) -> usize {
        let row = attr(e, b"r")
            .and_then(|r| r.parse::<usize>().ok())
            .and_then(|r| r.checked_sub(1))
            .unwrap_or_else(|| self.row.map_or(0, |r| r + 1));
        self.row = Some(row);
        self.col = None;
        row
    }

    fn enter_cell(&mut self, e: &BytesStart) -> (usize, usize) {
        let col = attr(e, b"r")
            .and_then(|r| parse_cell_ref(&r))
            .map(|(_, c)| c)
            .unwrap_or_else(|| self.col.map_or(0, |c| c + 1));
        self.col = Some(col);
        (self.row.unwrap_or(0), col)
    }
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn style_of(e: &BytesStart) -> Option<u32> {
    attr(e, b"s").and_then(|s| s.parse().ok())
}

/// Copy of `e` with `key` removed and, when given, set to `value`.
pub(crate) fn with_attr(e: &BytesStart, key: &[u8], value: Option<&str>) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for a in e.attributes().flatten() {
        if a.key.as_ref() != key {
            out.push_attribute(a);
        }
    }
    if let Some(value) = value {
        out.push_attribute((String::from_utf8_lossy(key).as_ref(), value));
    }
    out
}

fn xml_err(e: impl std::fmt::Display) -> String {
    format!("worksheet XML error: {e}")
}

/// `s` attribute of every listed cell that exists in the sheet.
pub fn cell_styles(xml: &str, wanted: &BTreeSet<(usize, usize)>) -> Result<BTreeMap<(usize, usize), u32>, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut pos = Position::default();
    let mut styles = BTreeMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"row" => {
                pos.enter_row(e);
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"c" => {
                let at = pos.enter_cell(e);
                if wanted.contains(&at) {
                    if let Some(s) = style_of(e) {
                        styles.insert(at, s);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(styles)
}

struct Patcher<'a> {
    writer: Writer<Vec<u8>>,
    /// Base style -> date style, from the styles part.
    date_styles: &'a BTreeMap<u32, u32>,
    stats: SheetPatchStats,
}

impl Patcher<'_> {
    fn write(&mut self, event: Event<'_>) -> Result<(), String> {
        self.writer.write_event(event).map_err(xml_err)
    }

    fn text_element(&mut self, name: &str, text: &str, preserve: bool) -> Result<(), String> {
        let mut start = BytesStart::new(name);
        if preserve {
            start.push_attribute(("xml:space", "preserve"));
        }
        self.write(Event::Start(start))?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn cell(&mut self, (row, col): (usize, usize), value: &CellValue, style: Option<u32>) -> Result<(), String> {
        let style = match value {
            CellValue::Date(_) => self.date_styles.get(&style.unwrap_or(0)).copied().or(style),
            _ => style,
        };

        let mut start = BytesStart::new("c");
        start.push_attribute(("r", cell_ref(row, col).as_str()));
        if let Some(s) = style {
            start.push_attribute(("s", s.to_string().as_str()));
        }

        match value {
            CellValue::Empty => {
                if style.is_some() {
                    self.write(Event::Empty(start))?;
                }
                return Ok(());
            }
            CellValue::Number(n) => {
                self.write(Event::Start(start))?;
                self.text_element("v", &n.to_string(), false)?;
            }
            CellValue::Date(d) => {
                self.write(Event::Start(start))?;
                self.text_element("v", &date_to_serial(*d).to_string(), false)?;
            }
            CellValue::Text(t) => {
                start.push_attribute(("t", "inlineStr"));
                self.write(Event::Start(start))?;
                self.write(Event::Start(BytesStart::new("is")))?;
                self.text_element("t", t, true)?;
                self.write(Event::End(BytesEnd::new("is")))?;
            }
            CellValue::Formula(f) => {
                self.write(Event::Start(start))?;
                self.text_element("f", f.strip_prefix('=').unwrap_or(f), false)?;
            }
        }
        self.write(Event::End(BytesEnd::new("c")))
    }

    fn new_cells(&mut self, row: usize, cells: BTreeMap<usize, &CellValue>) -> Result<(), String> {
        for (col, value) in cells {
            if matches!(value, CellValue::Empty) {
                continue;
            }
            self.cell((row, col), value, None)?;
            self.stats.inserted += 1;
        }
        Ok(())
    }

    fn new_rows(&mut self, rows: BTreeMap<usize, BTreeMap<usize, &CellValue>>) -> Result<(), String> {
        for (row, cells) in rows {
            if cells.values().all(|v| matches!(v, CellValue::Empty)) {
                continue;
            }
            let mut start = BytesStart::new("row");
            start.push_attribute(("r", (row + 1).to_string().as_str()));
            self.write(Event::Start(start))?;
            self.new_cells(row, cells)?;
            self.write(Event::End(BytesEnd::new("row")))?;
            self.stats.rows_inserted += 1;
        }
        Ok(())
    }
}

/// Entries of `map` with keys below `bound`, removed from `map`.
fn take_below<V>(map: &mut BTreeMap<usize, V>, bound: usize) -> BTreeMap<usize, V> {
    let rest = map.split_off(&bound);
    std::mem::replace(map, rest)
}

/// Rewrite a worksheet part with `edits` applied.
///
/// `date_styles` maps a cell's current style (0 when it has none) to the
/// style index to use for a date written there.
pub fn patch_worksheet(
    xml: &str,
    edits: &CellEdits,
    date_styles: &BTreeMap<u32, u32>,
) -> Result<(Vec<u8>, SheetPatchStats), String> {
    let mut pending: BTreeMap<usize, BTreeMap<usize, &CellValue>> = BTreeMap::new();
    for (&(row, col), value) in edits {
        pending.entry(row).or_default().insert(col, value);
    }

    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut pos = Position::default();
    let mut row_edits: BTreeMap<usize, &CellValue> = BTreeMap::new();
    let mut skip_depth = 0usize;
    let mut saw_sheet_data = false;
    let mut p = Patcher {
        writer: Writer::new(Vec::with_capacity(xml.len() + 256)),
        date_styles,
        stats: SheetPatchStats::default(),
    };

    loop {
        {
            let event = reader.read_event_into(&mut buf).map_err(xml_err)?;

            // Inside a replaced <c>: drop its children.
            if skip_depth > 0 {
                match event {
                    Event::Start(_) => skip_depth += 1,
                    Event::End(_) => skip_depth -= 1,
                    Event::Eof => return Err(xml_err("unexpected end of document inside a cell")),
                    _ => {}
                }
            } else {
                match event {
                    Event::Eof => break,
                    Event::Empty(e) if e.local_name().as_ref() == b"dimension" => {
                        let extended = attr(&e, b"ref").and_then(|r| extend_dimension(&r, edits));
                        match extended {
                            Some(r) => p.write(Event::Empty(with_attr(&e, b"ref", Some(r.as_str()))))?,
                            None => p.write(Event::Empty(e))?,
                        }
                    }
                    Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                        saw_sheet_data = true;
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        p.write(Event::Start(e))?;
                        p.new_rows(std::mem::take(&mut pending))?;
                        p.write(Event::End(BytesEnd::new(name)))?;
                    }
                    Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                        saw_sheet_data = true;
                        p.write(Event::Start(e))?;
                    }
                    Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                        p.new_rows(std::mem::take(&mut pending))?;
                        p.write(Event::End(e))?;
                    }
                    Event::Start(e) if e.local_name().as_ref() == b"row" => {
                        let row = pos.enter_row(&e);
                        let before = take_below(&mut pending, row);
                        p.new_rows(before)?;
                        row_edits = pending.remove(&row).unwrap_or_default();
                        if row_edits.is_empty() {
                            p.write(Event::Start(e))?;
                        } else {
                            p.write(Event::Start(with_attr(&e, b"spans", None)))?;
                        }
                    }
                    Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                        let row = pos.enter_row(&e);
                        let before = take_below(&mut pending, row);
                        p.new_rows(before)?;
                        match pending.remove(&row) {
                            Some(cells) => {
                                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                                p.write(Event::Start(with_attr(&e, b"spans", None)))?;
                                p.new_cells(row, cells)?;
                                p.write(Event::End(BytesEnd::new(name)))?;
                            }
                            None => p.write(Event::Empty(e))?,
                        }
                    }
                    Event::End(e) if e.local_name().as_ref() == b"row" => {
                        let row = pos.row.unwrap_or(0);
                        p.new_cells(row, std::mem::take(&mut row_edits))?;
                        p.write(Event::End(e))?;
                    }
                    Event::Start(e) if e.local_name().as_ref() == b"c" => {
                        let at = pos.enter_cell(&e);
                        let before = take_below(&mut row_edits, at.1);
                        p.new_cells(at.0, before)?;
                        match row_edits.remove(&at.1) {
                            Some(value) => {
                                p.cell(at, value, style_of(&e))?;
                                p.stats.replaced += 1;
                                skip_depth = 1;
                            }
                            None => p.write(Event::Start(e))?,
                        }
                    }
                    Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                        let at = pos.enter_cell(&e);
                        let before = take_below(&mut row_edits, at.1);
                        p.new_cells(at.0, before)?;
                        match row_edits.remove(&at.1) {
                            Some(value) => {
                                p.cell(at, value, style_of(&e))?;
                                p.stats.replaced += 1;
                            }
                            None => p.write(Event::Empty(e))?,
                        }
                    }
                    other => p.write(other)?,
                }
            }
        }
        buf.clear();
    }

    if !saw_sheet_data {
        return Err(xml_err("no <sheetData> element"));
    }
    Ok((p.writer.into_inner(), p.stats))
}

/// Widen a `dimension` reference ("A1:L20") to cover every edited cell.
fn extend_dimension(reference: &str, edits: &CellEdits) -> Option<String> {
    let (first, last) = reference.split_once(':').unwrap_or((reference, reference));
    let (mut top, mut left) = parse_cell_ref(first)?;
    let (mut bottom, mut right) = parse_cell_ref(last)?;
    let before = (top, left, bottom, right);

    for (&(row, col), value) in edits {
        if matches!(value, CellValue::Empty) {
            continue;
        }
        top = top.min(row);
        left = left.min(col);
        bottom = bottom.max(row);
        right = right.max(col);
    }

    if (top, left, bottom, right) == before {
        return None;
    }
    Some(format!("{}:{}", cell_ref(top, left), cell_ref(bottom, right)))
}
