// Delimited text: source exports and plain-text templates

use std::path::Path;

use distmerge_recon::grid::{CellValue, Grid};
use distmerge_recon::source::SourceTable;

/// Read a delimited source export. The first record is the header row.
pub fn read_table(path: &Path) -> Result<SourceTable, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter_for(path, &content);
    SourceTable::from_csv(&content, delimiter).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Read a delimited file as a headerless grid. Numeric fields become
/// numbers; everything else stays text.
pub fn read_grid(path: &Path) -> Result<Grid, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter_for(path, &content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut grid = Grid::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("{}: {}", path.display(), e))?;
        for (col, field) in record.iter().enumerate() {
            let field = field.trim_start_matches('\u{feff}');
            if field.trim().is_empty() {
                continue;
            }
            let value = match field.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => CellValue::Number(n),
                _ => CellValue::text(field),
            };
            grid.load(row, col, value);
        }
    }
    Ok(grid)
}

fn delimiter_for(path: &Path, content: &str) -> u8 {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ref ext) if ext == "tsv" => b'\t',
        _ => sniff_delimiter(content),
    }
}

/// Pick the delimiter that splits the first lines into the same number of
/// fields most often, preferring more fields. Falls back to comma.
pub fn sniff_delimiter(content: &str) -> u8 {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    let field_count = |line: &str, delim: u8| -> usize {
        csv::ReaderBuilder::new()
            .delimiter(delim)
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes())
            .records()
            .next()
            .and_then(|r| r.ok())
            .map_or(1, |r| r.len())
    };

    let mut best = (b',', 0usize);
    for delim in [b'\t', b';', b',', b'|'] {
        let counts: Vec<usize> = lines.iter().map(|l| field_count(l, delim)).collect();
        let Some(&first) = counts.first() else {
            break;
        };
        if first <= 1 {
            continue;
        }
        let score = counts.iter().filter(|&&c| c == first).count() * first;
        if score > best.1 {
            best = (delim, score);
        }
    }
    best.0
}

/// UTF-8 when valid, Windows-1252 otherwise (Excel's CSV export default).
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            log::debug!("{} is not UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            Ok(decoded.into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(sniff_delimiter("a;b;c\n1;2,5;3\n"), b';');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter("single\ncolumn\n"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn latin1_export_is_decoded() {
        // "Société" in Windows-1252
        let file = write_temp(".csv", b"Investor,Date,Amount\nSoci\xe9t\xe9,1/15/2024,10\n");
        let table = read_table(file.path()).unwrap();
        assert_eq!(table.rows[0][0], CellValue::text("Société"));
    }

    #[test]
    fn semicolon_export_with_decimal_commas() {
        let file = write_temp(".csv", "Investor;Date;Amount\nJon Smith;15 Jan 2024;\"1,250.00\"\n".as_bytes());
        let table = read_table(file.path()).unwrap();
        assert_eq!(table.headers, vec!["Investor", "Date", "Amount"]);
        assert_eq!(table.rows[0][2], CellValue::text("1,250.00"));
    }

    #[test]
    fn grid_keeps_absolute_positions() {
        let file = write_temp(".csv", b",,Investing Entity\n,,Jane Doe,42\n");
        let grid = read_grid(file.path()).unwrap();
        assert_eq!(grid.text(0, 2), Some("Investing Entity"));
        assert_eq!(grid.get(1, 3), &CellValue::Number(42.0));
        assert_eq!(grid.get(0, 0), &CellValue::Empty);
        assert_eq!(grid.edit_count(), 0);
    }
}
