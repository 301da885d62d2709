//! Tables: row layouts read from labels and the decoded [Table] they produce.
use std::ops::Index;

use serde::Serialize;
use tracing::{debug, trace};

use crate::decode::bits::{self, BitField};
use crate::decode::{AsciiKind, Cell, Endian, SampleType, Scaling, SpecialConstants};
use crate::label::pds4::text_of;
use crate::label::{Block, Value};
use crate::{DecodeWarning, Error, Result};

/// Maximum depth of nested `^STRUCTURE` includes.
const MAX_STRUCTURE_DEPTH: usize = 8;

/// How rows are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableFormat {
    /// Fixed-width binary records.
    Binary,
    /// Fixed-width text records.
    Character,
    /// Text records split on a delimiter byte.
    Delimited(u8),
}

/// Map a PDS3 `FIELD_DELIMITER` or PDS4 `field_delimiter` to its byte.
pub fn delimiter_byte(name: &str) -> Option<u8> {
    match name.trim().to_ascii_uppercase().replace(' ', "_").as_str() {
        "COMMA" => Some(b','),
        "SEMICOLON" => Some(b';'),
        "TAB" | "HORIZONTAL_TAB" => Some(b'\t'),
        "VERTICAL_BAR" => Some(b'|'),
        "," => Some(b','),
        ";" => Some(b';'),
        "|" => Some(b'|'),
        _ => None,
    }
}

/// One field of a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub sample_type: SampleType,
    /// 0-based offset within the row, not counting row prefix bytes.
    pub start: usize,
    pub bytes: usize,
    pub items: usize,
    pub item_bytes: usize,
    pub item_offset: usize,
    /// 0-based position among delimited fields.
    pub field_index: Option<usize>,
    pub scaling: Scaling,
    pub specials: SpecialConstants,
    pub bit_fields: Vec<BitField>,
    pub format: Option<String>,
    pub unit: Option<String>,
}

/// Layout of every row in a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLayout {
    pub columns: Vec<ColumnSpec>,
    /// Declared row count; 0 when unknown.
    pub rows: usize,
    pub row_bytes: Option<usize>,
    pub prefix_bytes: usize,
    pub suffix_bytes: usize,
    pub format: TableFormat,
}

fn int(block: &Block, key: &str) -> Option<i64> {
    block.get(key).and_then(text_of).and_then(Value::as_i64)
}

fn size(block: &Block, key: &str) -> Option<usize> {
    int(block, key).and_then(|v| usize::try_from(v).ok())
}

fn text(block: &Block, key: &str) -> Option<String> {
    block.get(key).and_then(text_of).map(|v| match v {
        Value::Text(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

/// A type usable for a text field declared with a binary-looking type name.
fn ascii_equivalent(data_type: &str) -> SampleType {
    let dt = data_type.to_ascii_uppercase();
    if dt.contains("INT") {
        SampleType::Ascii(AsciiKind::Integer)
    } else if dt.contains("REAL") || dt.contains("FLOAT") || dt.contains("DOUBLE") {
        SampleType::Ascii(AsciiKind::Real)
    } else if dt.contains("DATE") || dt.contains("TIME") {
        SampleType::Date
    } else {
        SampleType::Character
    }
}

impl ColumnSpec {
    fn new(name: String, sample_type: SampleType, start: usize, bytes: usize) -> Self {
        Self {
            name,
            sample_type,
            start,
            bytes,
            items: 1,
            item_bytes: bytes,
            item_offset: bytes,
            field_index: None,
            scaling: Scaling::default(),
            specials: SpecialConstants::default(),
            bit_fields: Vec::new(),
            format: None,
            unit: None,
        }
    }

    /// Build from a PDS3 `COLUMN` or `FIELD` block. `base` is the 0-based offset of the
    /// enclosing container.
    fn from_pds3(block: &Block, index: usize, base: usize, text_table: bool) -> Result<Self> {
        let name = text(block, "NAME").unwrap_or_else(|| format!("COLUMN_{index}"));
        let data_type = text(block, "DATA_TYPE").unwrap_or_else(|| "CHARACTER".to_string());
        let items = size(block, "ITEMS").unwrap_or(1).max(1);
        let item_bytes = size(block, "ITEM_BYTES");
        let bytes = size(block, "BYTES")
            .or_else(|| item_bytes.map(|b| b * items))
            .unwrap_or(0);
        let item_bytes = item_bytes.unwrap_or(bytes / items);
        let item_offset = size(block, "ITEM_OFFSET").unwrap_or(item_bytes);
        if item_offset < item_bytes {
            return Err(Error::UnsupportedFormat(format!(
                "{name}: ITEM_OFFSET {item_offset} is narrower than ITEM_BYTES {item_bytes}"
            )));
        }
        let sample_type = match SampleType::from_pds3(&data_type, item_bytes) {
            Ok(st) if text_table && st.is_binary_numeric() => ascii_equivalent(&data_type),
            Ok(st) => st,
            Err(_) if text_table => ascii_equivalent(&data_type),
            Err(err) => return Err(err),
        };
        let start = base + size(block, "START_BYTE").unwrap_or(1).saturating_sub(1);

        let mut col = Self::new(name, sample_type, start, bytes);
        col.items = items;
        col.item_bytes = item_bytes;
        col.item_offset = item_offset;
        col.field_index = size(block, "FIELD_NUMBER").map(|n| n.saturating_sub(1));
        col.scaling = Scaling::from_block(block);
        col.specials = SpecialConstants::from_block(block);
        col.bit_fields = block
            .get_all("BIT_COLUMN")
            .filter_map(Value::as_block)
            .filter_map(BitField::from_block)
            .collect();
        col.unit = text(block, "UNIT");
        if col.scaling.is_identity() {
            col.format = text(block, "FORMAT");
        }
        Ok(col)
    }

    /// Build from a PDS4 `Field_Binary`, `Field_Character` or `Field_Delimited` block.
    fn from_pds4(block: &Block, index: usize, base: usize) -> Result<Self> {
        let name = text(block, "name").unwrap_or_else(|| format!("FIELD_{index}"));
        let data_type = text(block, "data_type").unwrap_or_else(|| "ASCII_String".to_string());
        let sample_type = SampleType::from_pds4(&data_type)?;
        let bytes = size(block, "field_length").unwrap_or(0);
        let start = base + size(block, "field_location").unwrap_or(1).saturating_sub(1);

        let mut col = Self::new(name, sample_type, start, bytes);
        col.field_index = size(block, "field_number").map(|n| n.saturating_sub(1));
        col.scaling = Scaling::from_keys(block, "scaling_factor", "value_offset");
        if let Some(specials) = block.get("Special_Constants").and_then(Value::as_block) {
            col.specials = SpecialConstants::from_pds4(specials);
        }
        col.bit_fields = block
            .get("Packed_Data_Fields")
            .and_then(Value::as_block)
            .map(|packed| {
                packed
                    .get_all("Field_Bit")
                    .filter_map(Value::as_block)
                    .filter_map(|bit| {
                        let start_bit = size(bit, "start_bit_location")?;
                        let stop = size(bit, "stop_bit_location").unwrap_or(start_bit);
                        Some(BitField {
                            name: text(bit, "name").unwrap_or_default(),
                            start_bit,
                            bits: Some(stop.saturating_sub(start_bit) + 1),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        col.unit = text(block, "unit");
        if col.scaling.is_identity() {
            col.format = text(block, "field_format");
        }
        Ok(col)
    }

    fn is_text_numeric(&self) -> bool {
        matches!(
            self.sample_type,
            SampleType::Ascii(AsciiKind::Integer | AsciiKind::Real)
        )
    }

    /// Mask and scale one decoded value.
    fn finish(&self, cell: Cell) -> Cell {
        let scaling = &self.scaling;
        let specials = &self.specials;
        match cell.as_f64() {
            Some(raw) if specials.is_special(raw) => Cell::Null,
            Some(raw) if !scaling.is_identity() => Cell::Float(scaling.apply(raw, 0)),
            _ => cell,
        }
    }

    fn decode_fixed(&self, row: &[u8], at: usize) -> Result<Cell> {
        let slice = |from: usize, len: usize| {
            row.get(from..from + len).ok_or(Error::NotEnoughData {
                actual: row.len(),
                minimum: from + len,
            })
        };
        if !self.bit_fields.is_empty() {
            let endian = match self.sample_type {
                SampleType::BitString { endian } | SampleType::Int { endian, .. } => endian,
                _ => Endian::Big,
            };
            let values = bits::extract(slice(at, self.bytes)?, endian, &self.bit_fields);
            return Ok(Cell::Items(
                values
                    .into_iter()
                    .map(|v| v.map_or(Cell::Null, Cell::UInt))
                    .collect(),
            ));
        }
        if self.items > 1 {
            let items = (0..self.items)
                .map(|i| {
                    let bytes = slice(at + i * self.item_offset, self.item_bytes)?;
                    Ok(self.finish(self.sample_type.decode(bytes)?))
                })
                .collect::<Result<Vec<Cell>>>()?;
            return Ok(Cell::Items(items));
        }
        Ok(self.finish(self.sample_type.decode(slice(at, self.bytes)?)?))
    }

    fn parse_token(&self, raw: &str) -> Cell {
        if raw.trim().is_empty() {
            return Cell::Null;
        }
        self.finish(self.sample_type.parse_text(raw))
    }
}

fn pds3_columns(
    block: &Block,
    base: usize,
    text_table: bool,
    out: &mut Vec<ColumnSpec>,
) -> Result<()> {
    for (key, value) in block.iter() {
        let Some(child) = value.as_block() else {
            continue;
        };
        match key {
            "COLUMN" | "FIELD" => {
                let col = ColumnSpec::from_pds3(child, out.len(), base, text_table)?;
                out.push(col);
            }
            "CONTAINER" => {
                let start = base + size(child, "START_BYTE").unwrap_or(1).saturating_sub(1);
                let bytes = size(child, "BYTES").unwrap_or(0);
                let repetitions = size(child, "REPETITIONS").unwrap_or(1).max(1);
                trace!(start, bytes, repetitions, "container");
                for rep in 0..repetitions {
                    pds3_columns(child, start + rep * bytes, text_table, out)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn pds4_fields(block: &Block, base: usize, out: &mut Vec<ColumnSpec>) -> Result<()> {
    for (key, value) in block.iter() {
        let Some(child) = value.as_block() else {
            continue;
        };
        if key.starts_with("Field_") {
            let col = ColumnSpec::from_pds4(child, out.len(), base)?;
            out.push(col);
        } else if key.starts_with("Group_Field_") {
            let repetitions = size(child, "repetitions").unwrap_or(1).max(1);
            let start = base + size(child, "group_location").unwrap_or(1).saturating_sub(1);
            let stride = size(child, "group_length").unwrap_or(0) / repetitions;
            for rep in 0..repetitions {
                let before = out.len();
                pds4_fields(child, start + rep * stride, out)?;
                // Delimited groups number their fields within one repetition.
                let width = out.len() - before;
                for col in &mut out[before..] {
                    if let Some(i) = col.field_index.as_mut() {
                        *i += rep * width;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Replace every `^STRUCTURE` entry (at any depth) with the contents of the format file it
/// names. `load` reads and parses one format file.
pub fn splice_structures<F>(block: &Block, load: &mut F) -> Result<Block>
where
    F: FnMut(&str) -> Result<Block>,
{
    splice(block, load, 0)
}

fn splice<F>(block: &Block, load: &mut F, depth: usize) -> Result<Block>
where
    F: FnMut(&str) -> Result<Block>,
{
    let mut out = Block::new();
    for (key, value) in block.iter() {
        match value {
            Value::Text(file) if key == "^STRUCTURE" => {
                if depth >= MAX_STRUCTURE_DEPTH {
                    return Err(Error::UnsupportedFormat(format!(
                        "^STRUCTURE nested deeper than {MAX_STRUCTURE_DEPTH}"
                    )));
                }
                debug!(file, "splicing structure");
                let spliced = splice(&load(file)?, load, depth + 1)?;
                for (k, v) in spliced.iter() {
                    out.push(k, v.clone());
                }
            }
            Value::Block(child) => out.push(key, Value::Block(splice(child, load, depth)?)),
            other => out.push(key, other.clone()),
        }
    }
    Ok(out)
}

impl RowLayout {
    /// Layout of a PDS3 `TABLE`/`SPREADSHEET`/... object. `^STRUCTURE` includes must
    /// already be spliced.
    ///
    /// # Errors
    /// [Error::UnsupportedFormat] for column types that cannot be decoded.
    pub fn from_pds3(name: &str, block: &Block) -> Result<Self> {
        let mentions_ascii = block
            .find_blocks("COLUMN")
            .iter()
            .chain(block.find_blocks("FIELD").iter())
            .any(|c| text(c, "DATA_TYPE").is_some_and(|t| t.contains("ASCII")));
        let text_table = mentions_ascii
            || name.contains("ASCII")
            || name.contains("SPREADSHEET")
            || text(block, "INTERCHANGE_FORMAT").as_deref() == Some("ASCII");
        let delimiter = text(block, "FIELD_DELIMITER").and_then(|d| delimiter_byte(&d));
        let format = match (delimiter, name.contains("SPREADSHEET")) {
            (Some(d), _) => TableFormat::Delimited(d),
            (None, true) => TableFormat::Delimited(b','),
            (None, false) if text_table => TableFormat::Character,
            _ => TableFormat::Binary,
        };

        let mut columns = Vec::new();
        pds3_columns(block, 0, text_table, &mut columns)?;
        disambiguate(&mut columns);
        let mut next_field = 0;
        for col in &mut columns {
            if col.field_index.is_none() {
                col.field_index = Some(next_field);
            }
            next_field = col.field_index.unwrap_or(next_field) + col.items;
        }
        let layout = Self {
            columns,
            rows: size(block, "ROWS").or_else(|| size(block, "RECORDS")).unwrap_or(0),
            row_bytes: size(block, "ROW_BYTES").or_else(|| size(block, "RECORD_BYTES")),
            prefix_bytes: size(block, "ROW_PREFIX_BYTES").unwrap_or(0),
            suffix_bytes: size(block, "ROW_SUFFIX_BYTES").unwrap_or(0),
            format,
        };
        debug!(name, columns = layout.columns.len(), rows = layout.rows, format = ?layout.format, "pds3 table layout");
        Ok(layout)
    }

    /// Layout of a PDS4 `Table_Binary`, `Table_Character` or `Table_Delimited` element.
    pub fn from_pds4(tag: &str, block: &Block) -> Result<Self> {
        let (record_tag, format) = match tag {
            "Table_Binary" => ("Record_Binary", TableFormat::Binary),
            "Table_Character" => ("Record_Character", TableFormat::Character),
            "Table_Delimited" => {
                let delim = text(block, "field_delimiter")
                    .and_then(|d| delimiter_byte(&d))
                    .unwrap_or(b',');
                ("Record_Delimited", TableFormat::Delimited(delim))
            }
            other => return Err(Error::UnsupportedFormat(format!("table element {other}"))),
        };
        let record = block
            .get(record_tag)
            .and_then(Value::as_block)
            .ok_or_else(|| Error::UnsupportedFormat(format!("{tag} without {record_tag}")))?;
        let mut columns = Vec::new();
        pds4_fields(record, 0, &mut columns)?;
        disambiguate(&mut columns);
        if let TableFormat::Delimited(_) = format {
            for (i, col) in columns.iter_mut().enumerate() {
                col.field_index.get_or_insert(i);
            }
        }
        Ok(Self {
            columns,
            rows: size(block, "records").unwrap_or(0),
            row_bytes: size(record, "record_length"),
            prefix_bytes: 0,
            suffix_bytes: 0,
            format,
        })
    }

    /// Bytes from the start of one row to the start of the next.
    pub fn stride(&self) -> usize {
        let row_bytes = self.row_bytes.unwrap_or_else(|| {
            self.columns
                .iter()
                .map(|c| c.start + c.bytes.max(c.item_offset * c.items))
                .max()
                .unwrap_or(0)
        });
        self.prefix_bytes + row_bytes + self.suffix_bytes
    }
}

/// Rename repeated column names to `NAME_0`, `NAME_1`, ... in order.
fn disambiguate(columns: &mut [ColumnSpec]) {
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let mut seen: Vec<(String, usize)> = Vec::new();
    for col in columns.iter_mut() {
        let total = names.iter().filter(|n| **n == col.name).count();
        if total < 2 {
            continue;
        }
        let n = match seen.iter_mut().find(|(name, _)| *name == col.name) {
            Some(entry) => {
                entry.1 += 1;
                entry.1
            }
            None => {
                seen.push((col.name.clone(), 0));
                0
            }
        };
        col.name = format!("{}_{n}", col.name);
    }
}

/// Descriptive metadata of a decoded column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub unit: Option<String>,
    pub format: Option<String>,
}

/// A decoded table, stored by row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

/// One row of a [Table], indexable by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [Column],
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Cell> {
        let i = self.columns.iter().position(|c| c.name == name)?;
        self.cells.get(i)
    }

    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }
}

impl Index<&str> for Row<'_> {
    type Output = Cell;

    fn index(&self, name: &str) -> &Cell {
        self.get(name)
            .unwrap_or_else(|| panic!("no column named {name}"))
    }
}

impl Table {
    /// Assemble a table from column names and rows of cells.
    pub fn new(names: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let columns = names
            .into_iter()
            .map(|name| Column {
                name,
                unit: None,
                format: None,
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every value of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let i = self.columns.iter().position(|c| c.name == name)?;
        Some(self.rows.iter().filter_map(|r| r.get(i)).collect())
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&Cell> {
        self.row(row)?.get(name)
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|cells| Row {
            columns: &self.columns,
            cells,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row {
            columns: &self.columns,
            cells,
        })
    }

    /// Write as CSV with a header row.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(self.names())?;
        for row in &self.rows {
            w.write_record(row.iter().map(ToString::to_string))?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Guess a cell type for untyped text.
fn guess_cell(raw: &str) -> Cell {
    let s = raw.trim();
    if s.is_empty() {
        return Cell::Null;
    }
    if let Ok(v) = s.parse::<i64>() {
        return Cell::Int(v);
    }
    if let Ok(v) = s.parse::<f64>() {
        return Cell::Float(v);
    }
    Cell::Text(s.to_string())
}

/// Read comma separated text whose first row names the columns, ignoring any label
/// description of its fields.
pub fn read_csv_with_headers(data: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);
    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(guess_cell).collect());
    }
    Ok(Table::new(names, rows))
}

/// Decode a table from `data`, which starts at the table's first byte.
///
/// Short data shrinks the row count with a warning. Delimited tables that fail to parse
/// are retried as fixed-width text.
pub fn build_table(
    name: &str,
    data: &[u8],
    layout: &RowLayout,
    warnings: &mut Vec<DecodeWarning>,
) -> Result<Table> {
    let rows = match layout.format {
        TableFormat::Delimited(delim) => match read_delimited(data, layout, delim) {
            Ok(rows) => rows,
            Err(err) => {
                let message = format!("delimited parse failed ({err}); reading as fixed-width");
                debug!(object = name, "{message}");
                warnings.push(DecodeWarning::new(name, message));
                read_fixed(name, data, layout, warnings)?
            }
        },
        TableFormat::Character if layout.row_bytes.is_none() => read_lines(data, layout)?,
        _ => read_fixed(name, data, layout, warnings)?,
    };

    for (i, col) in layout.columns.iter().enumerate() {
        if !col.is_text_numeric() {
            continue;
        }
        let bad = rows
            .iter()
            .filter_map(|r: &Vec<Cell>| r.get(i))
            .filter(|c| matches!(c, Cell::Text(_)))
            .count();
        if bad > 0 {
            let message = format!("{bad} unparseable values in {} kept as text", col.name);
            debug!(object = name, "{message}");
            warnings.push(DecodeWarning::new(name, message));
        }
    }

    let columns = layout
        .columns
        .iter()
        .map(|c| Column {
            name: c.name.clone(),
            unit: c.unit.clone(),
            format: c.format.clone(),
        })
        .collect();
    Ok(Table { columns, rows })
}

fn read_fixed(
    name: &str,
    data: &[u8],
    layout: &RowLayout,
    warnings: &mut Vec<DecodeWarning>,
) -> Result<Vec<Vec<Cell>>> {
    let stride = layout.stride();
    if stride == 0 {
        return Err(Error::UnsupportedFormat(format!("{name} has zero-length rows")));
    }
    // The final row may omit its suffix.
    let mut available = data.len() / stride;
    if data.len() % stride >= stride - layout.suffix_bytes && stride > layout.suffix_bytes {
        available += 1;
    }
    let rows = if layout.rows == 0 {
        available
    } else if available < layout.rows {
        let message = format!(
            "label declares {} rows but data holds {available}; reading {available}",
            layout.rows
        );
        debug!(object = name, "{message}");
        warnings.push(DecodeWarning::new(name, message));
        available
    } else {
        layout.rows
    };
    trace!(object = name, rows, stride, "reading fixed-width rows");

    (0..rows)
        .map(|r| {
            let start = r * stride;
            let row = &data[start..(start + stride).min(data.len())];
            layout
                .columns
                .iter()
                .map(|col| col.decode_fixed(row, layout.prefix_bytes + col.start))
                .collect::<Result<Vec<Cell>>>()
        })
        .collect()
}

fn read_lines(data: &[u8], layout: &RowLayout) -> Result<Vec<Vec<Cell>>> {
    let limit = if layout.rows == 0 { usize::MAX } else { layout.rows };
    data.split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .take(limit)
        .map(|line| {
            layout
                .columns
                .iter()
                .map(|col| col.decode_fixed(line, layout.prefix_bytes + col.start))
                .collect::<Result<Vec<Cell>>>()
        })
        .collect()
}

fn read_delimited(data: &[u8], layout: &RowLayout, delimiter: u8) -> Result<Vec<Vec<Cell>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data);
    let limit = if layout.rows == 0 { usize::MAX } else { layout.rows };
    let mut rows = Vec::new();
    for record in reader.records().take(limit) {
        let record = record?;
        let row = layout
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let first = col.field_index.unwrap_or(i);
                let token = |k: usize| record.get(first + k).unwrap_or("");
                if col.items > 1 {
                    Cell::Items((0..col.items).map(|k| col.parse_token(token(k))).collect())
                } else {
                    col.parse_token(token(0))
                }
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::pds3;

    fn block(text: &str) -> Block {
        let (tree, _) = pds3::parse_block(text).unwrap();
        tree.find_block("TABLE")
            .or_else(|| tree.find_block("SPREADSHEET"))
            .cloned()
            .unwrap()
    }

    const BINARY: &str = r#"
OBJECT = TABLE
  ROWS = 2
  ROW_BYTES = 13
  OBJECT = COLUMN
    NAME = X
    DATA_TYPE = MSB_UNSIGNED_INTEGER
    START_BYTE = 1
    BYTES = 1
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = Y
    DATA_TYPE = IEEE_REAL
    START_BYTE = 2
    BYTES = 4
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = X
    DATA_TYPE = IEEE_REAL
    START_BYTE = 6
    BYTES = 8
  END_OBJECT = COLUMN
END_OBJECT = TABLE
END
"#;

    fn binary_rows(n: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for _ in 0..n {
            data.push(1u8);
            data.extend(4.4f32.to_be_bytes());
            data.extend(8.8f64.to_be_bytes());
        }
        data
    }

    #[test]
    fn duplicate_names_are_indexed() {
        let layout = RowLayout::from_pds3("TABLE", &block(BINARY)).unwrap();
        assert_eq!(layout.format, TableFormat::Binary);
        let names: Vec<&str> = layout.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["X_0", "Y", "X_1"]);

        let mut warnings = Vec::new();
        let table = build_table("TABLE", &binary_rows(2), &layout, &mut warnings).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "X_0"), Some(&Cell::UInt(1)));
        let y = table.get(1, "Y").and_then(Cell::as_f64).unwrap();
        assert!((y - 4.4).abs() < 1e-6);
        assert_eq!(table.row(1).unwrap()["X_1"], Cell::Float(8.8));
    }

    #[test]
    fn short_data_shrinks_rows() {
        let layout = RowLayout::from_pds3("TABLE", &block(BINARY)).unwrap();
        let mut warnings = Vec::new();
        let table = build_table("TABLE", &binary_rows(1), &layout, &mut warnings).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn prefix_items_and_scaling() {
        let text = r#"
OBJECT = TABLE
  ROWS = 1
  ROW_BYTES = 6
  ROW_PREFIX_BYTES = 2
  OBJECT = COLUMN
    NAME = COUNTS
    DATA_TYPE = LSB_UNSIGNED_INTEGER
    START_BYTE = 1
    BYTES = 4
    ITEMS = 2
    ITEM_BYTES = 2
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = TEMP
    DATA_TYPE = UNSIGNED_INTEGER
    START_BYTE = 5
    BYTES = 2
    SCALING_FACTOR = 0.5
    OFFSET = 1
    FORMAT = "I5"
    MISSING_CONSTANT = 65535
  END_OBJECT = COLUMN
END_OBJECT = TABLE
"#;
        let layout = RowLayout::from_pds3("TABLE", &block(text)).unwrap();
        assert_eq!(layout.columns[1].format, None);
        let data = [0xAA, 0xBB, 1, 0, 2, 0, 0, 10];
        let table = build_table("TABLE", &data, &layout, &mut Vec::new()).unwrap();
        assert_eq!(
            table.get(0, "COUNTS"),
            Some(&Cell::Items(vec![Cell::UInt(1), Cell::UInt(2)]))
        );
        assert_eq!(table.get(0, "TEMP"), Some(&Cell::Float(6.0)));

        let data = [0, 0, 1, 0, 2, 0, 0xFF, 0xFF];
        let table = build_table("TABLE", &data, &layout, &mut Vec::new()).unwrap();
        assert_eq!(table.get(0, "TEMP"), Some(&Cell::Null));
    }

    #[test]
    fn bit_columns() {
        let text = r#"
OBJECT = TABLE
  ROWS = 1
  ROW_BYTES = 1
  OBJECT = COLUMN
    NAME = FLAGS
    DATA_TYPE = MSB_BIT_STRING
    START_BYTE = 1
    BYTES = 1
    OBJECT = BIT_COLUMN
      NAME = HIGH
      START_BIT = 1
      BITS = 4
    END_OBJECT = BIT_COLUMN
    OBJECT = BIT_COLUMN
      NAME = LOW
      START_BIT = 5
      BITS = 4
    END_OBJECT = BIT_COLUMN
  END_OBJECT = COLUMN
END_OBJECT = TABLE
"#;
        let layout = RowLayout::from_pds3("TABLE", &block(text)).unwrap();
        let table = build_table("TABLE", &[0x3C], &layout, &mut Vec::new()).unwrap();
        assert_eq!(
            table.get(0, "FLAGS"),
            Some(&Cell::Items(vec![Cell::UInt(3), Cell::UInt(12)]))
        );
    }

    #[test]
    fn wide_bit_strings_keep_every_byte() {
        let text = r#"
OBJECT = TABLE
  ROWS = 1
  ROW_BYTES = 11
  OBJECT = COLUMN
    NAME = ID
    DATA_TYPE = MSB_UNSIGNED_INTEGER
    START_BYTE = 1
    BYTES = 1
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = STATUS
    DATA_TYPE = MSB_BIT_STRING
    START_BYTE = 2
    BYTES = 10
  END_OBJECT = COLUMN
END_OBJECT = TABLE
"#;
        let layout = RowLayout::from_pds3("TABLE", &block(text)).unwrap();
        let data = [7, 0, 0, 0, 0, 0, 0, 0, 0, 0xAB, 0xCD];
        let mut warnings = Vec::new();
        let table = build_table("TABLE", &data, &layout, &mut warnings).unwrap();
        assert_eq!(table.get(0, "ID"), Some(&Cell::UInt(7)));
        assert_eq!(
            table.get(0, "STATUS"),
            Some(&Cell::Text("0000000000000000abcd".into()))
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn containers_repeat() {
        let text = r#"
OBJECT = TABLE
  ROWS = 1
  ROW_BYTES = 4
  OBJECT = CONTAINER
    START_BYTE = 1
    BYTES = 2
    REPETITIONS = 2
    OBJECT = COLUMN
      NAME = V
      DATA_TYPE = MSB_INTEGER
      START_BYTE = 1
      BYTES = 2
    END_OBJECT = COLUMN
  END_OBJECT = CONTAINER
END_OBJECT = TABLE
"#;
        let layout = RowLayout::from_pds3("TABLE", &block(text)).unwrap();
        let table = build_table("TABLE", &[0, 1, 0xFF, 0xFF], &layout, &mut Vec::new()).unwrap();
        assert_eq!(table.get(0, "V_0"), Some(&Cell::Int(1)));
        assert_eq!(table.get(0, "V_1"), Some(&Cell::Int(-1)));
    }

    #[test]
    fn ascii_fixed_width() {
        let text = r#"
OBJECT = TABLE
  INTERCHANGE_FORMAT = ASCII
  ROWS = 2
  ROW_BYTES = 12
  OBJECT = COLUMN
    NAME = ID
    DATA_TYPE = INTEGER
    START_BYTE = 1
    BYTES = 3
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = VALUE
    DATA_TYPE = ASCII_REAL
    START_BYTE = 5
    BYTES = 6
  END_OBJECT = COLUMN
END_OBJECT = TABLE
"#;
        let layout = RowLayout::from_pds3("TABLE", &block(text)).unwrap();
        assert_eq!(layout.format, TableFormat::Character);
        let data = b" 12 1.5E+0\r\n  7    abc\r\n";
        let mut warnings = Vec::new();
        let table = build_table("TABLE", data, &layout, &mut warnings).unwrap();
        assert_eq!(table.get(0, "ID"), Some(&Cell::Int(12)));
        assert_eq!(table.get(0, "VALUE"), Some(&Cell::Float(1.5)));
        assert_eq!(table.get(1, "VALUE"), Some(&Cell::Text("abc".into())));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn delimited_spreadsheet() {
        let text = r#"
OBJECT = SPREADSHEET
  ROWS = 2
  FIELD_DELIMITER = "SEMICOLON"
  OBJECT = FIELD
    NAME = NAME
    DATA_TYPE = CHARACTER
    BYTES = 10
  END_OBJECT = FIELD
  OBJECT = FIELD
    NAME = VALUE
    DATA_TYPE = ASCII_REAL
    BYTES = 10
  END_OBJECT = FIELD
END_OBJECT = SPREADSHEET
"#;
        let layout = RowLayout::from_pds3("SPREADSHEET", &block(text)).unwrap();
        assert_eq!(layout.format, TableFormat::Delimited(b';'));
        let table =
            build_table("SPREADSHEET", b"\"cat\";1.5\ndog;\n", &layout, &mut Vec::new()).unwrap();
        assert_eq!(table.get(0, "NAME"), Some(&Cell::Text("cat".into())));
        assert_eq!(table.get(0, "VALUE"), Some(&Cell::Float(1.5)));
        assert_eq!(table.get(1, "VALUE"), Some(&Cell::Null));
    }

    #[test]
    fn structure_splice() {
        let outer = Block::new().with(
            "TABLE",
            Block::new().with("ROWS", 1).with("^STRUCTURE", "COLS.FMT"),
        );
        let mut load = |file: &str| {
            assert_eq!(file, "COLS.FMT");
            Ok(Block::new().with("COLUMN", Block::new().with("NAME", "A")))
        };
        let spliced = splice_structures(&outer, &mut load).unwrap();
        let table = spliced.find_block("TABLE").unwrap();
        assert!(table.get("^STRUCTURE").is_none());
        assert!(table.find_block("COLUMN").is_some());
    }

    #[test]
    fn csv_with_headers() {
        let table = read_csv_with_headers(b"a, b\n1, x\n2.5, y\n").unwrap();
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(table.get(1, "a"), Some(&Cell::Float(2.5)));
        assert_eq!(
            table.column("b").unwrap(),
            vec![&Cell::Text("x".into()), &Cell::Text("y".into())]
        );
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("a,b\n1,x\n"));
    }

    #[test]
    fn pds4_binary_table() {
        let field = |name: &str, loc: i64, dt: &str, len: i64| {
            Block::new()
                .with("name", name)
                .with("field_location", Block::new().with("@unit", "byte").with("_text", loc))
                .with("data_type", dt)
                .with("field_length", len)
        };
        let table = Block::new().with("records", 1).with(
            "Record_Binary",
            Block::new()
                .with("record_length", 6)
                .with("Field_Binary", field("A", 1, "SignedMSB2", 2))
                .with("Field_Binary", field("B", 3, "IEEE754LSBSingle", 4)),
        );
        let layout = RowLayout::from_pds4("Table_Binary", &table).unwrap();
        let mut data = vec![0xFF, 0xFE];
        data.extend(2.5f32.to_le_bytes());
        let out = build_table("t", &data, &layout, &mut Vec::new()).unwrap();
        assert_eq!(out.get(0, "A"), Some(&Cell::Int(-2)));
        assert_eq!(out.get(0, "B"), Some(&Cell::Float(2.5)));
    }
}
