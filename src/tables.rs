//! Reading and writing tabular files: parquet, CSV, or a CSV inside a ZIP.
//!
//! Inputs are read into a [`RawTable`] of optional strings. The two sources don't agree
//! on column types (a year might be an integer, a float, or text), so every column goes
//! through a cast to UTF-8 and the loaders in [`crate::sources`] parse what they need.

use arrow::array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use color_eyre::eyre::{bail, eyre, Context, ContextCompat, Result};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// On-disk formats we know about, by extension.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TableFormat {
    Parquet,
    Csv,
    /// A ZIP with a single CSV inside. Input only.
    CsvZip,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_lowercase)
            .with_context(|| format!("{} has no file extension", path.display()))?;
        match ext.as_str() {
            "parquet" | "pq" => Ok(Self::Parquet),
            "csv" => Ok(Self::Csv),
            "zip" => Ok(Self::CsvZip),
            _ => bail!(
                "Don't know how to handle a .{} file: {}",
                ext,
                path.display()
            ),
        }
    }
}

/// A table with named columns and optional string cells.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self {
            headers,
            index,
            rows: Vec::new(),
        }
    }

    /// Appends a row. Short rows are padded with `None`, long rows truncated.
    pub fn push_row(&mut self, mut row: Vec<Option<String>>) {
        row.resize(self.headers.len(), None);
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column that must exist.
    pub fn require(&self, column: &str) -> Result<usize> {
        self.index.get(column).copied().ok_or_else(|| {
            eyre!(
                "Missing column `{}` (found: {})",
                column,
                self.headers.join(", ")
            )
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<String>]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Read a table from `path`, choosing the reader by extension.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let table = match TableFormat::from_path(path)? {
        TableFormat::Parquet => read_parquet(path),
        TableFormat::Csv | TableFormat::CsvZip => read_csv(open_csvz_from_path(path)?),
    }
    .with_context(|| format!("Could not read table from {}", path.display()))?;
    debug!(
        "read {} rows x {} columns from {}",
        table.len(),
        table.headers().len(),
        path.display()
    );
    Ok(table)
}

fn read_parquet(path: &Path) -> Result<RawTable> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut table = RawTable::new(headers);
    for batch in reader {
        let batch = batch?;
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
        for (field, col) in batch.schema().fields().iter().zip(batch.columns()) {
            let text = cast(col.as_ref(), &DataType::Utf8)
                .with_context(|| format!("Column `{}` can't be read as text", field.name()))?;
            columns.push(text);
        }
        let strings: Vec<&StringArray> = columns
            .iter()
            .map(|c| {
                c.as_any()
                    .downcast_ref::<StringArray>()
                    .context("cast to Utf8 didn't produce a StringArray")
            })
            .collect::<Result<_>>()?;

        for i in 0..batch.num_rows() {
            let row = strings
                .iter()
                .map(|col| {
                    if col.is_null(i) {
                        None
                    } else {
                        Some(col.value(i).to_string())
                    }
                })
                .collect();
            table.push_row(row);
        }
    }
    Ok(table)
}

fn read_csv<R: Read>(infile: R) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(infile);
    let headers: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
    let mut table = RawTable::new(headers);

    let mut record = csv::StringRecord::new();
    while rdr.read_record(&mut record)? {
        let row = record
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        table.push_row(row);
    }
    Ok(table)
}

/// Opens a file, possibly zipped, for reading.
/// If the zipfile contains more than one file, the first will be returned.
/// Performance note: has to unzip and return the entire file.
pub fn open_csvz<T: 'static + Read + Seek>(mut infile: T) -> Result<Box<dyn Read>> {
    if is_zip(&mut infile)? {
        let mut zippah = zip::ZipArchive::new(infile).context("error establishing the ZIP")?;
        let mut zippy = zippah.by_index(0).context("no file in ZIP")?;
        let zs: usize = zippy
            .size()
            .try_into()
            .with_context(|| format!("I don't support files greater than {} :(", usize::MAX))?;
        let mut bigbuf: Vec<u8> = Vec::with_capacity(zs);
        zippy.read_to_end(&mut bigbuf).context("Error reading ZIP")?;
        Ok(Box::new(Cursor::new(bigbuf)))
    } else {
        Ok(Box::new(infile))
    }
}

pub fn open_csvz_from_path(inpath: &Path) -> Result<Box<dyn Read>> {
    let file =
        File::open(inpath).with_context(|| format!("Could not open {}", inpath.display()))?;
    open_csvz(file)
}

/// Peeks at the contents to check the magic number.
pub fn is_zip<T>(infile: &mut T) -> Result<bool>
where
    T: Read + Seek,
{
    const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
    let pos = infile.stream_position()?;
    let mut buffer: [u8; 4] = [0; 4];
    let bytes_read = infile.read(&mut buffer)?;
    infile
        .seek(SeekFrom::Start(pos))
        .context("couldn't seek back to the start after testing whether a file was a ZIP")?;
    Ok(bytes_read == ZIP_SIGNATURE.len() && buffer == ZIP_SIGNATURE)
}

/// A typed output column.
#[derive(Debug, Clone, PartialEq)]
pub enum OutColumn {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

impl OutColumn {
    fn data_type(&self) -> DataType {
        match self {
            Self::Int(_) => DataType::Int64,
            Self::Float(_) => DataType::Float64,
            Self::Bool(_) => DataType::Boolean,
            Self::Text(_) => DataType::Utf8,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    fn to_array(&self) -> ArrayRef {
        use arrow::array::{BooleanArray, Float64Array, Int64Array};
        match self {
            Self::Int(v) => Arc::new(Int64Array::from(v.clone())),
            Self::Float(v) => Arc::new(Float64Array::from(v.clone())),
            Self::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
            Self::Text(v) => Arc::new(StringArray::from(v.clone())),
        }
    }

    /// The cell as CSV text; missing values are empty.
    fn cell(&self, i: usize) -> String {
        match self {
            Self::Int(v) => v[i].map(|x| x.to_string()).unwrap_or_default(),
            Self::Float(v) => v[i].map(|x| x.to_string()).unwrap_or_default(),
            Self::Bool(v) => v[i].map(|x| x.to_string()).unwrap_or_default(),
            Self::Text(v) => v[i].clone().unwrap_or_default(),
        }
    }
}

/// Write named columns to `path` as parquet or CSV, by extension.
pub fn write_table(path: &Path, columns: &[(&str, OutColumn)]) -> Result<()> {
    let nrows = columns.first().map_or(0, |(_, c)| c.len());
    if let Some((name, _)) = columns.iter().find(|(_, c)| c.len() != nrows) {
        bail!("Column `{}` has a different length to the others", name);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
    }

    match TableFormat::from_path(path)? {
        TableFormat::Parquet => write_parquet(path, columns),
        TableFormat::Csv => write_csv(path, columns, nrows),
        TableFormat::CsvZip => bail!("Writing ZIP files isn't supported: {}", path.display()),
    }
    .with_context(|| format!("Could not write table to {}", path.display()))?;
    debug!("wrote {} rows to {}", nrows, path.display());
    Ok(())
}

fn write_parquet(path: &Path, columns: &[(&str, OutColumn)]) -> Result<()> {
    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, col)| Field::new(*name, col.data_type(), true))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = columns.iter().map(|(_, col)| col.to_array()).collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let file = File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn write_csv(path: &Path, columns: &[(&str, OutColumn)], nrows: usize) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(columns.iter().map(|(name, _)| *name))
        .context("error writing header")?;
    for i in 0..nrows {
        wtr.write_record(columns.iter().map(|(_, col)| col.cell(i)))
            .context("error writing row")?;
    }
    wtr.flush().context("error finalising CSV")?;
    Ok(())
}
