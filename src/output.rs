//! Output formatting and persistence for measurements and analysis results.
//!
//! Supports JSON logging, CSV append, and whole-file CSV writes with
//! optional gzip compression.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::analyzers::types::RankedTable;
use crate::model::{DepthBand, Location, Measurement, SoilProperty, Statistic};

/// Flat CSV shape of a [`Measurement`]. Missing values are empty cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow {
    pub lat: f64,
    pub lon: f64,
    pub property: SoilProperty,
    pub statistic: Statistic,
    pub depth_top: f64,
    pub depth_bottom: f64,
    pub mapped_unit: String,
    pub target_unit: String,
    pub d_factor: f64,
    pub value: Option<f64>,
}

impl From<&Measurement> for MeasurementRow {
    fn from(m: &Measurement) -> Self {
        MeasurementRow {
            lat: m.location.lat,
            lon: m.location.lon,
            property: m.property,
            statistic: m.statistic,
            depth_top: m.depth_top(),
            depth_bottom: m.depth_bottom(),
            mapped_unit: m.mapped_unit.clone(),
            target_unit: m.target_unit.clone(),
            d_factor: m.d_factor,
            value: m.value,
        }
    }
}

impl TryFrom<MeasurementRow> for Measurement {
    type Error = crate::error::SoilError;

    fn try_from(row: MeasurementRow) -> Result<Self, Self::Error> {
        Ok(Measurement {
            location: Location::new(row.lat, row.lon),
            property: row.property,
            statistic: row.statistic,
            band: DepthBand::new(row.depth_top, row.depth_bottom)?,
            mapped_unit: row.mapped_unit,
            target_unit: row.target_unit,
            d_factor: row.d_factor,
            value: row.value,
        })
    }
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends a record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: &str, record: &T) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Returns `path` with a `.gz` suffix when `gzip` is set.
pub fn output_path(path: &str, gzip: bool) -> String {
    if gzip && !path.ends_with(".gz") {
        format!("{path}.gz")
    } else {
        path.to_string()
    }
}

/// Destination of a whole-file write. Must be closed with [`Sink::finish`]
/// so a failed gzip trailer surfaces as an error.
enum Sink<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> Sink<W> {
    /// Flushes everything, writes the gzip trailer if any, and hands back
    /// the underlying writer.
    fn finish(self) -> io::Result<W> {
        match self {
            Sink::Plain(mut w) => {
                w.flush()?;
                Ok(w)
            }
            Sink::Gzip(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(encoder) => encoder.flush(),
        }
    }
}

fn create(path: &str, gzip: bool) -> Result<Sink<File>> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = File::create(path).with_context(|| format!("creating {path}"))?;
    Ok(if gzip {
        Sink::Gzip(GzEncoder::new(file, Compression::default()))
    } else {
        Sink::Plain(file)
    })
}

fn close(writer: csv::Writer<Sink<File>>, path: &str) -> Result<()> {
    let sink = writer.into_inner().map_err(|e| e.into_error())?;
    let file = sink.finish().with_context(|| format!("finishing {path}"))?;
    file.sync_all().with_context(|| format!("syncing {path}"))?;
    Ok(())
}

fn open(path: &str) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    Ok(if path.ends_with(".gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    })
}

/// Writes measurements to `path`, replacing any existing file. Returns the
/// path actually written.
pub fn write_measurements(path: &str, measurements: &[Measurement], gzip: bool) -> Result<String> {
    let path = output_path(path, gzip);
    let mut writer = WriterBuilder::new().from_writer(create(&path, gzip)?);

    for m in measurements {
        writer.serialize(MeasurementRow::from(m))?;
    }
    close(writer, &path)?;

    info!(path, rows = measurements.len(), gzip, "Measurements written");
    Ok(path)
}

/// Reads measurements written by [`write_measurements`]. `.gz` files are
/// decompressed transparently.
pub fn read_measurements(path: &str) -> Result<Vec<Measurement>> {
    let mut reader = ReaderBuilder::new().from_reader(open(path)?);

    let mut out = Vec::new();
    for (i, row) in reader.deserialize::<MeasurementRow>().enumerate() {
        let row = row.with_context(|| format!("{path}: bad record {}", i + 1))?;
        out.push(
            Measurement::try_from(row).with_context(|| format!("{path}: bad record {}", i + 1))?,
        );
    }

    debug!(path, rows = out.len(), "Measurements read");
    Ok(out)
}

/// Writes a ranking as `lat, lon, property_no1, property_no2, ...`.
///
/// Rows narrower than the widest one are padded with empty cells.
pub fn write_ranked(path: &str, table: &RankedTable, gzip: bool) -> Result<String> {
    let path = output_path(path, gzip);
    let mut writer = WriterBuilder::new().from_writer(create(&path, gzip)?);

    let width = table.rank_count();
    let mut header = vec!["lat".to_string(), "lon".to_string()];
    header.extend((1..=width).map(|i| format!("property_no{i}")));
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.location.lat.to_string(), row.location.lon.to_string()];
        let cells = row.describe();
        record.extend((0..width).map(|i| cells.get(i).cloned().unwrap_or_default()));
        writer.write_record(&record)?;
    }
    close(writer, &path)?;

    info!(path, rows = table.len(), "Ranking written");
    Ok(path)
}
