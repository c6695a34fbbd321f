use std::fs::File;
use std::io;

use camino::Utf8Path;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;

use crate::error::AtlasError;
use crate::frame::ObsFrame;
use crate::store::Store;

/// Header of the leading column holding row labels.
pub const LABEL_COLUMN: &str = "index";

fn to_io(err: csv::Error) -> io::Error {
    io::Error::other(err)
}

/// Writes a frame as gzip-compressed TSV. Missing values are empty fields, so
/// an empty string value is indistinguishable from a missing one and reads
/// back as missing.
pub fn write_frame_tsv_gz(path: &Utf8Path, frame: &ObsFrame) -> Result<(), AtlasError> {
    Store::write_atomic(path, |out| {
        let encoder = GzEncoder::new(out, Compression::default());
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(encoder);

        let header =
            std::iter::once(LABEL_COLUMN).chain(frame.columns().iter().map(String::as_str));
        writer.write_record(header).map_err(to_io)?;
        for (label, row) in frame.labels().iter().zip(frame.rows()) {
            let fields = std::iter::once(label.as_str())
                .chain(row.iter().map(|value| value.as_deref().unwrap_or("")));
            writer.write_record(fields).map_err(to_io)?;
        }

        let encoder = writer
            .into_inner()
            .map_err(|err| io::Error::new(err.error().kind(), err.error().to_string()))?;
        encoder.finish()?.flush()
    })
}

/// Reads a frame written by [`write_frame_tsv_gz`]. Every empty field becomes
/// a missing value.
pub fn read_frame_tsv_gz(path: &Utf8Path) -> Result<ObsFrame, AtlasError> {
    let read_err = |message: String| AtlasError::OutputRead {
        path: path.as_std_path().to_path_buf(),
        message,
    };
    let file = File::open(path.as_std_path()).map_err(|err| read_err(err.to_string()))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(GzDecoder::new(file));

    let headers = reader
        .headers()
        .map_err(|err| read_err(err.to_string()))?
        .clone();
    let mut fields = headers.iter();
    if fields.next() != Some(LABEL_COLUMN) {
        return Err(read_err(format!("first column must be `{LABEL_COLUMN}`")));
    }
    let mut frame = ObsFrame::new(fields.map(ToString::to_string).collect());

    for record in reader.records() {
        let record = record.map_err(|err| read_err(err.to_string()))?;
        let mut values = record.iter();
        let label = values.next().unwrap_or_default().to_string();
        let row = values
            .map(|value| (!value.is_empty()).then(|| value.to_string()))
            .collect();
        frame.push_row(label, row)?;
    }
    Ok(frame)
}

/// Writes serializable rows as plain TSV under `header`. The header line is
/// written even when `rows` is empty.
pub fn write_tsv<S: Serialize>(
    path: &Utf8Path,
    header: &[&str],
    rows: &[S],
) -> Result<(), AtlasError> {
    Store::write_atomic(path, |out| {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(out);
        writer.write_record(header).map_err(to_io)?;
        for row in rows {
            writer.serialize(row).map_err(to_io)?;
        }
        writer.flush()
    })
}
