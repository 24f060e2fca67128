//! Dot table: passthrough input columns plus typed analysis fields.
//!
//! The input is a delimited text table with a header. Every input column is
//! carried through verbatim; the analysis appends its own columns on write.
//! Undefined values are written as empty cells.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::error::{Error, Result};

/// Columns the analysis reads.
pub const REQUIRED_COLUMNS: [&str; 5] = ["File", "Channel", "x", "y", "z"];

/// Columns the analysis writes, in output order.
pub const OUTPUT_COLUMNS: [&str; 8] = [
    "cell_ID",
    "lamin_dist",
    "lamin_dist_norm",
    "centr_dist",
    "centr_dist_norm",
    "dilation",
    "G1",
    "Allele",
];

/// Analysis state of one detected dot.
#[derive(Debug, Clone, PartialEq)]
pub struct DotRecord {
    /// Field-of-view id parsed from `File`.
    pub fov: u32,
    pub channel: String,
    /// Voxel coordinates `[z, x, y]`; `x` indexes rows and `y` columns.
    pub coords: [i64; 3],
    /// Containing nucleus label; `Some(0)` is outside every nucleus and
    /// `None` means the field of view was not analyzed.
    pub cell_id: Option<u32>,
    pub lamin_dist: Option<f64>,
    pub lamin_dist_norm: Option<f64>,
    pub centr_dist: Option<f64>,
    pub centr_dist_norm: Option<f64>,
    /// G1 flag, zero unless the containing nucleus was selected.
    pub g1: u8,
    /// Allele code: `-1` crowded cell, `0` lone dot, `1` central, `2` peripheral.
    pub allele: Option<i8>,
}

impl DotRecord {
    pub fn new(fov: u32, channel: impl Into<String>, coords: [i64; 3]) -> Self {
        Self {
            fov,
            channel: channel.into(),
            coords,
            cell_id: None,
            lamin_dist: None,
            lamin_dist_norm: None,
            centr_dist: None,
            centr_dist_norm: None,
            g1: 0,
            allele: None,
        }
    }

    /// Whether the dot lies inside a segmented nucleus.
    pub fn is_assigned(&self) -> bool {
        matches!(self.cell_id, Some(c) if c > 0)
    }

    /// Mark the dot as outside every nucleus.
    pub fn set_unassigned(&mut self) {
        self.cell_id = Some(0);
        self.lamin_dist = None;
        self.lamin_dist_norm = None;
        self.centr_dist = None;
        self.centr_dist_norm = None;
    }

    /// Store the lamina distance and the metrics normalized by the
    /// nucleus-wide maximum.
    pub fn set_distances(&mut self, cell: u32, lamin_dist: f64, max_lamin_dist: f64) {
        let norm = lamin_dist / max_lamin_dist;
        let centr_norm = 1.0 - norm;
        self.cell_id = Some(cell);
        self.lamin_dist = Some(lamin_dist);
        self.lamin_dist_norm = Some(norm);
        self.centr_dist_norm = Some(centr_norm);
        self.centr_dist = Some(centr_norm * max_lamin_dist);
    }
}

/// Field-of-view id of a `File` value: the integer before the first `.` of
/// the last path component.
pub fn parse_fov_id(file: &str) -> Option<u32> {
    let name = file.rsplit(['/', '\\']).next()?;
    name.split('.').next()?.trim().parse().ok()
}

/// Dot table with passthrough columns and per-dot analysis state.
#[derive(Debug, Clone, Default)]
pub struct DotTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    records: Vec<DotRecord>,
    dilation: Option<usize>,
    gated: bool,
}

impl DotTable {
    /// Read a delimited table from disk.
    pub fn read(path: &Path, delimiter: u8) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(io::BufReader::new(file), delimiter)
    }

    /// Read a delimited table from any reader.
    pub fn from_reader<R: io::Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);
        let header = rdr.headers()?.clone();

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !header.iter().any(|h| h == **c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingColumns(missing));
        }

        let keep: Vec<usize> = header
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                let taken = OUTPUT_COLUMNS.contains(h);
                if taken {
                    tracing::warn!("Dropping input column '{}': it is an output column", h);
                }
                !taken
            })
            .map(|(i, _)| i)
            .collect();
        let headers: Vec<String> = keep.iter().map(|&i| header[i].to_string()).collect();
        let column = |name: &str| header.iter().position(|h| h == name);
        let [file_col, channel_col, x_col, y_col, z_col] =
            REQUIRED_COLUMNS.map(|c| column(c).unwrap_or_default());

        let mut rows = Vec::new();
        let mut records = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let rec = result?;
            let fov = parse_fov_id(&rec[file_col]).ok_or_else(|| Error::InvalidValue {
                row,
                column: "File".into(),
                value: rec[file_col].to_string(),
            })?;
            let coords = [
                parse_coord(&rec, row, z_col, "z")?,
                parse_coord(&rec, row, x_col, "x")?,
                parse_coord(&rec, row, y_col, "y")?,
            ];
            records.push(DotRecord::new(fov, &rec[channel_col], coords));
            rows.push(keep.iter().map(|&i| rec[i].to_string()).collect());
        }

        tracing::info!("Read {} dots in {} columns", records.len(), header.len());
        Ok(Self {
            headers,
            rows,
            records,
            dilation: None,
            gated: false,
        })
    }

    /// Table with only the required columns, built from records.
    pub fn from_records(records: Vec<DotRecord>) -> Self {
        let headers = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        let rows = records
            .iter()
            .map(|r| {
                vec![
                    format!("{:03}.tif", r.fov),
                    r.channel.clone(),
                    r.coords[1].to_string(),
                    r.coords[2].to_string(),
                    r.coords[0].to_string(),
                ]
            })
            .collect();
        Self {
            headers,
            rows,
            records,
            dilation: None,
            gated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Passthrough column names.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[DotRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [DotRecord] {
        &mut self.records
    }

    /// Reset every dot's analysis state and record the dilation used.
    pub fn start_analysis(&mut self, dilation: usize) {
        for rec in &mut self.records {
            *rec = DotRecord::new(rec.fov, rec.channel.clone(), rec.coords);
        }
        self.dilation = Some(dilation);
        self.gated = false;
    }

    /// Dilation of the analysis, if one was started.
    pub fn dilation(&self) -> Option<usize> {
        self.dilation
    }

    /// Whether the table carries distance columns.
    pub fn has_analysis(&self) -> bool {
        self.dilation.is_some()
    }

    /// Emit the `G1` column on write.
    pub fn set_gated(&mut self, gated: bool) {
        self.gated = gated;
    }

    pub fn is_gated(&self) -> bool {
        self.gated
    }

    /// Row indices grouped by field of view, ascending.
    pub fn fov_groups(&self) -> BTreeMap<u32, Vec<usize>> {
        let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (i, rec) in self.records.iter().enumerate() {
            groups.entry(rec.fov).or_default().push(i);
        }
        groups
    }

    /// Copy the records at `indices`.
    pub fn subset(&self, indices: &[usize]) -> Vec<DotRecord> {
        indices.iter().map(|&i| self.records[i].clone()).collect()
    }

    /// Write analyzed records back to their rows.
    pub fn merge(&mut self, indices: &[usize], records: Vec<DotRecord>) {
        debug_assert_eq!(indices.len(), records.len());
        for (&i, rec) in indices.iter().zip(records) {
            self.records[i] = rec;
        }
    }

    /// Column names written by [`DotTable::write`].
    pub fn output_headers(&self) -> Vec<String> {
        let mut out = self.headers.clone();
        if self.has_analysis() {
            out.extend(
                OUTPUT_COLUMNS
                    .iter()
                    .filter(|c| self.is_gated() || **c != "G1")
                    .map(|c| c.to_string()),
            );
        }
        out
    }

    /// Write the table tab-delimited to `path`.
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write(io::BufWriter::new(file), b'\t')
    }

    /// Write the table with passthrough and analysis columns.
    pub fn write<W: io::Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut w = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
        w.write_record(self.output_headers())?;
        for (row, rec) in self.rows.iter().zip(&self.records) {
            let mut fields = row.clone();
            if let Some(d) = self.dilation() {
                fields.push(rec.cell_id.map(|c| c.to_string()).unwrap_or_default());
                fields.push(fmt_opt(rec.lamin_dist));
                fields.push(fmt_opt(rec.lamin_dist_norm));
                fields.push(fmt_opt(rec.centr_dist));
                fields.push(fmt_opt(rec.centr_dist_norm));
                fields.push(d.to_string());
                if self.is_gated() {
                    fields.push(rec.g1.to_string());
                }
                fields.push(rec.allele.map(|a| a.to_string()).unwrap_or_default());
            }
            w.write_record(&fields)?;
        }
        w.flush()?;
        Ok(())
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_coord(rec: &StringRecord, row: usize, col: usize, name: &str) -> Result<i64> {
    let raw = &rec[col];
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i64)
        .ok_or_else(|| Error::InvalidValue {
            row,
            column: name.to_string(),
            value: raw.to_string(),
        })
}
