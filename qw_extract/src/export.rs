//! CSV export of the two output tables.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;

use crate::compose::{DataTable, PlotRow, PlotTable};
use crate::error::Result;
use crate::logging;
use crate::pipeline::Extraction;

pub const PLOT_TABLE_FILE: &str = "plot_table.csv";
pub const DATA_TABLE_FILE: &str = "data_table.csv";

/// Writes the long table. The header is written even with no rows.
pub fn write_plot_table<W: Write>(table: &PlotTable, out: W) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(PlotRow::COLUMNS)?;
    for row in &table.rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the wide table in its column order. Missing cells are empty.
pub fn write_data_table<W: Write>(table: &DataTable, out: W) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(
            table
                .columns
                .iter()
                .map(|column| row.value(column).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes both tables into `dir`, creating it if needed.
pub fn write_tables(extraction: &Extraction, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let plot_path = dir.join(PLOT_TABLE_FILE);
    write_plot_table(&extraction.plot_table, fs::File::create(&plot_path)?)?;
    let data_path = dir.join(DATA_TABLE_FILE);
    write_data_table(&extraction.data_table, fs::File::create(&data_path)?)?;

    logging::info(
        None,
        None,
        &format!(
            "wrote {} and {}",
            plot_path.display(),
            data_path.display()
        ),
    );
    Ok((plot_path, data_path))
}
