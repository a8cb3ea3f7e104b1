//! Delimited-text persistence for time series
//!
//! Layout: an optional header row, then one row per timestep with the
//! timestamp in the first column and the channels after it. Values are written
//! with the shortest representation that parses back to the same `f64`, so a
//! save/load cycle reproduces the series bit for bit.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::{Array1, Array2};

use super::TimeSeries;
use crate::error::{Error, Result};

impl TimeSeries {
    /// Write the series as CSV with a `t,x0,x1,...` header
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        let mut header = Vec::with_capacity(self.num_dims() + 1);
        header.push("t".to_string());
        header.extend((0..self.num_dims()).map(|c| format!("x{c}")));
        wtr.write_record(&header)?;

        for (t, row) in self.times.iter().zip(self.dependent_variable.rows()) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(t.to_string());
            record.extend(row.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Save to a file path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.save(BufWriter::new(file))
    }

    /// Read a series whose first column holds the timestamps.
    ///
    /// A leading non-numeric row is treated as a header and skipped, as are
    /// lines starting with `#`.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        Self::from_csv_with_time_index(reader, 0)
    }

    /// Read a series whose timestamps live in column `time_index`
    pub fn from_csv_with_time_index<R: Read>(reader: R, time_index: usize) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut times = Vec::new();
        let mut values = Vec::new();
        let mut width = 0;

        for (line, result) in rdr.records().enumerate() {
            let record = result?;

            if record.len() < 2 {
                return Err(Error::Parse(format!(
                    "row {}: expected a time column and at least one channel",
                    line + 1
                )));
            }
            if time_index >= record.len() {
                return Err(Error::InvalidParameter(format!(
                    "time column {time_index} out of range for {} columns",
                    record.len()
                )));
            }

            let parsed: std::result::Result<Vec<f64>, _> =
                record.iter().map(str::parse::<f64>).collect();
            let mut fields = match parsed {
                Ok(fields) => fields,
                Err(_) if line == 0 => continue,
                Err(e) => return Err(Error::Parse(format!("row {}: {e}", line + 1))),
            };

            times.push(fields.remove(time_index));
            width = fields.len();
            values.extend(fields);
        }

        let dependent_variable = Array2::from_shape_vec((times.len(), width), values)
            .map_err(|e| Error::Parse(e.to_string()))?;

        TimeSeries::new(dependent_variable, Array1::from(times))
    }

    /// Load from a file path
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_csv(BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Cursor;

    #[test]
    fn test_layout() {
        let ts = TimeSeries::new(array![[1.5, -2.0], [0.25, 3.0]], array![0.0, 0.5]).unwrap();
        let mut buffer = Vec::new();
        ts.save(&mut buffer).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "t,x0,x1\n0,1.5,-2\n0.5,0.25,3\n");
    }

    #[test]
    fn test_round_trip_is_exact() {
        let times: Vec<f64> = (0..20).map(|i| 0.1 * i as f64).collect();
        let values: Vec<f64> = times.iter().map(|t| (t * 7.3).sin() / 3.0).collect();
        let ts = TimeSeries::univariate(values, times).unwrap();

        let mut buffer = Vec::new();
        ts.save(&mut buffer).unwrap();
        let loaded = TimeSeries::from_csv(Cursor::new(buffer)).unwrap();

        assert_eq!(ts, loaded);
    }

    #[test]
    fn test_headerless_and_comments() {
        let text = "# generated\n0,1,2\n1,3,4\n2,5,6\n";
        let ts = TimeSeries::from_csv(text.as_bytes()).unwrap();
        assert_eq!(ts.num_dims(), 2);
        assert_eq!(ts.dependent_variable(), array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
    }

    #[test]
    fn test_time_index() {
        let text = "a,time,b\n1,10,2\n3,20,4\n";
        let ts = TimeSeries::from_csv_with_time_index(text.as_bytes(), 1).unwrap();
        assert_eq!(ts.times(), array![10.0, 20.0]);
        assert_eq!(ts.dependent_variable(), array![[1.0, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn test_bad_rows() {
        let text = "0,1\n1,oops\n";
        assert!(matches!(
            TimeSeries::from_csv(text.as_bytes()),
            Err(Error::Parse(_))
        ));

        let ragged = "0,1,2\n1,3\n";
        assert!(matches!(
            TimeSeries::from_csv(ragged.as_bytes()),
            Err(Error::Csv(_)) | Err(Error::Parse(_))
        ));

        let non_uniform = "0,1\n1,1\n3,1\n";
        assert!(TimeSeries::from_csv(non_uniform.as_bytes())
            .unwrap_err()
            .is_validation());
    }
}
