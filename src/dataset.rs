//! Labelled training data
//!
//! CSV with a header row, one column per sensor channel, and the posture
//! label in the last column (1 = good, 0 = bad). Rows with missing or
//! non-numeric cells are dropped rather than failing the whole file.

use crate::error::MonitorError;
use crate::types::{FeatureVector, FEATURE_COUNT};
use std::io::Read;
use std::path::Path;

/// Feature rows with their labels
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<f64>,
    /// Rows skipped for bad cells or a wrong column count
    pub dropped_rows: usize,
}

impl Dataset {
    pub fn from_path(path: &Path) -> Result<Self, MonitorError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, MonitorError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut dataset = Dataset::default();
        for result in rdr.records() {
            let record = result?;
            match parse_row(&record) {
                Some((features, label)) => {
                    dataset.features.push(features);
                    dataset.labels.push(label);
                }
                None => dataset.dropped_rows += 1,
            }
        }

        if dataset.is_empty() {
            return Err(MonitorError::DatasetError(format!(
                "no usable rows ({} dropped)",
                dataset.dropped_rows
            )));
        }

        if dataset.dropped_rows > 0 {
            tracing::warn!("Dropped {} incomplete dataset rows", dataset.dropped_rows);
        }
        tracing::info!("Loaded dataset with {} rows", dataset.len());

        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn parse_row(record: &csv::StringRecord) -> Option<(FeatureVector, f64)> {
    if record.len() != FEATURE_COUNT + 1 {
        return None;
    }

    let values: Vec<f64> = record
        .iter()
        .map(|cell| cell.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<_>>()?;

    let features = FeatureVector::from_slice(&values[..FEATURE_COUNT])?;
    Some((features, values[FEATURE_COUNT]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "f1,f2,f3,f4,f5,f6,f7,f8,f9,f10,f11,f12,label\n";

    #[test]
    fn test_loads_rows_and_labels() {
        let csv = format!(
            "{}{}{}",
            HEADER, "1,2,3,4,5,6,7,8,9,10,11,12,1\n", "0,0,0,0,0,0,0,0,0,0,0,0.5,0\n"
        );
        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.labels, vec![1.0, 0.0]);
        assert_eq!(dataset.features[0].values()[11], 12.0);
        assert_eq!(dataset.dropped_rows, 0);
    }

    #[test]
    fn test_drops_incomplete_rows() {
        let csv = format!(
            "{}{}{}{}{}",
            HEADER,
            "1,2,3,4,5,6,7,8,9,10,11,12,1\n",
            "1,2,,4,5,6,7,8,9,10,11,12,1\n",
            "1,2,abc,4,5,6,7,8,9,10,11,12,0\n",
            "1,2,3\n"
        );
        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.dropped_rows, 3);
    }

    #[test]
    fn test_no_usable_rows_is_error() {
        let csv = format!("{}{}", HEADER, "a,b,c,d,e,f,g,h,i,j,k,l,m\n");
        let result = Dataset::from_reader(csv.as_bytes());
        assert!(matches!(result, Err(MonitorError::DatasetError(_))));
    }
}
