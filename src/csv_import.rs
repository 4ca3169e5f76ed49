use crate::config::DownloadFormat;
use crate::errors::{Result, CoverQueueError};
use std::io::Read;
use std::path::Path;

/// One queue submission read from a CSV row
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRequest {
    pub url: String,
    pub format: DownloadFormat,
    pub source_profile: String,
}

/// CSV importer for batches of queue submissions
///
/// Expects a header row with a `url` column; `format` and `profile` columns
/// are optional and fall back to the supplied defaults when absent or blank.
pub struct CsvImporter {
    default_format: DownloadFormat,
    default_profile: String,
}

impl CsvImporter {
    pub fn new(default_format: DownloadFormat, default_profile: String) -> Self {
        Self {
            default_format,
            default_profile,
        }
    }

    /// Import submissions from a CSV file
    pub fn import_from_csv(&self, csv_path: &Path) -> Result<Vec<QueueRequest>> {
        tracing::info!("Importing queue entries from CSV: {}", csv_path.display());

        if !csv_path.exists() {
            return Err(CoverQueueError::CsvImport(
                format!("CSV file not found: {}", csv_path.display())
            ));
        }

        let file = std::fs::File::open(csv_path)?;
        self.import_from_reader(file)
    }

    pub fn import_from_reader<R: Read>(&self, input: R) -> Result<Vec<QueueRequest>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(input);

        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let url_column = column("url")
            .ok_or_else(|| CoverQueueError::CsvImport("CSV has no 'url' column".to_string()))?;
        let format_column = column("format");
        let profile_column = column("profile");

        let mut requests = Vec::new();
        for (row_number, result) in reader.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping unreadable CSV row {}: {}", row_number + 1, e);
                    continue;
                }
            };

            match self.parse_record(&record, url_column, format_column, profile_column) {
                Ok(request) => requests.push(request),
                Err(e) => tracing::warn!("Skipping CSV row {}: {}", row_number + 1, e),
            }
        }

        tracing::info!("Imported {} queue entries from CSV", requests.len());
        Ok(requests)
    }

    fn parse_record(
        &self,
        record: &csv::StringRecord,
        url_column: usize,
        format_column: Option<usize>,
        profile_column: Option<usize>,
    ) -> Result<QueueRequest> {
        let url = record.get(url_column).unwrap_or("");
        if url::Url::parse(url).is_err() {
            return Err(CoverQueueError::InvalidUrl(url.to_string()));
        }

        let format = match format_column.and_then(|i| record.get(i)).filter(|s| !s.is_empty()) {
            Some(value) => value.parse()?,
            None => self.default_format,
        };

        let source_profile = profile_column
            .and_then(|i| record.get(i))
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_profile.as_str())
            .to_string();

        Ok(QueueRequest {
            url: url.to_string(),
            format,
            source_profile,
        })
    }
}
