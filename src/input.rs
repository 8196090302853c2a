use std::io::Read;
use std::path::Path;

use url::Url;

const URL_HEADERS: &[&str] = &["url", "urls", "link", "links", "href"];

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("cannot read {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Read listing URLs from a CSV file with a header row.
pub fn read_urls(path: &Path) -> Result<Vec<String>, InputError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| InputError::Open {
            path: path.display().to_string(),
            source,
        })?;
    collect_urls(reader)
}

/// Same as [`read_urls`] for any reader.
pub fn read_urls_from<R: Read>(rdr: R) -> Result<Vec<String>, InputError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(rdr);
    collect_urls(reader)
}

fn collect_urls<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<String>, InputError> {
    let mut records = reader.records();

    let first = match records.next() {
        Some(record) => record?,
        None => return Ok(Vec::new()),
    };

    // Prefer a column named like a URL column; otherwise the first one.
    let column = first
        .iter()
        .position(|h| URL_HEADERS.contains(&h.to_lowercase().as_str()))
        .unwrap_or(0);

    let mut urls = Vec::new();

    // Header-less files start straight away with a URL.
    if let Some(cell) = first.get(column) {
        if looks_like_url(cell) {
            urls.push(cell.to_string());
        }
    }

    for record in records {
        let record = record?;
        match record.get(column) {
            Some(cell) if !cell.is_empty() => urls.push(cell.to_string()),
            _ => {}
        }
    }

    tracing::debug!("read {} URLs from column {}", urls.len(), column);
    Ok(urls)
}

fn looks_like_url(cell: &str) -> bool {
    Url::parse(cell)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
