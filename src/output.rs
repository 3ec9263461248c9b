use crate::{ExtractionResult, LookupError, Site};
use std::path::{Path, PathBuf};
use tracing::info;

/// Location of the result table for `site` inside `data_dir`
pub fn output_path(data_dir: &Path, site: Site) -> PathBuf {
    data_dir.join(format!("{}.csv", site.id()))
}

/// Write `results` as a two-column table, replacing any previous file.
pub fn write_results(path: &Path, results: &[ExtractionResult]) -> Result<(), LookupError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new().from_path(path)?;
    writer.write_record(["barcode", "image_url"])?;
    for result in results {
        writer.write_record([result.barcode.as_str(), result.outcome.as_cell()])?;
    }
    writer.flush()?;

    info!(
        "Fetched data for {} barcodes has been stored in {}",
        results.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageOutcome;

    #[test]
    fn test_output_path_named_after_site() {
        assert_eq!(
            output_path(Path::new("data"), Site::UpcItemDb),
            PathBuf::from("data/upcitemdb.csv")
        );
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(&dir.path().join("data"), Site::BarcodeSpider);
        let results = vec![
            ExtractionResult::new("111", ImageOutcome::Found("https://img/1.jpg".to_string())),
            ExtractionResult::skipped("222"),
            ExtractionResult::new("333", ImageOutcome::NotImplemented),
        ];

        write_results(&path, &results).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            vec!["barcode", "image_url"]
        );
        assert_eq!(
            rows,
            vec![
                vec!["111", "https://img/1.jpg"],
                vec!["222", "skipped"],
                vec!["333", "NotImplemented"],
            ]
        );
    }
}
