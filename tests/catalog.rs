use std::fs;

use assert_matches::assert_matches;

use kira_obs_atlas::catalog::Catalog;
use kira_obs_atlas::domain::{CatalogFormat, S3Uri};
use kira_obs_atlas::error::AtlasError;

const HEADER: &str = "\tS3 URIs\tOrganisms\tTissues\tAssays\tExplorer URL\tID\tName\tCell Count";

fn tsv(rows: &[&str]) -> String {
    let mut content = HEADER.to_string();
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    content.push('\n');
    content
}

#[test]
fn tsv_keeps_only_h5ad_locators() {
    let content = tsv(&[
        "0\t['s3://corpora-data-dev/a/local.h5ad', 's3://corpora-data-dev/a/local.rds']\t['Homo sapiens']\t['lung']\t['10x 3 v3']\thttps://cellxgene.example/e/a.cxg/\tc1\tLung atlas\t1200",
    ]);
    let catalog = Catalog::parse_tsv(content.as_bytes()).unwrap();

    assert_eq!(catalog.len(), 1);
    let record = &catalog.records()[0];
    assert_eq!(record.locator.to_string(), "s3://corpora-data-dev/a/local.h5ad");
    assert_eq!(
        record.production_locator.to_string(),
        "s3://corpora-data-prod/a/local.h5ad"
    );
    assert_eq!(record.organisms, vec!["Homo sapiens"]);
    assert_eq!(record.tissues, vec!["lung"]);
    assert_eq!(record.cell_count, 1200);
    assert_eq!(record.collection_name, "Lung atlas");
}

#[test]
fn tsv_row_without_h5ad_yields_nothing() {
    let content = tsv(&["0\t['s3://b/a/local.rds']\t[]\t[]\t[]\turl\tc1\tname\t5"]);
    let catalog = Catalog::parse_tsv(content.as_bytes()).unwrap();
    assert!(catalog.is_empty());
    assert!(catalog.skipped().is_empty());
}

#[test]
fn tsv_bad_rows_are_reported() {
    let content = tsv(&[
        "0\t['s3://b/a/one.h5ad']\t[]\t[]\t[]\turl\tc1\tname\tmany",
        "1\t['s3://b/a/two.h5ad']\t[]\t[]\t[]\turl\tc2\tname\t7",
    ]);
    let catalog = Catalog::parse_tsv(content.as_bytes()).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.skipped().len(), 1);
    assert_eq!(catalog.skipped()[0].row, "row 0");
}

#[test]
fn tsv_bad_locator_skips_only_that_locator() {
    let content = tsv(&["4\t['s3://b/a/good.h5ad', 'broken.h5ad']\t[]\t[]\t[]\turl\tc1\tname\t9"]);
    let catalog = Catalog::parse_tsv(content.as_bytes()).unwrap();

    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.records()[0].locator.to_string(), "s3://b/a/good.h5ad");
    assert_eq!(catalog.skipped().len(), 1);
    assert_eq!(catalog.skipped()[0].row, "row 4");
    assert!(catalog.skipped()[0].reason.contains("broken.h5ad"));
}

#[test]
fn tsv_missing_column_is_fatal() {
    let content = "\tS3 URIs\tOrganisms\n0\t[]\t[]\n";
    let err = Catalog::parse_tsv(content.as_bytes()).unwrap_err();
    assert_matches!(err, AtlasError::CatalogColumn(_));
}

#[test]
fn json_keeps_last_h5ad_locator_per_collection() {
    let content = r#"{
        "c1": {
            "s3_uris": ["s3://corpora-data-prod/x/first.h5ad", "s3://corpora-data-prod/x/rds.rds", "s3://corpora-data-prod/x/last.h5ad"],
            "explorer_url": "https://cellxgene.example/e/x.cxg/",
            "cell_count": 42,
            "organisms": [{"label": "Homo sapiens"}],
            "tissue": ["lung", "heart"],
            "name": "Collection one"
        },
        "c2": {
            "s3_uris": ["s3://corpora-data-prod/y/only.rds"],
            "explorer_url": "https://cellxgene.example/e/y.cxg/",
            "cell_count": 3
        }
    }"#;
    let catalog = Catalog::parse_json(content).unwrap();

    assert_eq!(catalog.len(), 1);
    let locator: S3Uri = "s3://corpora-data-prod/x/last.h5ad".parse().unwrap();
    let record = catalog.get(&locator).unwrap();
    assert_eq!(record.production_locator, locator);
    assert_eq!(record.organisms, vec!["Homo sapiens"]);
    assert_eq!(record.tissues, vec!["lung", "heart"]);
    assert_eq!(catalog.skipped().len(), 1);
}

#[test]
fn json_collections_follow_file_order() {
    let content = r#"{
        "zeta": {"s3_uris": ["s3://b/z/first.h5ad"], "explorer_url": "u1", "cell_count": 1},
        "alpha": {"s3_uris": ["s3://b/a/second.h5ad"], "explorer_url": "u2", "cell_count": 2}
    }"#;
    let catalog = Catalog::parse_json(content).unwrap();

    let locators: Vec<String> = catalog
        .records()
        .iter()
        .map(|record| record.locator.to_string())
        .collect();
    assert_eq!(locators, vec!["s3://b/z/first.h5ad", "s3://b/a/second.h5ad"]);
    assert_eq!(catalog.records()[0].collection_id, "zeta");
}

#[test]
fn load_detects_format_from_extension() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(
        &path,
        r#"{"c1": {"s3_uris": ["s3://b/x/a.h5ad"], "explorer_url": "u", "cell_count": "10"}}"#,
    )
    .unwrap();

    let catalog = Catalog::load(&path, None).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.records()[0].cell_count, 10);

    let err = Catalog::load(&path, Some(CatalogFormat::Tsv)).unwrap_err();
    assert_matches!(err, AtlasError::CatalogColumn(_));
}

#[test]
fn load_missing_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = Catalog::load(&temp.path().join("absent.tsv"), None).unwrap_err();
    assert_matches!(err, AtlasError::CatalogRead(_));
}
