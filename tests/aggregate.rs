use camino::Utf8PathBuf;
use chrono::Utc;

use kira_obs_atlas::aggregate::{
    CATEGORY_COUNTS_FILE, CATEGORY_COUNTS_HEADER, CategoryCensus, N_CATEGORIES_FILE,
    N_CATEGORIES_HEADER, RunSummary,
};
use kira_obs_atlas::app::{ApplyReport, ResultEntry, SkippedDataset, Stage};
use kira_obs_atlas::catalog::DatasetRecord;
use kira_obs_atlas::domain::{DatasetKey, S3Uri};
use kira_obs_atlas::store::Store;
use kira_obs_atlas::transform::DatasetCategories;

fn entry(uri: &str, value: DatasetCategories) -> ResultEntry<DatasetCategories> {
    let locator: S3Uri = uri.parse().unwrap();
    ResultEntry {
        key: DatasetKey::from(locator.clone()),
        record: DatasetRecord {
            production_locator: locator.clone(),
            explorer_url: format!("https://e/{}", locator.file_name()),
            locator,
            collection_id: "c".to_string(),
            collection_name: "n".to_string(),
            cell_count: 0,
            organisms: Vec::new(),
            tissues: Vec::new(),
            assays: Vec::new(),
        },
        value,
    }
}

fn store(temp: &tempfile::TempDir) -> Store {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    Store::new_with_paths(root.join("scratch.h5ad"), root.join("results"))
}

#[test]
fn census_writes_both_tables() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    let entries = vec![
        entry(
            "s3://b/one.h5ad",
            DatasetCategories {
                n_col_one_category: 1,
                n_col_two_or_more_category: 1,
                largest_category_n: 4,
                largest_category_label: Some("cell_type".to_string()),
                n_categories_per_column: vec![4, 1],
            },
        ),
        entry("s3://b/two.h5ad", DatasetCategories::default()),
    ];

    let census = CategoryCensus::from_entries(&entries);
    let written = census.persist(&store).unwrap();
    assert_eq!(written.len(), 2);

    let histogram =
        std::fs::read_to_string(store.result_path(CATEGORY_COUNTS_FILE).as_std_path()).unwrap();
    assert_eq!(histogram, "n_categories\tcounts\n1\t1\n4\t1\n");

    let datasets =
        std::fs::read_to_string(store.result_path(N_CATEGORIES_FILE).as_std_path()).unwrap();
    let lines: Vec<&str> = datasets.lines().collect();
    assert_eq!(
        lines[0],
        "exp_url\tn_col_one_category\tn_col_two_or_more_category\tlargest_category_n\tlargest_category_label"
    );
    assert_eq!(lines[1], "https://e/one.h5ad\t1\t1\t4\tcell_type");
    assert_eq!(lines[2], "https://e/two.h5ad\t0\t0\t0\t");
}

#[test]
fn empty_census_still_writes_headers() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);

    let census = CategoryCensus::from_entries(&[]);
    census.persist(&store).unwrap();

    let histogram =
        std::fs::read_to_string(store.result_path(CATEGORY_COUNTS_FILE).as_std_path()).unwrap();
    assert_eq!(histogram, "n_categories\tcounts\n");
    assert_eq!(histogram.trim_end(), CATEGORY_COUNTS_HEADER.join("\t"));

    let datasets =
        std::fs::read_to_string(store.result_path(N_CATEGORIES_FILE).as_std_path()).unwrap();
    assert_eq!(
        datasets,
        "exp_url\tn_col_one_category\tn_col_two_or_more_category\tlargest_category_n\tlargest_category_label\n"
    );
    assert_eq!(datasets.trim_end(), N_CATEGORIES_HEADER.join("\t"));
}

#[test]
fn run_summary_lists_processed_and_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    let good = entry("s3://b/one.h5ad", DatasetCategories::default());
    let missing: S3Uri = "s3://b/two.h5ad".parse().unwrap();
    let report = ApplyReport {
        transform: "category-summary".to_string(),
        attempted: 2,
        entries: vec![good],
        skipped: vec![SkippedDataset {
            key: DatasetKey::from(missing),
            stage: Stage::Fetch,
            reason: "S3 returned status 404".to_string(),
        }],
        catalog_skipped: Vec::new(),
    };

    let summary = RunSummary::from_report(&report, Utc::now(), vec![store.result_path("x.tsv")]);
    let path = summary.persist(&store).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path.as_std_path()).unwrap()).unwrap();
    assert_eq!(json["processed"][0], "s3://b/one.h5ad");
    assert_eq!(json["skipped"][0]["stage"], "fetch");
    assert_eq!(json["skipped"][0]["key"], "s3://b/two.h5ad");
    assert_eq!(json["attempted"], 2);
}
