use assert_matches::assert_matches;

use kira_obs_atlas::config::{
    AllowListEntry, CatalogEntry, CatalogEntryObject, Config, ConfigLoader, S3Entry,
};
use kira_obs_atlas::domain::CatalogFormat;
use kira_obs_atlas::error::AtlasError;

#[test]
fn parse_config_detailed() {
    let config = Config {
        schema_version: None,
        catalog: Some(CatalogEntry::Detailed(CatalogEntryObject {
            path: "tables/prod.json".to_string(),
            format: Some(CatalogFormat::Json),
        })),
        results_dir: Some("out".to_string()),
        scratch: Some("/tmp/kira-obs/scratch.h5ad".to_string()),
        s3: Some(S3Entry {
            endpoint: Some("http://localhost:9000".to_string()),
            request_timeout_secs: Some(600),
        }),
        max_datasets: Some(5),
        max_categories: Some(200),
        allow_list: Some(AllowListEntry::Columns(vec![
            "sex".to_string(),
            "tissue".to_string(),
        ])),
    };

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.catalog, "tables/prod.json");
    assert_eq!(resolved.catalog_format, Some(CatalogFormat::Json));
    assert_eq!(resolved.s3_endpoint, "http://localhost:9000");
    assert_eq!(resolved.request_timeout_secs, Some(600));
    assert_eq!(resolved.max_datasets, Some(5));
    assert_eq!(resolved.max_categories, 200);
    assert_eq!(resolved.allow_list, vec!["sex", "tissue"]);

    let store = resolved.store();
    assert!(store.result_path("all_obs.tsv.gz").ends_with("out/all_obs.tsv.gz"));
}

#[test]
fn resolve_reads_json_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-obs.json");
    std::fs::write(
        &path,
        r#"{"catalog": "data_tables/latest.tsv", "scratch": "scratch/x.h5ad", "allow_list": "standard"}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.catalog, "data_tables/latest.tsv");
    assert_eq!(resolved.scratch_path, "scratch/x.h5ad");
    assert_eq!(resolved.allow_list.len(), 19);
}

#[test]
fn unknown_allow_list_preset_is_rejected() {
    let config = Config {
        scratch: Some("scratch.h5ad".to_string()),
        allow_list: Some(AllowListEntry::Preset("everything".to_string())),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, AtlasError::ConfigParse(_));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, AtlasError::ConfigRead(_));
}
