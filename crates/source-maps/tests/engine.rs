use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bridge_source_maps::{paths, SourceMaps};

const MAP: &str = r#"{
    "version": 3,
    "file": "main.js",
    "sourceRoot": "webpack:///",
    "sources": ["./src/main.ts", "./src/util.ts"],
    "mappings": "AAAA,IAAI;AACJ;ACCA,EAAE"
}"#;

#[tokio::test]
async fn inline_map_with_overrides_round_trips() {
    let web_root = tempfile::tempdir().expect("web root");
    let root = web_root.path().to_string_lossy().to_string();
    let generated = paths::join(&root, "dist/main.js");
    let inline = format!(
        "data:application/json;charset=utf-8;base64,{}",
        STANDARD.encode(MAP)
    );

    let engine = SourceMaps::new(
        Some(root.clone()),
        &[("webpack:///./*".to_string(), "${webRoot}/*".to_string())],
    );
    let map = engine
        .process_new_source_map(&generated, &inline)
        .await
        .expect("inline map");

    let main_ts = paths::join(&root, "src/main.ts");
    let util_ts = paths::join(&root, "src/util.ts");
    assert_eq!(map.authored_sources(), [main_ts.clone(), util_ts.clone()]);

    // every exact mapping survives authored -> generated -> authored on the same line
    for (path, line, column) in [(&main_ts, 0, 0), (&main_ts, 0, 4), (&main_ts, 1, 0), (&util_ts, 2, 0)] {
        let generated_position = engine
            .map_to_generated(path, line, column)
            .expect("generated position");
        let back = engine
            .map_to_authored(&generated, generated_position.line, generated_position.column)
            .expect("authored position");
        assert_eq!(paths::canonical_key(&back.source), paths::canonical_key(path));
        assert_eq!(back.line, line);
    }
}

#[tokio::test]
async fn unknown_authored_file_has_no_mapping() {
    let engine = SourceMaps::new(None, &[]);
    assert!(engine.map_to_generated("/nowhere/a.ts", 0, 0).is_none());
    assert!(engine.generated_path_for("/nowhere/a.ts").is_none());
    assert!(engine.map_to_authored("/nowhere/a.js", 0, 0).is_none());
}
