use std::fs::File;
use std::io::Write;

use filmscan_config::{ScriptRow, load_script_csv};
use rstest::rstest;
use tempfile::tempdir;

fn write_csv(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("script.csv");
    let mut f = File::create(&path).expect("create");
    f.write_all(contents.as_bytes()).expect("write");
    (dir, path)
}

#[rstest]
fn loads_names_and_codes() {
    let (_dir, path) = write_csv("delay_ms,command,param\n0,super8,0\n10, start_scan ,0\n5,54,-2\n");
    let rows = load_script_csv(&path).expect("load");
    assert_eq!(
        rows,
        vec![
            ScriptRow {
                delay_ms: 0,
                command: "super8".into(),
                param: 0
            },
            ScriptRow {
                delay_ms: 10,
                command: "start_scan".into(),
                param: 0
            },
            ScriptRow {
                delay_ms: 5,
                command: "54".into(),
                param: -2
            },
        ]
    );
}

#[rstest]
fn rejects_wrong_headers() {
    let (_dir, path) = write_csv("delay,cmd,param\n0,start_scan,0\n");
    let err = load_script_csv(&path).expect_err("bad headers");
    assert!(format!("{err}").contains("delay_ms,command,param"));
}

#[rstest]
#[case("delay_ms,command,param\n0,set_pt_level,70000\n", "16 bits")]
#[case("delay_ms,command,param\n-1,start_scan,0\n", "invalid CSV row 2")]
#[case("delay_ms,command,param\n", "no rows")]
fn rejects_bad_rows(#[case] contents: &str, #[case] needle: &str) {
    let (_dir, path) = write_csv(contents);
    let err = load_script_csv(&path).expect_err("bad script");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "{msg:?} should contain {needle:?}");
}

#[rstest]
fn missing_file_is_reported() {
    let dir = tempdir().expect("tempdir");
    let err = load_script_csv(&dir.path().join("nope.csv")).expect_err("missing");
    assert!(format!("{err}").contains("open script CSV"));
}
