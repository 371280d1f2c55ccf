//! End-to-end tests of the `filterbench` command line

use image::{Rgb, RgbImage};
use std::path::Path;
use std::process::{Command, Output};

/// Run block line for a three-image batch with no failures
const ALL_OK: &str = "[Stats] Success: 3 | Failed: 0";

fn filterbench(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_filterbench"))
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_inputs(root: &Path) {
    for (category, count) in [("ramen", 2), ("tacos", 1)] {
        let dir = root.join("input_images").join(category);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            RgbImage::from_pixel(10, 10, Rgb([200, 120, 40]))
                .save(dir.join(format!("{}.jpg", i)))
                .unwrap();
        }
    }
}

#[test]
fn test_init_prints_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let output = filterbench(dir.path(), &["init"]);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("[runner]"));
    assert!(text.contains("pool_workers = [1, 2, 4, 8]"));
}

#[test]
fn test_empty_input_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("input_images")).unwrap();

    let output = filterbench(dir.path(), &["serial"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no input images"));
    assert!(!dir.path().join("serial_baseline_value.csv").exists());
}

#[test]
fn test_missing_baseline_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let output = filterbench(
        dir.path(),
        &["futures", "--workers", "2", "--isolation", "thread"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("baseline"));
    assert!(!stdout(&output).contains("SCALING SUMMARY"));
}

#[test]
fn test_serial_then_parallel_runs() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let serial = filterbench(dir.path(), &["serial"]);
    assert!(serial.status.success(), "{}", stderr(&serial));
    assert!(stdout(&serial).contains("[Stats] Success: 3 | Failed: 0"));

    let baseline = std::fs::read_to_string(dir.path().join("serial_baseline_value.csv")).unwrap();
    assert!(baseline.starts_with("metric,value\nserial_baseline,"));
    let detail = std::fs::read_to_string(dir.path().join("serial_results.csv")).unwrap();
    assert_eq!(detail.lines().count(), 4);
    assert!(detail.contains("ramen_0.jpg"));
    assert!(dir.path().join("output_serial").join("grayscale").join("tacos_0.jpg").is_file());

    // Default isolation: every item handled by a real worker process.
    let pool = filterbench(dir.path(), &["pool", "--workers", "2,1"]);
    assert!(pool.status.success(), "{}", stderr(&pool));
    let text = stdout(&pool);
    assert!(text.contains("POOL SCALING SUMMARY"));
    assert_eq!(text.matches(" workers ---").count(), 2, "{}", text);
    assert_eq!(text.matches(ALL_OK).count(), 2, "{}", text);
    assert!(!text.contains("Worker unknown"), "{}", text);
    let one = text.find("\n1 ").unwrap();
    let two = text.find("\n2 ").unwrap();
    assert!(one < two);
    assert!(dir.path().join("output_multiprocessing").join("edge").join("ramen_1.jpg").is_file());

    let report = dir.path().join("futures.json");
    let futures = filterbench(
        dir.path(),
        &[
            "futures",
            "--workers",
            "1,2",
            "--format",
            "json",
            "--output",
            report.to_str().unwrap(),
        ],
    );
    assert!(futures.status.success(), "{}", stderr(&futures));
    let text = stdout(&futures);
    assert_eq!(text.matches(ALL_OK).count(), 2, "{}", text);
    assert!(!text.contains("Worker unknown"), "{}", text);

    let json = std::fs::read_to_string(&report).unwrap();
    assert!(json.contains("\"strategy\": \"futures\""));
    assert!(json.contains("\"worker_count\": 2"));
    assert!(json.contains("\"rows\""));
    assert_eq!(json.matches("\"success_count\": 3").count(), 2, "{}", json);
    assert_eq!(json.matches("\"failure_count\": 0").count(), 2, "{}", json);
    assert!(!json.contains("\"unknown\":"), "{}", json);
}

#[test]
fn test_thread_isolation_runs_every_item() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let pool = filterbench(
        dir.path(),
        &["pool", "--workers", "2", "--compute-baseline", "--isolation", "thread"],
    );
    assert!(pool.status.success(), "{}", stderr(&pool));
    let text = stdout(&pool);
    assert_eq!(text.matches(ALL_OK).count(), 1, "{}", text);
    assert!(dir.path().join("serial_baseline_value.csv").is_file());
}
