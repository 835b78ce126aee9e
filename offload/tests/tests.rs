use std::os::unix::fs::PermissionsExt;

struct TestEnv {
    _tmp_dir: tempfile::TempDir,
    src: std::path::PathBuf,
    dst1: std::path::PathBuf,
    dst2: std::path::PathBuf,
}

// src
// |- a.txt      (5 bytes)
// |- sub
//    |- b.txt   (10 bytes)
fn setup_test_env() -> TestEnv {
    let tmp_dir = tempfile::tempdir().unwrap();
    let src = tmp_dir.path().join("src");
    std::fs::create_dir_all(src.join("sub")).unwrap();
    std::fs::write(src.join("a.txt"), "hello").unwrap();
    std::fs::write(src.join("sub").join("b.txt"), "0123456789").unwrap();
    TestEnv {
        src,
        dst1: tmp_dir.path().join("d1"),
        dst2: tmp_dir.path().join("d2"),
        _tmp_dir: tmp_dir,
    }
}

fn offload() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("offload").unwrap()
}

fn get_file_content(path: &std::path::Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

fn check_copied(env: &TestEnv, dst: &std::path::Path) {
    assert_eq!(get_file_content(&dst.join("a.txt")), "hello");
    assert_eq!(get_file_content(&dst.join("sub").join("b.txt")), "0123456789");
    assert!(env.src.join("a.txt").exists());
}

#[test]
fn test_copy_to_two_destinations() {
    let env = setup_test_env();
    offload()
        .args([&env.src, &env.dst1, &env.dst2])
        .assert()
        .success();
    check_copied(&env, &env.dst1);
    check_copied(&env, &env.dst2);
}

#[test]
fn test_copy_to_single_destination() {
    let env = setup_test_env();
    offload().args([&env.src, &env.dst1]).assert().success();
    check_copied(&env, &env.dst1);
    assert!(!env.dst2.exists());
}

#[test]
fn test_existing_files_are_overwritten() {
    let env = setup_test_env();
    std::fs::create_dir_all(&env.dst1).unwrap();
    std::fs::write(env.dst1.join("a.txt"), "a much longer stale content").unwrap();
    offload().args([&env.src, &env.dst1]).assert().success();
    assert_eq!(get_file_content(&env.dst1.join("a.txt")), "hello");
}

#[test]
fn test_empty_source_succeeds_with_note() {
    let env = setup_test_env();
    let empty = env.src.join("sub").join("empty");
    std::fs::create_dir(&empty).unwrap();
    offload()
        .args([&empty, &env.dst1])
        .assert()
        .success()
        .stdout(predicates::str::contains("nothing was copied"));
    assert!(!env.dst1.exists());
}

#[test]
fn test_missing_source_fails() {
    let env = setup_test_env();
    offload()
        .args([&env.src.join("missing"), &env.dst1])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("does not exist"));
    assert!(!env.dst1.exists());
}

#[test]
fn test_too_many_destinations_fails() {
    let env = setup_test_env();
    let dst3 = env.dst1.with_file_name("d3");
    offload()
        .args([&env.src, &env.dst1, &env.dst2, &dst3])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("at most 2 destination"));
    assert!(!env.dst1.exists());
}

#[test]
fn test_destination_equal_to_source_fails() {
    let env = setup_test_env();
    offload()
        .args([&env.src, &env.src])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("is the source directory"));
    assert_eq!(get_file_content(&env.src.join("a.txt")), "hello");
}

#[test]
fn test_destination_overlapping_source_fails() {
    let env = setup_test_env();
    std::fs::write(env.src.join("sub").join("a.txt"), "nested").unwrap();
    let parent = env.src.parent().unwrap().to_path_buf();
    for destination in [env.src.join("backup"), parent] {
        offload()
            .args([&env.src, &destination])
            .assert()
            .code(1)
            .stderr(predicates::str::contains("overlaps source directory"));
    }
    assert_eq!(get_file_content(&env.src.join("a.txt")), "hello");
    assert!(!env.src.join("backup").exists());
}

#[test]
fn test_zero_progress_delay_is_reported() {
    let env = setup_test_env();
    offload()
        .args(["--progress-type", "text-updates", "--progress-delay", "0s"])
        .args([&env.src, &env.dst1])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stderr(predicates::str::contains("progress delay must be greater than zero"));
    check_copied(&env, &env.dst1);
}

#[test]
fn test_blocked_destination_fails_other_is_complete() {
    let env = setup_test_env();
    std::fs::write(&env.dst2, "not a directory").unwrap();
    offload()
        .args([&env.src, &env.dst1, &env.dst2])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("DestinationPrepareError"))
        .stderr(predicates::str::contains("offload encountered 2 errors"));
    check_copied(&env, &env.dst1);
}

#[test]
fn test_quiet_suppresses_errors() {
    let env = setup_test_env();
    std::fs::write(&env.dst2, "not a directory").unwrap();
    offload()
        .arg("-q")
        .args([&env.src, &env.dst1, &env.dst2])
        .assert()
        .code(1)
        .stderr(predicates::str::is_empty());
}

#[test]
fn test_summary_is_printed() {
    let env = setup_test_env();
    offload()
        .arg("--summary")
        .args([&env.src, &env.dst1, &env.dst2])
        .assert()
        .success()
        .stdout(predicates::str::contains("files processed: 2"))
        .stdout(predicates::str::contains("copies succeeded: 4"))
        .stdout(predicates::str::contains("copies failed: 0"));
}

#[test]
fn test_preserve_keeps_permissions() {
    let env = setup_test_env();
    std::fs::set_permissions(
        env.src.join("a.txt"),
        std::fs::Permissions::from_mode(0o750),
    )
    .unwrap();
    offload()
        .arg("--preserve")
        .args([&env.src, &env.dst1])
        .assert()
        .success();
    let mode = std::fs::metadata(env.dst1.join("a.txt"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o7777, 0o750);
}

#[test]
fn test_exclude_filter() {
    let env = setup_test_env();
    offload()
        .args(["--exclude", "/sub/"])
        .args([&env.src, &env.dst1])
        .assert()
        .success();
    assert_eq!(get_file_content(&env.dst1.join("a.txt")), "hello");
    assert!(!env.dst1.join("sub").exists());
}

#[test]
fn test_include_filter() {
    let env = setup_test_env();
    std::fs::write(env.src.join("sub").join("c.log"), "log").unwrap();
    offload()
        .args(["--include", "*.txt"])
        .args([&env.src, &env.dst1])
        .assert()
        .success();
    check_copied(&env, &env.dst1);
    assert!(!env.dst1.join("sub").join("c.log").exists());
}

#[test]
fn test_parallel_destinations_with_text_progress() {
    let env = setup_test_env();
    offload()
        .args([
            "--parallel-destinations",
            "--progress-type",
            "text-updates",
            "--progress-delay",
            "10ms",
            "--chunk-size",
            "4",
        ])
        .args([&env.src, &env.dst1, &env.dst2])
        .assert()
        .success();
    check_copied(&env, &env.dst1);
    check_copied(&env, &env.dst2);
}

#[test]
fn test_invalid_progress_delay_is_reported() {
    let env = setup_test_env();
    offload()
        .args(["--progress-delay", "soon"])
        .args([&env.src, &env.dst1])
        .assert()
        .success()
        .stderr(predicates::str::contains("invalid progress delay"));
    check_copied(&env, &env.dst1);
}

#[test]
fn test_debug_log_file_is_written() {
    let env = setup_test_env();
    let log = env.dst1.with_file_name("offload.log");
    offload()
        .arg("-v")
        .arg("--debug-log-file")
        .arg(&log)
        .args([&env.src, &env.dst1])
        .assert()
        .success();
    assert!(get_file_content(&log).contains("replication finished"));
}
