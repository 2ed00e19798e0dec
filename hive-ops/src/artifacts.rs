use std::{
    fs,
    io::{self, Error, ErrorKind},
};

/// Locates the distribution archive "{prefix}-*.tar.gz" in the
/// directory and returns its filename.
pub fn find_distribution(dir: &str, prefix: &str) -> io::Result<String> {
    log::info!("looking for '{}-*.tar.gz' in '{}'", prefix, dir);

    let wanted_prefix = format!("{}-", prefix);
    let mut found: Option<String> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(s) => s,
            None => continue,
        };
        if name.starts_with(&wanted_prefix) && name.ends_with(".tar.gz") {
            found = Some(name.to_string());
        }
    }

    found.ok_or_else(|| {
        Error::new(
            ErrorKind::NotFound,
            format!("unable to find {} distribution in '{}'", prefix, dir),
        )
    })
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- artifacts::test_find_distribution --exact --show-output
#[test]
fn test_find_distribution() {
    use std::io::Write as _;

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let tmp_dir = tempfile::tempdir().unwrap();
    let dir = tmp_dir.path().to_str().unwrap();

    // nothing to find yet
    assert!(find_distribution(dir, "hive").is_err());

    for name in ["README.txt", "hive-1.0.jar", "other-1.0.tar.gz"] {
        let mut f = fs::File::create(tmp_dir.path().join(name)).unwrap();
        f.write_all(&[0]).unwrap();
    }
    assert!(find_distribution(dir, "hive").is_err());

    let mut f = fs::File::create(tmp_dir.path().join("hive-1.0.tar.gz")).unwrap();
    f.write_all(&[0]).unwrap();
    assert_eq!(find_distribution(dir, "hive").unwrap(), "hive-1.0.tar.gz");
}
