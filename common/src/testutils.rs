use std::path::{Path, PathBuf};

/// Temporary workspace with a source tree and two (not yet existing) destination roots
pub struct TestTree {
    _tmp_dir: tempfile::TempDir,
    pub src: PathBuf,
    pub dst1: PathBuf,
    pub dst2: PathBuf,
}

impl TestTree {
    pub fn destinations(&self) -> Vec<PathBuf> {
        vec![self.dst1.clone(), self.dst2.clone()]
    }
}

/// Creates an empty source directory
pub async fn setup_empty_tree() -> anyhow::Result<TestTree> {
    let tmp_dir = tempfile::tempdir()?;
    let src = tmp_dir.path().join("src");
    tokio::fs::create_dir(&src).await?;
    Ok(TestTree {
        src,
        dst1: tmp_dir.path().join("d1"),
        dst2: tmp_dir.path().join("d2"),
        _tmp_dir: tmp_dir,
    })
}

pub async fn setup_test_tree() -> anyhow::Result<TestTree> {
    // src
    // |- a.txt      (5 bytes)
    // |- sub
    //    |- b.txt   (10 bytes)
    let tree = setup_empty_tree().await?;
    tokio::fs::write(tree.src.join("a.txt"), "hello").await?;
    tokio::fs::create_dir(tree.src.join("sub")).await?;
    tokio::fs::write(tree.src.join("sub").join("b.txt"), "0123456789").await?;
    Ok(tree)
}

pub async fn setup_nested_tree() -> anyhow::Result<TestTree> {
    // src
    // |- 0.txt
    // |- .hidden
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    //    |- deep
    //       |- 3.txt
    // |- baz
    //    |- 4.txt
    let tree = setup_empty_tree().await?;
    let src = &tree.src;
    tokio::fs::write(src.join("0.txt"), "0").await?;
    tokio::fs::write(src.join(".hidden"), "hidden").await?;
    tokio::fs::create_dir_all(src.join("bar").join("deep")).await?;
    tokio::fs::write(src.join("bar").join("1.txt"), "1").await?;
    tokio::fs::write(src.join("bar").join("2.txt"), "22").await?;
    tokio::fs::write(src.join("bar").join("deep").join("3.txt"), "333").await?;
    tokio::fs::create_dir(src.join("baz")).await?;
    tokio::fs::write(src.join("baz").join("4.txt"), "4444").await?;
    Ok(tree)
}

/// Lists all regular files under `root` as paths relative to it, sorted
pub async fn list_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = vec![];
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else {
                files.push(path.strip_prefix(root)?.to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Checks that every file under `src` exists under `dst` with identical contents
pub async fn check_dirs_identical(src: &Path, dst: &Path) -> anyhow::Result<()> {
    for relative in list_files(src).await? {
        let src_contents = tokio::fs::read(src.join(&relative)).await?;
        let dst_file = dst.join(&relative);
        let dst_contents = tokio::fs::read(&dst_file)
            .await
            .map_err(|err| anyhow::anyhow!("destination file {dst_file:?} is missing: {err}"))?;
        assert_eq!(
            src_contents, dst_contents,
            "contents of {relative:?} differ between {src:?} and {dst:?}"
        );
    }
    Ok(())
}

/// Returns true if the current user bypasses permission checks (e.g. runs as root)
pub async fn ignores_permissions(probe: &Path) -> bool {
    tokio::fs::read_dir(probe).await.is_ok() || tokio::fs::read(probe).await.is_ok()
}
