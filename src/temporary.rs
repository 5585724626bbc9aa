//! temp file logic
use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

static TEMPS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(<_>::default);

/// Add a file as temporary so it can be deleted later.
pub fn add(file: impl Into<PathBuf>) {
    TEMPS.lock().unwrap().insert(file.into());
}

/// Delete all added temporary files.
pub async fn clean() {
    for file in std::mem::take(&mut *TEMPS.lock().unwrap()) {
        let _ = tokio::fs::remove_file(file).await;
    }
}
