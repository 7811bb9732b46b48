//! L2 on-disk tier.
//!
//! Entries are written once and never mutated in place: a write serializes
//! to a sibling temp file and renames it over the final path, so a concurrent
//! reader either sees the old file, the new one, or nothing — never a
//! partial write.

use serde::de::DeserializeOwned;
use serde::Serialize;
#[cfg(test)]
use std::path::Path;
use std::path::PathBuf;

pub(crate) struct L2Store {
    dir: PathBuf,
}

impl L2Store {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, hex_key: &str) -> PathBuf {
        self.dir.join(format!("{hex_key}.json"))
    }

    pub(crate) async fn get<V: DeserializeOwned>(&self, hex_key: &str) -> std::io::Result<Option<V>> {
        let path = self.path_for(hex_key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn put<V: Serialize>(&self, hex_key: &str, value: &V) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let final_path = self.path_for(hex_key);
        let tmp_path = self.dir.join(format!("{hex_key}.{}.tmp", uniqueish_suffix()));
        let bytes =
            serde_json::to_vec(value).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await
    }

    pub(crate) async fn remove(&self, hex_key: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.path_for(hex_key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[cfg(test)]
    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }
}

fn uniqueish_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("{}-{}", std::process::id(), COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        n: u32,
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = L2Store::new(dir.path().to_path_buf());

        assert_eq!(store.get::<Payload>("abc").await.unwrap(), None);

        store.put("abc", &Payload { n: 7 }).await.unwrap();
        assert_eq!(store.get::<Payload>("abc").await.unwrap(), Some(Payload { n: 7 }));

        store.remove("abc").await.unwrap();
        assert_eq!(store.get::<Payload>("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = L2Store::new(dir.path().to_path_buf());
        store.put("k", &Payload { n: 1 }).await.unwrap();

        let mut entries = tokio::fs::read_dir(store.dir()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().into_string().unwrap());
        }
        assert_eq!(names, vec!["k.json".to_string()]);
    }
}
