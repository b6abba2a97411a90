//! # blockswarm Storage
//!
//! Block persistence on the local filesystem.
//!
//! ## Storage Layout
//!
//! - `<blocks_dir>/block_<index>` - one file per block, raw bytes
//! - `<output_dir>/peer_<id>_complete` - file reconstructed by a finished peer

use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Block file does not exist
    #[error("Block {0} not found in store")]
    BlockNotFound(u32),

    /// Reconstruction was asked for an incomplete set
    #[error("Cannot reconstruct: block {0} is missing")]
    MissingBlock(u32),
}

impl StorageError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub mod block_store {
    //! Per-block file store
    //!
    //! Each index is written at most once in normal operation; writes go
    //! through a temporary file and a rename so concurrent readers of a
    //! shared directory only ever see complete blocks.

    use super::{Result, StorageError};
    use blockswarm_core::types::BlockIndex;
    use std::io::ErrorKind;
    use std::path::PathBuf;
    use tokio::fs;

    /// Directory of `block_<index>` files
    #[derive(Clone, Debug)]
    pub struct BlockStore {
        dir: PathBuf,
    }

    impl BlockStore {
        /// Create the backing directory if needed
        pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
            let store = Self { dir: dir.into() };
            fs::create_dir_all(&store.dir)
                .await
                .map_err(|e| StorageError::io(&store.dir, e))?;
            Ok(store)
        }

        pub fn block_path(&self, index: BlockIndex) -> PathBuf {
            self.dir.join(format!("block_{}", index))
        }

        pub async fn contains(&self, index: BlockIndex) -> bool {
            fs::metadata(self.block_path(index))
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
        }

        pub async fn read_block(&self, index: BlockIndex) -> Result<Vec<u8>> {
            let path = self.block_path(index);
            match fs::read(&path).await {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::BlockNotFound(index)),
                Err(e) => Err(StorageError::io(path, e)),
            }
        }

        pub async fn write_block(&self, index: BlockIndex, data: &[u8]) -> Result<()> {
            let path = self.block_path(index);
            let tmp = self
                .dir
                .join(format!(".block_{}.{:016x}.tmp", index, rand::random::<u64>()));

            fs::write(&tmp, data)
                .await
                .map_err(|e| StorageError::io(&tmp, e))?;
            if let Err(e) = fs::rename(&tmp, &path).await {
                let _ = fs::remove_file(&tmp).await;
                return Err(StorageError::io(path, e));
            }

            tracing::trace!(block = index, bytes = data.len(), "Block written");
            Ok(())
        }
    }
}

pub mod chunking {
    //! Split a file into blocks and put it back together

    use super::block_store::BlockStore;
    use super::{Result, StorageError};
    use blockswarm_core::types::BlockIndex;
    use std::path::Path;
    use tokio::fs;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

    /// Split `input` into `block_size` chunks stored as blocks `0..n`
    ///
    /// Returns the number of blocks written. The last block may be short.
    pub async fn split_file(input: &Path, store: &BlockStore, block_size: usize) -> Result<u32> {
        let mut file = fs::File::open(input)
            .await
            .map_err(|e| StorageError::io(input, e))?;

        let mut index: BlockIndex = 0;
        let mut buf = vec![0u8; block_size];
        loop {
            let filled = read_full(&mut file, &mut buf)
                .await
                .map_err(|e| StorageError::io(input, e))?;
            if filled == 0 {
                break;
            }
            store.write_block(index, &buf[..filled]).await?;
            index += 1;
            if filled < block_size {
                break;
            }
        }

        tracing::info!(file = %input.display(), blocks = index, block_size, "File split into blocks");
        Ok(index)
    }

    /// Concatenate `blocks` in index order into `output`
    pub async fn reconstruct(
        store: &BlockStore,
        blocks: impl IntoIterator<Item = BlockIndex>,
        output: &Path,
    ) -> Result<u64> {
        let mut indices: Vec<BlockIndex> = blocks.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let file = fs::File::create(output)
            .await
            .map_err(|e| StorageError::io(output, e))?;
        let mut writer = BufWriter::new(file);

        let mut written = 0u64;
        for index in indices {
            let data = match store.read_block(index).await {
                Err(StorageError::BlockNotFound(i)) => return Err(StorageError::MissingBlock(i)),
                other => other?,
            };
            writer
                .write_all(&data)
                .await
                .map_err(|e| StorageError::io(output, e))?;
            written += data.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| StorageError::io(output, e))?;

        Ok(written)
    }

    async fn read_full(file: &mut fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

// Re-export for convenience
pub use block_store::BlockStore;
pub use chunking::{reconstruct, split_file};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read_block() {
        let dir = TempDir::new().unwrap();
        let store = BlockStore::open(dir.path().join("blocks")).await.unwrap();

        assert!(!store.contains(3).await);
        store.write_block(3, b"hello").await.unwrap();
        assert!(store.contains(3).await);
        assert_eq!(store.read_block(3).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_missing_block() {
        let dir = TempDir::new().unwrap();
        let store = BlockStore::open(dir.path()).await.unwrap();

        let err = store.read_block(9).await.unwrap_err();
        assert!(matches!(err, StorageError::BlockNotFound(9)));
    }

    #[tokio::test]
    async fn test_write_leaves_no_temporary_files() {
        let dir = TempDir::new().unwrap();
        let store = BlockStore::open(dir.path()).await.unwrap();
        store.write_block(0, b"a").await.unwrap();
        store.write_block(0, b"b").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["block_0".to_string()]);
        assert_eq!(store.read_block(0).await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_split_and_reconstruct_round_trip() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.bin");
        let original: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        std::fs::write(&input, &original).unwrap();

        let store = BlockStore::open(dir.path().join("blocks")).await.unwrap();
        let total = split_file(&input, &store, 64).await.unwrap();
        assert_eq!(total, 16); // 15 full blocks + 40 trailing bytes
        assert_eq!(store.read_block(15).await.unwrap().len(), 1000 - 15 * 64);

        // Out-of-order input set still reconstructs in index order
        let output = dir.path().join("out/complete");
        let written = reconstruct(&store, (0..total).rev(), &output).await.unwrap();
        assert_eq!(written, 1000);
        assert_eq!(std::fs::read(&output).unwrap(), original);
    }

    #[tokio::test]
    async fn test_split_exact_multiple() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.bin");
        std::fs::write(&input, vec![7u8; 128]).unwrap();

        let store = BlockStore::open(dir.path().join("blocks")).await.unwrap();
        assert_eq!(split_file(&input, &store, 64).await.unwrap(), 2);
        assert!(!store.contains(2).await);
    }

    #[tokio::test]
    async fn test_reconstruct_missing_block() {
        let dir = TempDir::new().unwrap();
        let store = BlockStore::open(dir.path().join("blocks")).await.unwrap();
        store.write_block(0, b"x").await.unwrap();

        let err = reconstruct(&store, [0, 1], &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingBlock(1)));
    }
}
