//! Exhaustive nearest-neighbor index over `f16` vectors.
//!
//! Vectors are stored row-major; search computes the squared Euclidean
//! distance from the query to every row. The on-disk format is
//!
//! ```text
//! magic "DQAFLAT1" | dimension u32 LE | count u64 LE | count × dimension f16
//! ```

use anyhow::{Context, Result, bail, ensure};
use half::f16;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"DQAFLAT1";
const HEADER_LEN: usize = 8 + 4 + 8;

/// A search result: the row of the vector and its squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f16>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Result<Self> {
        ensure!(dimension > 0, "Index dimension must be positive");
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector and return its position.
    pub fn add(&mut self, vector: &[f16]) -> Result<usize> {
        ensure!(
            vector.len() == self.dimension,
            "Vector has dimension {}, index expects {}",
            vector.len(),
            self.dimension
        );
        self.data.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    pub fn add_all<'a, I>(&mut self, vectors: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Vec<f16>>,
    {
        for vector in vectors {
            self.add(vector)?;
        }
        Ok(())
    }

    pub fn vector(&self, position: usize) -> Option<&[f16]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// The `k` nearest vectors, closest first. Equal distances keep
    /// insertion order. `k` is clamped to the number of vectors.
    pub fn search(&self, query: &[f16], k: usize) -> Result<Vec<SearchHit>> {
        ensure!(
            query.len() == self.dimension,
            "Query has dimension {}, index expects {}",
            query.len(),
            self.dimension
        );
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query: Vec<f32> = query.iter().map(|x| x.to_f32()).collect();
        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| SearchHit {
                position,
                distance: squared_l2(&query, row),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        Ok(hits)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 2);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(bytemuck::cast_slice::<f16, u8>(&self.data));
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
            bail!("Not a flat index file");
        }
        let dimension = u32::from_le_bytes(bytes[8..12].try_into()?) as usize;
        let count = u64::from_le_bytes(bytes[12..20].try_into()?) as usize;
        ensure!(dimension > 0, "Index file has zero dimension");

        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(2))
            .context("Index header overflows")?;
        let payload = &bytes[HEADER_LEN..];
        ensure!(
            payload.len() == expected,
            "Index payload is {} bytes, header promises {}",
            payload.len(),
            expected
        );

        // The payload sits at an arbitrary alignment inside `bytes`
        let mut data = vec![f16::ZERO; expected / 2];
        bytemuck::cast_slice_mut::<f16, u8>(&mut data).copy_from_slice(payload);
        Ok(Self { dimension, data })
    }

    /// Flush the index to `path` through a temporary file in the same directory.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes)).await??;
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read index {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("Invalid index {}", path.display()))
    }

    /// Delete an index file; a missing file is not an error.
    pub async fn remove(path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

fn squared_l2(query: &[f32], row: &[f16]) -> f32 {
    query
        .iter()
        .zip(row)
        .map(|(q, r)| {
            let d = q - r.to_f32();
            d * d
        })
        .sum()
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write index {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn v(values: &[f32]) -> Vec<f16> {
        values.iter().map(|&x| f16::from_f32(x)).collect()
    }

    fn sample() -> FlatL2Index {
        let mut index = FlatL2Index::new(2).unwrap();
        index.add(&v(&[0.0, 0.0])).unwrap();
        index.add(&v(&[1.0, 0.0])).unwrap();
        index.add(&v(&[0.0, 3.0])).unwrap();
        index.add(&v(&[1.0, 0.0])).unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = sample();
        assert_eq!(index.len(), 4);

        let hits = index.search(&v(&[0.9, 0.0]), 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        // rows 1 and 3 are identical, so insertion order decides
        assert_eq!(positions, vec![1, 3, 0]);
        assert!((hits[0].distance - 0.01).abs() < 1e-3);
        assert!(hits[0].distance <= hits[2].distance);
    }

    #[test]
    fn test_k_is_clamped() {
        let index = sample();
        assert_eq!(index.search(&v(&[0.0, 0.0]), 10).unwrap().len(), 4);
        assert!(index.search(&v(&[0.0, 0.0]), 0).unwrap().is_empty());

        let empty = FlatL2Index::new(2).unwrap();
        assert!(empty.is_empty());
        assert!(empty.search(&v(&[0.0, 0.0]), 3).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_checks() {
        let mut index = FlatL2Index::new(3).unwrap();
        assert!(index.add(&v(&[1.0, 2.0])).is_err());
        assert!(index.search(&v(&[1.0]), 1).is_err());
        assert!(FlatL2Index::new(0).is_err());
        assert_eq!(index.add(&v(&[1.0, 2.0, 3.0])).unwrap(), 0);
        assert_eq!(index.vector(0), Some(&v(&[1.0, 2.0, 3.0])[..]));
        assert_eq!(index.vector(1), None);
    }

    #[test]
    fn test_bytes_validation() {
        let index = sample();
        let bytes = index.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 4 * 2 * 2);
        assert_eq!(FlatL2Index::from_bytes(&bytes).unwrap(), index);

        assert!(FlatL2Index::from_bytes(b"short").is_err());
        assert!(FlatL2Index::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        assert!(FlatL2Index::from_bytes(&wrong_magic).is_err());
    }

    #[test]
    fn test_payload_is_raw_f16_and_alignment_free() {
        let index = sample();
        let bytes = index.to_bytes();
        assert_eq!(&bytes[HEADER_LEN..], bytemuck::cast_slice::<f16, u8>(&index.data));

        // Decode from an odd offset so the payload is not 2-byte aligned
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);
        assert_eq!(FlatL2Index::from_bytes(&shifted[1..]).unwrap(), index);
    }

    #[tokio::test]
    async fn test_save_load_remove() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("kb").join("index.flat");
        let index = sample();

        index.save(&path).await?;
        let loaded = FlatL2Index::load(&path).await?;
        assert_eq!(loaded, index);
        assert_eq!(loaded.search(&v(&[0.0, 2.5]), 1)?[0].position, 2);

        assert!(FlatL2Index::remove(&path).await?);
        assert!(!FlatL2Index::remove(&path).await?);
        assert!(FlatL2Index::load(&path).await.is_err());
        Ok(())
    }
}
