use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;

use crate::config::{ChunkStrategy, DEFAULT_CHUNK_LIMIT_BYTES};
use crate::models::DataLogEntry;
use crate::time::Timestamp;

/// A contiguous slice of a batch sent in one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub entries: Vec<DataLogEntry>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Halve the chunk, keeping order. The left half gets the smaller share.
    pub fn split_in_half(mut self) -> (Chunk, Chunk) {
        let right = self.entries.split_off(self.entries.len() / 2);
        (self, Chunk { entries: right })
    }

    pub fn max_end(&self) -> Option<Timestamp> {
        self.entries.iter().map(|entry| entry.end_date_time).max()
    }
}

/// Size of `entry` as it goes over the wire.
pub fn serialized_size(entry: &DataLogEntry) -> usize {
    serde_json::to_vec(entry).map(|bytes| bytes.len()).unwrap_or(0)
}

/// How many entries of `sample_size` bytes fit under `limit_bytes`. Never
/// less than one.
pub fn entries_per_chunk(sample_size: usize, limit_bytes: usize) -> usize {
    (limit_bytes / sample_size.max(1)).max(1)
}

/// Split `entries` into consecutive chunks, keeping order.
///
/// `Approximate` sizes one randomly chosen entry and cuts fixed-length
/// chunks from it; a chunk can exceed the ceiling when entry sizes vary.
/// `Exact` accumulates the real serialized size of each chunk (array
/// brackets and separators included), so only a single oversized entry can
/// exceed it.
pub fn plan_chunks(
    entries: Vec<DataLogEntry>,
    limit_bytes: usize,
    strategy: ChunkStrategy,
) -> Vec<Chunk> {
    if entries.is_empty() {
        return Vec::new();
    }
    let limit_bytes = if limit_bytes == 0 {
        DEFAULT_CHUNK_LIMIT_BYTES
    } else {
        limit_bytes
    };

    match strategy {
        ChunkStrategy::Approximate => plan_approximate(entries, limit_bytes),
        ChunkStrategy::Exact => plan_exact(entries, limit_bytes),
    }
}

fn plan_approximate(entries: Vec<DataLogEntry>, limit_bytes: usize) -> Vec<Chunk> {
    let sample_size = entries
        .choose(&mut rand::thread_rng())
        .map(serialized_size)
        .unwrap_or(1);
    let per_chunk = entries_per_chunk(sample_size, limit_bytes);

    let mut chunks = Vec::with_capacity(entries.len().div_ceil(per_chunk));
    let mut remaining = entries.into_iter().peekable();
    while remaining.peek().is_some() {
        chunks.push(Chunk {
            entries: remaining.by_ref().take(per_chunk).collect(),
        });
    }
    chunks
}

fn plan_exact(entries: Vec<DataLogEntry>, limit_bytes: usize) -> Vec<Chunk> {
    const BRACKETS: usize = 2;

    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_size = BRACKETS;

    for entry in entries {
        let size = serialized_size(&entry);
        let separator = usize::from(!current.is_empty());
        if !current.is_empty() && current_size + separator + size > limit_bytes {
            chunks.push(Chunk {
                entries: std::mem::take(&mut current),
            });
            current_size = BRACKETS;
        }
        current_size += usize::from(!current.is_empty()) + size;
        current.push(entry);
    }
    if !current.is_empty() {
        chunks.push(Chunk { entries: current });
    }
    chunks
}

/// Plans chunks and counts the ones the backend acknowledged.
#[derive(Debug, Default)]
pub struct ChunkPlanner {
    posted: AtomicUsize,
}

impl ChunkPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(
        &self,
        entries: Vec<DataLogEntry>,
        limit_bytes: usize,
        strategy: ChunkStrategy,
    ) -> Vec<Chunk> {
        plan_chunks(entries, limit_bytes, strategy)
    }

    /// Returns the new total.
    pub fn acknowledge(&self) -> usize {
        self.posted.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn posted_chunk_count(&self) -> usize {
        self.posted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::log_types;
    use crate::time::parse_iso;

    fn uniform_entries(count: usize) -> Vec<DataLogEntry> {
        let start = parse_iso("2024-05-01T10:00:00.000+00:00").unwrap();
        let end = parse_iso("2024-05-01T10:01:00.000+00:00").unwrap();
        (0..count)
            .map(|_| DataLogEntry::new(log_types::ACTIVITY, "step_count", 12.0, "count", start, end))
            .collect()
    }

    fn sizes(chunks: &[Chunk]) -> Vec<usize> {
        chunks.iter().map(Chunk::len).collect()
    }

    #[test]
    fn empty_batch_has_no_chunks() {
        assert!(plan_chunks(Vec::new(), 1024, ChunkStrategy::Approximate).is_empty());
        assert!(plan_chunks(Vec::new(), 1024, ChunkStrategy::Exact).is_empty());
    }

    #[test]
    fn approximate_split_matches_forty_entry_limit() {
        let entries = uniform_entries(150);
        let limit = serialized_size(&entries[0]) * 40;
        let chunks = plan_chunks(entries, limit, ChunkStrategy::Approximate);
        assert_eq!(sizes(&chunks), vec![40, 40, 40, 30]);
    }

    #[test]
    fn chunks_keep_input_order() {
        let entries = uniform_entries(7);
        let ids: Vec<_> = entries.iter().map(|e| e.id.clone()).collect();
        let limit = serialized_size(&entries[0]) * 3;
        let chunks = plan_chunks(entries, limit, ChunkStrategy::Approximate);
        let flattened: Vec<_> = chunks
            .iter()
            .flat_map(|chunk| chunk.entries.iter().map(|e| e.id.clone()))
            .collect();
        assert_eq!(flattened, ids);
    }

    #[test]
    fn tiny_limit_still_makes_progress() {
        let chunks = plan_chunks(uniform_entries(3), 1, ChunkStrategy::Approximate);
        assert_eq!(sizes(&chunks), vec![1, 1, 1]);
        let chunks = plan_chunks(uniform_entries(3), 1, ChunkStrategy::Exact);
        assert_eq!(sizes(&chunks), vec![1, 1, 1]);
    }

    #[test]
    fn zero_limit_falls_back_to_default() {
        let chunks = plan_chunks(uniform_entries(5), 0, ChunkStrategy::Approximate);
        assert_eq!(sizes(&chunks), vec![5]);
    }

    #[test]
    fn exact_chunks_never_exceed_the_limit() {
        let mut entries = uniform_entries(20);
        for (i, entry) in entries.iter_mut().enumerate() {
            entry
                .additional_properties
                .insert("note".into(), "x".repeat(i * 10).into());
        }
        let limit = 1_000;
        let chunks = plan_chunks(entries, limit, ChunkStrategy::Exact);
        for chunk in &chunks {
            let payload = serde_json::to_vec(&chunk.entries).unwrap();
            assert!(payload.len() <= limit || chunk.len() == 1);
        }
        assert_eq!(chunks.iter().map(Chunk::len).sum::<usize>(), 20);
    }

    #[test]
    fn split_halves_keep_order_and_max_end() {
        let mut entries = uniform_entries(5);
        let later = parse_iso("2024-05-01T11:00:00.000+00:00").unwrap();
        entries[4].end_date_time = later;
        let ids: Vec<_> = entries.iter().map(|e| e.id.clone()).collect();

        let (left, right) = Chunk { entries }.split_in_half();
        assert_eq!((left.len(), right.len()), (2, 3));
        assert_eq!(left.entries[1].id, ids[1]);
        assert_eq!(right.entries[0].id, ids[2]);
        assert_eq!(right.max_end(), Some(later));
        assert!(left.max_end() < right.max_end());
    }

    #[test]
    fn planner_counts_acknowledgements() {
        let planner = ChunkPlanner::new();
        assert_eq!(planner.acknowledge(), 1);
        assert_eq!(planner.acknowledge(), 2);
        assert_eq!(planner.posted_chunk_count(), 2);
    }
}
