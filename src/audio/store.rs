use std::ops::Range;

use super::chunk::AudioChunk;

/// Why a segment ended
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentReason {
    LanguageSwap { source: String, target: String },
    SpeakerSwitch,
    EndOfSession,
}

/// Chunks of one closed segment, ready to be written
#[derive(Debug, Clone)]
pub struct SegmentCut {
    /// 0-based segment number within the session
    pub index: usize,
    pub reason: SegmentReason,
    pub chunks: Vec<AudioChunk>,
}

impl SegmentCut {
    pub fn first_sequence(&self) -> Option<u64> {
        self.chunks.first().map(|c| c.sequence)
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.chunks.last().map(|c| c.sequence)
    }

    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(|c| c.samples.len()).sum()
    }
}

/// In-memory accumulation buffer for one session.
///
/// Appended to only by the capture loop. The full buffer is kept for the
/// session file; segments are index ranges into it, so cutting a segment
/// never removes audio from the full recording.
#[derive(Debug, Default)]
pub struct AudioStore {
    chunks: Vec<AudioChunk>,
    segment_start: usize,
    next_segment: usize,
    /// Boundaries marked on the hot path, written later
    deferred: Vec<(usize, SegmentReason, Range<usize>)>,
}

impl AudioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: AudioChunk) {
        self.chunks.push(chunk);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Interleaved samples across all chunks
    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(|c| c.samples.len()).sum()
    }

    /// Cheap copy of every chunk (sample data is shared)
    pub fn snapshot(&self) -> Vec<AudioChunk> {
        self.chunks.clone()
    }

    /// Whether any segment boundary has been cut or marked
    pub fn has_segments(&self) -> bool {
        self.next_segment > 0
    }

    /// Number the next closed segment will get
    pub fn next_segment_index(&self) -> usize {
        self.next_segment
    }

    /// Close the open segment and start a new one at the current end.
    ///
    /// Returns `None` when the open segment holds no audio; no segment
    /// number is consumed in that case.
    pub fn close_segment(&mut self, reason: SegmentReason) -> Option<SegmentCut> {
        let range = self.take_open_range()?;
        let index = self.next_segment;
        self.next_segment += 1;

        Some(SegmentCut {
            index,
            reason,
            chunks: self.chunks[range].to_vec(),
        })
    }

    /// Mark a boundary without materialising the segment.
    ///
    /// Used from the capture loop, where only bookkeeping is allowed.
    pub fn mark_boundary(&mut self, reason: SegmentReason) {
        if let Some(range) = self.take_open_range() {
            let index = self.next_segment;
            self.next_segment += 1;
            self.deferred.push((index, reason, range));
        }
    }

    /// Materialise segments marked with [`mark_boundary`](Self::mark_boundary)
    pub fn drain_marked(&mut self) -> Vec<SegmentCut> {
        let deferred = std::mem::take(&mut self.deferred);
        deferred
            .into_iter()
            .map(|(index, reason, range)| SegmentCut {
                index,
                reason,
                chunks: self.chunks[range].to_vec(),
            })
            .collect()
    }

    fn take_open_range(&mut self) -> Option<Range<usize>> {
        if self.segment_start >= self.chunks.len() {
            return None;
        }
        let range = self.segment_start..self.chunks.len();
        self.segment_start = self.chunks.len();
        Some(range)
    }
}
