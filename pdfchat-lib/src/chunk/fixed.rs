use crate::chunk::{Chunk, ChunkMetadata, Chunker};
use crate::config::ChunkingConfig;
use crate::{Error, Result};

/// Fixed-size chunker - slides a character window over the text
///
/// Windows are `chunk_size` characters long and advance by
/// `chunk_size - overlap`, so every adjacent pair shares exactly `overlap`
/// characters. The last window stops at the end of the text and may be
/// shorter.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    /// Create a chunker, rejecting parameters that cannot advance.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Configuration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(Error::Configuration(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Number of windows produced for a text of `len` characters.
    pub fn window_count(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else if len <= self.chunk_size {
            1
        } else {
            (len - self.overlap).div_ceil(self.stride())
        }
    }
}

impl Default for FixedSizeChunker {
    fn default() -> Self {
        let config = ChunkingConfig::default();
        Self {
            chunk_size: config.chunk_size,
            overlap: config.overlap,
        }
    }
}

impl Chunker for FixedSizeChunker {
    fn name(&self) -> &str {
        "fixed"
    }

    fn chunk(&self, content: &str, mut metadata: ChunkMetadata) -> Vec<Chunk> {
        // byte offset of every char, plus the end, so windows slice on char boundaries
        let mut offsets: Vec<usize> = content.char_indices().map(|(i, _)| i).collect();
        let len = offsets.len();
        offsets.push(content.len());

        let total = self.window_count(len);
        metadata.total_chunks = Some(total);

        let mut chunks = Vec::with_capacity(total);
        for i in 0..total {
            let start = i * self.stride();
            let end = (start + self.chunk_size).min(len);

            let mut m = metadata.clone();
            m.index = i;
            m.position = start;

            chunks.push(Chunk {
                content: content[offsets[start]..offsets[end]].to_string(),
                metadata: m,
            });
        }
        chunks
    }
}
