use crate::error::PipelineError;
use crate::models::Chunk;
use std::mem;

/// Words are multiplied by this to approximate model tokens. Language-agnostic on purpose.
const TOKENS_PER_WORD: f64 = 1.33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_tokens: 500,
            max_tokens: 800,
            overlap_tokens: 60,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_tokens == 0 {
            return Err(PipelineError::InvalidChunkConfig(
                "max_tokens must be positive".to_string(),
            ));
        }
        if self.min_tokens > self.max_tokens {
            return Err(PipelineError::InvalidChunkConfig(format!(
                "min_tokens {} exceeds max_tokens {}",
                self.min_tokens, self.max_tokens
            )));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(PipelineError::InvalidChunkConfig(format!(
                "overlap_tokens {} must be below max_tokens {}",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    tokens_for_words(text.split_whitespace().count())
}

fn tokens_for_words(words: usize) -> usize {
    if words == 0 {
        return 0;
    }
    ((words as f64 * TOKENS_PER_WORD).round() as usize).max(1)
}

fn overlap_word_count(overlap_tokens: usize) -> usize {
    if overlap_tokens == 0 {
        return 0;
    }
    ((overlap_tokens as f64 / TOKENS_PER_WORD).round() as usize).max(1)
}

/// Byte span of one whitespace-delimited word in the source text.
#[derive(Debug, Clone, Copy)]
struct Word {
    start: usize,
    end: usize,
}

/// Splits `text` into paragraph-coherent chunks bounded by `config.max_tokens`.
///
/// Whole paragraphs are accumulated while they fit. A paragraph that cannot be
/// appended either starts a new chunk (when the buffer already holds
/// `min_tokens`) or is subdivided word by word. Every chunk after the first
/// starts with the trailing words of its predecessor, recorded in
/// [`Chunk::overlap_words`]. A whitespace-free run counts as a single word, so
/// it is never cut.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<Chunk> {
    let config = ChunkingConfig {
        max_tokens: config.max_tokens.max(1),
        ..config
    };
    let mut builder = ChunkBuilder::new(text, config);

    for paragraph in split_paragraphs(text) {
        if builder.fits(paragraph.len()) {
            builder.push_segment(paragraph);
            continue;
        }

        if builder.fresh() > 0 && tokens_for_words(builder.words) >= config.min_tokens {
            builder.flush();
            if builder.fits(paragraph.len()) {
                builder.push_segment(paragraph);
                continue;
            }
        }

        builder.split_into(paragraph);
    }

    builder.finish()
}

fn split_paragraphs(text: &str) -> Vec<Vec<Word>> {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let words = word_spans(line, offset);
        if words.is_empty() {
            if !current.is_empty() {
                paragraphs.push(mem::take(&mut current));
            }
        } else {
            current.extend(words);
        }
        offset += line.len();
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

fn word_spans(line: &str, base: usize) -> Vec<Word> {
    let mut words = Vec::new();
    let mut start = None;

    for (index, ch) in line.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(begin)) => {
                words.push(Word {
                    start: base + begin,
                    end: base + index,
                });
                start = None;
            }
            (false, None) => start = Some(index),
            _ => {}
        }
    }

    if let Some(begin) = start {
        words.push(Word {
            start: base + begin,
            end: base + line.len(),
        });
    }

    words
}

struct ChunkBuilder<'a> {
    text: &'a str,
    config: ChunkingConfig,
    overlap_len: usize,
    segments: Vec<Vec<Word>>,
    carried: usize,
    words: usize,
    chunks: Vec<Chunk>,
}

impl<'a> ChunkBuilder<'a> {
    fn new(text: &'a str, config: ChunkingConfig) -> Self {
        Self {
            text,
            config,
            overlap_len: overlap_word_count(config.overlap_tokens),
            segments: Vec::new(),
            carried: 0,
            words: 0,
            chunks: Vec::new(),
        }
    }

    fn fits(&self, extra_words: usize) -> bool {
        tokens_for_words(self.words + extra_words) <= self.config.max_tokens
    }

    fn fresh(&self) -> usize {
        self.words - self.carried
    }

    fn push_segment(&mut self, segment: Vec<Word>) {
        if segment.is_empty() {
            return;
        }
        self.words += segment.len();
        self.segments.push(segment);
    }

    fn drop_carried_overlap(&mut self) {
        if self.fresh() == 0 {
            self.segments.clear();
            self.words = 0;
            self.carried = 0;
        }
    }

    fn split_into(&mut self, paragraph: Vec<Word>) {
        let mut part = Vec::new();

        for word in paragraph {
            if self.fits(part.len() + 1) {
                part.push(word);
                continue;
            }

            if part.is_empty() && self.fresh() == 0 {
                self.drop_carried_overlap();
                part.push(word);
                continue;
            }

            self.push_segment(mem::take(&mut part));
            self.flush();
            if !self.fits(1) {
                self.drop_carried_overlap();
            }
            part.push(word);
        }

        self.push_segment(part);
    }

    fn flush(&mut self) {
        if self.fresh() == 0 {
            self.drop_carried_overlap();
            return;
        }

        let text = self
            .segments
            .iter()
            .map(|segment| {
                segment
                    .iter()
                    .map(|word| &self.text[word.start..word.end])
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let words = self.segments.concat();
        let first_fresh = words[self.carried];
        let last = words[words.len() - 1];

        self.chunks.push(Chunk {
            id: format!("chunk_{}", self.chunks.len()),
            text,
            token_count: tokens_for_words(words.len()),
            start_offset: first_fresh.start,
            end_offset: last.end,
            overlap_words: self.carried,
        });

        let take = self.overlap_len.min(words.len());
        let tail = words[words.len() - take..].to_vec();
        self.segments.clear();
        self.carried = tail.len();
        self.words = tail.len();
        if !tail.is_empty() {
            self.segments.push(tail);
        }
    }

    fn finish(mut self) -> Vec<Chunk> {
        if self.fresh() > 0 {
            self.flush();
        }
        self.chunks
    }
}
