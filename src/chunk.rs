/// A chunk is flushed once appending the next paragraph would reach this many characters.
pub const CHUNK_CHAR_LIMIT: usize = 2500;

/// Greedily packs paragraph markup into chunks below [`CHUNK_CHAR_LIMIT`].
///
/// Paragraphs are never split; one that is too long on its own becomes its own
/// chunk. Lengths count Unicode scalar values.
pub fn chunk_paragraphs<S: AsRef<str>>(paragraphs: &[S]) -> Vec<String> {
    chunk_paragraphs_with_limit(paragraphs, CHUNK_CHAR_LIMIT)
}

fn chunk_paragraphs_with_limit<S: AsRef<str>>(paragraphs: &[S], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0usize;

    for paragraph in paragraphs {
        let paragraph = paragraph.as_ref();
        let paragraph_chars = paragraph.chars().count();

        if buffer_chars + paragraph_chars >= limit && !buffer.is_empty() {
            chunks.push(std::mem::take(&mut buffer));
            buffer_chars = 0;
        }
        buffer.push_str(paragraph);
        buffer_chars += paragraph_chars;
    }

    if !buffer.is_empty() {
        chunks.push(buffer);
    }
    chunks
}
