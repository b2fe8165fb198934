//! Header-aware markdown chunking
//!
//! Chunks carry the breadcrumb of enclosing headings so downstream stages can
//! stamp header context onto facts the LLM produced without one.

/// One chunk of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position within the document
    pub index: usize,
    /// Enclosing headings, outermost first
    pub header_path: Vec<String>,
    /// Chunk text
    pub content: String,
}

impl Chunk {
    /// Breadcrumb rendered the way facts carry it ("A > B > C")
    pub fn breadcrumb(&self) -> String {
        self.header_path.join(" > ")
    }
}

/// A heading-delimited section with its breadcrumb
struct Section {
    header_path: Vec<String>,
    content: String,
}

/// Splits markdown into header-aware chunks
pub struct MarkdownChunker {
    max_chunk_size: usize,
    overlap: usize,
}

impl MarkdownChunker {
    /// Create a chunker with the given size and overlap (characters)
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self { max_chunk_size, overlap }
    }

    /// Chunk the given markdown
    pub fn chunk(&self, markdown: &str) -> Vec<Chunk> {
        let text = markdown.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if text.len() <= self.max_chunk_size {
            return vec![Chunk {
                index: 0,
                header_path: first_heading_path(text),
                content: text.to_string(),
            }];
        }

        let sections = split_sections(text);
        self.pack_sections(sections)
    }

    /// Combine sections into chunks up to the size limit; oversized sections
    /// split at paragraph boundaries with overlap
    fn pack_sections(&self, sections: Vec<Section>) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current = String::new();
        let mut current_path: Vec<String> = Vec::new();

        let mut flush = |current: &mut String, path: &mut Vec<String>, chunks: &mut Vec<Chunk>| {
            let content = current.trim().to_string();
            if !content.is_empty() {
                chunks.push(Chunk { index: chunks.len(), header_path: path.clone(), content });
            }
            current.clear();
        };

        for section in sections {
            if section.content.len() > self.max_chunk_size {
                flush(&mut current, &mut current_path, &mut chunks);
                for piece in self.split_oversized(&section.content) {
                    chunks.push(Chunk {
                        index: chunks.len(),
                        header_path: section.header_path.clone(),
                        content: piece,
                    });
                }
                continue;
            }

            if current.is_empty() {
                current_path = section.header_path.clone();
            } else if current.len() + section.content.len() + 2 > self.max_chunk_size {
                flush(&mut current, &mut current_path, &mut chunks);
                current_path = section.header_path.clone();
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&section.content);
        }
        flush(&mut current, &mut current_path, &mut chunks);
        chunks
    }

    /// Split one oversized section at paragraph boundaries, carrying
    /// `overlap` trailing characters into each following piece
    fn split_oversized(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();

        for paragraph in text.split("\n\n") {
            // A single huge paragraph still has to split somewhere
            if paragraph.len() > self.max_chunk_size {
                if !current.trim().is_empty() {
                    pieces.push(current.trim().to_string());
                }
                current = String::new();
                let mut start = 0;
                let bytes: Vec<char> = paragraph.chars().collect();
                while start < bytes.len() {
                    let end = (start + self.max_chunk_size).min(bytes.len());
                    pieces.push(bytes[start..end].iter().collect());
                    if end == bytes.len() {
                        break;
                    }
                    start = end.saturating_sub(self.overlap);
                }
                continue;
            }

            if !current.is_empty() && current.len() + paragraph.len() + 2 > self.max_chunk_size {
                let finished = current.trim().to_string();
                // Seed the next piece with trailing context
                current = tail_chars(&finished, self.overlap);
                pieces.push(finished);
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }

        if !current.trim().is_empty() {
            pieces.push(current.trim().to_string());
        }
        pieces
    }
}

/// Last `n` characters of a string, on char boundaries
fn tail_chars(text: &str, n: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

/// Heading level of a markdown line, if it is one
fn heading_level(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    rest.strip_prefix(' ').map(|title| (hashes, title.trim()))
}

/// Breadcrumb of the first heading in a small document
fn first_heading_path(text: &str) -> Vec<String> {
    text.lines()
        .find_map(|line| heading_level(line).map(|(_, title)| vec![title.to_string()]))
        .unwrap_or_default()
}

/// Split markdown into heading-delimited sections with breadcrumbs
fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut current = String::new();
    let mut current_path: Vec<String> = Vec::new();

    for line in text.lines() {
        if let Some((level, title)) = heading_level(line) {
            if !current.trim().is_empty() {
                sections.push(Section {
                    header_path: current_path.clone(),
                    content: current.trim().to_string(),
                });
            }
            current = String::new();
            stack.retain(|(l, _)| *l < level);
            stack.push((level, title.to_string()));
            current_path = stack.iter().map(|(_, t)| t.clone()).collect();
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(Section {
            header_path: current_path,
            content: current.trim().to_string(),
        });
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_document_is_one_chunk() {
        let chunker = MarkdownChunker::new(1000, 100);
        let chunks = chunker.chunk("# Title\n\nShort content.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].header_path, vec!["Title"]);
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        let chunker = MarkdownChunker::new(1000, 100);
        assert!(chunker.chunk("   \n  ").is_empty());
    }

    #[test]
    fn test_breadcrumb_tracks_nesting() {
        let chunker = MarkdownChunker::new(40, 8);
        let text = "# Products\n\nIntro paragraph about the range.\n\n## Gearboxes\n\nPlanetary and helical units in all sizes.\n\n## Motors\n\nServo and stepper motors for automation.";
        let chunks = chunker.chunk(text);
        assert!(chunks.len() >= 2);

        let gearbox_chunk = chunks
            .iter()
            .find(|c| c.content.contains("Planetary"))
            .unwrap();
        assert_eq!(gearbox_chunk.header_path, vec!["Products", "Gearboxes"]);
        assert_eq!(gearbox_chunk.breadcrumb(), "Products > Gearboxes");

        let motor_chunk = chunks.iter().find(|c| c.content.contains("Servo")).unwrap();
        assert_eq!(motor_chunk.header_path, vec!["Products", "Motors"]);
    }

    #[test]
    fn test_sibling_heading_replaces_previous() {
        let sections = split_sections("# A\ntext\n## B\ntext\n## C\ntext");
        let paths: Vec<Vec<String>> = sections.into_iter().map(|s| s.header_path).collect();
        assert!(paths.contains(&vec!["A".to_string(), "B".to_string()]));
        assert!(paths.contains(&vec!["A".to_string(), "C".to_string()]));
        // C replaced B, never nested under it
        assert!(!paths.iter().any(|p| p.contains(&"B".to_string()) && p.contains(&"C".to_string())));
    }

    #[test]
    fn test_chunk_indices_are_sequential() {
        let chunker = MarkdownChunker::new(30, 5);
        let text = "# A\n\nfirst paragraph here\n\nsecond paragraph here\n\nthird paragraph here";
        let chunks = chunker.chunk(text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn test_oversized_paragraph_is_split_with_overlap() {
        let chunker = MarkdownChunker::new(50, 10);
        let text = format!("# A\n\n{}", "x".repeat(200));
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.len() <= 60);
        }
    }

    #[test]
    fn test_no_headings_still_chunks() {
        let chunker = MarkdownChunker::new(30, 5);
        let text = "plain text paragraph\n\nanother paragraph\n\na third one";
        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.header_path.is_empty()));
    }
}
