//! Grounding context assembly.

use super::ChatTurn;
use crate::index::ScoredChunk;

/// Context used when retrieval finds nothing.
pub const NO_CONTEXT_MARKER: &str = "No relevant context found in this video's transcript.";

/// Render retrieved chunks in transcript order, one `[MM:SS - MM:SS] text` line each.
pub fn format_context(results: &[ScoredChunk]) -> String {
    if results.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }

    let mut ordered: Vec<&ScoredChunk> = results.iter().collect();
    ordered.sort_by_key(|r| r.chunk.id);

    ordered
        .iter()
        .map(|r| format!("[{}] {}", r.chunk.time_range(), r.chunk.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The last `max_turns` turns, oldest first.
pub fn recent_history(history: &[ChatTurn], max_turns: usize) -> &[ChatTurn] {
    &history[history.len().saturating_sub(max_turns)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunk;

    fn scored(id: usize, start: f64, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id,
                text: text.to_string(),
                start,
                end: start + 30.0,
                first_segment: id,
                last_segment: id,
            },
            score,
        }
    }

    #[test]
    fn test_context_is_in_transcript_order() {
        let results = vec![
            scored(4, 125.0, "later point", 0.9),
            scored(1, 5.0, "early point", 0.4),
        ];

        assert_eq!(
            format_context(&results),
            "[00:05 - 00:35] early point\n[02:05 - 02:35] later point"
        );
    }

    #[test]
    fn test_empty_context_marker() {
        assert_eq!(format_context(&[]), NO_CONTEXT_MARKER);
    }

    #[test]
    fn test_recent_history() {
        let turns: Vec<ChatTurn> = (0..5)
            .map(|i| ChatTurn::new(format!("q{i}"), format!("a{i}"), i))
            .collect();

        let recent = recent_history(&turns, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question, "q3");
        assert_eq!(recent_history(&turns, 10).len(), 5);
        assert!(recent_history(&turns, 0).is_empty());
    }
}
