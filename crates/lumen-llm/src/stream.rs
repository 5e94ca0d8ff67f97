/// Events emitted during LLM streaming response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },

    /// Stream completed successfully.
    Done {
        model: String,
        tokens_in: u32,
        tokens_out: u32,
    },

    /// Error during streaming.
    Error { message: String },
}

/// Parse a single SSE line from an OpenAI-compatible streaming API.
/// SSE format: `event: <type>\ndata: <json>\n\n`
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_line() {
        match parse_sse_line("data: {\"x\":1}") {
            Some(SseParsed::Data(d)) => assert_eq!(d, "{\"x\":1}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_event_line() {
        match parse_sse_line("event: message_stop") {
            Some(SseParsed::Event(e)) => assert_eq!(e, "message_stop"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ignores_comment_line() {
        assert!(parse_sse_line(": keep-alive").is_none());
    }
}
