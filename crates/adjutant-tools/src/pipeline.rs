//! Tool-result pipeline.
//!
//! Applied to every tool return value before it reaches the model:
//! first text truncation, then image normalization. The pipeline
//! guarantees no tool can push content past the model endpoint's size
//! rules, so tool authors never defend in-toolkit.

use tracing::warn;

use adjutant_protocols::{ContentBlock, ToolResult};

/// Cap on a single text block.
pub const MAX_RESULT_CHARS: usize = 50_000;

const TRUNCATION_PREFIX: &str = "\n\n[truncated: showing first ";
const TRUNCATION_SUFFIX: &str = " chars omitted]";

/// Truncate one text payload. Idempotent: an already-truncated payload
/// is returned unchanged.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    // Already carries a truncation note from an earlier pass.
    if text.ends_with(TRUNCATION_SUFFIX) && text.contains(TRUNCATION_PREFIX) {
        return text.to_string();
    }

    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}{}{} of {} chars; {}{}",
        &text[..end],
        TRUNCATION_PREFIX,
        end,
        text.len(),
        text.len() - end,
        TRUNCATION_SUFFIX,
    )
}

/// Run the full pipeline over a tool result.
pub fn apply_pipeline(result: ToolResult) -> ToolResult {
    let content = result
        .content
        .into_iter()
        .map(process_block)
        .collect();
    ToolResult { content }
}

fn process_block(block: ContentBlock) -> ContentBlock {
    match block {
        ContentBlock::Text { text } => ContentBlock::Text {
            text: truncate_text(&text, MAX_RESULT_CHARS),
        },
        ContentBlock::Image { data, mime_type } => normalize_image_block(data, mime_type),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ContentBlock::ToolResult {
            tool_use_id,
            content: content.into_iter().map(process_block).collect(),
            is_error,
        },
        other => other,
    }
}

fn normalize_image_block(data: String, mime_type: String) -> ContentBlock {
    match adjutant_media::normalize_base64(&data) {
        Ok(normalized) => {
            if !normalized.within_limits {
                warn!(
                    bytes = normalized.bytes.len(),
                    "tool image still over the byte limit after reduction"
                );
            }
            ContentBlock::Image {
                data: normalized.to_base64(),
                mime_type: normalized.mime_type,
            }
        }
        Err(e) => {
            warn!("dropping undecodable tool image: {}", e);
            ContentBlock::Text {
                text: format!(
                    "[an image ({}) was omitted from this result: {}]",
                    mime_type, e
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_text("hello", 100), "hello");
    }

    #[test]
    fn long_text_is_truncated_with_note() {
        let long = "x".repeat(60_000);
        let truncated = truncate_text(&long, MAX_RESULT_CHARS);
        assert!(truncated.len() < long.len());
        assert!(truncated.contains("of 60000 chars"));
        assert!(truncated.contains("10000 chars omitted"));
    }

    #[test]
    fn truncation_is_idempotent() {
        let long = "y".repeat(120_000);
        let once = truncate_text(&long, MAX_RESULT_CHARS);
        let twice = truncate_text(&once, MAX_RESULT_CHARS);
        assert_eq!(once, twice);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "ß".repeat(40_000); // 2 bytes each
        let truncated = truncate_text(&long, 50_001);
        assert!(truncated.is_char_boundary(50_000));
    }

    #[test]
    fn pipeline_truncates_nested_result_blocks() {
        let result = ToolResult::blocks(vec![ContentBlock::tool_result(
            "call_1",
            vec![ContentBlock::text("z".repeat(60_000))],
        )]);
        let processed = apply_pipeline(result);
        match &processed.content[0] {
            ContentBlock::ToolResult { content, .. } => match &content[0] {
                ContentBlock::Text { text } => assert!(text.contains("chars omitted")),
                other => panic!("unexpected block: {:?}", other),
            },
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn oversized_image_is_normalized() {
        let img = image::RgbImage::from_pixel(3000, 1200, image::Rgb([120, 10, 200]));
        let mut raw = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut raw, image::ImageFormat::Png)
            .unwrap();

        let result = ToolResult::blocks(vec![ContentBlock::image(
            B64.encode(raw.into_inner()),
            "image/png",
        )]);
        let processed = apply_pipeline(result);
        match &processed.content[0] {
            ContentBlock::Image { data, mime_type } => {
                assert_eq!(mime_type, "image/jpeg");
                let bytes = B64.decode(data).unwrap();
                assert!(bytes.len() <= adjutant_media::MAX_BYTES);
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn undecodable_image_becomes_explanatory_text() {
        let result = ToolResult::blocks(vec![ContentBlock::image(
            B64.encode(b"garbage"),
            "image/png",
        )]);
        let processed = apply_pipeline(result);
        match &processed.content[0] {
            ContentBlock::Text { text } => assert!(text.contains("omitted")),
            other => panic!("unexpected block: {:?}", other),
        }
    }
}
