//! Prompts for menu structuring and vision OCR.
//!
//! The structuring prompt is a fixed instruction block followed by the
//! extracted text under [`TEXT_MARKER`]. Only the appended text varies between
//! calls, so for a given brand list the prompt is byte-for-byte reproducible
//! and can be asserted in tests.
//!
//! Callers can replace the instruction block via
//! [`crate::config::PipelineConfig::instructions`]; the marker and the text
//! are always appended the same way.

use crate::config::BrandList;

/// Delimits the instruction block from the menu text.
pub const TEXT_MARKER: &str = "**TEXT**:";

const TASK: &str = r#"The input text, given after the **TEXT** marker, comes from a drinks or food menu. Extract and structure the following as JSON:
- A short summary of the menu (is it a beer list, a wine list, a cocktail menu, etc.? What are the key elements of the design?)
- An array of products, each with:
    - name
    - description (if available)
    - price (if available, keep the currency symbol)
    - brand (only if it is one of the recognised brands below)
- The branded share of the menu as percentages, for example Bacardi 40, 10000 hours 20, unbranded 40. Percentages are numbers and should add up to 100.

Recognised brand list:"#;

const RULES: &str = r#"If part of the text is nonsensical, ignore that part.

Use exactly these top-level keys: "menu_summary", "products", "brand_percentages". Omit optional product fields that are not available instead of inventing them.

Here is an example of the exact output shape:"#;

/// The worked example embedded in every prompt.
pub const EXAMPLE_OUTPUT: &str = r#"{
    "menu_summary": "Beer menu with floral design",
    "products": [
        {
            "name": "Sierra Nevada Pale Ale",
            "description": "A crisp pale ale.",
            "price": "$13",
            "brand": "Sierra Nevada"
        },
        {
            "name": "House Draught Stout",
            "price": "$10"
        }
    ],
    "brand_percentages": {
        "Sierra Nevada": 20,
        "unbranded": 80
    }
}"#;

/// Render the built-in instruction block for `brands`.
pub fn instruction_block(brands: &BrandList) -> String {
    let brand_lines = brands
        .iter()
        .map(|b| format!("    - {b}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{TASK}\n{brand_lines}\n\n{RULES}\n\n{EXAMPLE_OUTPUT}")
}

/// Append `text` to `instructions` under the text marker.
pub fn format_prompt(instructions: &str, text: &str) -> String {
    format!("{instructions}\n\n{TEXT_MARKER}\n{text}\n")
}

/// System message asking a chat model for bare JSON.
///
/// Used for providers without a native JSON response mode.
pub const JSON_ONLY_SYSTEM_PROMPT: &str = "You are a precise data extraction engine. \
Respond with a single valid JSON object and nothing else: no Markdown fences, no commentary.";

/// System prompt for the vision OCR backend.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe ALL text visible in the page image exactly as printed.

- Keep the reading order a human would use (columns left to right, top to bottom)
- Put each menu line on its own line
- Keep prices and currency symbols exactly as printed
- Do NOT describe images, decorations or layout
- Do NOT add commentary, headings or Markdown
- If the page has no text, output nothing"#;
