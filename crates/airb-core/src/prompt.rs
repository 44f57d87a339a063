use crate::media::DecodedImage;

pub const GUIDE_PREFIX: &str = "tell them, ";

pub const FIXED_INSTRUCTION: &str = "Rewrite this message using Dale Carnegie’s principles from \
How to Win Friends and Influence People. Use a warm, customer service–oriented tone. \
Be concise, helpful, and friendly. Only provide one polished version of the message—no \
explanations, no options. don't put it in quotation marks";

/// One piece of a multi-part request
#[derive(Debug, Clone)]
pub enum PromptPart {
    Image(DecodedImage),
    Text(String),
}

/// Image plus instruction text, built fresh for every send
#[derive(Debug, Clone)]
pub struct GeneratedPrompt {
    pub parts: Vec<PromptPart>,
}

impl GeneratedPrompt {
    pub fn text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            PromptPart::Text(text) => Some(text.as_str()),
            PromptPart::Image(_) => None,
        })
    }

    pub fn image(&self) -> Option<&DecodedImage> {
        self.parts.iter().find_map(|part| match part {
            PromptPart::Image(image) => Some(image),
            PromptPart::Text(_) => None,
        })
    }
}

/// Combine the user's guide text with the fixed instruction and the image.
///
/// The guide is passed through verbatim, including when empty.
pub fn build(guide_text: &str, image: DecodedImage) -> GeneratedPrompt {
    let text = format!("{}{}\n\n{}", GUIDE_PREFIX, guide_text, FIXED_INSTRUCTION);
    GeneratedPrompt {
        parts: vec![PromptPart::Image(image), PromptPart::Text(text)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn sample_image() -> DecodedImage {
        DecodedImage {
            pixels: DynamicImage::new_rgb8(3, 2),
            format: None,
        }
    }

    fn count_parts(prompt: &GeneratedPrompt) -> (usize, usize) {
        prompt.parts.iter().fold((0, 0), |(img, txt), part| match part {
            PromptPart::Image(_) => (img + 1, txt),
            PromptPart::Text(_) => (img, txt + 1),
        })
    }

    #[test]
    fn test_exactly_one_image_and_one_text() {
        for guide in ["", "I need the invoice", "multi\nline\n", "  spaced  "] {
            let prompt = build(guide, sample_image());
            assert_eq!(count_parts(&prompt), (1, 1));
            assert!(prompt.text().unwrap().starts_with(GUIDE_PREFIX));
        }
    }

    #[test]
    fn test_text_layout() {
        let prompt = build("I need the invoice", sample_image());
        let expected = format!("tell them, I need the invoice\n\n{}", FIXED_INSTRUCTION);
        assert_eq!(prompt.text(), Some(expected.as_str()));
    }

    #[test]
    fn test_empty_guide_passes_through() {
        let prompt = build("", sample_image());
        assert_eq!(
            prompt.text().unwrap(),
            format!("tell them, \n\n{}", FIXED_INSTRUCTION)
        );
    }

    #[test]
    fn test_image_comes_first() {
        let prompt = build("hi", sample_image());
        assert!(matches!(prompt.parts[0], PromptPart::Image(_)));
        assert_eq!(prompt.image().map(|i| i.width()), Some(3));
    }
}
