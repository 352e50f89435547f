// src/services/prompt_builder.rs
use crate::models::{
    Background, CustomizationOptions, Industry, Mood, RawCustomizationOptions, Style, UseCase,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptQuality {
    Standard,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptContext {
    pub quality: PromptQuality,
    pub preserve_identity: bool,
}

impl std::str::FromStr for PromptQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(PromptQuality::Standard),
            "high" => Ok(PromptQuality::High),
            other => Err(format!("unknown prompt quality '{}'", other)),
        }
    }
}

impl PromptContext {
    pub fn with_quality(quality: PromptQuality) -> Self {
        Self {
            quality,
            ..Self::default()
        }
    }
}

impl Default for PromptContext {
    fn default() -> Self {
        Self {
            quality: PromptQuality::High,
            preserve_identity: true,
        }
    }
}

/// Four renderings of the same request, from terse to fully structured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptVariants {
    pub basic: String,
    pub detailed: String,
    pub technical: String,
    pub creative: String,
}

struct StyleDescriptor {
    attire: &'static str,
    expression: &'static str,
    posture: &'static str,
}

struct BackgroundDescriptor {
    setting: &'static str,
    lighting: &'static str,
    atmosphere: &'static str,
}

fn style_descriptor(style: Style) -> StyleDescriptor {
    match style {
        Style::Professional => StyleDescriptor {
            attire: "a well-fitted business suit or blazer with a crisp collared shirt",
            expression: "a confident, approachable smile",
            posture: "upright shoulders squared to the camera",
        },
        Style::Casual => StyleDescriptor {
            attire: "smart-casual clothing such as a neat sweater or open-collar shirt",
            expression: "a relaxed, genuine smile",
            posture: "a natural, slightly angled stance",
        },
        Style::Executive => StyleDescriptor {
            attire: "a tailored dark suit with a tie or an elegant formal outfit",
            expression: "a composed, authoritative expression",
            posture: "a commanding posture with a slight chin lift",
        },
        Style::Creative => StyleDescriptor {
            attire: "modern, stylish clothing with a distinctive personal touch",
            expression: "an expressive, engaging look",
            posture: "a dynamic, open pose",
        },
    }
}

fn background_descriptor(background: Background) -> BackgroundDescriptor {
    match background {
        Background::Office => BackgroundDescriptor {
            setting: "a modern office interior softly blurred behind the subject",
            lighting: "soft natural window light with gentle fill",
            atmosphere: "professional and productive",
        },
        Background::Studio => BackgroundDescriptor {
            setting: "a seamless neutral studio backdrop in soft gray",
            lighting: "classic three-point studio lighting",
            atmosphere: "clean and polished",
        },
        Background::Outdoor => BackgroundDescriptor {
            setting: "an outdoor urban or park setting with pleasant bokeh",
            lighting: "warm golden-hour daylight",
            atmosphere: "fresh and approachable",
        },
        Background::Conference => BackgroundDescriptor {
            setting: "an elegant conference room with subtle architectural detail",
            lighting: "balanced overhead lighting with soft key light",
            atmosphere: "corporate and trustworthy",
        },
    }
}

fn industry_phrase(industry: Industry) -> &'static str {
    match industry {
        Industry::Technology => "suited to a forward-thinking technology professional",
        Industry::Finance => "conveying the trustworthiness expected in finance",
        Industry::Healthcare => "conveying the warmth and competence of a healthcare professional",
        Industry::Legal => "projecting the credibility expected of a legal professional",
        Industry::Consulting => "reflecting the sharp, polished presence of a consultant",
        Industry::Education => "reflecting the approachable authority of an educator",
        Industry::Creative => "showing the individuality of a creative professional",
        Industry::RealEstate => "projecting the friendly reliability of a real estate agent",
        Industry::General => "appropriate for any professional context",
    }
}

fn mood_phrase(mood: Mood) -> &'static str {
    match mood {
        Mood::Confident => "self-assured and confident",
        Mood::Approachable => "warm and approachable",
        Mood::Authoritative => "authoritative and decisive",
        Mood::Friendly => "friendly and open",
    }
}

pub fn use_case_suffix(use_case: UseCase) -> &'static str {
    match use_case {
        UseCase::Linkedin => {
            "Optimize for a LinkedIn profile photo: tight head-and-shoulders crop, face centered, reads well as a small circular thumbnail."
        }
        UseCase::BusinessCard => {
            "Optimize for a printed business card: clean background, high contrast, sharp detail at small print sizes."
        }
        UseCase::Website => {
            "Optimize for a company website team page: consistent framing with room around the subject for layout."
        }
        UseCase::Resume => {
            "Optimize for a resume photo: conservative framing, neutral expression, formal presentation."
        }
        UseCase::SocialMedia => {
            "Optimize for social media profiles: vibrant but natural color, engaging expression, square-friendly crop."
        }
    }
}

/// Checks every field and reports all offending ones at once.
pub fn validate_context(raw: &RawCustomizationOptions) -> Result<CustomizationOptions, Vec<String>> {
    let mut errors = Vec::new();

    let background = match raw.background.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push("background is required".to_string());
            None
        }
        Some(value) => value
            .parse::<Background>()
            .map_err(|_| errors.push(format!("background: unknown value '{}'", value)))
            .ok(),
    };

    let style = match raw.style.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push("style is required".to_string());
            None
        }
        Some(value) => value
            .parse::<Style>()
            .map_err(|_| errors.push(format!("style: unknown value '{}'", value)))
            .ok(),
    };

    let industry = match raw.industry.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => value
            .parse::<Industry>()
            .map_err(|_| errors.push(format!("industry: unknown value '{}'", value)))
            .ok(),
    };

    let mood = match raw.mood.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => value
            .parse::<Mood>()
            .map_err(|_| errors.push(format!("mood: unknown value '{}'", value)))
            .ok(),
    };

    match (background, style) {
        (Some(background), Some(style)) if errors.is_empty() => Ok(CustomizationOptions {
            background,
            style,
            industry,
            mood,
            additional_requirements: raw
                .additional_requirements
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }),
        _ => Err(errors),
    }
}

pub fn build_prompt(options: &CustomizationOptions, context: &PromptContext) -> PromptVariants {
    let style = style_descriptor(options.style);
    let background = background_descriptor(options.background);
    let industry = industry_phrase(options.industry_or_default());
    let mood = mood_phrase(options.mood_or_default());

    let identity = if context.preserve_identity {
        "Preserve the person's facial features, skin tone, hair and identity exactly; do not alter who they are."
    } else {
        "Keep the person recognizable."
    };

    let finish = match context.quality {
        PromptQuality::High => "high resolution, photorealistic, studio-grade retouching",
        PromptQuality::Standard => "standard resolution, photorealistic, light retouching",
    };

    let extra = options
        .additional_requirements
        .as_deref()
        .map(|req| format!("\nAdditional requirements: {}", req))
        .unwrap_or_default();

    let basic = format!(
        "Transform this photo into a {} professional headshot with {}.",
        style_name(options.style),
        background.setting
    );

    let detailed = format!(
        "Create a professional headshot portrait from the provided photo.\n\
         Subject: wearing {}, with {}, {}.\n\
         Mood: {}, {}.\n\
         Setting: {}.\n\
         Lighting: {}; overall atmosphere {}.\n\
         Framing: head and shoulders, subject centered, eyes in sharp focus.\n\
         Finish: {}.\n\
         {}{}",
        style.attire,
        style.expression,
        style.posture,
        mood,
        industry,
        background.setting,
        background.lighting,
        background.atmosphere,
        finish,
        identity,
        extra
    );

    let technical_specs = match context.quality {
        PromptQuality::High => {
            "Output: photorealistic, high resolution, 85mm portrait lens look, f/2.8 shallow depth of field, accurate skin texture, no artifacts."
        }
        PromptQuality::Standard => {
            "Output: photorealistic, standard resolution, natural depth of field, clean skin rendering."
        }
    };

    let technical = format!(
        "{}\nTechnical: {}\nColor: neutral white balance, natural skin tones, subtle contrast.",
        detailed, technical_specs
    );

    let creative = format!(
        "Imagine this person stepping into {} under {}. They wear {} and look {}, {}. \
         Capture them as a portrait photographer would for their finest professional profile. {}{}",
        background.setting,
        background.lighting,
        style.attire,
        mood,
        industry,
        identity,
        extra
    );

    PromptVariants {
        basic,
        detailed,
        technical,
        creative,
    }
}

/// Detailed prompt with the use-case phrase appended.
pub fn build_prompt_for_use_case(
    options: &CustomizationOptions,
    context: &PromptContext,
    use_case: Option<UseCase>,
) -> String {
    let detailed = build_prompt(options, context).detailed;
    match use_case {
        Some(use_case) => format!("{}\n{}", detailed, use_case_suffix(use_case)),
        None => detailed,
    }
}

fn style_name(style: Style) -> &'static str {
    match style {
        Style::Professional => "polished",
        Style::Casual => "relaxed",
        Style::Executive => "executive",
        Style::Creative => "creative",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(background: &str, style: &str) -> RawCustomizationOptions {
        RawCustomizationOptions {
            background: Some(background.to_string()),
            style: Some(style.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn build_prompt_is_deterministic() {
        let options = CustomizationOptions {
            industry: Some(Industry::Finance),
            mood: Some(Mood::Friendly),
            additional_requirements: Some("navy tie".to_string()),
            ..CustomizationOptions::new(Background::Conference, Style::Executive)
        };
        let context = PromptContext::default();

        assert_eq!(build_prompt(&options, &context), build_prompt(&options, &context));
    }

    #[test]
    fn unset_industry_and_mood_use_defaults() {
        let options = CustomizationOptions::new(Background::Office, Style::Professional);
        let prompts = build_prompt(&options, &PromptContext::default());

        assert!(prompts.detailed.contains(industry_phrase(Industry::General)));
        assert!(prompts.detailed.contains(mood_phrase(Mood::Confident)));
    }

    #[test]
    fn variants_grow_in_specificity() {
        let options = CustomizationOptions::new(Background::Studio, Style::Casual);
        let prompts = build_prompt(&options, &PromptContext::default());

        assert!(prompts.basic.len() < prompts.detailed.len());
        assert!(prompts.technical.starts_with(&prompts.detailed));
        assert!(prompts.technical.contains("Technical:"));
    }

    #[test]
    fn quality_shapes_detailed_and_technical_prompts() {
        let options = CustomizationOptions::new(Background::Studio, Style::Professional);
        let high = build_prompt(&options, &PromptContext::default());
        let standard = build_prompt(&options, &PromptContext::with_quality("Standard".parse().unwrap()));

        assert_ne!(high.detailed, standard.detailed);
        assert!(standard.detailed.contains("standard resolution"));
        assert!(high.technical.contains("high resolution"));
        assert!(standard.technical.contains("standard resolution"));
        assert!("ultra".parse::<PromptQuality>().is_err());
    }

    #[test]
    fn use_case_appends_to_detailed_prompt() {
        let options = CustomizationOptions::new(Background::Outdoor, Style::Creative);
        let context = PromptContext::default();
        let detailed = build_prompt(&options, &context).detailed;
        let linkedin = build_prompt_for_use_case(&options, &context, Some(UseCase::Linkedin));

        assert!(linkedin.starts_with(&detailed));
        assert!(linkedin.ends_with(use_case_suffix(UseCase::Linkedin)));
        assert_eq!(build_prompt_for_use_case(&options, &context, None), detailed);
    }

    #[test]
    fn validate_context_accepts_known_values() {
        let mut input = raw("office", "professional");
        input.industry = Some("real-estate".to_string());
        let options = validate_context(&input).unwrap();

        assert_eq!(options.background, Background::Office);
        assert_eq!(options.industry, Some(Industry::RealEstate));
        assert_eq!(options.mood, None);
    }

    #[test]
    fn validate_context_reports_every_bad_field() {
        let input = RawCustomizationOptions {
            background: Some("beach".to_string()),
            style: None,
            industry: Some("mining".to_string()),
            mood: Some("grumpy".to_string()),
            additional_requirements: None,
        };
        let errors = validate_context(&input).unwrap_err();

        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.starts_with("background")));
        assert!(errors.iter().any(|e| e.starts_with("style")));
        assert!(errors.iter().any(|e| e.starts_with("industry")));
        assert!(errors.iter().any(|e| e.starts_with("mood")));
    }
}
