// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Background {
    Office,
    Studio,
    Outdoor,
    Conference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    Professional,
    Casual,
    Executive,
    Creative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Industry {
    Technology,
    Finance,
    Healthcare,
    Legal,
    Consulting,
    Education,
    Creative,
    RealEstate,
    #[default]
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mood {
    #[default]
    Confident,
    Approachable,
    Authoritative,
    Friendly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UseCase {
    Linkedin,
    BusinessCard,
    Website,
    Resume,
    SocialMedia,
}

/// Validated customization choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationOptions {
    pub background: Background,
    pub style: Style,
    #[serde(default)]
    pub industry: Option<Industry>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub additional_requirements: Option<String>,
}

impl CustomizationOptions {
    pub fn new(background: Background, style: Style) -> Self {
        Self {
            background,
            style,
            industry: None,
            mood: None,
            additional_requirements: None,
        }
    }

    pub fn industry_or_default(&self) -> Industry {
        self.industry.unwrap_or_default()
    }

    pub fn mood_or_default(&self) -> Mood {
        self.mood.unwrap_or_default()
    }
}

/// Options as they arrive on the wire, before enum validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCustomizationOptions {
    pub background: Option<String>,
    pub style: Option<String>,
    pub industry: Option<String>,
    pub mood: Option<String>,
    pub additional_requirements: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Preview,
    Full,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Preview => "preview",
            SizeClass::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn shorter_side(&self) -> u32 {
        self.width.min(self.height)
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

/// Uploaded source image as sent by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub base64_data: Option<String>,
}

/// Source image after server-side decoding.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    /// Client-supplied base64 payload, reused instead of re-encoding when present.
    pub base64: Option<String>,
    pub mime_type: String,
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: SourceImage,
    pub options: CustomizationOptions,
    pub size_class: SizeClass,
    pub use_case: Option<UseCase>,
    pub prompt_override: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub success: bool,
    /// Base64-encoded image payload.
    pub image_data: Option<String>,
    pub error: Option<String>,
    pub cost: f64,
    pub duration_ms: u64,
    pub model: String,
}

impl GenerationResult {
    pub fn failed(error: impl Into<String>, model: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            image_data: None,
            error: Some(error.into()),
            cost: 0.0,
            duration_ms,
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub id: Uuid,
    pub model: String,
    pub generation_time: u64,
    pub cost: f64,
    pub size: SizeClass,
    pub quality: QualityTier,
    pub dimensions: Option<Dimensions>,
    pub format: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProcessedResponse {
    pub image_data: String,
    /// Decoded pixels, kept so watermarking does not decode again.
    pub image: image::DynamicImage,
    pub metadata: ResponseMetadata,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeliverableImage {
    pub image_data: String,
    pub mime_type: String,
    pub watermarked: bool,
    pub metadata: ResponseMetadata,
    pub warnings: Vec<String>,
}

impl DeliverableImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.image_data)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePreviewBody {
    pub image: Option<ImageUpload>,
    pub options: Option<RawCustomizationOptions>,
    pub use_case: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFullBody {
    pub image: Option<ImageUpload>,
    pub options: Option<RawCustomizationOptions>,
    pub use_case: Option<String>,
    pub prompt: Option<String>,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMetadata {
    pub id: Uuid,
    pub generation_time: u64,
    pub cost: f64,
    pub dimensions: Option<Dimensions>,
    pub quality: QualityTier,
    pub watermarked: bool,
    pub model: String,
    pub format: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&DeliverableImage> for DeliveryMetadata {
    fn from(image: &DeliverableImage) -> Self {
        Self {
            id: image.metadata.id,
            generation_time: image.metadata.generation_time,
            cost: image.metadata.cost,
            dimensions: image.metadata.dimensions,
            quality: image.metadata.quality,
            watermarked: image.watermarked,
            model: image.metadata.model.clone(),
            format: image.metadata.format.clone(),
            timestamp: image.metadata.timestamp,
        }
    }
}

impl std::str::FromStr for UseCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_kebab(s)
    }
}

impl std::str::FromStr for Background {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_kebab(s)
    }
}

impl std::str::FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_kebab(s)
    }
}

impl std::str::FromStr for Industry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_kebab(s)
    }
}

impl std::str::FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_kebab(s)
    }
}

// Reuses the serde renames so wire names and parse names cannot drift apart.
fn parse_kebab<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase()))
        .map_err(|_| s.to_string())
}
