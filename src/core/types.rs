// Core data model for the appraisal lot workflow

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// Grouping strategy for one segment of the image array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubMode {
    SingleLot,
    PerItem,
    PerPhoto,
    Catalogue,
    Mixed,
}

impl SubMode {
    /// Wire value accepted by the AI analysis collaborator.
    /// Mixed segments are analyzed as catalogues (nested items).
    pub fn analysis_kind(&self) -> &'static str {
        match self {
            SubMode::SingleLot => "single_lot",
            SubMode::PerItem => "per_item",
            SubMode::PerPhoto => "per_photo",
            SubMode::Catalogue | SubMode::Mixed => "catalogue",
        }
    }

    /// Filename prefix used by the rename planner
    pub fn file_prefix(&self) -> &'static str {
        match self {
            SubMode::SingleLot => "single",
            SubMode::PerItem => "peritem",
            SubMode::PerPhoto => "perphoto",
            SubMode::Catalogue => "catalogue",
            SubMode::Mixed => "mixed",
        }
    }

    /// Per-item lots carry at most one image
    pub fn single_image(&self) -> bool {
        matches!(self, SubMode::PerItem)
    }

    /// Catalogue-class segments get the larger analysis cap and early numbering
    pub fn is_catalogue_like(&self) -> bool {
        matches!(self, SubMode::Catalogue | SubMode::Mixed)
    }
}

/// One grouping declaration from the submission config
#[derive(Debug, Clone, Deserialize)]
pub struct GroupingDeclaration {
    pub sub_mode: SubMode,
    /// Requested main image count
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub extra_count: usize,
    /// Cover position within the main range
    #[serde(default)]
    pub cover_index: usize,
}

/// Request configuration for one appraisal job
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Caller-supplied job id; generated when absent
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub declarations: Vec<GroupingDeclaration>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            job_id: None,
            declarations: Vec::new(),
            locale: default_locale(),
            currency: default_currency(),
        }
    }
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Raw uploaded image awaiting ingest into object storage
#[derive(Clone)]
pub struct UploadedImage {
    pub index: usize,
    pub original_name: String,
    pub bytes: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

/// Canonical image array entry: position i always means "the image
/// originally uploaded at i", even after renaming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub name: String,
}

/// Contiguous range of the image array assigned to one grouping declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub base_offset: usize,
    pub main_count: usize,
    pub extra_count: usize,
    /// Global index of the cover image, resolved within the main range
    pub cover_index: usize,
    pub sub_mode: SubMode,
}

impl Segment {
    pub fn main_range(&self) -> Range<usize> {
        self.base_offset..self.base_offset + self.main_count
    }

    pub fn extra_range(&self) -> Range<usize> {
        let start = self.base_offset + self.main_count;
        start..start + self.extra_count
    }

    pub fn total(&self) -> usize {
        self.main_count + self.extra_count
    }
}

/// Lot as returned by the AI analysis collaborator. Indices are local to the
/// sub-list the collaborator was shown; `lot_number` may be a sticker string
/// or a bare number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzedLot {
    #[serde(default)]
    pub lot_number: Option<serde_json::Value>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub estimated_value: String,
    #[serde(default)]
    pub image_indexes: Vec<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub items: Vec<AnalyzedItem>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Nested catalogue item from the AI analysis collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzedItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub estimated_value: String,
    #[serde(default)]
    pub image_index: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Analysis output for one segment, still carrying AI-local indices
#[derive(Debug, Clone)]
pub struct SegmentLots {
    pub segment: Segment,
    /// Maps AI-local index -> global image index (the truncated sub-list)
    pub local_to_global: Vec<usize>,
    pub lots: Vec<AnalyzedLot>,
}

/// A fully resolved appraisal lot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub lot_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<u64>,
    pub title: String,
    pub description: String,
    pub condition: String,
    pub estimated_value: String,
    pub image_indexes: Vec<usize>,
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_image_indexes: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_image_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<LotItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_mode: Option<SubMode>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Lot {
    /// Blank lot with a fresh id; the remapper fills the rest in
    pub fn with_id() -> Self {
        Self {
            lot_id: uuid::Uuid::new_v4().to_string(),
            lot_number: None,
            title: String::new(),
            description: String::new(),
            condition: String::new(),
            estimated_value: String::new(),
            image_indexes: Vec::new(),
            image_urls: Vec::new(),
            extra_image_indexes: Vec::new(),
            extra_image_urls: Vec::new(),
            cover_url: None,
            items: Vec::new(),
            sub_mode: None,
            tags: Vec::new(),
        }
    }
}

/// Nested item within a catalogue/mixed lot. Same single-image constraint as
/// a per-item lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotItem {
    pub title: String,
    pub description: String,
    pub condition: String,
    pub estimated_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Request for one AI analysis call
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub image_urls: Vec<String>,
    pub sub_mode: &'static str,
    pub locale: String,
    pub currency: String,
}

/// Group of per-item lots judged to depict the same physical item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupGroup {
    pub lot_ids: Vec<String>,
}

/// Structured attributes from the VIN decode collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VinAttributes {
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub trim: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub body_style: Option<String>,
}

/// Final job output: ordered, numbered, image-annotated lot list
#[derive(Debug, Clone, Serialize)]
pub struct AppraisalReport {
    pub job_id: String,
    /// Replacement image array, same length and positions as the upload order
    pub images: Vec<ImageRef>,
    pub lots: Vec<Lot>,
    pub total_images: usize,
    pub total_lots: usize,
    pub locale: String,
    pub currency: String,
    pub processing_time_ms: f64,
}
