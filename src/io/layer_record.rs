use anyhow::Result;

/// Section divider type stored in `lsct`/`lsdk` blocks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionDivider {
    Other,
    OpenFolder,
    ClosedFolder,
    BoundingDivider,
}

impl SectionDivider {
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => SectionDivider::OpenFolder,
            2 => SectionDivider::ClosedFolder,
            3 => SectionDivider::BoundingDivider,
            _ => SectionDivider::Other,
        }
    }
}

/// One tagged block from a layer record's additional information area
#[derive(Clone, Debug, PartialEq)]
pub enum AdditionalInfo {
    SectionDivider(SectionDivider),
    UnicodeName(String),
    LayerId(u32),
    Unknown([u8; 4]),
}

/// Location of one channel's compressed bytes inside the document
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelInfo {
    pub id: i16,
    pub offset: usize,
    pub length: usize,
}

/// Canvas dimensions from the document header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A single entry of the document's flat layer list
#[derive(Clone, Debug, PartialEq)]
pub struct LayerRecord {
    /// Position in the stored (file) order
    pub position: usize,
    pub name: String,
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
    pub channels: Vec<ChannelInfo>,
    pub additional: Vec<AdditionalInfo>,
}

impl LayerRecord {
    pub fn width(&self) -> u32 {
        (self.right as i64 - self.left as i64).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom as i64 - self.top as i64).max(0) as u32
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    /// First section divider block, if any
    pub fn section_divider(&self) -> Option<SectionDivider> {
        self.additional.iter().find_map(|info| match info {
            AdditionalInfo::SectionDivider(kind) => Some(*kind),
            _ => None,
        })
    }

    /// First Unicode name block, if any
    pub fn unicode_name(&self) -> Option<&str> {
        self.additional.iter().find_map(|info| match info {
            AdditionalInfo::UnicodeName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn layer_id(&self) -> Option<u32> {
        self.additional.iter().find_map(|info| match info {
            AdditionalInfo::LayerId(id) => Some(*id),
            _ => None,
        })
    }

    /// Unicode name when present, legacy Pascal name otherwise
    pub fn display_name(&self) -> &str {
        self.unicode_name().unwrap_or(&self.name)
    }
}

/// A decoded layered document whose pixels are read on demand
pub trait LayerDocument {
    fn canvas_size(&self) -> CanvasSize;

    /// Layer records in stored order (bottom-most first)
    fn records(&self) -> &[LayerRecord];

    /// Decode one layer into tightly packed RGBA8, `width * height * 4` bytes
    fn read_rgba(&self, record: &LayerRecord) -> Result<Vec<u8>>;
}
