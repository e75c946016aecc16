//! Recognition templates: where on the rendered first page each field lives.

use std::{fmt, str::FromStr};

use schemars::JsonSchema;

use crate::prelude::*;

/// An axis-aligned rectangle in the pixel space of the rendered page.
///
/// Coordinates are `(x1, y1)` inclusive and `(x2, y2)` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roi {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Roi {
    /// Create a new region, checking that it has a positive area.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self, RoiParseError> {
        if x1 >= x2 || y1 >= y2 {
            return Err(RoiParseError::EmptyArea { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }
}

/// Why a stored region string could not be used.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoiParseError {
    #[error("expected 4 comma-separated integers, found {0}")]
    WrongArity(usize),
    #[error("invalid coordinate {0:?}")]
    BadCoordinate(String),
    #[error("region {x1},{y1},{x2},{y2} has no area")]
    EmptyArea { x1: u32, y1: u32, x2: u32, y2: u32 },
}

impl FromStr for Roi {
    type Err = RoiParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split(',').map(str::trim).collect::<Vec<_>>();
        if parts.len() != 4 {
            return Err(RoiParseError::WrongArity(parts.len()));
        }
        let mut coords = [0u32; 4];
        for (coord, part) in coords.iter_mut().zip(&parts) {
            *coord = part
                .parse::<u32>()
                .map_err(|_| RoiParseError::BadCoordinate((*part).to_owned()))?;
        }
        let [x1, y1, x2, y2] = coords;
        Roi::new(x1, y1, x2, y2)
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }
}

/// The three fields we know how to extract.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Order number, normalized to `DDD-DDDD-DDDD-DDD`.
    Order,
    /// Operator number, digits only.
    Operator,
    /// Report date, normalized to `dd.mm.yyyy`.
    Date,
}

impl FieldKind {
    /// All fields, in extraction order.
    pub const ALL: [FieldKind; 3] = [FieldKind::Order, FieldKind::Operator, FieldKind::Date];

    /// Short name, used in logs and diagnostic file names.
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Order => "order",
            FieldKind::Operator => "operator",
            FieldKind::Date => "date",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The active recognition template, as stored.
///
/// Regions are kept in their stored string form (`"x1,y1,x2,y2"`), because a
/// malformed region must only disable its own field. Parsing happens per field
/// at extraction time.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Template {
    /// Database ID, if this template was loaded from the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Human-readable name.
    pub name: String,

    /// Region of the order number.
    #[serde(default)]
    pub roi_order: Option<String>,

    /// Region of the operator number.
    #[serde(default)]
    pub roi_operator: Option<String>,

    /// Region of the report date.
    #[serde(default)]
    pub roi_date: Option<String>,
}

/// The on-disk template file format. Any `id` in a file is ignored on import.
pub type TemplateFile = Template;

impl Template {
    /// The raw stored region for a field.
    pub fn raw_roi(&self, field: FieldKind) -> Option<&str> {
        match field {
            FieldKind::Order => self.roi_order.as_deref(),
            FieldKind::Operator => self.roi_operator.as_deref(),
            FieldKind::Date => self.roi_date.as_deref(),
        }
    }

    /// Parse the region for a field. `Ok(None)` means no region was defined.
    pub fn roi(&self, field: FieldKind) -> Result<Option<Roi>, RoiParseError> {
        self.raw_roi(field).map(str::parse).transpose()
    }

    /// Check that every region which is present parses.
    pub fn validate(&self) -> Result<()> {
        for field in FieldKind::ALL {
            self.roi(field)
                .with_context(|| format!("invalid {} region in template {:?}", field, self.name))?;
        }
        Ok(())
    }
}
