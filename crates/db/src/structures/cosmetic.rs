//! Cosmetics: badges and name paints.

use bson::Document;
use bson::oid::ObjectId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use emotes_common::AppResult;

/// Cosmetic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CosmeticKind {
    /// Badge.
    Badge,
    /// Name paint.
    Paint,
}

/// A badge or paint that users can display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cosmetic<D = Document> {
    /// Cosmetic ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Kind.
    pub kind: CosmeticKind,
    /// Sort priority.
    #[serde(default)]
    pub priority: i32,
    /// Name.
    pub name: String,
    /// Legacy direct grants.
    #[serde(default)]
    pub user_ids: Vec<ObjectId>,
    /// Kind-specific payload.
    pub data: D,
}

impl<D> Cosmetic<D> {
    fn with_data<T>(self, data: T) -> Cosmetic<T> {
        Cosmetic {
            id: self.id,
            kind: self.kind,
            priority: self.priority,
            name: self.name,
            user_ids: self.user_ids,
            data,
        }
    }
}

impl<D: Serialize> Cosmetic<D> {
    /// Re-encode the payload as a raw document.
    pub fn to_raw(self) -> AppResult<Cosmetic> {
        let data = bson::to_document(&self.data)?;
        Ok(self.with_data(data))
    }
}

impl Cosmetic {
    /// Decode the payload into a typed struct.
    pub fn convert<T: DeserializeOwned>(mut self) -> AppResult<Cosmetic<T>> {
        let data = bson::from_document(std::mem::take(&mut self.data))?;
        Ok(self.with_data(data))
    }
}

/// Badge payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmeticBadge {
    /// Hover text.
    pub tooltip: String,
    /// Short tag.
    #[serde(default)]
    pub tag: String,
}

/// Paint rendering function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaintFunction {
    /// Linear gradient.
    LinearGradient,
    /// Radial gradient.
    RadialGradient,
    /// Image.
    Url,
}

/// A gradient stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaintStop {
    /// Offset in `[0, 1]`.
    pub at: f64,
    /// Packed RGBA color.
    pub color: i32,
}

/// A drop shadow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaintShadow {
    /// Horizontal offset.
    pub x_offset: f64,
    /// Vertical offset.
    pub y_offset: f64,
    /// Blur radius.
    pub radius: f64,
    /// Packed RGBA color.
    pub color: i32,
}

/// Paint payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosmeticPaint {
    /// Rendering function.
    pub function: PaintFunction,
    /// Solid fallback color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<i32>,
    /// Gradient stops.
    #[serde(default)]
    pub stops: Vec<PaintStop>,
    /// Repeat the gradient.
    #[serde(default)]
    pub repeat: bool,
    /// Gradient angle in degrees.
    #[serde(default)]
    pub angle: i32,
    /// Radial gradient shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    /// Image for the `Url` function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Drop shadows.
    #[serde(default)]
    pub shadows: Vec<PaintShadow>,
}
