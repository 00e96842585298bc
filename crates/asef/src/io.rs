//! JSON configuration and report helpers for batch eye location.

use crate::core::PixelRect;
use crate::eyes::{EyeFilterModel, EyeLocatorResult, LocateError};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum EyeIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Configuration of one batch run: a filter file, an image and its faces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeLocateConfig {
    pub filter_path: String,
    pub image_path: String,
    pub faces: Vec<PixelRect>,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl EyeLocateConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, EyeIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), EyeIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("eye_locate_report.json"))
    }
}

/// Outcome for one face. Either the eye fields or `error` are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceReport {
    pub face: PixelRect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_eye: Option<Point2<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_eye: Option<Point2<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_response: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_response: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FaceReport {
    pub fn from_result(face: PixelRect, res: &Result<EyeLocatorResult, LocateError>) -> Self {
        match res {
            Ok(r) => Self {
                face,
                left_eye: Some(r.left_eye),
                right_eye: Some(r.right_eye),
                left_response: Some(r.left_response),
                right_response: Some(r.right_response),
                error: None,
            },
            Err(e) => Self {
                face,
                left_eye: None,
                right_eye: None,
                left_response: None,
                right_response: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn is_located(&self) -> bool {
        self.error.is_none() && self.left_eye.is_some() && self.right_eye.is_some()
    }
}

/// Report written by a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeLocateReport {
    pub image_path: String,
    pub filter_path: String,
    pub tile_width: usize,
    pub tile_height: usize,
    pub faces: Vec<FaceReport>,
}

impl EyeLocateReport {
    /// Build a report from per-face results, paired with `faces` in order.
    pub fn new(
        image_path: impl Into<String>,
        filter_path: impl Into<String>,
        model: &EyeFilterModel,
        faces: &[PixelRect],
        results: &[Result<EyeLocatorResult, LocateError>],
    ) -> Self {
        let faces = faces
            .iter()
            .zip(results)
            .map(|(&face, res)| FaceReport::from_result(face, res))
            .collect();
        Self {
            image_path: image_path.into(),
            filter_path: filter_path.into(),
            tile_width: model.tile_width(),
            tile_height: model.tile_height(),
            faces,
        }
    }

    /// Number of faces with both eyes located.
    pub fn located(&self) -> usize {
        self.faces.iter().filter(|f| f.is_located()).count()
    }

    /// Load a JSON report from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, EyeIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), EyeIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
