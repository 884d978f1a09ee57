//! Request payload types shared by the HTTP layer and the segmentation service

use crate::error::{ClearCutError, Result};
use serde::Serialize;
use serde_json::Value;

/// Message for a missing or non-list `points`/`labels`
pub const MSG_PROMPTS_REQUIRED: &str = "points/labels required.";
/// Message for empty or misaligned `points`/`labels`
pub const MSG_PROMPTS_LENGTH: &str = "points/labels required and must match lengths.";
/// Message for a malformed `box`
pub const MSG_BAD_BOX: &str = "box must be [x1,y1,x2,y2].";
/// Message for an unparseable `req` form field
pub const MSG_BAD_JSON: &str = "req must be valid JSON.";

/// Validated point/box prompts for a single segmentation request
///
/// Invariant: `points.len() == labels.len() >= 1`, every coordinate finite,
/// every label 0 (remove) or 1 (keep).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentationRequest {
    pub points: Vec<[f32; 2]>,
    pub labels: Vec<i32>,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
}

impl SegmentationRequest {
    /// Build a request from already-typed prompts, enforcing the same rules as [`parse`]
    ///
    /// [`parse`]: SegmentationRequest::parse
    ///
    /// # Errors
    /// - `InvalidRequest` when the prompts violate the invariant
    pub fn new(points: Vec<[f32; 2]>, labels: Vec<i32>, bbox: Option<[f32; 4]>) -> Result<Self> {
        let request = Self {
            points,
            labels,
            bbox,
        };
        request.validate()?;
        Ok(request)
    }

    /// Parse and validate the JSON `req` form field
    ///
    /// # Errors
    /// - `InvalidRequest` with a client-facing message on any violation
    pub fn parse(raw: &str) -> Result<Self> {
        let payload: Value =
            serde_json::from_str(raw).map_err(|_| ClearCutError::invalid_request(MSG_BAD_JSON))?;
        let object = payload
            .as_object()
            .ok_or_else(|| ClearCutError::invalid_request(MSG_PROMPTS_REQUIRED))?;

        let (Some(Value::Array(points)), Some(Value::Array(labels))) =
            (object.get("points"), object.get("labels"))
        else {
            return Err(ClearCutError::invalid_request(MSG_PROMPTS_REQUIRED));
        };
        if points.is_empty() || points.len() != labels.len() {
            return Err(ClearCutError::invalid_request(MSG_PROMPTS_LENGTH));
        }

        let points = points
            .iter()
            .map(parse_point)
            .collect::<Result<Vec<_>>>()?;
        let labels = labels
            .iter()
            .map(parse_label)
            .collect::<Result<Vec<_>>>()?;
        let bbox = match object.get("box") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_box(value)?),
        };

        Self::new(points, labels, bbox)
    }

    fn validate(&self) -> Result<()> {
        if self.points.is_empty() || self.points.len() != self.labels.len() {
            return Err(ClearCutError::invalid_request(MSG_PROMPTS_LENGTH));
        }
        if self.points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ClearCutError::invalid_request("each point must be [x,y]."));
        }
        if self.labels.iter().any(|&l| l != 0 && l != 1) {
            return Err(ClearCutError::invalid_request("labels must be 0 or 1."));
        }
        if let Some(bbox) = &self.bbox {
            if bbox.iter().any(|v| !v.is_finite()) {
                return Err(ClearCutError::invalid_request(MSG_BAD_BOX));
            }
        }
        Ok(())
    }
}

fn finite(value: &Value) -> Option<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .filter(|v| v.is_finite())
}

fn parse_point(value: &Value) -> Result<[f32; 2]> {
    match value.as_array().map(Vec::as_slice) {
        Some([x, y]) => match (finite(x), finite(y)) {
            (Some(x), Some(y)) => Ok([x, y]),
            _ => Err(ClearCutError::invalid_request("each point must be [x,y].")),
        },
        _ => Err(ClearCutError::invalid_request("each point must be [x,y].")),
    }
}

fn parse_label(value: &Value) -> Result<i32> {
    match value.as_i64() {
        Some(0) => Ok(0),
        Some(1) => Ok(1),
        _ => Err(ClearCutError::invalid_request("labels must be 0 or 1.")),
    }
}

fn parse_box(value: &Value) -> Result<[f32; 4]> {
    let coords = value
        .as_array()
        .filter(|items| items.len() == 4)
        .ok_or_else(|| ClearCutError::invalid_request(MSG_BAD_BOX))?;
    let mut bbox = [0.0_f32; 4];
    for (slot, item) in bbox.iter_mut().zip(coords) {
        *slot = finite(item).ok_or_else(|| ClearCutError::invalid_request(MSG_BAD_BOX))?;
    }
    Ok(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: ClearCutError) -> String {
        match err {
            ClearCutError::InvalidRequest(msg) => msg,
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_points_and_labels() {
        let req = SegmentationRequest::parse(r#"{"points": [[50, 50], [10.5, 3]], "labels": [1, 0]}"#)
            .unwrap();
        assert_eq!(req.points, vec![[50.0, 50.0], [10.5, 3.0]]);
        assert_eq!(req.labels, vec![1, 0]);
        assert_eq!(req.bbox, None);
    }

    #[test]
    fn test_parse_box_and_null_box() {
        let req = SegmentationRequest::parse(
            r#"{"points": [[1, 2]], "labels": [1], "box": [0, 0, 10, 20]}"#,
        )
        .unwrap();
        assert_eq!(req.bbox, Some([0.0, 0.0, 10.0, 20.0]));

        let req =
            SegmentationRequest::parse(r#"{"points": [[1, 2]], "labels": [1], "box": null}"#).unwrap();
        assert_eq!(req.bbox, None);
    }

    #[test]
    fn test_invalid_json() {
        let err = SegmentationRequest::parse("{not json").unwrap_err();
        assert_eq!(message(err), MSG_BAD_JSON);
    }

    #[test]
    fn test_missing_or_non_list_prompts() {
        for raw in [
            r#"{"labels": [1]}"#,
            r#"{"points": [[1, 2]]}"#,
            r#"{"points": "1,2", "labels": [1]}"#,
            "[1, 2]",
        ] {
            let err = SegmentationRequest::parse(raw).unwrap_err();
            assert_eq!(message(err), MSG_PROMPTS_REQUIRED, "payload {raw}");
        }
    }

    #[test]
    fn test_length_mismatch_and_empty() {
        let err =
            SegmentationRequest::parse(r#"{"points": [[1, 2], [3, 4]], "labels": [1]}"#).unwrap_err();
        assert_eq!(message(err), MSG_PROMPTS_LENGTH);

        let err = SegmentationRequest::parse(r#"{"points": [], "labels": []}"#).unwrap_err();
        assert_eq!(message(err), MSG_PROMPTS_LENGTH);
    }

    #[test]
    fn test_malformed_points_and_labels() {
        let err = SegmentationRequest::parse(r#"{"points": [[1]], "labels": [1]}"#).unwrap_err();
        assert_eq!(message(err), "each point must be [x,y].");

        let err =
            SegmentationRequest::parse(r#"{"points": [["a", 2]], "labels": [1]}"#).unwrap_err();
        assert_eq!(message(err), "each point must be [x,y].");

        let err = SegmentationRequest::parse(r#"{"points": [[1, 2]], "labels": [2]}"#).unwrap_err();
        assert_eq!(message(err), "labels must be 0 or 1.");
    }

    #[test]
    fn test_malformed_box() {
        for raw in [
            r#"{"points": [[1, 2]], "labels": [1], "box": [1, 2, 3]}"#,
            r#"{"points": [[1, 2]], "labels": [1], "box": "0,0,1,1"}"#,
            r#"{"points": [[1, 2]], "labels": [1], "box": [0, 0, "x", 1]}"#,
        ] {
            let err = SegmentationRequest::parse(raw).unwrap_err();
            assert_eq!(message(err), MSG_BAD_BOX, "payload {raw}");
        }
    }

    #[test]
    fn test_new_rejects_non_finite() {
        assert!(SegmentationRequest::new(vec![[f32::NAN, 0.0]], vec![1], None).is_err());
        assert!(
            SegmentationRequest::new(vec![[1.0, 1.0]], vec![1], Some([0.0, 0.0, f32::INFINITY, 1.0]))
                .is_err()
        );
    }

    #[test]
    fn test_serializes_box_field_name() {
        let req = SegmentationRequest::new(vec![[1.0, 2.0]], vec![1], Some([0.0, 0.0, 4.0, 4.0]))
            .unwrap();
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"box\":[0.0,0.0,4.0,4.0]"));
    }
}
