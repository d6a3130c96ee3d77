use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;

pub const NUM_KEYPOINTS: usize = 6;

/// Face box found by the short-range detector.
///
/// Contains (x,y) of the center and (width,height) of the box, all in `[0, 1]`
/// units of the input image.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
    /// eyes, nose tip, mouth, ear tragions
    #[serde(rename = "k")]
    pub keypoints: [(f32, f32); NUM_KEYPOINTS],
}

impl Detection {
    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox().iou(&other.bbox())
    }

    #[inline(always)]
    pub fn bbox(&self) -> BBox {
        BBox::xywh(self.x, self.y, self.w, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_short_keys() {
        let det = Detection {
            x: 0.5,
            y: 0.5,
            w: 0.25,
            h: 0.5,
            confidence: 0.75,
            keypoints: [(0.5, 0.5); NUM_KEYPOINTS],
        };

        let json = serde_json::to_value(det).unwrap();
        assert_eq!(json["p"], 0.75);
        assert_eq!(json["k"].as_array().unwrap().len(), NUM_KEYPOINTS);
        assert_eq!(det.bbox().as_slice(), &[0.375, 0.25, 0.625, 0.75]);
    }

    #[test]
    fn proposal_list_reads_back() {
        let json = r#"[{"x":0.5,"y":0.4,"w":0.2,"h":0.3,"p":0.9,
            "k":[[0.45,0.35],[0.55,0.35],[0.5,0.4],[0.5,0.5],[0.4,0.4],[0.6,0.4]]}]"#;

        let dets: Vec<Detection> = serde_json::from_str(json).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[0].keypoints[1], (0.55, 0.35));
        assert_eq!(serde_json::to_string(&dets).unwrap().matches("\"p\"").count(), 1);
    }
}
