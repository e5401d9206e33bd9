/// Boosted Haar cascade classifier read from OpenCV's cascade XML format.
///
/// Supports the trainer's current layout (`stageType` BOOST, `featureType`
/// HAAR, upright features). Windows are scored on integral images with
/// variance normalization; the image pyramid and neighbor grouping follow
/// the usual multi-scale scheme.
use std::fs;
use std::path::Path;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::shared::rect::Rect;

use super::math;

/// Relative tolerance used when grouping candidate windows.
pub const GROUP_EPS: f64 = 0.2;

/// Trained stage thresholds are stored rounded; loosen them by this much.
const STAGE_THRESHOLD_EPS: f64 = 1e-5;

#[derive(Error, Debug)]
pub enum CascadeLoadError {
    #[error("failed to read cascade file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed cascade xml: {0}")]
    Xml(String),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
    #[error("invalid cascade data: {0}")]
    Invalid(String),
}

/// Pyramid and grouping parameters for [`HaarCascade::detect_multi_scale`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MultiScaleParams {
    /// Pyramid step, must be > 1.0.
    pub scale_factor: f64,
    /// Candidates a group needs beyond this count to be reported. 0 disables grouping.
    pub min_neighbors: u32,
    pub min_size: (u32, u32),
    /// `0` on either axis means unbounded.
    pub max_size: (u32, u32),
}

#[derive(Clone, Debug)]
struct FeatureRect {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    weight: f64,
}

#[derive(Clone, Debug)]
struct HaarFeature {
    rects: Vec<FeatureRect>,
}

impl HaarFeature {
    fn value(&self, sums: &IntegralTable, x: usize, y: usize) -> f64 {
        self.rects
            .iter()
            .map(|r| r.weight * rect_sum(sums, x + r.x, y + r.y, r.width, r.height) as f64)
            .sum()
    }
}

/// Internal tree node. Positive children index further nodes, zero or
/// negative children index leaves by negation.
#[derive(Clone, Debug)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Clone, Debug)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

impl WeakClassifier {
    fn evaluate(&self, feature_value: impl Fn(usize) -> f64) -> f64 {
        let mut index = 0usize;
        loop {
            let node = &self.nodes[index];
            let next = if feature_value(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return self.leaves[next.unsigned_abs() as usize];
            }
            index = next as usize;
        }
    }
}

#[derive(Clone, Debug)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

#[derive(Clone, Debug)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn load(path: &Path) -> Result<Self, CascadeLoadError> {
        let source = fs::read_to_string(path)?;
        Self::from_xml(&source)
    }

    pub fn from_xml(source: &str) -> Result<Self, CascadeLoadError> {
        let document = parse_xml(source)?;
        let storage = document.require("opencv_storage")?;
        let cascade = storage
            .children
            .iter()
            .find(|c| c.child("stages").is_some() && c.child("features").is_some())
            .ok_or_else(|| {
                CascadeLoadError::Unsupported(
                    "no cascade with <stages> and <features> (old-style cascades are not supported)"
                        .into(),
                )
            })?;

        if let Some(stage_type) = cascade.child("stageType") {
            if stage_type.text.trim() != "BOOST" {
                return Err(CascadeLoadError::Unsupported(format!(
                    "stage type {}",
                    stage_type.text.trim()
                )));
            }
        }
        if let Some(feature_type) = cascade.child("featureType") {
            if feature_type.text.trim() != "HAAR" {
                return Err(CascadeLoadError::Unsupported(format!(
                    "feature type {}",
                    feature_type.text.trim()
                )));
            }
        }

        let window_width: u32 = cascade.require("width")?.number()?;
        let window_height: u32 = cascade.require("height")?.number()?;
        if window_width < 3 || window_height < 3 {
            return Err(CascadeLoadError::Invalid(format!(
                "window {window_width}x{window_height} is smaller than 3x3"
            )));
        }

        let features = cascade
            .require("features")?
            .children
            .iter()
            .map(|f| parse_feature(f, window_width as usize, window_height as usize))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = cascade
            .require("stages")?
            .children
            .iter()
            .map(|s| parse_stage(s, features.len()))
            .collect::<Result<Vec<_>, _>>()?;
        if stages.is_empty() {
            return Err(CascadeLoadError::Invalid("cascade has no stages".into()));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Scans `image` over a pyramid of scales and returns grouped detections
    /// in `image` coordinates.
    pub fn detect_multi_scale(&self, image: &GrayImage, params: &MultiScaleParams) -> Vec<Rect> {
        if params.scale_factor <= 1.0 {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let window_w = (self.window_width as f64 * factor).round() as u32;
            let window_h = (self.window_height as f64 * factor).round() as u32;
            let scaled_w = (image.width() as f64 / factor) as u32;
            let scaled_h = (image.height() as f64 / factor) as u32;

            if scaled_w < self.window_width || scaled_h < self.window_height {
                break;
            }
            if exceeds(window_w, window_h, params.max_size) {
                break;
            }

            if window_w >= params.min_size.0 && window_h >= params.min_size.1 {
                let resized;
                let scaled = if scaled_w == image.width() && scaled_h == image.height() {
                    image
                } else {
                    resized = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
                    &resized
                };
                self.scan(scaled, factor, (window_w, window_h), &mut candidates);
            }

            factor *= params.scale_factor;
        }

        group_rectangles(candidates, params.min_neighbors, GROUP_EPS)
    }

    fn scan(&self, image: &GrayImage, factor: f64, window: (u32, u32), out: &mut Vec<Rect>) {
        let sums: IntegralTable = integral_image::<_, u64>(image);
        let squares: IntegralTable = integral_squared_image::<_, u64>(image);
        let step = if factor > 2.0 { 1 } else { 2 };
        let max_x = (image.width() - self.window_width) as usize;
        let max_y = (image.height() - self.window_height) as usize;

        for y in (0..=max_y).step_by(step) {
            for x in (0..=max_x).step_by(step) {
                if self.passes(&sums, &squares, x, y) {
                    out.push(Rect::new(
                        (x as f64 * factor).round() as i32,
                        (y as f64 * factor).round() as i32,
                        window.0 as i32,
                        window.1 as i32,
                    ));
                }
            }
        }
    }

    fn passes(&self, sums: &IntegralTable, squares: &IntegralTable, x: usize, y: usize) -> bool {
        let inner_w = self.window_width as usize - 2;
        let inner_h = self.window_height as usize - 2;
        let area = (inner_w * inner_h) as f64;
        let sum = rect_sum(sums, x + 1, y + 1, inner_w, inner_h) as f64;
        let square_sum = rect_sum(squares, x + 1, y + 1, inner_w, inner_h) as f64;
        let variance = area * square_sum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        self.stages.iter().all(|stage| {
            let score: f64 = stage
                .classifiers
                .iter()
                .map(|c| c.evaluate(|f| self.features[f].value(sums, x, y) / norm))
                .sum();
            score >= stage.threshold - STAGE_THRESHOLD_EPS
        })
    }
}

fn exceeds(width: u32, height: u32, max_size: (u32, u32)) -> bool {
    (max_size.0 > 0 && width > max_size.0) || (max_size.1 > 0 && height > max_size.1)
}

// ---------------------------------------------------------------------------
// Integral images
// ---------------------------------------------------------------------------

/// Summed-area table with a zero first row and column.
type IntegralTable = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Sum over the `w` x `h` box whose top-left pixel is `(x, y)`.
fn rect_sum(table: &IntegralTable, x: usize, y: usize, w: usize, h: usize) -> u64 {
    if w == 0 || h == 0 {
        return 0;
    }
    let [total] = sum_image_pixels(
        table,
        x as u32,
        y as u32,
        (x + w - 1) as u32,
        (y + h - 1) as u32,
    );
    total
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Clusters similar rectangles and keeps clusters with more than
/// `min_neighbors` members, averaged. Small clusters nested inside a
/// stronger one are dropped. `min_neighbors == 0` returns the input as-is.
pub fn group_rectangles(rects: Vec<Rect>, min_neighbors: u32, eps: f64) -> Vec<Rect> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects;
    }

    let (labels, class_count) = partition(&rects, eps);
    let mut sums = vec![[0i64; 4]; class_count];
    let mut counts = vec![0u32; class_count];
    for (rect, &label) in rects.iter().zip(&labels) {
        let s = &mut sums[label];
        s[0] += rect.x as i64;
        s[1] += rect.y as i64;
        s[2] += rect.width as i64;
        s[3] += rect.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<(Rect, u32)> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &n)| {
            let k = n as f64;
            let avg = |v: i64| (v as f64 / k).round() as i32;
            (Rect::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3])), n)
        })
        .collect();

    averaged
        .iter()
        .enumerate()
        .filter(|&(i, &(r1, n1))| {
            if n1 <= min_neighbors {
                return false;
            }
            let nested = averaged.iter().enumerate().any(|(j, &(r2, n2))| {
                if i == j || n2 <= min_neighbors {
                    return false;
                }
                let dx = (r2.width as f64 * eps).round() as i32;
                let dy = (r2.height as f64 * eps).round() as i32;
                r1.x >= r2.x - dx
                    && r1.y >= r2.y - dy
                    && r1.right() <= r2.right() + dx
                    && r1.bottom() <= r2.bottom() + dy
                    && (n2 > n1.max(3) || n1 < 3)
            });
            !nested
        })
        .map(|(_, &(r, _))| r)
        .collect()
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.right() - b.right()).abs() as f64 <= delta
        && (a.bottom() - b.bottom()).abs() as f64 <= delta
}

/// Union-find over the similarity relation. Returns a dense class label per
/// rect and the number of classes.
fn partition(rects: &[Rect], eps: f64) -> (Vec<usize>, usize) {
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                math::union(&mut parent, i, j);
            }
        }
    }
    math::dense_labels(&mut parent)
}

// ---------------------------------------------------------------------------
// XML
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&XmlElement, CascadeLoadError> {
        self.child(name).ok_or_else(|| {
            CascadeLoadError::Invalid(format!("<{}> is missing <{}>", self.name, name))
        })
    }

    fn number<T: FromStr>(&self) -> Result<T, CascadeLoadError> {
        let text = self.text.trim();
        text.parse::<T>().map_err(|_| {
            CascadeLoadError::Invalid(format!("bad number \"{text}\" in <{}>", self.name))
        })
    }

    fn numbers<T: FromStr>(&self) -> Result<Vec<T>, CascadeLoadError> {
        self.text
            .split_whitespace()
            .map(|token| {
                token.parse::<T>().map_err(|_| {
                    CascadeLoadError::Invalid(format!("bad number \"{token}\" in <{}>", self.name))
                })
            })
            .collect()
    }
}

/// Reads the whole document into a small element tree rooted at a nameless node.
fn parse_xml(source: &str) -> Result<XmlElement, CascadeLoadError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut stack = vec![XmlElement::default()];
    loop {
        match reader
            .read_event()
            .map_err(|e| CascadeLoadError::Xml(e.to_string()))?
        {
            Event::Start(e) => stack.push(XmlElement {
                name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ..Default::default()
            }),
            Event::Empty(e) => {
                let element = XmlElement {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Default::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| CascadeLoadError::Xml(e.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    if !current.text.is_empty() {
                        current.text.push(' ');
                    }
                    current.text.push_str(&text);
                }
            }
            Event::End(_) => {
                let done = stack
                    .pop()
                    .ok_or_else(|| CascadeLoadError::Xml("unbalanced closing tag".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => return Err(CascadeLoadError::Xml("unbalanced closing tag".into())),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(CascadeLoadError::Xml("unexpected end of document".into()));
    }
    stack
        .pop()
        .ok_or_else(|| CascadeLoadError::Xml("empty document".into()))
}

fn parse_feature(
    element: &XmlElement,
    window_width: usize,
    window_height: usize,
) -> Result<HaarFeature, CascadeLoadError> {
    if let Some(tilted) = element.child("tilted") {
        if tilted.number::<i32>()? != 0 {
            return Err(CascadeLoadError::Unsupported("tilted features".into()));
        }
    }

    let rects = element
        .require("rects")?
        .children
        .iter()
        .map(|r| {
            let values: Vec<f64> = r.numbers()?;
            if values.len() != 5 {
                return Err(CascadeLoadError::Invalid(format!(
                    "feature rect needs 5 values, got {}",
                    values.len()
                )));
            }
            let geometry = &values[..4];
            if geometry.iter().any(|v| *v < 0.0 || v.fract() != 0.0) {
                return Err(CascadeLoadError::Invalid(format!(
                    "feature rect {geometry:?} is not a non-negative integer box"
                )));
            }
            let rect = FeatureRect {
                x: values[0] as usize,
                y: values[1] as usize,
                width: values[2] as usize,
                height: values[3] as usize,
                weight: values[4],
            };
            if rect.x + rect.width > window_width || rect.y + rect.height > window_height {
                return Err(CascadeLoadError::Invalid(format!(
                    "feature rect {geometry:?} exceeds the {window_width}x{window_height} window"
                )));
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() {
        return Err(CascadeLoadError::Invalid("feature without rects".into()));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(element: &XmlElement, feature_count: usize) -> Result<Stage, CascadeLoadError> {
    let threshold: f64 = element.require("stageThreshold")?.number()?;
    let classifiers = element
        .require("weakClassifiers")?
        .children
        .iter()
        .map(|w| parse_weak_classifier(w, feature_count))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(
    element: &XmlElement,
    feature_count: usize,
) -> Result<WeakClassifier, CascadeLoadError> {
    let raw: Vec<f64> = element.require("internalNodes")?.numbers()?;
    let leaves: Vec<f64> = element.require("leafValues")?.numbers()?;
    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(CascadeLoadError::Invalid(format!(
            "internalNodes holds {} values, expected groups of 4",
            raw.len()
        )));
    }

    let node_count = raw.len() / 4;
    let as_int = |v: f64| -> Result<i32, CascadeLoadError> {
        if v.fract() != 0.0 {
            return Err(CascadeLoadError::Invalid(format!("{v} is not an index")));
        }
        Ok(v as i32)
    };

    let mut nodes = Vec::with_capacity(node_count);
    for (index, chunk) in raw.chunks(4).enumerate() {
        let left = as_int(chunk[0])?;
        let right = as_int(chunk[1])?;
        let feature = as_int(chunk[2])?;
        if feature < 0 || feature as usize >= feature_count {
            return Err(CascadeLoadError::Invalid(format!(
                "feature index {feature} out of range ({feature_count} features)"
            )));
        }
        for child in [left, right] {
            let valid = if child > 0 {
                (child as usize) > index && (child as usize) < node_count
            } else {
                (child.unsigned_abs() as usize) < leaves.len()
            };
            if !valid {
                return Err(CascadeLoadError::Invalid(format!(
                    "node {index} has an invalid child reference {child}"
                )));
            }
        }
        nodes.push(TreeNode {
            left,
            right,
            feature: feature as usize,
            threshold: chunk[3],
        });
    }

    Ok(WeakClassifier { nodes, leaves })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One-stage 4x4 cascade that fires when the left half of the window is
    /// brighter than the right half.
    pub(crate) fn edge_cascade_xml() -> String {
        cascade_xml("HAAR", "0 -1 0 1.0000000000000001e-01", "0 0 2 4 1.", "2 0 2 4 -1.")
    }

    fn cascade_xml(feature_type: &str, nodes: &str, rect_a: &str, rect_b: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>{feature_type}</featureType>
  <height>4</height>
  <width>4</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>5.0e-01</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            {nodes}</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          {rect_a}</_>
        <_>
          {rect_b}</_></rects></_></features></cascade>
</opencv_storage>
"#
        )
    }

    fn gray(width: u32, height: u32, bright_until_x: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            if x < bright_until_x {
                image::Luma([255u8])
            } else {
                image::Luma([0u8])
            }
        })
    }

    fn params(min_neighbors: u32) -> MultiScaleParams {
        MultiScaleParams {
            scale_factor: 1.5,
            min_neighbors,
            min_size: (0, 0),
            max_size: (0, 0),
        }
    }

    // ── Loading ──────────────────────────────────────────────────────

    #[test]
    fn test_from_xml_reads_window_and_stages() {
        let cascade = HaarCascade::from_xml(&edge_cascade_xml()).unwrap();
        assert_eq!(cascade.window_size(), (4, 4));
        assert_eq!(cascade.stage_count(), 1);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = HaarCascade::load(Path::new("/nonexistent/cascade.xml")).unwrap_err();
        assert!(matches!(err, CascadeLoadError::Io(_)));
    }

    #[test]
    fn test_rejects_lbp_cascade() {
        let xml = cascade_xml("LBP", "0 -1 0 0.1", "0 0 2 4 1.", "2 0 2 4 -1.");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeLoadError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_feature_index() {
        let xml = cascade_xml("HAAR", "0 -1 5 0.1", "0 0 2 4 1.", "2 0 2 4 -1.");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeLoadError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_rect_outside_window() {
        let xml = cascade_xml("HAAR", "0 -1 0 0.1", "0 0 2 4 1.", "3 0 2 4 -1.");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeLoadError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_document_without_cascade() {
        let xml = "<opencv_storage><other>1</other></opencv_storage>";
        assert!(matches!(
            HaarCascade::from_xml(xml),
            Err(CascadeLoadError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_xml() {
        assert!(matches!(
            HaarCascade::from_xml("<opencv_storage><cascade></opencv_storage>"),
            Err(CascadeLoadError::Xml(_))
        ));
    }

    // ── Detection ────────────────────────────────────────────────────

    #[test]
    fn test_window_with_bright_left_half_is_detected() {
        let cascade = HaarCascade::from_xml(&edge_cascade_xml()).unwrap();
        let rects = cascade.detect_multi_scale(&gray(4, 4, 2), &params(0));
        assert_eq!(rects, vec![Rect::new(0, 0, 4, 4)]);
    }

    #[test]
    fn test_uniform_image_has_no_detections() {
        let cascade = HaarCascade::from_xml(&edge_cascade_xml()).unwrap();
        let rects = cascade.detect_multi_scale(&gray(16, 16, 16), &params(0));
        assert!(rects.is_empty());
    }

    #[test]
    fn test_image_smaller_than_window_has_no_detections() {
        let cascade = HaarCascade::from_xml(&edge_cascade_xml()).unwrap();
        assert!(cascade
            .detect_multi_scale(&gray(3, 3, 1), &params(0))
            .is_empty());
    }

    #[test]
    fn test_raw_detections_straddle_the_edge() {
        let cascade = HaarCascade::from_xml(&edge_cascade_xml()).unwrap();
        let rects = cascade.detect_multi_scale(&gray(12, 8, 6), &params(0));
        assert!(!rects.is_empty());
        for r in &rects {
            assert!(r.x >= 0 && r.y >= 0);
            assert!(r.x <= 6 && r.right() >= 6, "rect {r:?} misses the edge");
        }
    }

    #[test]
    fn test_min_size_filters_small_windows() {
        let cascade = HaarCascade::from_xml(&edge_cascade_xml()).unwrap();
        let p = MultiScaleParams {
            min_size: (5, 5),
            ..params(0)
        };
        // Only the 4x4 scale fits a 4x4 image, and it is below min_size.
        assert!(cascade.detect_multi_scale(&gray(4, 4, 2), &p).is_empty());
    }

    #[test]
    fn test_non_increasing_scale_factor_yields_nothing() {
        let cascade = HaarCascade::from_xml(&edge_cascade_xml()).unwrap();
        let p = MultiScaleParams {
            scale_factor: 1.0,
            ..params(0)
        };
        assert!(cascade.detect_multi_scale(&gray(4, 4, 2), &p).is_empty());
    }

    // ── Grouping ─────────────────────────────────────────────────────

    #[test]
    fn test_group_zero_neighbors_returns_input() {
        let rects = vec![Rect::new(0, 0, 10, 10), Rect::new(1, 1, 10, 10)];
        assert_eq!(group_rectangles(rects.clone(), 0, GROUP_EPS), rects);
    }

    #[test]
    fn test_group_averages_similar_rects() {
        let rects = vec![
            Rect::new(100, 100, 50, 50),
            Rect::new(102, 100, 50, 50),
            Rect::new(101, 103, 50, 50),
        ];
        assert_eq!(
            group_rectangles(rects, 2, GROUP_EPS),
            vec![Rect::new(101, 101, 50, 50)]
        );
    }

    #[test]
    fn test_group_requires_more_than_min_neighbors() {
        let rects = vec![
            Rect::new(100, 100, 50, 50),
            Rect::new(102, 100, 50, 50),
            Rect::new(101, 103, 50, 50),
        ];
        assert!(group_rectangles(rects, 3, GROUP_EPS).is_empty());
    }

    #[test]
    fn test_group_keeps_distant_clusters_apart() {
        let rects = vec![
            Rect::new(0, 0, 20, 20),
            Rect::new(1, 0, 20, 20),
            Rect::new(200, 200, 20, 20),
            Rect::new(201, 201, 20, 20),
        ];
        let grouped = group_rectangles(rects, 1, GROUP_EPS);
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn test_group_drops_weak_cluster_nested_in_strong_one() {
        let mut rects = vec![Rect::new(0, 0, 100, 100); 4];
        rects.extend([Rect::new(20, 20, 20, 20), Rect::new(21, 20, 20, 20)]);
        let grouped = group_rectangles(rects, 1, GROUP_EPS);
        assert_eq!(grouped, vec![Rect::new(0, 0, 100, 100)]);
    }

    // ── Integral image ───────────────────────────────────────────────

    #[test]
    fn test_integral_sums_match_direct_sums() {
        let img = GrayImage::from_fn(5, 4, |x, y| image::Luma([(x * 10 + y) as u8]));
        let sums: IntegralTable = integral_image::<_, u64>(&img);
        let squares: IntegralTable = integral_squared_image::<_, u64>(&img);
        let direct: u64 = (1..4)
            .flat_map(|y| (2..5).map(move |x| (x * 10 + y) as u64))
            .sum();
        assert_eq!(rect_sum(&sums, 2, 1, 3, 3), direct);
        let direct_sq: u64 = (1..4)
            .flat_map(|y| (2..5).map(move |x| ((x * 10 + y) as u64).pow(2)))
            .sum();
        assert_eq!(rect_sum(&squares, 2, 1, 3, 3), direct_sq);
        let total = img.pixels().map(|p| p.0[0] as u64).sum::<u64>();
        assert_eq!(rect_sum(&sums, 0, 0, 5, 4), total);
        assert_eq!(rect_sum(&sums, 1, 1, 0, 3), 0);
    }
}
