//! Foreign document access
//!
//! The importer only reads the source through [`ForeignDocument`]. The
//! bundled [`MemoryDocument`] keeps everything in memory and loads from
//! JSON; [`DocumentBuilder`] assembles one programmatically.

pub mod builder;
pub mod model;

pub use builder::{DocumentBuilder, VoiceBuilder};
pub use model::*;

use crate::errors::ImportError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Read access to a foreign document
pub trait ForeignDocument {
    /// Staves in scroll-view order
    fn staves(&self) -> &[SourceStaff];

    fn multi_staff_groups(&self) -> &[MultiStaffGroup];

    fn staff_groups(&self) -> &[SourceStaffGroup];

    /// Measures in document order
    fn measures(&self) -> &[SourceMeasure];

    /// Layers holding entries for (staff, measure), ascending
    fn layers_with_entries(&self, part: PartId, staff: StaffId, measure: MeasureId) -> Vec<LayerIndex>;

    fn entries(&self, part: PartId, staff: StaffId, measure: MeasureId, layer: LayerIndex) -> &[SourceEntry];

    fn tuplets(&self, part: PartId, staff: StaffId, measure: MeasureId, layer: LayerIndex) -> &[TupletDescriptor];

    fn layer_attributes(&self, part: PartId) -> &[LayerAttributes];

    fn smart_shapes(&self, part: PartId) -> Vec<&SmartShape>;

    fn custom_line(&self, id: CustomLineId) -> Option<&CustomLine>;

    fn staff(&self, id: StaffId) -> Option<&SourceStaff> {
        self.staves().iter().find(|s| s.id == id)
    }

    fn multi_staff_group_of(&self, staff: StaffId) -> Option<&MultiStaffGroup> {
        self.multi_staff_groups()
            .iter()
            .find(|g| g.staves.contains(&staff))
    }
}

/// Fully in-memory foreign document
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct MemoryDocument {
    pub staves: Vec<SourceStaff>,
    pub multi_staff_groups: Vec<MultiStaffGroup>,
    pub staff_groups: Vec<SourceStaffGroup>,
    pub measures: Vec<SourceMeasure>,
    pub frames: Vec<SourceFrame>,
    pub layer_attributes: Vec<LayerAttributes>,
    pub smart_shapes: Vec<SmartShape>,
    pub custom_lines: Vec<CustomLine>,
}

impl MemoryDocument {
    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ImportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn frame(&self, part: PartId, staff: StaffId, measure: MeasureId, layer: LayerIndex) -> Option<&SourceFrame> {
        self.frames.iter().find(|f| {
            f.part == part && f.staff == staff && f.measure == measure && f.layer == layer
        })
    }
}

impl ForeignDocument for MemoryDocument {
    fn staves(&self) -> &[SourceStaff] {
        &self.staves
    }

    fn multi_staff_groups(&self) -> &[MultiStaffGroup] {
        &self.multi_staff_groups
    }

    fn staff_groups(&self) -> &[SourceStaffGroup] {
        &self.staff_groups
    }

    fn measures(&self) -> &[SourceMeasure] {
        &self.measures
    }

    fn layers_with_entries(&self, part: PartId, staff: StaffId, measure: MeasureId) -> Vec<LayerIndex> {
        let mut layers: Vec<LayerIndex> = self
            .frames
            .iter()
            .filter(|f| f.part == part && f.staff == staff && f.measure == measure)
            .filter(|f| !f.entries.is_empty())
            .map(|f| f.layer)
            .collect();
        layers.sort_unstable();
        layers.dedup();
        layers
    }

    fn entries(&self, part: PartId, staff: StaffId, measure: MeasureId, layer: LayerIndex) -> &[SourceEntry] {
        self.frame(part, staff, measure, layer)
            .map(|f| f.entries.as_slice())
            .unwrap_or(&[])
    }

    fn tuplets(&self, part: PartId, staff: StaffId, measure: MeasureId, layer: LayerIndex) -> &[TupletDescriptor] {
        self.frame(part, staff, measure, layer)
            .map(|f| f.tuplets.as_slice())
            .unwrap_or(&[])
    }

    fn layer_attributes(&self, _part: PartId) -> &[LayerAttributes] {
        &self.layer_attributes
    }

    fn smart_shapes(&self, part: PartId) -> Vec<&SmartShape> {
        self.smart_shapes.iter().filter(|s| s.part == part).collect()
    }

    fn custom_line(&self, id: CustomLineId) -> Option<&CustomLine> {
        self.custom_lines.iter().find(|l| l.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_raw_fraction_resolve() {
        assert_eq!(RawFraction(2, 8).resolve().unwrap().denominator(), 4);
        assert!(RawFraction(1, 0).resolve().is_none());
        // 1/7 of a whole note is not an integral tick count
        assert!(RawFraction(1, 7).resolve().is_none());
        assert!(RawFraction(1, 7).resolve_ratio().is_some());
    }

    #[test]
    fn test_layers_with_entries_sorted() {
        let doc = DocumentBuilder::new()
            .staff(1, "Flute")
            .measures(1, 4, 1024)
            .voice(1, 1, 2, |v| v.rest(4096))
            .voice(1, 1, 0, |v| v.rest(4096))
            .build();
        assert_eq!(doc.layers_with_entries(SCORE_PART_ID, 1, 1), vec![0, 2]);
        assert!(doc.entries(SCORE_PART_ID, 1, 1, 1).is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let doc = DocumentBuilder::new()
            .staff(7, "Oboe")
            .measures(2, 3, 1024)
            .build();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(doc.to_json().unwrap().as_bytes()).unwrap();

        let loaded = MemoryDocument::from_path(file.path()).unwrap();
        assert_eq!(loaded, doc);
        assert_eq!(loaded.staff(7).unwrap().full_name, "Oboe");
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "staves": [{"id": 1}],
            "measures": [{"id": 1}],
            "smart_shapes": [{
                "id": 4, "shape_type": 15,
                "start": {"staff": 1, "measure": 1},
                "end": {"staff": 1, "measure": 1, "position": [1, 2]}
            }]
        }"#;
        let doc = MemoryDocument::from_json(json).unwrap();
        assert_eq!(doc.staves[0].staff_lines, 5);
        assert_eq!(doc.measures[0].time_sig, SourceTimeSig::default());
        assert_eq!(doc.smart_shapes[0].shape_type, ShapeType::SlurAuto);
        assert_eq!(doc.smart_shapes[0].end.position, RawFraction(1, 2));
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(matches!(
            MemoryDocument::from_json("{\"staves\": 3}"),
            Err(ImportError::Json(_))
        ));
    }
}
