//! Programmatic construction of in-memory documents
//!
//! ```
//! use score_import::source::DocumentBuilder;
//!
//! // One 4/4 measure: a quarter-note triplet of eighths, then a half rest
//! let doc = DocumentBuilder::new()
//!     .staff(1, "Violin")
//!     .measures(1, 4, 1024)
//!     .voice(1, 1, 0, |v| {
//!         v.tuplet(3, 2, 512, |t| t.note(512, &[0]).note(512, &[1]).note(512, &[2]))
//!             .rest(1024)
//!             .rest(2048)
//!     })
//!     .build();
//! assert_eq!(doc.frames[0].entries.len(), 5);
//! ```

use super::model::*;
use super::MemoryDocument;
use crate::fraction::Fraction;

fn edu_fraction(edu: Edu) -> Fraction {
    Fraction::new(i64::from(edu), i64::from(EDU_PER_WHOLE)).unwrap_or(Fraction::ZERO)
}

/// Builds a [`MemoryDocument`]; entry numbers are assigned sequentially
/// from 1 in call order.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    doc: MemoryDocument,
    next_entry: EntryNumber,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            doc: MemoryDocument::default(),
            next_entry: 1,
        }
    }

    pub fn staff(mut self, id: StaffId, name: &str) -> Self {
        self.doc.staves.push(SourceStaff::new(id, name));
        self
    }

    pub fn staff_with(mut self, staff: SourceStaff) -> Self {
        self.doc.staves.push(staff);
        self
    }

    /// Append `count` measures of `beats` beats of `beat_edu` each
    pub fn measures(mut self, count: u32, beats: i64, beat_edu: Edu) -> Self {
        for _ in 0..count {
            let time_sig = SourceTimeSig {
                count: RawFraction::whole(beats),
                beat_edu,
            };
            self = self.measure(time_sig);
        }
        self
    }

    pub fn measure(mut self, time_sig: SourceTimeSig) -> Self {
        let id = self.doc.measures.len() as MeasureId + 1;
        self.doc.measures.push(SourceMeasure { id, time_sig });
        self
    }

    /// Fill one (staff, measure, layer) frame
    pub fn voice<F>(mut self, staff: StaffId, measure: MeasureId, layer: LayerIndex, build: F) -> Self
    where
        F: FnOnce(VoiceBuilder) -> VoiceBuilder,
    {
        let voice = build(VoiceBuilder::new(self.next_entry));
        self.next_entry = voice.next_entry;
        let existing = self.doc.frames.iter_mut().find(|f| {
            f.part == SCORE_PART_ID && f.staff == staff && f.measure == measure && f.layer == layer
        });
        match existing {
            Some(frame) => {
                frame.entries.extend(voice.entries);
                frame.tuplets.extend(voice.tuplets);
            }
            None => self.doc.frames.push(SourceFrame {
                part: SCORE_PART_ID,
                staff,
                measure,
                layer,
                entries: voice.entries,
                tuplets: voice.tuplets,
            }),
        }
        self
    }

    pub fn frame(mut self, frame: SourceFrame) -> Self {
        self.doc.frames.push(frame);
        self
    }

    pub fn layer_attributes(mut self, attributes: LayerAttributes) -> Self {
        self.doc.layer_attributes.push(attributes);
        self
    }

    pub fn multi_staff_group(mut self, group: MultiStaffGroup) -> Self {
        self.doc.multi_staff_groups.push(group);
        self
    }

    pub fn staff_group(mut self, group: SourceStaffGroup) -> Self {
        self.doc.staff_groups.push(group);
        self
    }

    pub fn smart_shape(mut self, shape: SmartShape) -> Self {
        self.doc.smart_shapes.push(shape);
        self
    }

    pub fn custom_line(mut self, line: CustomLine) -> Self {
        self.doc.custom_lines.push(line);
        self
    }

    pub fn build(self) -> MemoryDocument {
        self.doc
    }
}

/// Sequential writer for one layer of one measure.
///
/// Tracks the elapsed position and the tuplet scaling in effect, so that
/// `elapsed` and `actual_duration` of every entry are consistent.
#[derive(Debug)]
pub struct VoiceBuilder {
    entries: Vec<SourceEntry>,
    tuplets: Vec<TupletDescriptor>,
    position: Fraction,
    scale: Fraction,
    next_entry: EntryNumber,
}

impl VoiceBuilder {
    fn new(next_entry: EntryNumber) -> Self {
        Self {
            entries: Vec::new(),
            tuplets: Vec::new(),
            position: Fraction::ZERO,
            scale: Fraction::ONE,
            next_entry,
        }
    }

    fn actual(&self, edu: Edu) -> Fraction {
        edu_fraction(edu)
            .checked_mul(self.scale)
            .unwrap_or(Fraction::ZERO)
    }

    fn push(mut self, duration: Edu, notes: Vec<SourceNote>) -> Self {
        let actual = self.actual(duration);
        let entry = SourceEntry {
            number: self.next_entry,
            duration,
            is_note: !notes.is_empty(),
            notes,
            elapsed: self.position.into(),
            actual_duration: actual.into(),
            float_rest: true,
            ..Default::default()
        };
        self.next_entry += 1;
        self.position = self.position.checked_add(actual).unwrap_or(self.position);
        self.entries.push(entry);
        self
    }

    /// Chord with one note per diatonic level (0 = middle C)
    pub fn note(self, duration: Edu, harm_levs: &[i32]) -> Self {
        let notes = harm_levs
            .iter()
            .enumerate()
            .map(|(i, &lev)| SourceNote::new(i as NoteId + 1, lev, 0))
            .collect();
        self.push(duration, notes)
    }

    pub fn chord(self, duration: Edu, notes: Vec<SourceNote>) -> Self {
        self.push(duration, notes)
    }

    pub fn rest(self, duration: Edu) -> Self {
        self.push(duration, Vec::new())
    }

    /// Advance without writing an entry, leaving a gap
    pub fn skip(mut self, duration: Edu) -> Self {
        let actual = self.actual(duration);
        self.position = self.position.checked_add(actual).unwrap_or(self.position);
        self
    }

    /// Adjust the entry written last
    pub fn with_last<F: FnOnce(&mut SourceEntry)>(mut self, edit: F) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            edit(entry);
        }
        self
    }

    /// `actual` notes in the time of `normal`, each tuplet unit `base_edu` long
    pub fn tuplet<F>(mut self, actual: i64, normal: i64, base_edu: Edu, build: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let start = self.position;
        let outer_scale = self.scale;
        if let Ok(ratio) = Fraction::new(normal, actual) {
            self.scale = outer_scale.checked_mul(ratio).unwrap_or(outer_scale);
        }
        let index = self.tuplets.len();
        self.tuplets.push(TupletDescriptor::new(
            start.into(),
            start.into(),
            RawFraction(actual, normal),
            base_edu,
        ));
        let mut built = build(self);
        built.tuplets[index].end = built.position.into();
        built.scale = outer_scale;
        built
    }
}
