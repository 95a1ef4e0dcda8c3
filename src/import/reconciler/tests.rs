use super::*;
use crate::import::entries::LayerMap;
use crate::score::{ChordRestKind, ElementRef, Part, Staff, TimeSignature, TupletMember};
use crate::source::{DocumentBuilder, MemoryDocument, RawFraction, StaffId};
use std::collections::HashMap;

fn frac(n: i64, d: i64) -> Fraction {
    Fraction::new(n, d).unwrap()
}

struct Fixture {
    score: Score,
    measures: Vec<MeasureKey>,
    doc: MemoryDocument,
}

impl Fixture {
    fn new(measures: usize, doc: MemoryDocument) -> Self {
        let mut score = Score::new();
        let part = score.append_part(Part {
            id: "P1".into(),
            name: "Violin".into(),
            short_name: String::new(),
            staves: Vec::new(),
        });
        score.append_staff(Staff::new(part)).unwrap();
        let mut keys = Vec::new();
        for _ in 0..measures {
            let tick = score.end_tick();
            keys.push(score.create_measure(tick, TimeSignature::COMMON).unwrap());
        }
        Self {
            score,
            measures: keys,
            doc,
        }
    }

    fn run(&mut self, measure: usize) -> (VoicePassSummary, ImportLogger) {
        let ids: HashMap<StaffId, usize> = [(1, 0)].into_iter().collect();
        let layers = LayerMap::default();
        let mut importer = EntryImporter::new(&ids, &layers, true);
        let mut logger = ImportLogger::default();
        let frame = &self.doc.frames[measure];
        let mut map = TupletMap::new();
        let len = self.score.measure(self.measures[measure]).unwrap().ticks;
        map.rebuild(&frame.tuplets, len, &mut logger, SourceLocation::default());

        let target = EntryTarget {
            staff: 0,
            track: 0,
            layer: 0,
            location: SourceLocation::new(1, measure as u32 + 1),
        };
        let pass = reconcile_voice(
            &mut self.score,
            &mut map,
            &mut importer,
            self.measures[measure],
            &frame.entries,
            target,
            &mut logger,
        )
        .unwrap();
        let summary = VoicePassSummary {
            placed: pass.placed.iter().map(|(_, k)| *k).collect(),
            skipped: pass.skipped,
            failed: pass.failed,
            aborted: pass.aborted,
            position: pass.cursor.expected_position,
            measure_start: pass.cursor.measure_start_tick,
            state: pass.state,
        };
        (summary, logger)
    }

    fn track_content(&self, measure: usize) -> Vec<(Fraction, Fraction, bool)> {
        self.score
            .chord_rests_on_track(self.measures[measure], 0)
            .into_iter()
            .map(|k| {
                let cr = self.score.chord_rest(k).unwrap();
                let tick = self.score.element_tick(ElementRef::ChordRest(k)).unwrap();
                (tick, cr.ticks, cr.visible)
            })
            .collect()
    }
}

struct VoicePassSummary {
    placed: Vec<ChordRestKey>,
    skipped: usize,
    failed: usize,
    aborted: bool,
    position: Fraction,
    measure_start: Fraction,
    state: ReconcilerState,
}

#[test]
fn test_triplet_creates_one_tuplet() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.tuplet(3, 2, 512, |t| t.note(512, &[0]).note(512, &[1]).note(512, &[2]))
                .rest(1024)
                .rest(2048)
        })
        .build();
    let mut fixture = Fixture::new(1, doc);
    let (pass, _) = fixture.run(0);

    assert_eq!(pass.placed.len(), 5);
    assert_eq!(pass.state, ReconcilerState::Done);
    assert_eq!(pass.position, Fraction::ONE);

    let tuplets: Vec<_> = fixture.score.tuplets().collect();
    assert_eq!(tuplets.len(), 1);
    let (tuplet_key, tuplet) = tuplets[0];
    assert_eq!(tuplet.ratio, frac(3, 2));
    assert_eq!(tuplet.ticks, frac(1, 4));
    assert_eq!(tuplet.elements.len(), 3);

    for (i, key) in pass.placed[..3].iter().enumerate() {
        let cr = fixture.score.chord_rest(*key).unwrap();
        assert_eq!(cr.tuplet, Some(tuplet_key));
        assert_eq!(cr.ticks, frac(1, 12));
        let tick = fixture.score.element_tick(ElementRef::ChordRest(*key)).unwrap();
        assert_eq!(tick, frac(i as i64, 12));
        assert!(tick < frac(1, 4));
    }
    assert!(fixture.score.chord_rest(pass.placed[3]).unwrap().tuplet.is_none());
}

#[test]
fn test_nested_tuplet_gets_parent() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.tuplet(3, 2, 1024, |outer| {
                outer
                    .tuplet(5, 4, 256, |inner| {
                        inner
                            .note(256, &[0])
                            .note(256, &[1])
                            .note(256, &[2])
                            .note(256, &[3])
                            .note(256, &[4])
                    })
                    .note(1024, &[5])
                    .note(1024, &[6])
            })
            .rest(2048)
        })
        .build();
    let mut fixture = Fixture::new(1, doc);
    let (pass, _) = fixture.run(0);
    assert_eq!(pass.failed, 0);

    let outer = fixture.score.tuplets().find(|(_, t)| t.parent.is_none()).unwrap().0;
    let (inner_key, inner) = fixture.score.tuplets().find(|(_, t)| t.parent.is_some()).unwrap();
    assert_eq!(inner.parent, Some(outer));
    assert!(fixture
        .score
        .tuplet(outer)
        .unwrap()
        .elements
        .contains(&TupletMember::Tuplet(inner_key)));

    let first = fixture.score.chord_rest(pass.placed[0]).unwrap();
    assert_eq!(first.tuplet, Some(inner_key));
    assert_eq!(first.ticks, frac(1, 30));
    let sixth = fixture.score.chord_rest(pass.placed[5]).unwrap();
    assert_eq!(sixth.tuplet, Some(outer));
    assert_eq!(
        fixture.score.element_tick(ElementRef::ChordRest(pass.placed[5])),
        Some(frac(1, 6))
    );
}

#[test]
fn test_gap_is_filled_with_invisible_rest() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| v.note(1024, &[0]).skip(512).note(512, &[1]).note(2048, &[2]))
        .build();
    let mut fixture = Fixture::new(1, doc);
    let (pass, logger) = fixture.run(0);

    assert_eq!(pass.placed.len(), 3);
    assert_eq!(logger.diagnostics().of_kind("gap_filled").count(), 1);
    assert_eq!(
        fixture.track_content(0),
        vec![
            (Fraction::ZERO, frac(1, 4), true),
            (frac(1, 4), frac(1, 8), false),
            (frac(3, 8), frac(1, 8), true),
            (frac(1, 2), frac(1, 2), true),
        ]
    );
}

#[test]
fn test_expected_position_never_decreases() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.skip(256)
                .note(256, &[0])
                .tuplet(5, 4, 256, |t| t.note(256, &[1]).skip(512).note(512, &[2]))
                .note(1024, &[3])
        })
        .build();
    let mut fixture = Fixture::new(1, doc);
    fixture.run(0);

    let content = fixture.track_content(0);
    let mut end = Fraction::ZERO;
    for (tick, ticks, _) in &content {
        assert_eq!(*tick, end, "no overlap and no hole");
        end = tick.checked_add(*ticks).unwrap();
    }
    assert_eq!(end, frac(5, 8));
}

#[test]
fn test_grace_and_voice_two_are_skipped() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(4096, &[0])
                .note(256, &[5])
                .with_last(|e| {
                    e.grace_index = 1;
                    e.elapsed = RawFraction(0, 1);
                    e.actual_duration = RawFraction(0, 1);
                })
                .note(1024, &[2])
                .with_last(|e| {
                    e.voice2 = true;
                    e.elapsed = RawFraction(0, 1);
                })
        })
        .build();
    let mut fixture = Fixture::new(1, doc);
    let (pass, logger) = fixture.run(0);
    assert_eq!(pass.placed.len(), 1);
    assert_eq!(pass.skipped, 2);
    assert_eq!(logger.diagnostics().of_kind("grace_skipped").count(), 1);
    assert_eq!(logger.diagnostics().of_kind("voice2_skipped").count(), 1);
}

#[test]
fn test_unknown_position_aborts_voice() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(1024, &[0])
                .note(1024, &[1])
                .with_last(|e| e.elapsed = RawFraction(1, 0))
                .note(1024, &[2])
        })
        .build();
    let mut fixture = Fixture::new(1, doc);
    let (pass, logger) = fixture.run(0);
    assert!(pass.aborted);
    assert_eq!(pass.placed.len(), 1);
    assert_eq!(logger.diagnostics().of_kind("voice_aborted").count(), 1);
}

#[test]
fn test_entry_behind_cursor_is_rejected() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(2048, &[0])
                .note(1024, &[1])
                .with_last(|e| e.elapsed = RawFraction(1, 4))
                .note(1024, &[2])
        })
        .build();
    let mut fixture = Fixture::new(1, doc);
    let (pass, logger) = fixture.run(0);
    assert_eq!(pass.failed, 1);
    assert_eq!(pass.placed.len(), 2);
    assert_eq!(logger.diagnostics().of_kind("entry_failed").count(), 1);
    // the third entry starts at 3/4, after a filled gap
    assert_eq!(logger.diagnostics().of_kind("gap_filled").count(), 1);
    assert_eq!(pass.position, Fraction::ONE);
}

#[test]
fn test_measure_start_entry_after_cursor_moves_to_next_measure() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(2, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(1024, &[0])
                .note(2048, &[1])
                .with_last(|e| e.elapsed = RawFraction(0, 1))
        })
        .build();
    let mut fixture = Fixture::new(2, doc);
    let (pass, logger) = fixture.run(0);

    assert_eq!(pass.placed.len(), 2);
    assert_eq!(logger.diagnostics().of_kind("measure_boundary").count(), 1);
    assert_eq!(pass.measure_start, Fraction::ONE);
    assert_eq!(pass.position, frac(1, 2));

    // measure 1 tail is filled, the late entry opens measure 2
    let first = fixture.track_content(0);
    assert_eq!(first.len(), 2);
    assert_eq!(first[1], (frac(1, 4), frac(3, 4), false));
    let second = fixture.track_content(1);
    assert_eq!(second, vec![(Fraction::ONE, frac(1, 2), true)]);
}

#[test]
fn test_late_entry_after_tuplet_does_not_join_it() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(2, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.tuplet(3, 2, 512, |t| t.note(512, &[0]).note(512, &[1]).note(512, &[2]))
                .note(2048, &[3])
                .with_last(|e| e.elapsed = RawFraction(0, 1))
        })
        .build();
    let mut fixture = Fixture::new(2, doc);
    let (pass, logger) = fixture.run(0);

    assert_eq!(logger.diagnostics().of_kind("measure_boundary").count(), 1);
    assert_eq!(pass.measure_start, Fraction::ONE);
    let tuplets: Vec<_> = fixture.score.tuplets().collect();
    assert_eq!(tuplets.len(), 1);
    assert_eq!(tuplets[0].1.elements.len(), 3);

    let late = *pass.placed.last().unwrap();
    assert_eq!(fixture.score.chord_rest(late).unwrap().tuplet, None);
    assert_eq!(fixture.score.element_tick(ElementRef::ChordRest(late)).unwrap(), Fraction::ONE);
    assert_eq!(fixture.track_content(1), vec![(Fraction::ONE, frac(1, 2), true)]);
}

fn triplet_with_base(base_edu: i32) -> MemoryDocument {
    let mut doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.tuplet(3, 2, 512, |t| t.note(512, &[0]).note(512, &[1]).note(512, &[2]))
                .rest(1024)
                .rest(2048)
        })
        .build();
    doc.frames[0].tuplets[0].base_duration = base_edu;
    doc
}

#[test]
fn test_inconsistent_tuplet_is_reported_and_kept() {
    // a quarter base makes the triplet half a measure long, but it spans a beat
    let mut fixture = Fixture::new(1, triplet_with_base(1024));
    let (pass, logger) = fixture.run(0);

    assert_eq!(logger.diagnostics().of_kind("tuplet_corrupt").count(), 1);
    let tuplets: Vec<_> = fixture.score.tuplets().collect();
    assert_eq!(tuplets.len(), 1);
    assert_eq!(tuplets[0].1.elements.len(), 3);
    assert_eq!(pass.position, Fraction::ONE);
}

#[test]
fn test_tuplet_with_unsupported_base_is_not_created() {
    let mut fixture = Fixture::new(1, triplet_with_base(1280));
    let (pass, logger) = fixture.run(0);

    assert!(logger.diagnostics().of_kind("tuplet_base_unsupported").count() > 0);
    assert_eq!(fixture.score.tuplets().count(), 0);
    for key in &pass.placed[..3] {
        assert_eq!(fixture.score.chord_rest(*key).unwrap().tuplet, None);
    }
}

#[test]
fn test_unsupported_duration_becomes_filler() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| v.note(1280, &[0]).note(1024, &[1]))
        .build();
    let mut fixture = Fixture::new(1, doc);
    let (pass, logger) = fixture.run(0);

    assert_eq!(pass.failed, 1);
    assert_eq!(logger.diagnostics().of_kind("unsupported_duration").count(), 1);
    let content = fixture.track_content(0);
    assert!(content[..content.len() - 1].iter().all(|(_, _, visible)| !visible));
    assert_eq!(content.last().unwrap(), &(frac(5, 16), frac(1, 4), true));
}

#[test]
fn test_clef_change_after_entry() {
    let doc = DocumentBuilder::new()
        .staff(1, "Cello")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(2048, &[0])
                .with_last(|e| {
                    e.clef_change = Some(crate::source::ClefChange {
                        clef_index: 3,
                        hidden: false,
                        generated: false,
                    })
                })
                .note(2048, &[-12])
        })
        .build();
    let mut fixture = Fixture::new(1, doc);
    fixture.run(0);

    let clefs: Vec<_> = fixture.score.clefs().map(|(_, c)| c.clone()).collect();
    assert_eq!(clefs.len(), 1);
    assert_eq!(clefs[0].kind, crate::score::ClefType::F);
    let segment = fixture.score.segment(clefs[0].segment).unwrap();
    assert_eq!(segment.kind, SegmentType::Clef);
    assert_eq!(segment.tick, frac(1, 2));
}

#[test]
fn test_fixed_rest_survives_placement() {
    let doc = DocumentBuilder::new()
        .staff(1, "Violin")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.rest(4096).with_last(|e| {
                e.float_rest = false;
                e.notes = vec![crate::source::SourceNote::new(0, 4, 0)];
            })
        })
        .build();
    let mut fixture = Fixture::new(1, doc);
    let (pass, _) = fixture.run(0);
    let rest = fixture.score.chord_rest(pass.placed[0]).unwrap();
    assert!(matches!(rest.kind, ChordRestKind::Rest(ref r) if r.fixed_line == Some(4)));
}
