//! Whole-document imports: skeleton, voices, ties, beams, spanners, options
//! and rollback.

use score_import::score::{
    BeamMode, BracketType, ChordRestKind, ClefType, Direction, ElementRef, SegmentType, SpannerKind, TieKind,
};
use score_import::source::{
    BracketStyle, ClefChange, DocumentBuilder, LayerAttributes, MemoryDocument, MultiStaffGroup, RawFraction,
    ShapeType, SmartShape, SourceNote, SourceStaffGroup, Termination, SCORE_PART_ID,
};
use score_import::{import_document, Fraction, ImportOptions, ImportOutcome, Score};

fn frac(n: i64, d: i64) -> Fraction {
    Fraction::new(n, d).unwrap()
}

fn import(doc: &MemoryDocument) -> ImportOutcome {
    import_document(doc, &ImportOptions::default()).expect("import should succeed")
}

fn chord_direction(score: &Score, track: usize) -> Vec<Direction> {
    score
        .chord_rests()
        .filter(|(_, cr)| cr.track == track)
        .filter_map(|(_, cr)| match &cr.kind {
            ChordRestKind::Chord(chord) => Some(chord.stem_direction),
            ChordRestKind::Rest(_) => None,
        })
        .collect()
}

fn slur(id: u32, start: Termination, end: Termination) -> SmartShape {
    SmartShape {
        id,
        part: SCORE_PART_ID,
        shape_type: ShapeType::SlurAuto,
        entry_based: true,
        hidden: false,
        start,
        end,
        start_note_id: None,
        end_note_id: None,
        line_id: None,
    }
}

/// Flute on one staff, piano on two; the piano is braced
fn ensemble() -> DocumentBuilder {
    DocumentBuilder::new()
        .staff(1, "Flute")
        .staff(2, "Piano")
        .staff(3, "")
        .multi_staff_group(MultiStaffGroup {
            id: 1,
            staves: vec![2, 3],
            full_name: "Piano".into(),
            abbreviated_name: "Pno.".into(),
        })
        .staff_group(SourceStaffGroup {
            start_slot: Some(1),
            end_slot: Some(2),
            bracket: BracketStyle::PianoBrace,
            ..Default::default()
        })
        .measures(2, 4, 1024)
}

#[test]
fn test_skeleton_of_ensemble() {
    let doc = ensemble().build();
    let outcome = import(&doc);
    let score = &outcome.score;

    assert_eq!(score.parts().len(), 2);
    assert_eq!(score.parts()[1].short_name, "Pno.");
    assert_eq!(score.nstaves(), 3);
    let brace = &score.staff(1).unwrap().brackets[0];
    assert_eq!((brace.kind, brace.span), (BracketType::Brace, 2));
    assert_eq!(score.measure_keys().len(), 2);
    // every empty measure of every staff gets a visible full-measure rest
    assert_eq!(outcome.stats.entries.measure_rests, 6);
    assert_eq!(score.time_sigs().count(), 3);
    assert_eq!(score.clefs().count(), 3);
}

#[test]
fn test_layers_map_to_voices() {
    let doc = DocumentBuilder::new()
        .staff(1, "Piano")
        .measures(1, 4, 1024)
        .layer_attributes(LayerAttributes {
            layer: 0,
            freeze_layer: true,
            freeze_stems_up: true,
        })
        .layer_attributes(LayerAttributes {
            layer: 1,
            freeze_layer: true,
            freeze_stems_up: false,
        })
        .voice(1, 1, 0, |v| v.note(4096, &[7]))
        .voice(1, 1, 1, |v| v.note(2048, &[0]).note(2048, &[2]))
        .voice(1, 1, 2, |v| v.note(4096, &[4]))
        .build();
    let score = import(&doc).score;

    assert_eq!(score.chord_rests().filter(|(_, cr)| cr.track == 0).count(), 1);
    assert_eq!(score.chord_rests().filter(|(_, cr)| cr.track == 1).count(), 2);
    // the unattributed layer takes the first free voice
    assert_eq!(score.chord_rests().filter(|(_, cr)| cr.track == 2).count(), 1);
    assert_eq!(chord_direction(&score, 0), vec![Direction::Auto]);
}

#[test]
fn test_forced_stems_follow_entry_flags() {
    let doc = DocumentBuilder::new()
        .staff(1, "Flute")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(2048, &[0])
                .with_last(|e| {
                    e.freeze_stem = true;
                    e.up_stem = false;
                })
                .note(2048, &[1])
        })
        .build();
    let score = import(&doc).score;
    let mut directions = chord_direction(&score, 0);
    directions.sort_by_key(|d| *d as u8);
    assert_eq!(directions, vec![Direction::Auto, Direction::Down]);
}

#[test]
fn test_ties_across_barline_and_laissez_vibrer() {
    let doc = DocumentBuilder::new()
        .staff(1, "Flute")
        .measures(2, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(2048, &[0]).note(2048, &[2]).with_last(|e| e.notes[0].tie_start = true)
        })
        .voice(1, 2, 0, |v| {
            v.note(2048, &[2])
                .with_last(|e| e.notes[0].tie_end = true)
                .note(2048, &[4])
                .with_last(|e| e.notes[0].tie_start = true)
        })
        .build();
    let outcome = import(&doc);
    let ties: Vec<_> = outcome.score.ties().map(|(_, t)| t.clone()).collect();

    assert_eq!(ties.len(), 2);
    let tie = ties.iter().find(|t| t.kind == TieKind::Tie).unwrap();
    let start = outcome.score.element_tick(ElementRef::Note(tie.start_note)).unwrap();
    let end = outcome.score.element_tick(ElementRef::Note(tie.end_note.unwrap())).unwrap();
    assert_eq!((start, end), (frac(1, 2), Fraction::ONE));
    assert!(ties.iter().any(|t| t.kind == TieKind::LaissezVib && t.end_note.is_none()));
    assert_eq!(outcome.stats.entries.laissez_vibrer, 1);
}

#[test]
fn test_beam_groups() {
    let doc = DocumentBuilder::new()
        .staff(1, "Flute")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(512, &[0])
                .with_last(|e| e.beam_start = true)
                .note(512, &[1])
                .note(512, &[2])
                .with_last(|e| e.sec_beam_break = Some(1))
                .note(512, &[3])
                .note(2048, &[4])
        })
        .build();
    let outcome = import(&doc);
    let score = &outcome.score;

    assert_eq!(score.beams().count(), 1);
    let (_, beam) = score.beams().next().unwrap();
    let modes: Vec<BeamMode> = beam
        .elements
        .iter()
        .map(|k| score.chord_rest(*k).unwrap().beam_mode)
        .collect();
    assert_eq!(modes, vec![BeamMode::Begin, BeamMode::Mid, BeamMode::Begin16, BeamMode::End]);
    assert_eq!(outcome.stats.entries.beams, 1);
}

#[test]
fn test_clef_change_mid_measure() {
    let doc = DocumentBuilder::new()
        .staff(1, "Cello")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(1024, &[0])
                .note(1024, &[1])
                .with_last(|e| {
                    e.clef_change = Some(ClefChange {
                        clef_index: 3,
                        hidden: false,
                        generated: false,
                    })
                })
                .note(2048, &[2])
        })
        .build();
    let score = import(&doc).score;

    let mut clefs: Vec<(Fraction, SegmentType, ClefType)> = score
        .clefs()
        .map(|(_, c)| {
            let segment = score.segment(c.segment).unwrap();
            (segment.tick, segment.kind, c.kind)
        })
        .collect();
    clefs.sort_by_key(|(tick, _, _)| *tick);
    assert_eq!(
        clefs,
        vec![
            (Fraction::ZERO, SegmentType::HeaderClef, ClefType::G),
            (frac(1, 2), SegmentType::Clef, ClefType::F),
        ]
    );
}

#[test]
fn test_cross_staff_chord() {
    let doc = ensemble()
        .voice(2, 1, 0, |v| {
            v.chord(4096, vec![SourceNote {
                cross_staff: Some(3),
                ..SourceNote::new(1, -5, 0)
            }])
        })
        .build();
    let score = import(&doc).score;
    let (_, chord) = score.chord_rests().find(|(_, cr)| cr.track == 4 && !cr.is_rest()).unwrap();
    match &chord.kind {
        ChordRestKind::Chord(c) => assert_eq!(c.staff_move, 1),
        ChordRestKind::Rest(_) => panic!("expected a chord"),
    }
}

#[test]
fn test_bare_time_slur_dropped_while_others_import() {
    let doc = DocumentBuilder::new()
        .staff(1, "Flute")
        .measures(2, 4, 1024)
        .voice(1, 1, 0, |v| v.note(2048, &[0]).note(2048, &[1]))
        .smart_shape(slur(1, Termination::entry(1, 1, 1), Termination::entry(1, 1, 2)))
        .smart_shape(SmartShape {
            entry_based: false,
            ..slur(
                2,
                Termination::at(1, 2, RawFraction(1, 4)),
                Termination::at(1, 2, RawFraction(3, 4)),
            )
        })
        .smart_shape(SmartShape {
            shape_type: ShapeType::Crescendo,
            entry_based: false,
            ..slur(
                3,
                Termination::at(1, 2, RawFraction(1, 4)),
                Termination::at(1, 2, RawFraction(3, 4)),
            )
        })
        .build();
    let outcome = import(&doc);

    assert_eq!(outcome.stats.shapes.created, 2);
    assert_eq!(outcome.stats.shapes.dropped, 1);
    let kinds: Vec<SpannerKind> = outcome.score.spanners().map(|(_, s)| s.kind).collect();
    assert!(kinds.contains(&SpannerKind::Slur));
    assert!(kinds.contains(&SpannerKind::Hairpin));
    let dropped: Vec<_> = outcome.diagnostics.of_kind("spanner_dropped").collect();
    assert_eq!(dropped.len(), 1);
    assert!(dropped[0].message.contains("shape 2"), "{}", dropped[0].message);
}

#[test]
fn test_options_switch_stages_off() {
    let doc = DocumentBuilder::new()
        .staff(1, "Flute")
        .measures(1, 4, 1024)
        .voice(1, 1, 0, |v| {
            v.note(512, &[0])
                .with_last(|e| {
                    e.beam_start = true;
                    e.notes[0].tie_start = true;
                })
                .note(512, &[0])
                .with_last(|e| e.notes[0].tie_end = true)
        })
        .smart_shape(slur(1, Termination::entry(1, 1, 1), Termination::entry(1, 1, 2)))
        .build();
    let options = ImportOptions {
        import_beams: false,
        import_ties: false,
        import_smart_shapes: false,
        fill_trailing_gaps: false,
        ..Default::default()
    };
    let score = import_document(&doc, &options).unwrap().score;

    assert_eq!(score.beams().count(), 0);
    assert_eq!(score.ties().count(), 0);
    assert_eq!(score.spanners().count(), 0);
    // no filler after the two eighths
    assert_eq!(score.chord_rests().count(), 2);

    let full = import(&doc).score;
    assert_eq!(full.beams().count(), 1);
    assert_eq!(full.ties().count(), 1);
    assert_eq!(full.spanners().count(), 1);
}

#[test]
fn test_whole_import_is_one_undo_step() {
    let doc = ensemble()
        .voice(1, 1, 0, |v| {
            v.tuplet(3, 2, 512, |t| t.note(512, &[0]).note(512, &[1]).note(512, &[2]))
                .note(1024, &[3])
                .rest(2048)
        })
        .smart_shape(slur(1, Termination::entry(1, 1, 1), Termination::entry(1, 1, 4)))
        .build();
    let mut score = import(&doc).score;
    assert!(score.chord_rests().count() > 0);
    assert!(score.can_undo());

    assert!(score.undo_last_batch().unwrap());
    assert_eq!(score.parts().len(), 0);
    assert_eq!(score.nstaves(), 0);
    assert!(score.measure_keys().is_empty());
    assert_eq!(score.chord_rests().count(), 0);
    assert_eq!(score.tuplets().count(), 0);
    assert_eq!(score.spanners().count(), 0);
    assert!(!score.can_undo());
}

#[test]
fn test_empty_documents_are_rejected() {
    let no_staves = DocumentBuilder::new().measures(1, 4, 1024).build();
    assert!(matches!(
        import_document(&no_staves, &ImportOptions::default()),
        Err(score_import::ImportError::NoStaves)
    ));
    let no_measures = DocumentBuilder::new().staff(1, "Flute").build();
    assert!(matches!(
        import_document(&no_measures, &ImportOptions::default()),
        Err(score_import::ImportError::NoMeasures)
    ));
}
