//! Score skeleton and the per-measure entry driver
//!
//! Parts and staves come from the scroll-order staff list (multi-staff
//! instruments become one part), brackets from the staff groups, and
//! measures from the measure table. The driver then walks every staff,
//! measure and layer and hands the entries to the reconciler.

use super::convert;
use super::entries::{build_beams, build_tremolos, EntryImporter, EntryIndex, EntryTarget, LayerMap};
use super::reconciler::{fill_with_invisible_rests, reconcile_voice};
use super::tuplet_map::TupletMap;
use super::PartContext;
use crate::diagnostics::{ImportLogger, SourceLocation};
use crate::errors::{ImportError, ImportResult, ScoreError};
use crate::fraction::Fraction;
use crate::score::{
    staff2track, BracketItem, Clef, Duration, DurationType, MeasureKey, Part, Score, SegmentType, Staff, StaffIndex,
    TimeSig, TimeSignature, VOICES,
};
use crate::source::{DrawBarlineStyle, ForeignDocument, MeasureId, SourceStaff, SourceStaffGroup, StaffId};
use serde::Serialize;
use std::collections::HashMap;

/// Source ids of the skeleton and their destination handles
#[derive(Debug, Default, Clone)]
pub struct ScoreMap {
    staff_ids: HashMap<StaffId, StaffIndex>,
    /// (source id, destination index) in destination staff order
    staves: Vec<(StaffId, StaffIndex)>,
    measures: Vec<(MeasureId, MeasureKey)>,
}

impl ScoreMap {
    pub fn staff_index(&self, id: StaffId) -> Option<StaffIndex> {
        self.staff_ids.get(&id).copied()
    }

    pub fn staff_ids(&self) -> &HashMap<StaffId, StaffIndex> {
        &self.staff_ids
    }

    pub fn staves(&self) -> &[(StaffId, StaffIndex)] {
        &self.staves
    }

    pub fn measure_key(&self, id: MeasureId) -> Option<MeasureKey> {
        self.measures.iter().find(|(m, _)| *m == id).map(|(_, k)| *k)
    }

    pub fn measures(&self) -> &[(MeasureId, MeasureKey)] {
        &self.measures
    }
}

/// Counters reported after an import
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct EntryStats {
    pub placed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub aborted_voices: usize,
    pub beams: usize,
    pub tremolos: usize,
    pub laissez_vibrer: usize,
    pub measure_rests: usize,
}

// ============================================================================
// PARTS AND STAVES
// ============================================================================

fn create_staff(part: usize, source: &SourceStaff, logger: &mut ImportLogger) -> Staff {
    let mut staff = Staff::new(part);
    staff.lines = source.staff_lines;
    staff.default_clef = convert::clef_type(source.first_clef_index);
    staff.transposing_clef = match source.transposed_clef {
        Some(index) => convert::clef_type(index),
        None => staff.default_clef,
    };
    if staff.default_clef.is_none() || staff.transposing_clef.is_none() {
        logger.info(
            SourceLocation::staff(source.id),
            "clef_unsupported",
            "Staff clef not supported, no clef generated",
        );
        staff.default_clef = None;
        staff.transposing_clef = None;
    }
    staff.bar_line_from = convert::barline_offset(source.top_barline_offset);
    staff.bar_line_to = convert::barline_offset(source.bottom_barline_offset);
    staff.hide_when_empty = source.hide_when_empty;
    staff
}

/// One part per single staff or multi-staff instrument, numbered P1, P2, ...
pub fn import_parts(doc: &dyn ForeignDocument, score: &mut Score, logger: &mut ImportLogger) -> ImportResult<ScoreMap> {
    if doc.staves().is_empty() {
        return Err(ImportError::NoStaves);
    }
    let mut map = ScoreMap::default();
    let mut part_number = 0;

    for source in doc.staves() {
        if map.staff_ids.contains_key(&source.id) {
            continue;
        }
        let group = doc.multi_staff_group_of(source.id);
        part_number += 1;

        let (full_name, short_name) = match group {
            Some(g) if !g.full_name.is_empty() => (g.full_name.as_str(), g.abbreviated_name.as_str()),
            _ => (source.full_name.as_str(), source.abbreviated_name.as_str()),
        };
        let part = score.append_part(Part {
            id: format!("P{}", part_number),
            name: convert::part_name(full_name),
            short_name: convert::part_name(short_name),
            staves: Vec::new(),
        });

        let members: Vec<StaffId> = match group {
            Some(g) => g.staves.clone(),
            None => vec![source.id],
        };
        for id in members {
            let Some(member) = doc.staff(id) else {
                logger.warn(
                    SourceLocation::staff(id),
                    "missing_staff",
                    format!("Staff {} of part P{} is not defined", id, part_number),
                );
                continue;
            };
            if map.staff_ids.contains_key(&id) {
                continue;
            }
            let index = score.append_staff(create_staff(part, member, logger))?;
            map.staff_ids.insert(id, index);
            map.staves.push((id, index));
        }
        log::debug!("Part P{} with {} staves", part_number, score.parts()[part].staves.len());
    }
    Ok(map)
}

// ============================================================================
// BRACKETS
// ============================================================================

/// Attach a bracket to the first staff of every staff group.
///
/// A group nested inside another gets the next bracket column.
pub fn import_brackets(doc: &dyn ForeignDocument, score: &mut Score, map: &ScoreMap, logger: &mut ImportLogger) {
    let groups: Vec<(usize, usize, &SourceStaffGroup)> = doc
        .staff_groups()
        .iter()
        .filter_map(|g| match (g.start_slot, g.end_slot) {
            (Some(start), Some(end)) if start <= end => Some((start, end, g)),
            _ => {
                logger.warn(
                    SourceLocation::default(),
                    "bracket_incomplete",
                    "Staff group without start or end slot",
                );
                None
            }
        })
        .collect();

    // Widest first so every enclosing group has its column before its contents
    let mut order: Vec<usize> = (0..groups.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(groups[i].1 - groups[i].0));
    let mut columns = vec![0usize; groups.len()];
    for (n, &i) in order.iter().enumerate() {
        let (start, end, _) = groups[i];
        let column = order[..n]
            .iter()
            .filter(|&&j| {
                let (outer_start, outer_end, _) = groups[j];
                outer_start <= start && end <= outer_end && (outer_start, outer_end) != (start, end)
            })
            .map(|&j| columns[j] + 1)
            .max()
            .unwrap_or(0);
        columns[i] = column;
    }
    order.sort_by_key(|&i| (columns[i], groups[i].0));

    for i in order {
        let (start_slot, end_slot, group) = groups[i];
        let Some(start) = doc.staves().get(start_slot).and_then(|s| map.staff_index(s.id)) else {
            logger.warn(
                SourceLocation::default(),
                "bracket_staff_missing",
                format!("Staff group starts at unknown slot {}", start_slot),
            );
            continue;
        };
        let span = end_slot - start_slot + 1;
        if let Some(kind) = convert::bracket_type(group.bracket) {
            if let Some(staff) = score.staff_mut(start) {
                staff.brackets.push(BracketItem {
                    kind,
                    span,
                    column: columns[i],
                });
            }
        }
        if group.draw_barlines == DrawBarlineStyle::ThroughStaves {
            for index in start..start + span - 1 {
                if let Some(staff) = score.staff_mut(index) {
                    staff.bar_line_to = 0;
                    staff.bar_line_span = true;
                }
            }
        }
    }
}

// ============================================================================
// MEASURES
// ============================================================================

/// Measures end to end, time signatures where the signature changes, and
/// the initial clef of every staff
pub fn import_measures(
    doc: &dyn ForeignDocument,
    score: &mut Score,
    map: &mut ScoreMap,
    logger: &mut ImportLogger,
) -> ImportResult<()> {
    if doc.measures().is_empty() {
        return Err(ImportError::NoMeasures);
    }
    let mut current: Option<TimeSignature> = None;

    for source in doc.measures() {
        let sig = match convert::simplify_time_sig(&source.time_sig) {
            Some(sig) => sig,
            None => {
                logger.warn(
                    SourceLocation::measure(source.id),
                    "time_sig_unsupported",
                    "Time signature cannot be simplified, using 4/4",
                );
                TimeSignature::COMMON
            }
        };
        let tick = score.end_tick();
        let key = score.create_measure(tick, sig)?;
        map.measures.push((source.id, key));

        if current != Some(sig) {
            let segment = score.segment_at(key, SegmentType::TimeSig, tick)?;
            for staff in 0..score.nstaves() {
                score.add_time_sig(
                    segment,
                    TimeSig {
                        segment,
                        track: staff2track(staff),
                        sig,
                    },
                )?;
            }
            current = Some(sig);
        }
    }

    let first = map.measures[0].1;
    for staff in 0..score.nstaves() {
        let Some(kind) = score.staff(staff).and_then(|s| s.default_clef) else {
            continue;
        };
        let segment = score.segment_at(first, SegmentType::HeaderClef, Fraction::ZERO)?;
        score.add_clef(
            segment,
            Clef {
                segment,
                track: staff2track(staff),
                kind,
                visible: true,
                generated: true,
            },
        )?;
    }
    Ok(())
}

// ============================================================================
// ENTRIES
// ============================================================================

/// Walk every staff, measure and layer of the part and place its entries.
///
/// Every placed entry is recorded in `index` for spanner anchoring.
pub fn import_entries(
    doc: &dyn ForeignDocument,
    score: &mut Score,
    map: &ScoreMap,
    ctx: &PartContext<'_>,
    index: &mut EntryIndex,
    logger: &mut ImportLogger,
) -> ImportResult<EntryStats> {
    let mut stats = EntryStats::default();
    let layers = LayerMap::build(doc.layer_attributes(ctx.part_id), logger);
    let mut tuplets = TupletMap::new();
    let mut importer: Option<EntryImporter<'_>> = None;
    let mut current_part = None;

    for &(staff_id, staff) in map.staves() {
        let part = score.staff(staff).map(|s| s.part);
        if part != current_part {
            // ties never cross parts
            if let Some(mut finished) = importer.take() {
                stats.laissez_vibrer += finished.finish_part(score)?;
            }
            current_part = part;
        }
        let part_importer =
            importer.get_or_insert_with(|| EntryImporter::new(map.staff_ids(), &layers, ctx.options.import_ties));

        for &(measure_id, measure) in map.measures() {
            let location = SourceLocation::new(staff_id, measure_id);
            let (measure_tick, measure_len) = score
                .measure(measure)
                .map(|m| (m.tick, m.ticks))
                .ok_or(ImportError::MissingMeasure(measure_id))?;

            for layer in doc.layers_with_entries(ctx.part_id, staff_id, measure_id) {
                let Some(voice) = layers.voice(layer) else {
                    logger.warn(
                        location,
                        "layer_unmapped",
                        format!("Layer {} was not mapped to a voice", layer + 1),
                    );
                    continue;
                };
                let track = staff2track(staff) + voice;
                let entries = doc.entries(ctx.part_id, staff_id, measure_id, layer);
                tuplets.rebuild(
                    doc.tuplets(ctx.part_id, staff_id, measure_id, layer),
                    measure_len,
                    logger,
                    location,
                );
                // a measure change during reconciliation rebuilds the map
                let tremolo_spans = tuplets.tremolos().to_vec();

                let target = EntryTarget {
                    staff,
                    track,
                    layer,
                    location,
                };
                let pass = reconcile_voice(score, &mut tuplets, part_importer, measure, entries, target, logger)?;
                for (entry, key) in &pass.placed {
                    index.insert(score, entry, *key);
                }
                stats.placed += pass.placed.len();
                stats.skipped += pass.skipped;
                stats.failed += pass.failed;
                stats.aborted_voices += usize::from(pass.aborted);

                let position = pass.cursor.expected_position;
                let same_measure = pass.cursor.measure_start_tick == measure_tick;
                if ctx.options.fill_trailing_gaps && same_measure && position < measure_len && !pass.placed.is_empty() {
                    let tail = measure_len.checked_sub(position)?;
                    if let Err(err) = fill_with_invisible_rests(
                        score,
                        &mut tuplets,
                        measure,
                        position,
                        track,
                        tail,
                        location,
                        logger,
                    ) {
                        logger.warn(location, "trailing_fill_failed", err.to_string());
                    }
                }
                if !tremolo_spans.is_empty() {
                    stats.tremolos += build_tremolos(score, &tremolo_spans, measure, track, location, logger)?;
                }
                if ctx.options.import_beams {
                    stats.beams += build_beams(score, track, &pass.placed)?;
                }
            }

            if ctx.options.ensure_voice_one && score.chord_rests_on_track(measure, staff2track(staff)).is_empty() {
                add_measure_rest(score, measure, staff)?;
                stats.measure_rests += 1;
            }
        }
    }
    if let Some(mut finished) = importer {
        stats.laissez_vibrer += finished.finish_part(score)?;
    }
    log::info!(
        "Placed {} entries ({} skipped, {} failed) on {} staves",
        stats.placed,
        stats.skipped,
        stats.failed,
        map.staves().len()
    );
    Ok(stats)
}

/// Visible rest filling the whole measure on the first voice of `staff`
fn add_measure_rest(score: &mut Score, measure: MeasureKey, staff: StaffIndex) -> ImportResult<()> {
    let (tick, len) = score
        .measure(measure)
        .map(|m| (m.tick, m.ticks))
        .ok_or(ScoreError::StaleHandle("measure"))?;
    let duration = match convert::decompose_duration(len) {
        (parts, rest) if parts.len() == 1 && rest.is_zero() => parts[0],
        _ => Duration::plain(DurationType::Whole),
    };
    let mut rest = Score::create_rest(duration);
    rest.ticks = len;
    let segment = score.segment_at(measure, SegmentType::ChordRest, tick)?;
    score.add_chord_rest(segment, staff * VOICES, rest, Vec::new())?;
    Ok(())
}
