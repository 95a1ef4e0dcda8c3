//! Invisible rests for time a voice does not account for

use super::ensure_tuplet;
use crate::diagnostics::{ImportLogger, SourceLocation};
use crate::errors::{EntryError, ScoreError};
use crate::fraction::Fraction;
use crate::import::convert;
use crate::import::tuplet_map::TupletMap;
use crate::score::{ChordRestKey, Duration, DurationType, MeasureKey, Score, SegmentType, TrackIndex};

/// Fill `[start, start + length)` of `measure` on `track` with invisible rests.
///
/// `start` is measure-relative. Each piece of the span is scaled by the
/// tuplets covering it, so the rests read as regular durations inside their
/// tuplet while their actual lengths add up to exactly `length`. The span is
/// clipped to the measure.
#[allow(clippy::too_many_arguments)]
pub fn fill_with_invisible_rests(
    score: &mut Score,
    map: &mut TupletMap<'_>,
    measure: MeasureKey,
    start: Fraction,
    track: TrackIndex,
    length: Fraction,
    location: SourceLocation,
    logger: &mut ImportLogger,
) -> Result<Vec<ChordRestKey>, EntryError> {
    if length.is_negative() {
        return Err(EntryError::NegativeGap { length });
    }
    let mut rests = Vec::new();
    if length.is_zero() {
        return Ok(rests);
    }
    let measure_tick = score
        .measure(measure)
        .map(|m| m.tick)
        .ok_or(ScoreError::StaleHandle("measure"))?;
    let requested = start.checked_add(length)?;
    let end = requested.min(map.measure_len());
    if end < requested {
        logger.warn(
            location,
            "gap_clipped",
            format!("Filler from {} clipped by {} at the end of the measure", start, requested.checked_sub(end)?),
        );
    }

    for interval in map.bottom_intervals() {
        let piece_start = interval.start.max(start);
        let piece_end = interval.end.min(end);
        if piece_start >= piece_end {
            continue;
        }
        let tuplet = if interval.index == 0 {
            None
        } else {
            ensure_tuplet(score, map, interval.index, measure, track, location, logger)?
        };

        let actual = piece_end.checked_sub(piece_start)?;
        let nominal = actual.checked_mul(interval.ratio)?;
        let (mut durations, remainder) = convert::decompose_duration(nominal);
        if durations.is_empty() {
            durations.push(Duration::plain(DurationType::D1024th));
        } else if !remainder.is_zero() {
            logger.debug(
                location,
                "irregular_rest",
                format!("Filler of {} ends with an irregular rest", actual),
            );
        }

        let mut position = piece_start;
        let last = durations.len() - 1;
        for (i, duration) in durations.into_iter().enumerate() {
            let ticks = if i == last {
                piece_end.checked_sub(position)?
            } else {
                duration.fraction()?.checked_div(interval.ratio)?
            };
            let mut rest = Score::create_rest(duration);
            rest.visible = false;
            rest.ticks = ticks;

            let segment = score.segment_at(measure, SegmentType::ChordRest, measure_tick.checked_add(position)?)?;
            let key = score.add_chord_rest(segment, track, rest, Vec::new())?;
            if let Some(tuplet) = tuplet {
                score.add_to_tuplet(tuplet, key)?;
            }
            rests.push(key);
            position = position.checked_add(ticks)?;
        }
    }
    Ok(rests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Part, Staff, TimeSignature};
    use crate::source::{RawFraction, TupletDescriptor};

    fn frac(n: i64, d: i64) -> Fraction {
        Fraction::new(n, d).unwrap()
    }

    fn one_staff() -> (Score, MeasureKey) {
        let mut score = Score::new();
        let part = score.append_part(Part {
            id: "P1".into(),
            name: String::new(),
            short_name: String::new(),
            staves: Vec::new(),
        });
        score.append_staff(Staff::new(part)).unwrap();
        let m = score.create_measure(Fraction::ZERO, TimeSignature::COMMON).unwrap();
        (score, m)
    }

    fn here() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    #[test]
    fn test_plain_gap_is_one_eighth() {
        let (mut score, m) = one_staff();
        let mut map = TupletMap::new();
        let mut logger = ImportLogger::default();
        map.rebuild(&[], Fraction::ONE, &mut logger, SourceLocation::default());

        let rests = fill_with_invisible_rests(
            &mut score,
            &mut map,
            m,
            frac(1, 4),
            0,
            frac(1, 8),
            here(),
            &mut logger,
        )
        .unwrap();
        assert_eq!(rests.len(), 1);
        let rest = score.chord_rest(rests[0]).unwrap();
        assert!(!rest.visible);
        assert_eq!(rest.duration, Duration::plain(DurationType::Eighth));
        assert_eq!(score.element_tick(crate::score::ElementRef::ChordRest(rests[0])), Some(frac(1, 4)));
    }

    #[test]
    fn test_zero_and_negative_length() {
        let (mut score, m) = one_staff();
        let mut map = TupletMap::new();
        let mut logger = ImportLogger::default();
        map.rebuild(&[], Fraction::ONE, &mut logger, SourceLocation::default());

        let none = fill_with_invisible_rests(&mut score, &mut map, m, Fraction::ZERO, 0, Fraction::ZERO, here(), &mut logger);
        assert!(none.unwrap().is_empty());
        let negative = fill_with_invisible_rests(&mut score, &mut map, m, Fraction::ZERO, 0, frac(-1, 4), here(), &mut logger);
        assert!(matches!(negative, Err(EntryError::NegativeGap { .. })));
        assert_eq!(score.chord_rests().count(), 0);
    }

    #[test]
    fn test_gap_inside_triplet_uses_tuplet() {
        let (mut score, m) = one_staff();
        let descriptors = vec![TupletDescriptor::new(
            RawFraction(0, 1),
            RawFraction(1, 4),
            RawFraction(3, 2),
            512,
        )];
        let mut map = TupletMap::new();
        let mut logger = ImportLogger::default();
        map.rebuild(&descriptors, Fraction::ONE, &mut logger, SourceLocation::default());

        // the whole triplet, then a plain eighth
        let rests = fill_with_invisible_rests(
            &mut score,
            &mut map,
            m,
            Fraction::ZERO,
            0,
            frac(3, 8),
            here(),
            &mut logger,
        )
        .unwrap();

        let total = rests
            .iter()
            .map(|k| score.chord_rest(*k).unwrap().ticks)
            .fold(Fraction::ZERO, |acc, t| acc.checked_add(t).unwrap());
        assert_eq!(total, frac(3, 8));

        let first = score.chord_rest(rests[0]).unwrap();
        assert_eq!(first.duration, Duration::new(DurationType::Quarter, 1));
        assert_eq!(first.ticks, frac(1, 4));
        assert!(first.tuplet.is_some());
        let last = score.chord_rest(*rests.last().unwrap()).unwrap();
        assert_eq!(last.duration, Duration::plain(DurationType::Eighth));
        assert!(last.tuplet.is_none());
        assert_eq!(score.tuplets().count(), 1);
        assert!(map.get(1).unwrap().created_tuplet.is_some());
    }

    #[test]
    fn test_gap_past_measure_end_is_clipped_and_reported() {
        let (mut score, m) = one_staff();
        let mut map = TupletMap::new();
        let mut logger = ImportLogger::default();
        map.rebuild(&[], Fraction::ONE, &mut logger, SourceLocation::default());

        let rests = fill_with_invisible_rests(
            &mut score,
            &mut map,
            m,
            frac(3, 4),
            0,
            frac(1, 2),
            here(),
            &mut logger,
        )
        .unwrap();

        let total = rests
            .iter()
            .map(|k| score.chord_rest(*k).unwrap().ticks)
            .fold(Fraction::ZERO, |acc, t| acc.checked_add(t).unwrap());
        assert_eq!(total, frac(1, 4));
        assert_eq!(logger.diagnostics().of_kind("gap_clipped").count(), 1);
    }
}
