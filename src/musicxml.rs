//! # MusicXML Reader
//!
//! Reads partwise MusicXML into a [`Score`] with a streaming `quick-xml` pass.
//!
//! ## What is read
//! - `<part-list>`: part names, instrument names, MIDI programs
//! - `<attributes>`: divisions, time signatures, transposition
//! - `<note>`: pitch (or unpitched display position), duration, voice, staff,
//!   chord, grace, ties, articulations, note-attached dynamics, `dynamics`
//!   attribute as velocity
//! - `<backup>` / `<forward>` for multi-voice measures
//! - `<direction>`: dynamics and rehearsal marks
//! - work and movement titles
//!
//! Times are converted to quarter-note beats local to each measure. Each
//! measure declares the longer of its content and its time signature, except
//! implicit (pickup) measures, which declare their content only.
//!
//! Timewise documents are rejected.

use crate::error::{Result, TimelineError};
use crate::score::{
    Articulation, DynamicMark, DynamicsDirection, MeasureDecl, Part, Pitch, RawNoteEvent,
    RehearsalMarkDecl, Score, Step, TieKind, TimeSignature, Transposition,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Default MIDI velocity of a MusicXML `dynamics="100"` note.
const FORTE_VELOCITY: f64 = 90.0;

fn xml_error<E: fmt::Display>(e: E) -> TimelineError {
    TimelineError::ParseError(format!("XML error: {}", e))
}

fn attr(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    match e.try_get_attribute(name).map_err(xml_error)? {
        Some(a) => Ok(Some(a.unescape_value().map_err(xml_error)?.into_owned())),
        None => Ok(None),
    }
}

/// Text content up to the closing `end` tag.
fn read_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(xml_error)?),
            Event::End(e) if e.name().as_ref() == end => return Ok(text.trim().to_string()),
            Event::Eof => {
                return Err(TimelineError::ParseError(format!(
                    "unexpected end of document inside <{}>",
                    String::from_utf8_lossy(end)
                )))
            }
            _ => {}
        }
    }
}

fn read_value<T: FromStr>(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<T> {
    let text = read_text(reader, end)?;
    text.parse().map_err(|_| {
        TimelineError::ParseError(format!(
            "invalid <{}> value '{}'",
            String::from_utf8_lossy(end),
            text
        ))
    })
}

fn unexpected_eof(inside: &str) -> TimelineError {
    TimelineError::ParseError(format!("unexpected end of document inside <{}>", inside))
}

/// Read a partwise MusicXML document.
///
/// # Example
/// ```rust
/// use scoreline::musicxml::read_score;
///
/// let xml = br#"<?xml version="1.0"?>
/// <score-partwise>
///   <part-list><score-part id="P1"><part-name>Flute</part-name></score-part></part-list>
///   <part id="P1">
///     <measure number="1">
///       <attributes><divisions>1</divisions><time><beats>2</beats><beat-type>4</beat-type></time></attributes>
///       <note><pitch><step>A</step><octave>4</octave></pitch><duration>2</duration></note>
///     </measure>
///   </part>
/// </score-partwise>"#;
///
/// let score = read_score(xml).unwrap();
/// assert_eq!(score.parts[0].label(), "Flute");
/// assert_eq!(score.parts[0].notes[0].pitch.midi(), 69);
/// assert_eq!(score.parts[0].measures[0].duration, Some(2.0));
/// ```
pub fn read_score(xml: &[u8]) -> Result<Score> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut partwise = false;
    let mut work_title: Option<String> = None;
    let mut movement_title: Option<String> = None;
    let mut part_list: HashMap<String, PartListEntry> = HashMap::new();
    let mut parts = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"score-partwise" => partwise = true,
                b"score-timewise" => {
                    return Err(TimelineError::ParseError(
                        "timewise MusicXML is not supported; convert to partwise".to_string(),
                    ))
                }
                b"work-title" => work_title = Some(read_text(&mut reader, b"work-title")?),
                b"movement-title" => {
                    movement_title = Some(read_text(&mut reader, b"movement-title")?)
                }
                b"score-part" => {
                    let id = attr(&e, b"id")?.unwrap_or_default();
                    let entry = read_score_part(&mut reader)?;
                    part_list.insert(id, entry);
                }
                b"part" => {
                    let id = attr(&e, b"id")?.unwrap_or_else(|| format!("P{}", parts.len() + 1));
                    let entry = part_list.get(&id).cloned().unwrap_or_default();
                    parts.push(PartReader::new(id, entry).read(&mut reader)?);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !partwise {
        return Err(TimelineError::ParseError(
            "document has no <score-partwise> root".to_string(),
        ));
    }

    debug!(parts = parts.len(), "read MusicXML score");
    Ok(Score {
        title: work_title.or(movement_title).filter(|t| !t.is_empty()),
        parts,
    })
}

#[derive(Debug, Clone, Default)]
struct PartListEntry {
    name: Option<String>,
    instrument_name: Option<String>,
    midi_program: Option<u8>,
}

fn read_score_part(reader: &mut Reader<&[u8]>) -> Result<PartListEntry> {
    let mut entry = PartListEntry::default();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"part-name" => entry.name = Some(read_text(reader, b"part-name")?),
                b"instrument-name" => {
                    let name = read_text(reader, b"instrument-name")?;
                    entry.instrument_name.get_or_insert(name);
                }
                b"midi-program" => {
                    let program: u8 = read_value(reader, b"midi-program")?;
                    entry.midi_program.get_or_insert(program);
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"score-part" => return Ok(entry),
            Event::Eof => return Err(unexpected_eof("score-part")),
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
struct TieFlags {
    start: bool,
    stop: bool,
    cont: bool,
}

impl TieFlags {
    fn record(&mut self, kind: Option<&str>) {
        match kind {
            Some("start") => self.start = true,
            Some("stop") => self.stop = true,
            Some("continue") => self.cont = true,
            _ => {}
        }
    }

    fn kind(&self) -> Option<TieKind> {
        match (self.start, self.stop, self.cont) {
            (true, true, _) | (_, _, true) => Some(TieKind::Continue),
            (true, false, false) => Some(TieKind::Start),
            (false, true, false) => Some(TieKind::Stop),
            _ => None,
        }
    }
}

fn articulation(name: &[u8]) -> Option<Articulation> {
    match name {
        b"staccato" => Some(Articulation::Staccato),
        b"staccatissimo" | b"spiccato" => Some(Articulation::Staccatissimo),
        b"accent" => Some(Articulation::Accent),
        b"strong-accent" => Some(Articulation::StrongAccent),
        b"tenuto" => Some(Articulation::Tenuto),
        _ => None,
    }
}

/// First recognised marking inside `<dynamics>`.
fn read_dynamics(reader: &mut Reader<&[u8]>) -> Result<Option<DynamicMark>> {
    let mut mark = None;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => {
                if mark.is_none() {
                    mark = std::str::from_utf8(e.name().as_ref())
                        .ok()
                        .and_then(|name| name.parse::<DynamicMark>().ok());
                }
            }
            Event::End(e) if e.name().as_ref() == b"dynamics" => return Ok(mark),
            Event::Eof => return Err(unexpected_eof("dynamics")),
            _ => {}
        }
    }
}

/// Pitch from `<pitch>` or the display position of `<unpitched>`.
fn read_pitch(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<Pitch> {
    let mut step: Option<Step> = None;
    let mut alter = 0i8;
    let mut octave = 4i8;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"step" | b"display-step" => {
                    let tag = e.name().as_ref().to_vec();
                    let text = read_text(reader, &tag)?;
                    step = text.chars().next().and_then(Step::from_char);
                    if step.is_none() {
                        return Err(TimelineError::ParseError(format!("invalid step '{}'", text)));
                    }
                }
                b"alter" => {
                    let value: f64 = read_value(reader, b"alter")?;
                    alter = value.round() as i8;
                }
                b"octave" | b"display-octave" => {
                    let tag = e.name().as_ref().to_vec();
                    octave = read_value(reader, &tag)?;
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == end => break,
            Event::Eof => return Err(unexpected_eof(&String::from_utf8_lossy(end))),
            _ => {}
        }
    }

    let step = step.ok_or_else(|| {
        TimelineError::ParseError(format!("<{}> without a step", String::from_utf8_lossy(end)))
    })?;
    Ok(Pitch::spelled(step, alter, octave))
}

/// One `<note>` element, before placement.
#[derive(Debug, Default)]
struct NoteData {
    pitch: Option<Pitch>,
    rest: bool,
    chord: bool,
    grace: bool,
    duration: f64,
    voice: Option<u8>,
    staff: Option<u8>,
    ties: TieFlags,
    articulations: Vec<Articulation>,
    dynamic: Option<DynamicMark>,
}

fn read_note(reader: &mut Reader<&[u8]>) -> Result<NoteData> {
    let mut note = NoteData::default();
    loop {
        let (e, open) = match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => (e, true),
            Event::Empty(e) => (e, false),
            Event::End(e) if e.name().as_ref() == b"note" => return Ok(note),
            Event::Eof => return Err(unexpected_eof("note")),
            _ => continue,
        };

        match e.name().as_ref() {
            b"pitch" if open => note.pitch = Some(read_pitch(reader, b"pitch")?),
            b"unpitched" if open => note.pitch = Some(read_pitch(reader, b"unpitched")?),
            b"rest" => {
                note.rest = true;
                if open {
                    reader.read_to_end(e.name()).map_err(xml_error)?;
                }
            }
            b"chord" => note.chord = true,
            b"grace" => note.grace = true,
            b"duration" if open => note.duration = read_value(reader, b"duration")?,
            b"voice" if open => note.voice = Some(read_value(reader, b"voice")?),
            b"staff" if open => note.staff = Some(read_value(reader, b"staff")?),
            b"tie" | b"tied" => note.ties.record(attr(&e, b"type")?.as_deref()),
            b"dynamics" if open => {
                if let Some(mark) = read_dynamics(reader)? {
                    note.dynamic.get_or_insert(mark);
                }
            }
            name => {
                if let Some(a) = articulation(name) {
                    note.articulations.push(a);
                }
            }
        }
    }
}

/// Contents of one `<direction>`.
#[derive(Debug, Default)]
struct DirectionData {
    marks: Vec<DynamicMark>,
    rehearsals: Vec<String>,
    staff: Option<u8>,
    /// Divisions.
    offset: f64,
}

fn read_direction(reader: &mut Reader<&[u8]>) -> Result<DirectionData> {
    let mut direction = DirectionData::default();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"dynamics" => direction.marks.extend(read_dynamics(reader)?),
                b"rehearsal" => {
                    let label = read_text(reader, b"rehearsal")?;
                    if !label.is_empty() {
                        direction.rehearsals.push(label);
                    }
                }
                b"staff" => direction.staff = Some(read_value(reader, b"staff")?),
                b"offset" => direction.offset = read_value(reader, b"offset")?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"direction" => return Ok(direction),
            Event::Eof => return Err(unexpected_eof("direction")),
            _ => {}
        }
    }
}

/// Reads one `<part>`, tracking divisions and position across measures.
struct PartReader {
    part: Part,
    divisions: f64,
    time_signature: Option<TimeSignature>,
    measure_index: usize,
}

/// Position inside the measure being read, in beats.
#[derive(Debug, Default)]
struct MeasureCursor {
    position: f64,
    furthest: f64,
    last_onset: f64,
    time_change: Option<TimeSignature>,
}

impl MeasureCursor {
    fn advance(&mut self, beats: f64) {
        self.position += beats;
        self.furthest = self.furthest.max(self.position);
    }

    fn back(&mut self, beats: f64) {
        self.position = (self.position - beats).max(0.0);
    }
}

impl PartReader {
    fn new(id: String, entry: PartListEntry) -> Self {
        let mut part = Part {
            id,
            name: entry.name,
            ..Part::default()
        };
        part.instrument.name = entry.instrument_name;
        part.instrument.midi_program = entry.midi_program;
        Self {
            part,
            divisions: 1.0,
            time_signature: None,
            measure_index: 0,
        }
    }

    fn beats(&self, divisions: f64) -> f64 {
        divisions / self.divisions
    }

    fn read(mut self, reader: &mut Reader<&[u8]>) -> Result<Part> {
        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) if e.name().as_ref() == b"measure" => {
                    let number = attr(&e, b"number")?;
                    let implicit = attr(&e, b"implicit")?.as_deref() == Some("yes");
                    self.read_measure(reader, number, implicit)?;
                }
                Event::Empty(e) if e.name().as_ref() == b"measure" => {
                    let number = attr(&e, b"number")?;
                    self.finish_measure(number, false, MeasureCursor::default());
                }
                Event::End(e) if e.name().as_ref() == b"part" => break,
                Event::Eof => return Err(unexpected_eof("part")),
                _ => {}
            }
        }

        debug!(
            part = %self.part.id,
            measures = self.part.measures.len(),
            notes = self.part.notes.len(),
            "read part"
        );
        Ok(self.part)
    }

    fn read_measure(
        &mut self,
        reader: &mut Reader<&[u8]>,
        number: Option<String>,
        implicit: bool,
    ) -> Result<()> {
        let mut cursor = MeasureCursor::default();
        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"attributes" => self.read_attributes(reader, &mut cursor)?,
                    b"note" => {
                        let velocity = attr(&e, b"dynamics")?
                            .and_then(|v| v.parse::<f64>().ok())
                            .map(|percent| (percent * FORTE_VELOCITY / 100.0).round().clamp(0.0, 127.0) as u8);
                        let note = read_note(reader)?;
                        self.place_note(note, velocity, &mut cursor);
                    }
                    b"backup" => {
                        let divisions = read_duration_block(reader, b"backup")?;
                        cursor.back(self.beats(divisions));
                    }
                    b"forward" => {
                        let divisions = read_duration_block(reader, b"forward")?;
                        cursor.advance(self.beats(divisions));
                    }
                    b"direction" => {
                        let direction = read_direction(reader)?;
                        self.place_direction(direction, &cursor);
                    }
                    _ => {}
                },
                Event::End(e) if e.name().as_ref() == b"measure" => break,
                Event::Eof => return Err(unexpected_eof("measure")),
                _ => {}
            }
        }
        self.finish_measure(number, implicit, cursor);
        Ok(())
    }

    fn read_attributes(&mut self, reader: &mut Reader<&[u8]>, cursor: &mut MeasureCursor) -> Result<()> {
        let mut beats: Option<u8> = None;
        let mut beat_type: Option<u8> = None;
        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"divisions" => {
                        let divisions: f64 = read_value(reader, b"divisions")?;
                        if divisions > 0.0 {
                            self.divisions = divisions;
                        }
                    }
                    b"beats" => {
                        // compound signatures like 3+2 are summed
                        let text = read_text(reader, b"beats")?;
                        beats = text
                            .split('+')
                            .map(|p| p.trim().parse::<u8>().ok())
                            .sum::<Option<u8>>();
                    }
                    b"beat-type" => beat_type = read_value(reader, b"beat-type").ok(),
                    b"transpose" => {
                        self.part.instrument.transposition = read_transpose(reader)?;
                    }
                    _ => {}
                },
                Event::End(e) if e.name().as_ref() == b"attributes" => break,
                Event::Eof => return Err(unexpected_eof("attributes")),
                _ => {}
            }
        }

        if let (Some(beats), Some(beat_type)) = (beats, beat_type) {
            let signature = TimeSignature { beats, beat_type };
            self.time_signature = Some(signature);
            cursor.time_change = Some(signature);
        }
        Ok(())
    }

    fn place_note(&mut self, note: NoteData, velocity: Option<u8>, cursor: &mut MeasureCursor) {
        let duration = if note.grace { 0.0 } else { self.beats(note.duration) };
        let onset = if note.chord { cursor.last_onset } else { cursor.position };

        if let (Some(pitch), false) = (note.pitch, note.rest) {
            self.part.notes.push(RawNoteEvent {
                voice: note.voice.unwrap_or(1),
                staff: note.staff.unwrap_or(1),
                tie: note.ties.kind(),
                articulations: note.articulations,
                dynamic: note.dynamic,
                velocity,
                ..RawNoteEvent::new(self.measure_index, onset, duration, pitch)
            });
        }

        if !note.chord && !note.grace {
            cursor.last_onset = cursor.position;
            cursor.advance(duration);
        }
    }

    fn place_direction(&mut self, direction: DirectionData, cursor: &MeasureCursor) {
        let onset = (cursor.position + self.beats(direction.offset)).max(0.0);
        for mark in direction.marks {
            self.part.dynamics.push(DynamicsDirection {
                measure: self.measure_index,
                onset,
                voice: None,
                staff: direction.staff,
                mark,
            });
        }
        for label in direction.rehearsals {
            self.part.rehearsal_marks.push(RehearsalMarkDecl {
                measure: self.measure_index,
                onset,
                label,
            });
        }
    }

    fn finish_measure(&mut self, number: Option<String>, implicit: bool, cursor: MeasureCursor) {
        let nominal = self.time_signature.map(|t| t.quarter_beats());
        let duration = match nominal {
            Some(nominal) if !implicit => cursor.furthest.max(nominal),
            _ => cursor.furthest,
        };
        self.part.measures.push(MeasureDecl {
            index: self.measure_index,
            number,
            duration: (duration > 0.0).then_some(duration),
            time_signature: cursor.time_change,
        });
        self.measure_index += 1;
    }
}

fn read_duration_block(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<f64> {
    let mut duration = 0.0;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if e.name().as_ref() == b"duration" => {
                duration = read_value(reader, b"duration")?;
            }
            Event::End(e) if e.name().as_ref() == end => return Ok(duration),
            Event::Eof => return Err(unexpected_eof(&String::from_utf8_lossy(end))),
            _ => {}
        }
    }
}

fn read_transpose(reader: &mut Reader<&[u8]>) -> Result<Transposition> {
    let mut transposition = Transposition::default();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"chromatic" => {
                    let value: f64 = read_value(reader, b"chromatic")?;
                    transposition.chromatic = value.round() as i8;
                }
                b"octave-change" => transposition.octave_change = read_value(reader, b"octave-change")?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"transpose" => return Ok(transposition),
            Event::Eof => return Err(unexpected_eof("transpose")),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn partwise(part_list: &str, parts: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="3.1">
  <work><work-title>Test Piece</work-title></work>
  <part-list>{}</part-list>
  {}
</score-partwise>"#,
            part_list, parts
        )
        .into_bytes()
    }

    const CLARINET_LIST: &str = r#"
<score-part id="P1">
  <part-name>Clarinet in Bb</part-name>
  <score-instrument id="P1-I1"><instrument-name>Clarinet</instrument-name></score-instrument>
  <midi-instrument id="P1-I1"><midi-channel>1</midi-channel><midi-program>72</midi-program></midi-instrument>
</score-part>"#;

    const CLARINET_PART: &str = r#"
<part id="P1">
  <measure number="1">
    <attributes>
      <divisions>2</divisions>
      <time><beats>3</beats><beat-type>4</beat-type></time>
      <transpose><diatonic>-1</diatonic><chromatic>-2</chromatic></transpose>
    </attributes>
    <direction placement="below">
      <direction-type><rehearsal>A</rehearsal></direction-type>
    </direction>
    <direction placement="below">
      <direction-type><dynamics><mf/></dynamics></direction-type>
      <staff>1</staff>
    </direction>
    <note dynamics="120">
      <pitch><step>C</step><octave>5</octave></pitch>
      <duration>2</duration><voice>1</voice>
      <notations><articulations><staccato/></articulations></notations>
    </note>
    <note>
      <pitch><step>E</step><octave>5</octave></pitch>
      <duration>2</duration><voice>1</voice>
    </note>
    <note>
      <chord/>
      <pitch><step>G</step><octave>5</octave></pitch>
      <duration>2</duration><voice>1</voice>
    </note>
    <note>
      <pitch><step>F</step><alter>1</alter><octave>5</octave></pitch>
      <duration>2</duration><voice>1</voice>
      <tie type="start"/>
      <notations><tied type="start"/></notations>
    </note>
    <backup><duration>6</duration></backup>
    <note>
      <rest/><duration>2</duration><voice>2</voice>
    </note>
    <note>
      <pitch><step>A</step><octave>4</octave></pitch>
      <duration>4</duration><voice>2</voice>
    </note>
  </measure>
  <measure number="2">
    <note>
      <grace/>
      <pitch><step>E</step><octave>5</octave></pitch>
      <voice>1</voice>
    </note>
    <note>
      <pitch><step>F</step><alter>1</alter><octave>5</octave></pitch>
      <duration>6</duration><voice>1</voice>
      <tie type="stop"/>
      <notations><tied type="stop"/></notations>
    </note>
  </measure>
</part>"#;

    fn clarinet() -> Score {
        read_score(&partwise(CLARINET_LIST, CLARINET_PART)).unwrap()
    }

    #[test]
    fn test_part_list_metadata() {
        let score = clarinet();
        assert_eq!(score.title.as_deref(), Some("Test Piece"));
        let part = &score.parts[0];
        assert_eq!(part.id, "P1");
        assert_eq!(part.name.as_deref(), Some("Clarinet in Bb"));
        assert_eq!(part.label(), "Clarinet");
        assert_eq!(part.instrument.midi_program, Some(72));
        assert_eq!(part.instrument.transposition.semitones(), -2);
    }

    #[test]
    fn test_note_positions_in_beats() {
        let score = clarinet();
        let notes = &score.parts[0].notes;
        let placed: Vec<(usize, f64, f64, i16, u8)> = notes
            .iter()
            .map(|n| (n.measure, n.onset, n.duration, n.pitch.midi(), n.voice))
            .collect();
        assert_eq!(
            placed,
            vec![
                (0, 0.0, 1.0, 72, 1),
                (0, 1.0, 1.0, 76, 1),
                (0, 1.0, 1.0, 79, 1), // chord shares the onset
                (0, 2.0, 1.0, 78, 1),
                (0, 1.0, 2.0, 69, 2), // after backup and a rest
                (1, 0.0, 0.0, 76, 1), // grace
                (1, 0.0, 3.0, 78, 1),
            ]
        );
    }

    #[test]
    fn test_ties_articulations_and_velocity() {
        let score = clarinet();
        let notes = &score.parts[0].notes;
        assert_eq!(notes[0].articulations, vec![Articulation::Staccato]);
        assert_eq!(notes[0].velocity, Some(108));
        assert_eq!(notes[1].velocity, None);
        assert_eq!(notes[3].tie, Some(TieKind::Start));
        assert_eq!(notes[6].tie, Some(TieKind::Stop));
        assert_eq!(notes[4].tie, None);
    }

    #[test]
    fn test_measures_and_directions() {
        let score = clarinet();
        let part = &score.parts[0];
        let measures: Vec<(usize, Option<&str>, Option<f64>)> = part
            .measures
            .iter()
            .map(|m| (m.index, m.number.as_deref(), m.duration))
            .collect();
        assert_eq!(measures, vec![(0, Some("1"), Some(3.0)), (1, Some("2"), Some(3.0))]);
        assert_eq!(
            part.measures[0].time_signature,
            Some(TimeSignature { beats: 3, beat_type: 4 })
        );
        assert_eq!(part.measures[1].time_signature, None);

        assert_eq!(part.dynamics.len(), 1);
        assert_eq!(part.dynamics[0].mark, DynamicMark::Mf);
        assert_eq!(part.dynamics[0].staff, Some(1));
        assert_eq!(part.dynamics[0].voice, None);
        assert_eq!(part.rehearsal_marks[0].label, "A");
        assert_eq!(part.rehearsal_marks[0].onset, 0.0);
    }

    #[test]
    fn test_pickup_measure_uses_content() {
        let xml = partwise(
            r#"<score-part id="P1"><part-name>Oboe</part-name></score-part>"#,
            r#"<part id="P1">
  <measure number="0" implicit="yes">
    <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
    <note><pitch><step>G</step><octave>4</octave></pitch><duration>1</duration></note>
  </measure>
  <measure number="1"/>
</part>"#,
        );
        let score = read_score(&xml).unwrap();
        let durations: Vec<Option<f64>> = score.parts[0].measures.iter().map(|m| m.duration).collect();
        assert_eq!(durations, vec![Some(1.0), Some(4.0)]);
    }

    #[test]
    fn test_percussion_without_time_signature() {
        let xml = partwise(
            r#"<score-part id="P1"><part-name>Snare Drum</part-name></score-part>"#,
            r#"<part id="P1">
  <measure number="1">
    <attributes><divisions>4</divisions></attributes>
    <note><unpitched><display-step>C</display-step><display-octave>5</display-octave></unpitched><duration>4</duration></note>
    <forward><duration>4</duration></forward>
  </measure>
  <measure number="2"/>
</part>"#,
        );
        let score = read_score(&xml).unwrap();
        let part = &score.parts[0];
        assert_eq!(part.notes[0].pitch.midi(), 72);
        assert_eq!(part.measures[0].duration, Some(2.0));
        assert_eq!(part.measures[1].duration, None);
    }

    #[test]
    fn test_tie_start_and_stop_is_continue() {
        let xml = partwise(
            r#"<score-part id="P1"><part-name>Horn</part-name></score-part>"#,
            r#"<part id="P1"><measure number="1">
  <note><pitch><step>D</step><octave>4</octave></pitch><duration>1</duration>
    <tie type="stop"/><tie type="start"/></note>
</measure></part>"#,
        );
        let score = read_score(&xml).unwrap();
        assert_eq!(score.parts[0].notes[0].tie, Some(TieKind::Continue));
    }

    #[test]
    fn test_timewise_rejected() {
        let err = read_score(b"<score-timewise><part-list/></score-timewise>").unwrap_err();
        assert!(matches!(err, TimelineError::ParseError(msg) if msg.contains("timewise")));
    }

    #[test]
    fn test_not_musicxml() {
        assert!(matches!(
            read_score(b"<html><body/></html>"),
            Err(TimelineError::ParseError(_))
        ));
    }

    #[test]
    fn test_truncated_document() {
        assert!(matches!(
            read_score(b"<score-partwise><part id=\"P1\"><measure number=\"1\">"),
            Err(TimelineError::ParseError(_))
        ));
    }

    #[test]
    fn test_pitch_without_step() {
        let xml = partwise(
            "",
            r#"<part id="P1"><measure number="1">
  <note><pitch><octave>4</octave></pitch><duration>1</duration></note>
</measure></part>"#,
        );
        assert!(matches!(read_score(&xml), Err(TimelineError::ParseError(msg)) if msg.contains("step")));
    }
}
