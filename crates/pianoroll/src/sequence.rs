//! MIDIファイルを読み込み、秒単位のノート列に変換します。

use crate::tempo::TempoIndex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// ドラムとして扱うチャンネル（GMの10ch）。
pub const DRUM_CHANNEL: u8 = 9;

/// サステインペダルのコントロールチェンジ番号。
pub const SUSTAIN_PEDAL: u8 = 64;

/// 1つのノート。時刻は秒単位。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub start: f64,
    pub end: f64,
}

/// コントロールチェンジ。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlChange {
    pub time: f64,
    pub controller: u8,
    pub value: u8,
}

/// 1トラック内の1チャンネル・1プログラム分のイベント。
///
/// 途中でプログラムチェンジがあると、以降のイベントは別のパートになります。
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub track: usize,
    pub channel: u8,
    /// このパートのノートが鳴ったときのプログラム番号。
    pub program: u8,
    pub notes: Vec<Note>,
    pub control_changes: Vec<ControlChange>,
}

impl Part {
    fn new(track: usize, channel: u8, program: u8) -> Self {
        Part {
            track,
            channel,
            program,
            notes: vec![],
            control_changes: vec![],
        }
    }

    pub fn is_drum(&self) -> bool {
        self.channel == DRUM_CHANNEL
    }
}

/// 読み込まれたMIDIの内容。
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub parts: Vec<Part>,
    /// 最後のイベントの時刻（秒）。
    pub end_time: f64,
}

/// MIDIファイルの読み込みエラー。
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {} as a MIDI file", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: midly::Error,
    },
}

/// MIDIファイルを読み込みます。
///
/// # Errors
///
/// ファイルが存在しない、読めない、またはSMFとして不正な場合に[`LoadError`]を返します。
pub fn load_sequence(path: &Path) -> Result<Sequence, LoadError> {
    let content = std::fs::read(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Sequence::from_bytes(&content).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Sequence {
    /// SMFのバイト列から読み込みます。
    pub fn from_bytes(content: &[u8]) -> Result<Self, midly::Error> {
        let smf = midly::Smf::parse(content)?;
        Ok(Self::from_smf(&smf))
    }

    pub fn from_smf(smf: &midly::Smf) -> Self {
        let tempo_index = TempoIndex::new(smf);
        tracing::debug!(?tempo_index, "built tempo index");

        let mut parts = vec![];
        for (track_index, track) in smf.tracks.iter().enumerate() {
            parts.extend(read_track(track_index, track, &tempo_index));
        }

        let end_time = parts
            .iter()
            .flat_map(|part| {
                part.notes
                    .iter()
                    .map(|note| note.end)
                    .chain(part.control_changes.iter().map(|cc| cc.time))
            })
            .chain(tempo_index.change_times())
            .fold(0.0, f64::max);

        Sequence { parts, end_time }
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.parts.iter().flat_map(|part| part.notes.iter())
    }

    pub fn note_count(&self) -> usize {
        self.parts.iter().map(|part| part.notes.len()).sum()
    }
}

/// 開いているノート：`(開始ティック, ベロシティ)`
type OpenNotes = HashMap<(u8, u8), Vec<(u64, u8)>>;

/// `(チャンネル, プログラム)`に対応するパートの位置。無ければ作ります。
fn part_index(
    parts: &mut Vec<Part>,
    indices: &mut HashMap<(u8, u8), usize>,
    track_index: usize,
    (channel, program): (u8, u8),
) -> usize {
    *indices.entry((channel, program)).or_insert_with(|| {
        parts.push(Part::new(track_index, channel, program));
        parts.len() - 1
    })
}

fn read_track(
    track_index: usize,
    track: &[midly::TrackEvent],
    tempo_index: &TempoIndex,
) -> Vec<Part> {
    // (チャンネル, プログラム)の出現順を保つ
    let mut parts: Vec<Part> = vec![];
    let mut part_indices: HashMap<(u8, u8), usize> = HashMap::new();
    let mut programs: HashMap<u8, u8> = HashMap::new();
    let mut open_notes: OpenNotes = HashMap::new();

    let mut current_tick = 0u64;
    for event in track {
        current_tick += event.delta.as_int() as u64;
        let midly::TrackEventKind::Midi { channel, message } = event.kind else {
            continue;
        };
        let channel = channel.as_int();
        if let midly::MidiMessage::ProgramChange { program } = message {
            programs.insert(channel, program.as_int());
            continue;
        }
        let program = programs.get(&channel).copied().unwrap_or(0);
        let part_key = (channel, program);

        match message {
            midly::MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                open_notes
                    .entry((channel, key.as_int()))
                    .or_default()
                    .push((current_tick, vel.as_int()));
            }
            midly::MidiMessage::NoteOn { key: pitch, .. }
            | midly::MidiMessage::NoteOff { key: pitch, .. } => {
                let pitch = pitch.as_int();
                let Some(opened) = open_notes.remove(&(channel, pitch)) else {
                    continue;
                };
                // 同じティックで開いたノートは再トリガーとみなして残す
                let (to_keep, to_close): (Vec<_>, Vec<_>) = opened
                    .into_iter()
                    .partition(|(start_tick, _)| *start_tick == current_tick);
                if !to_keep.is_empty() {
                    open_notes.insert((channel, pitch), to_keep);
                }
                if to_close.is_empty() {
                    continue;
                }
                let index = part_index(&mut parts, &mut part_indices, track_index, part_key);
                let end = tempo_index.ticks_to_time(current_tick);
                parts[index]
                    .notes
                    .extend(to_close.into_iter().map(|(start_tick, velocity)| Note {
                        pitch,
                        velocity,
                        start: tempo_index.ticks_to_time(start_tick),
                        end,
                    }));
            }
            midly::MidiMessage::Controller { controller, value } => {
                let index = part_index(&mut parts, &mut part_indices, track_index, part_key);
                parts[index].control_changes.push(ControlChange {
                    time: tempo_index.ticks_to_time(current_tick),
                    controller: controller.as_int(),
                    value: value.as_int(),
                });
            }
            _ => {}
        }
    }

    let dropped = open_notes.values().map(Vec::len).sum::<usize>();
    if dropped > 0 {
        tracing::warn!(
            track = track_index,
            dropped,
            "dropping notes that were never turned off"
        );
    }

    parts.retain(|part| !part.notes.is_empty() || !part.control_changes.is_empty());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        SmfBuilder, TICKS_PER_BEAT, control_change, note_off, note_on, program_change,
    };

    #[test]
    fn test_single_note() {
        let bytes = SmfBuilder::new()
            .note(0, 60, 100, 0, TICKS_PER_BEAT * 2)
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();

        assert_eq!(sequence.note_count(), 1);
        let note = sequence.notes().next().unwrap();
        assert_eq!(note.pitch, 60);
        assert_eq!(note.velocity, 100);
        assert!((note.start - 0.0).abs() < 1e-9);
        assert!((note.end - 1.0).abs() < 1e-9);
        assert!((sequence.end_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_note_on_with_zero_velocity_closes_note() {
        let bytes = SmfBuilder::new()
            .raw(0, 0, note_on(64, 90))
            .raw(TICKS_PER_BEAT, 0, note_on(64, 0))
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        let notes = sequence.notes().collect::<Vec<_>>();
        assert_eq!(notes.len(), 1);
        assert!((notes[0].end - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_note_off_closes_all_earlier_notes_of_key() {
        let bytes = SmfBuilder::new()
            .raw(0, 0, note_on(60, 80))
            .raw(240, 0, note_on(60, 90))
            .raw(480, 0, note_off(60))
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        let velocities = sequence.notes().map(|note| note.velocity).collect::<Vec<_>>();
        assert_eq!(velocities, vec![80, 90]);
        assert!(sequence.notes().all(|note| (note.end - 0.5).abs() < 1e-9));
    }

    #[test]
    fn test_retrigger_on_same_tick_keeps_new_note_open() {
        let bytes = SmfBuilder::new()
            .raw(0, 0, note_on(60, 80))
            .raw(480, 0, note_on(60, 70))
            .raw(480, 0, note_off(60))
            .raw(960, 0, note_off(60))
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        let notes = sequence
            .notes()
            .map(|note| (note.velocity, note.start, note.end))
            .collect::<Vec<_>>();
        assert_eq!(notes, vec![(80, 0.0, 0.5), (70, 0.5, 1.0)]);
    }

    #[test]
    fn test_note_opened_on_closing_tick_survives_alone() {
        let bytes = SmfBuilder::new()
            .raw(480, 0, note_on(60, 80))
            .raw(480, 0, note_off(60))
            .raw(960, 0, note_off(60))
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        let notes = sequence
            .notes()
            .map(|note| (note.velocity, note.start, note.end))
            .collect::<Vec<_>>();
        assert_eq!(notes, vec![(80, 0.5, 1.0)]);
        assert!((sequence.end_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unterminated_note_is_dropped() {
        let bytes = SmfBuilder::new()
            .raw(0, 0, note_on(60, 80))
            .note(0, 62, 80, 0, 480)
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        assert_eq!(sequence.note_count(), 1);
        assert_eq!(sequence.notes().next().unwrap().pitch, 62);
    }

    #[test]
    fn test_parts_are_split_by_channel_and_track() {
        let bytes = SmfBuilder::new()
            .note(0, 60, 100, 0, 480)
            .note(DRUM_CHANNEL, 36, 100, 0, 480)
            .track()
            .raw(0, 1, program_change(40))
            .note(1, 72, 100, 0, 480)
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        let parts = sequence
            .parts
            .iter()
            .map(|part| (part.track, part.channel, part.program, part.is_drum()))
            .collect::<Vec<_>>();
        assert_eq!(
            parts,
            vec![(0, 0, 0, false), (0, DRUM_CHANNEL, 0, true), (1, 1, 40, false)]
        );
    }

    #[test]
    fn test_program_change_starts_new_part() {
        let bytes = SmfBuilder::new()
            .note(0, 60, 100, 0, 480)
            .raw(480, 0, program_change(40))
            .note(0, 60, 100, 480, 960)
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        let parts = sequence
            .parts
            .iter()
            .map(|part| (part.channel, part.program, part.notes.len()))
            .collect::<Vec<_>>();
        assert_eq!(parts, vec![(0, 0, 1), (0, 40, 1)]);
    }

    #[test]
    fn test_tempo_from_another_track() {
        // 1拍目は120BPM、2拍目からは240BPM
        let bytes = SmfBuilder::new()
            .note(0, 60, 100, 0, TICKS_PER_BEAT * 4)
            .track()
            .tempo(TICKS_PER_BEAT * 2, 250_000)
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        let note = sequence.notes().next().unwrap();
        assert!((note.end - 1.5).abs() < 1e-9);
        assert!((sequence.end_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_at_start() {
        let bytes = SmfBuilder::new()
            .tempo(0, 1_000_000)
            .note(0, 60, 100, TICKS_PER_BEAT, TICKS_PER_BEAT * 2)
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        let note = sequence.notes().next().unwrap();
        assert!((note.start - 1.0).abs() < 1e-9);
        assert!((note.end - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_timecode_timing() {
        // 25fps × 40サブフレーム = 1000ティック/秒
        let bytes = SmfBuilder::new()
            .timing(midly::Timing::Timecode(midly::Fps::Fps25, 40))
            .tempo(0, 1_000_000)
            .note(0, 60, 100, 500, 1500)
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        let note = sequence.notes().next().unwrap();
        assert!((note.start - 0.5).abs() < 1e-9);
        assert!((note.end - 1.5).abs() < 1e-9);
        assert!((sequence.end_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_end_time_includes_control_changes() {
        let bytes = SmfBuilder::new()
            .note(0, 60, 100, 0, 480)
            .raw(1440, 0, control_change(64, 0))
            .build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        assert!((sequence.end_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = load_sequence(&dir.path().join("missing.mid")).unwrap_err();
        assert!(matches!(error, LoadError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mid");
        std::fs::write(&path, b"not a midi file").unwrap();
        let error = load_sequence(&path).unwrap_err();
        assert!(matches!(error, LoadError::Parse { .. }));
    }
}
