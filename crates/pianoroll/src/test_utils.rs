//! テスト用のSMF組み立てヘルパー。

use midly::num::{u4, u7, u15, u24, u28};

pub const TICKS_PER_BEAT: u64 = 480;

pub fn note_on(key: u8, vel: u8) -> midly::MidiMessage {
    midly::MidiMessage::NoteOn {
        key: u7::new(key),
        vel: u7::new(vel),
    }
}

pub fn note_off(key: u8) -> midly::MidiMessage {
    midly::MidiMessage::NoteOff {
        key: u7::new(key),
        vel: u7::new(0),
    }
}

pub fn control_change(controller: u8, value: u8) -> midly::MidiMessage {
    midly::MidiMessage::Controller {
        controller: u7::new(controller),
        value: u7::new(value),
    }
}

pub fn program_change(program: u8) -> midly::MidiMessage {
    midly::MidiMessage::ProgramChange {
        program: u7::new(program),
    }
}

/// 絶対ティックでイベントを積んでいき、SMFのバイト列を作るビルダー。
///
/// テンポは既定の120BPM、分解能は[`TICKS_PER_BEAT`]。
#[derive(Debug)]
pub struct SmfBuilder {
    timing: midly::Timing,
    tracks: Vec<Vec<(u64, midly::TrackEventKind<'static>)>>,
}

impl SmfBuilder {
    pub fn new() -> Self {
        SmfBuilder {
            timing: midly::Timing::Metrical(u15::new(TICKS_PER_BEAT as u16)),
            tracks: vec![vec![]],
        }
    }

    pub fn timing(mut self, timing: midly::Timing) -> Self {
        self.timing = timing;
        self
    }

    fn push(mut self, tick: u64, kind: midly::TrackEventKind<'static>) -> Self {
        self.tracks
            .last_mut()
            .expect("builder always has a track")
            .push((tick, kind));
        self
    }

    /// 四分音符あたりのマイクロ秒でテンポを指定します。
    pub fn tempo(self, tick: u64, uspb: u32) -> Self {
        self.push(
            tick,
            midly::TrackEventKind::Meta(midly::MetaMessage::Tempo(u24::new(uspb))),
        )
    }

    /// 以降のイベントを新しいトラックに積みます。
    pub fn track(mut self) -> Self {
        self.tracks.push(vec![]);
        self
    }

    pub fn raw(self, tick: u64, channel: u8, message: midly::MidiMessage) -> Self {
        self.push(
            tick,
            midly::TrackEventKind::Midi {
                channel: u4::new(channel),
                message,
            },
        )
    }

    pub fn note(self, channel: u8, key: u8, vel: u8, start: u64, end: u64) -> Self {
        self.raw(start, channel, note_on(key, vel))
            .raw(end, channel, note_off(key))
    }

    pub fn build(self) -> Vec<u8> {
        let format = if self.tracks.len() == 1 {
            midly::Format::SingleTrack
        } else {
            midly::Format::Parallel
        };
        let mut smf = midly::Smf::new(midly::Header::new(format, self.timing));
        for mut events in self.tracks {
            events.sort_by_key(|(tick, _)| *tick);
            let mut track = vec![];
            let mut last_tick = 0;
            for (tick, kind) in events {
                track.push(midly::TrackEvent {
                    delta: u28::new((tick - last_tick) as u32),
                    kind,
                });
                last_tick = tick;
            }
            track.push(midly::TrackEvent {
                delta: u28::new(0),
                kind: midly::TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
            });
            smf.tracks.push(track);
        }

        let mut bytes = vec![];
        smf.write_std(&mut bytes).expect("writing to a Vec cannot fail");
        bytes
    }
}
