//! MIDIのティックを秒に変換するためのテンポマップ。

use itertools::Itertools;

pub const US_PER_SECOND: u64 = 1_000_000;

/// テンポ指定が無い場合のテンポ（120BPM）。
pub const DEFAULT_USPB: u64 = US_PER_SECOND * 60 / 120;

/// テンポ変更1つ分のエントリ。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoIndexEntry {
    ticks: u64,
    seconds: f64,
    uspb: u64,
}

/// ティックと秒を相互に変換するためのインデックス。
///
/// Metricalなタイミングではテンポ変更ごとのエントリを持ち、
/// Timecodeなタイミングでは一定の秒間ティック数で変換します。
#[derive(Debug, Clone, PartialEq)]
pub enum TempoIndex {
    Metrical {
        ticks_per_beat: u64,
        entries: Vec<TempoIndexEntry>,
    },
    Timecode {
        ticks_per_second: f64,
    },
}

impl TempoIndex {
    /// SMFの全トラックからテンポ変更を集めてインデックスを作ります。
    pub fn new(smf: &midly::Smf) -> Self {
        match smf.header.timing {
            midly::Timing::Metrical(tpb) => {
                Self::metrical(tpb.as_int() as u64, collect_tempo_changes(smf))
            }
            midly::Timing::Timecode(fps, subframe) => TempoIndex::Timecode {
                ticks_per_second: fps.as_f32() as f64 * subframe as f64,
            },
        }
    }

    /// `(ティック, 四分音符あたりのマイクロ秒)`の列からインデックスを作ります。
    pub fn metrical(ticks_per_beat: u64, changes: Vec<(u64, u64)>) -> Self {
        let ticks_per_beat = ticks_per_beat.max(1);
        let mut changes = changes
            .into_iter()
            .collect::<std::collections::BTreeMap<_, _>>();
        changes.entry(0).or_insert(DEFAULT_USPB);
        let changes = changes.into_iter().collect::<Vec<_>>();

        let mut entries = Vec::with_capacity(changes.len());
        entries.push(TempoIndexEntry {
            ticks: 0,
            seconds: 0.0,
            uspb: changes[0].1,
        });
        let mut current_time = 0f64;
        for ((p_ticks, p_uspb), (ticks, uspb)) in changes.iter().tuple_windows() {
            let delta_ticks = ticks - p_ticks;
            current_time += (*p_uspb as f64 / US_PER_SECOND as f64)
                * (delta_ticks as f64 / ticks_per_beat as f64);
            entries.push(TempoIndexEntry {
                ticks: *ticks,
                seconds: current_time,
                uspb: *uspb,
            });
        }

        TempoIndex::Metrical {
            ticks_per_beat,
            entries,
        }
    }

    pub fn ticks_to_time(&self, ticks: u64) -> f64 {
        match self {
            TempoIndex::Timecode { ticks_per_second } => ticks as f64 / ticks_per_second,
            TempoIndex::Metrical {
                ticks_per_beat,
                entries,
            } => {
                // entries[0]は常にティック0なので、partition_pointは1以上になる
                let index = entries.partition_point(|entry| entry.ticks <= ticks) - 1;
                let entry = &entries[index];
                let delta_ticks = ticks - entry.ticks;
                entry.seconds
                    + (entry.uspb as f64 / US_PER_SECOND as f64)
                        * (delta_ticks as f64 / *ticks_per_beat as f64)
            }
        }
    }

    /// テンポ変更が起きる時刻（秒）の一覧。
    pub fn change_times(&self) -> Vec<f64> {
        match self {
            TempoIndex::Timecode { .. } => vec![],
            TempoIndex::Metrical { entries, .. } => {
                entries.iter().map(|entry| entry.seconds).collect()
            }
        }
    }
}

fn collect_tempo_changes(smf: &midly::Smf) -> Vec<(u64, u64)> {
    let mut tempo_changes = vec![];
    for track in &smf.tracks {
        let mut current_tick = 0u64;
        for event in track.iter() {
            current_tick += event.delta.as_int() as u64;
            if let midly::TrackEventKind::Meta(midly::MetaMessage::Tempo(uspb)) = &event.kind {
                tempo_changes.push((current_tick, uspb.as_int() as u64));
            }
        }
    }
    tempo_changes
}
