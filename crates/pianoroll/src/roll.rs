//! ノート列をピアノロール（音高×時間の2次元配列）に変換します。

use crate::sequence::{Part, SUSTAIN_PEDAL, Sequence};

/// MIDIの音高の数。
pub const PITCH_COUNT: usize = 128;

/// 浮動小数点の誤差でサンプルがずれないようにするための許容量。
const SAMPLE_EPSILON: f64 = 1e-9;

/// 同じ音高・時刻でノートが重なったときの扱い。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// ベロシティを足し合わせる。
    #[default]
    Sum,
    /// 大きい方のベロシティを使う。
    Max,
    /// 後から処理したノートで上書きする。
    Last,
}

impl OverlapPolicy {
    fn combine(self, current: f32, incoming: f32) -> f32 {
        match self {
            OverlapPolicy::Sum => current + incoming,
            OverlapPolicy::Max => current.max(incoming),
            OverlapPolicy::Last => {
                if incoming > 0.0 {
                    incoming
                } else {
                    current
                }
            }
        }
    }
}

/// [`OverlapPolicy`]のパースエラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown overlap policy: {0} (expected sum, max or last)")]
pub struct OverlapPolicyParseError(String);

impl std::str::FromStr for OverlapPolicy {
    type Err = OverlapPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(OverlapPolicy::Sum),
            "max" => Ok(OverlapPolicy::Max),
            "last" => Ok(OverlapPolicy::Last),
            _ => Err(OverlapPolicyParseError(s.to_string())),
        }
    }
}

/// サンプリングの設定。
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SamplerOptions {
    /// 1秒あたりの列数。
    pub fs: u32,
    pub overlap: OverlapPolicy,
    /// サステインペダルを踏んでいるとみなすCC64の値の下限。`None`ならペダルを無視します。
    pub pedal_threshold: Option<u8>,
    /// ドラム（10ch）のノートも含めるかどうか。
    pub include_drums: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        SamplerOptions {
            fs: 100,
            overlap: OverlapPolicy::Sum,
            pedal_threshold: Some(64),
            include_drums: false,
        }
    }
}

/// サンプリング時のエラー。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    #[error("sampling rate must be positive")]
    InvalidSamplingRate,
    #[error("sequence has no events to sample")]
    EmptySequence,
}

/// 音高範囲の指定エラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("start pitch {start} must be lower than end pitch {end}")]
    Inverted { start: u8, end: u8 },
    #[error("pitch range {start}..{end} is outside of {min}..{max}")]
    OutOfBounds { start: u8, end: u8, min: u8, max: u8 },
}

/// 音高×時間のベロシティ配列。
///
/// 行は音高（0行目が`start_pitch`）、列は`1 / fs`秒ごとのサンプル。
#[derive(Debug, Clone, PartialEq)]
pub struct PianoRoll {
    data: Vec<f32>,
    rows: usize,
    columns: usize,
    start_pitch: u8,
    fs: u32,
}

impl PianoRoll {
    /// 全音高・空の配列を作ります。
    pub fn zeros(columns: usize, fs: u32) -> Self {
        PianoRoll {
            data: vec![0.0; PITCH_COUNT * columns],
            rows: PITCH_COUNT,
            columns,
            start_pitch: 0,
            fs,
        }
    }

    /// 指定した長さ（秒）を`fs`でサンプリングしたときの列数。
    pub fn columns_for(duration: f64, fs: u32) -> usize {
        ((duration * fs as f64) - SAMPLE_EPSILON).ceil().max(0.0) as usize
    }

    /// シーケンス全体をサンプリングします。
    ///
    /// # Errors
    ///
    /// `fs`が0の場合、またはシーケンスの長さが0の場合にエラーを返します。
    pub fn sample(sequence: &Sequence, options: &SamplerOptions) -> Result<Self, SampleError> {
        if options.fs == 0 {
            return Err(SampleError::InvalidSamplingRate);
        }
        if sequence.end_time <= 0.0 {
            return Err(SampleError::EmptySequence);
        }

        let columns = Self::columns_for(sequence.end_time, options.fs);
        let mut roll = Self::zeros(columns, options.fs);
        for part in &sequence.parts {
            if part.is_drum() && !options.include_drums {
                tracing::debug!(track = part.track, "skipping drum part");
                continue;
            }
            let part_roll = Self::sample_part(part, columns, options);
            for (cell, value) in roll.data.iter_mut().zip(part_roll.data) {
                *cell = options.overlap.combine(*cell, value);
            }
        }

        tracing::info!(
            rows = roll.rows,
            columns = roll.columns,
            fs = options.fs,
            "sampled piano roll"
        );
        Ok(roll)
    }

    fn sample_part(part: &Part, columns: usize, options: &SamplerOptions) -> Self {
        let mut roll = Self::zeros(columns, options.fs);
        let mut notes = part.notes.clone();
        notes.sort_by(|a, b| a.start.total_cmp(&b.start));
        for note in &notes {
            let start = roll.column_at(note.start);
            let end = roll.column_at(note.end);
            let row = note.pitch as usize;
            for column in start..end {
                let cell = &mut roll.data[row * columns + column];
                *cell = options.overlap.combine(*cell, note.velocity as f32);
            }
        }

        if let Some(threshold) = options.pedal_threshold {
            roll.apply_sustain(part, threshold);
        }
        roll
    }

    /// ペダルを踏んでいる区間の各行をその区間内の累積最大値で置き換えます。
    fn apply_sustain(&mut self, part: &Part, threshold: u8) {
        let mut pedal_on_at = None;
        for cc in part
            .control_changes
            .iter()
            .filter(|cc| cc.controller == SUSTAIN_PEDAL)
        {
            let column = self.column_at(cc.time);
            let is_down = cc.value >= threshold;
            match (pedal_on_at, is_down) {
                (None, true) => pedal_on_at = Some(column),
                (Some(start), false) => {
                    self.running_max(start, column);
                    pedal_on_at = None;
                }
                _ => {}
            }
        }
    }

    fn running_max(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        for row in 0..self.rows {
            let cells = &mut self.data[row * self.columns + start..row * self.columns + end];
            let mut max = 0.0f32;
            for cell in cells {
                max = max.max(*cell);
                *cell = max;
            }
        }
    }

    fn column_at(&self, time: f64) -> usize {
        let column = (time * self.fs as f64 + SAMPLE_EPSILON).floor().max(0.0) as usize;
        column.min(self.columns)
    }

    /// `[start_pitch, end_pitch)`の行だけを取り出します。
    ///
    /// # Errors
    ///
    /// 範囲が逆転している場合、または現在の音高範囲の外にはみ出す場合に[`RangeError`]を返します。
    pub fn slice(&self, start_pitch: u8, end_pitch: u8) -> Result<Self, RangeError> {
        if start_pitch >= end_pitch {
            return Err(RangeError::Inverted {
                start: start_pitch,
                end: end_pitch,
            });
        }
        let (min, max) = (self.start_pitch, self.end_pitch());
        if start_pitch < min || end_pitch > max {
            return Err(RangeError::OutOfBounds {
                start: start_pitch,
                end: end_pitch,
                min,
                max,
            });
        }

        let first_row = (start_pitch - min) as usize;
        let rows = (end_pitch - start_pitch) as usize;
        let data = self.data[first_row * self.columns..(first_row + rows) * self.columns].to_vec();
        Ok(PianoRoll {
            data,
            rows,
            columns: self.columns,
            start_pitch,
            fs: self.fs,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn fs(&self) -> u32 {
        self.fs
    }

    pub fn start_pitch(&self) -> u8 {
        self.start_pitch
    }

    /// 範囲の終端（この音高は含まない）。
    pub fn end_pitch(&self) -> u8 {
        self.start_pitch + self.rows as u8
    }

    /// 指定した音高の行。範囲外なら`None`。
    pub fn row(&self, pitch: u8) -> Option<&[f32]> {
        let row = (pitch as usize).checked_sub(self.start_pitch as usize)?;
        if row >= self.rows {
            return None;
        }
        Some(&self.data[row * self.columns..(row + 1) * self.columns])
    }

    pub fn get(&self, pitch: u8, column: usize) -> Option<f32> {
        self.row(pitch)?.get(column).copied()
    }

    /// 最小値と最大値。空の配列なら`(0.0, 0.0)`。
    pub fn value_range(&self) -> (f32, f32) {
        if self.data.is_empty() {
            return (0.0, 0.0);
        }
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), value| {
                (min.min(*value), max.max(*value))
            })
    }
}
