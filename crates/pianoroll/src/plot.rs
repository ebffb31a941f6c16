use crate::Error;
use crate::render::{self, FigureOptions};
use crate::roll::{PianoRoll, SamplerOptions};
use crate::sequence::load_sequence;
use std::path::{Path, PathBuf};

/// 出力画像の既定のパス。
pub const DEFAULT_OUTPUT: &str = "visual_gen.png";

/// [`plot_piano_roll`]の設定。
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PlotOptions {
    /// 表示する最も低い音高。
    pub start_pitch: u8,
    /// 表示範囲の終端（この音高は含まない）。
    pub end_pitch: u8,
    pub sampler: SamplerOptions,
    pub figure: FigureOptions,
    pub output: PathBuf,
    /// `None`なら`Piano Roll: <入力パス>`。
    pub title: Option<String>,
}

impl Default for PlotOptions {
    fn default() -> Self {
        PlotOptions {
            start_pitch: 0,
            end_pitch: 127,
            sampler: SamplerOptions::default(),
            figure: FigureOptions::default(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            title: None,
        }
    }
}

impl PlotOptions {
    pub fn title_for(&self, input: &Path) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => format!("Piano Roll: {}", input.display()),
        }
    }
}

/// [`plot_piano_roll`]の結果。
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSummary {
    pub output: PathBuf,
    /// 画像の幅（ピクセル）
    pub width: u32,
    /// 画像の高さ（ピクセル）
    pub height: u32,
    /// ピアノロールの列数
    pub columns: usize,
    /// ピアノロールの行数（音高の数）
    pub rows: usize,
    /// 曲の長さ（秒）
    pub duration: f64,
}

/// MIDIファイルを読み込み、指定した音高範囲のピアノロールを画像として保存します。
///
/// 途中で失敗した場合、画像は書き出されません。
///
/// # Errors
///
/// 読み込み・サンプリング・範囲指定・描画・保存のいずれかに失敗した場合に[`Error`]を返します。
pub fn plot_piano_roll(input: &Path, options: &PlotOptions) -> Result<PlotSummary, Error> {
    let sequence = load_sequence(input)?;
    tracing::info!(
        input = %input.display(),
        parts = sequence.parts.len(),
        notes = sequence.note_count(),
        duration = sequence.end_time,
        "loaded MIDI file"
    );

    let roll = PianoRoll::sample(&sequence, &options.sampler)?
        .slice(options.start_pitch, options.end_pitch)?;
    tracing::info!(
        start_pitch = roll.start_pitch(),
        end_pitch = roll.end_pitch(),
        rows = roll.rows(),
        columns = roll.columns(),
        "sliced piano roll"
    );

    let title = options.title_for(input);
    let image = render::render(&roll, sequence.end_time, &title, &options.figure)?;
    render::save(&image, &options.output, options.figure.dpi)?;

    Ok(PlotSummary {
        output: options.output.clone(),
        width: image.width(),
        height: image.height(),
        columns: roll.columns(),
        rows: roll.rows(),
        duration: sequence.end_time,
    })
}
