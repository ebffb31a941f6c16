//! # pianoroll
//!
//! MIDIファイルをピアノロール（音高×時間のベロシティ配列）に変換し、ヒートマップ画像として描画するクレート。
//!
//! ## モジュール
//!
//! - [`sequence`][]：MIDIファイルの読み込みとノート列への変換。
//! - [`tempo`][]：ティックから秒への変換。
//! - [`roll`][]：ピアノロールのサンプリングと音高範囲の切り出し。
//! - [`render`][]：ヒートマップ画像の描画と保存。
//! - [`colormap`][]：カラーマップ。
//!
//! 読み込みから保存までをまとめて行うには[`plot_piano_roll`]を使います。
mod axis;
mod font;
mod plot;
#[cfg(test)]
mod test_utils;

pub mod colormap;
pub mod render;
pub mod roll;
pub mod sequence;
pub mod tempo;

pub use colormap::ColorMap;
pub use plot::*;
pub use render::{FigureOptions, RenderError};
pub use roll::{OverlapPolicy, PianoRoll, RangeError, SampleError, SamplerOptions};
pub use sequence::{LoadError, Sequence, load_sequence};

/// 各段階のエラーをまとめたもの。
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
