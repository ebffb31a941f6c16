use clap::Parser;
use pianoroll::{ColorMap, OverlapPolicy, PlotOptions};
use std::path::PathBuf;

/// MIDIファイルのピアノロールをヒートマップ画像として書き出します。
#[derive(Debug, Parser)]
#[command(name = "pianoroll", version, about = "Render a MIDI file as a piano-roll heat map")]
pub struct Cli {
    /// Input MIDI file
    pub input: PathBuf,

    /// Output image path [default: visual_gen.png]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Lowest pitch to show (inclusive)
    #[arg(long)]
    pub start_pitch: Option<u8>,

    /// Highest pitch to show (exclusive)
    #[arg(long)]
    pub end_pitch: Option<u8>,

    /// Samples per second
    #[arg(long)]
    pub fs: Option<u32>,

    #[arg(long)]
    pub title: Option<String>,

    /// Figure width in inches
    #[arg(long)]
    pub width: Option<f64>,

    /// Figure height in inches
    #[arg(long)]
    pub height: Option<f64>,

    #[arg(long)]
    pub dpi: Option<u32>,

    /// magma, inferno, viridis, plasma or grayscale
    #[arg(long)]
    pub color_map: Option<ColorMap>,

    /// How overlapping notes are combined: sum, max or last
    #[arg(long)]
    pub overlap: Option<OverlapPolicy>,

    /// Minimum CC64 value treated as a pressed sustain pedal
    #[arg(long, conflicts_with = "no_pedal")]
    pub pedal_threshold: Option<u8>,

    /// Ignore the sustain pedal
    #[arg(long)]
    pub no_pedal: bool,

    /// Include the drum channel
    #[arg(long)]
    pub include_drums: bool,

    /// JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Open the image after writing it
    #[arg(long)]
    pub show: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// 指定されたフラグで設定を上書きします。
    pub fn apply(&self, options: &mut PlotOptions) {
        if let Some(output) = &self.output {
            options.output = output.clone();
        }
        if let Some(start_pitch) = self.start_pitch {
            options.start_pitch = start_pitch;
        }
        if let Some(end_pitch) = self.end_pitch {
            options.end_pitch = end_pitch;
        }
        if let Some(fs) = self.fs {
            options.sampler.fs = fs;
        }
        if let Some(title) = &self.title {
            options.title = Some(title.clone());
        }
        if let Some(width) = self.width {
            options.figure.width = width;
        }
        if let Some(height) = self.height {
            options.figure.height = height;
        }
        if let Some(dpi) = self.dpi {
            options.figure.dpi = dpi;
        }
        if let Some(color_map) = self.color_map {
            options.figure.color_map = color_map;
        }
        if let Some(overlap) = self.overlap {
            options.sampler.overlap = overlap;
        }
        if self.no_pedal {
            options.sampler.pedal_threshold = None;
        } else if let Some(threshold) = self.pedal_threshold {
            options.sampler.pedal_threshold = Some(threshold);
        }
        if self.include_drums {
            options.sampler.include_drums = true;
        }
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
