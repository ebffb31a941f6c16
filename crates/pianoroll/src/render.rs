//! ピアノロールをヒートマップ画像として描画します。

use crate::axis::{Tick, nice_ticks};
use crate::colormap::ColorMap;
use crate::font::{self, Orientation};
use crate::roll::PianoRoll;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const FOREGROUND: Rgb<u8> = Rgb([0, 0, 0]);

pub const X_LABEL: &str = "Time (seconds)";
pub const Y_LABEL: &str = "Pitch (MIDI Note Number)";
pub const COLORBAR_LABEL: &str = "Velocity";

/// 描画できる画像の最大ピクセル数。
pub const MAX_PIXELS: f64 = 100_000_000.0;

const METERS_PER_INCH: f64 = 0.0254;

/// 画像の大きさと見た目の設定。
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FigureOptions {
    /// 幅（インチ）
    pub width: f64,
    /// 高さ（インチ）
    pub height: f64,
    pub dpi: u32,
    pub color_map: ColorMap,
    /// 文字の大きさ（ポイント）
    pub font_size: f64,
}

impl Default for FigureOptions {
    fn default() -> Self {
        FigureOptions {
            width: 12.0,
            height: 4.5,
            dpi: 320,
            color_map: ColorMap::Magma,
            font_size: 10.0,
        }
    }
}

impl FigureOptions {
    /// 出力画像のピクセル数。
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.width * self.dpi as f64).round() as u32,
            (self.height * self.dpi as f64).round() as u32,
        )
    }

    fn points_to_pixels(&self, points: f64) -> i64 {
        ((points * self.dpi as f64 / 72.0).round() as i64).max(1)
    }
}

/// 描画・保存時のエラー。
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid figure size {width}x{height} inches at {dpi} dpi")]
    InvalidFigure { width: f64, height: f64, dpi: u32 },
    #[error("figure of {width}x{height} pixels is too small to hold the plot")]
    FigureTooSmall { width: u32, height: u32 },
    #[error("failed to write image to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: WriteError,
    },
}

/// [`RenderError::Write`]の原因。
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Png(#[from] png::EncodingError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// 画像上の矩形。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
}

impl Rect {
    fn right(&self) -> i64 {
        self.x + self.width
    }

    fn bottom(&self) -> i64 {
        self.y + self.height
    }
}

#[derive(Debug)]
struct Layout {
    scale: u32,
    pad: i64,
    tick_length: i64,
    line_width: i64,
    plot: Rect,
    colorbar: Rect,
}

struct Ticks {
    x: Vec<Tick>,
    y: Vec<Tick>,
    colorbar: Vec<Tick>,
}

fn max_label_width(ticks: &[Tick], scale: u32) -> i64 {
    ticks
        .iter()
        .map(|tick| font::text_width(&tick.label, scale) as i64)
        .max()
        .unwrap_or(0)
}

impl Layout {
    fn new(figure: &FigureOptions, ticks: &Ticks) -> Result<Self, RenderError> {
        let (width, height) = figure.pixel_size();
        let scale = ((figure.font_size * figure.dpi as f64 / 72.0
            / (font::GLYPH_HEIGHT + 1) as f64)
            .round() as u32)
            .max(1);
        let text_height = font::text_height(scale) as i64;
        let pad = figure.points_to_pixels(4.0);
        let tick_length = figure.points_to_pixels(3.5);
        let line_width = figure.points_to_pixels(0.8);
        let colorbar_width = ((width as f64 * 0.015).round() as i64).max(4);

        let left = pad + text_height + pad + max_label_width(&ticks.y, scale) + pad + tick_length;
        let right = pad * 3
            + colorbar_width
            + tick_length
            + pad
            + max_label_width(&ticks.colorbar, scale)
            + pad
            + text_height
            + pad;
        let top = pad + text_height + pad * 2;
        let bottom = tick_length + pad + text_height + pad + text_height + pad;

        let plot = Rect {
            x: left,
            y: top,
            width: width as i64 - left - right,
            height: height as i64 - top - bottom,
        };
        if plot.width < 2 || plot.height < 2 {
            return Err(RenderError::FigureTooSmall { width, height });
        }
        let colorbar = Rect {
            x: plot.right() + pad * 3,
            y: plot.y,
            width: colorbar_width,
            height: plot.height,
        };
        tracing::debug!(?plot, ?colorbar, scale, "computed figure layout");

        Ok(Layout {
            scale,
            pad,
            tick_length,
            line_width,
            plot,
            colorbar,
        })
    }
}

/// ピアノロールをヒートマップとして描画します。
///
/// 横軸は`0`〜`duration`秒、縦軸はピアノロールの音高範囲（低い音が下）。
/// 色は配列の最小値〜最大値で正規化されます。
///
/// # Errors
///
/// 図の大きさが不正、または小さすぎて軸が収まらない場合に[`RenderError`]を返します。
pub fn render(
    roll: &PianoRoll,
    duration: f64,
    title: &str,
    figure: &FigureOptions,
) -> Result<RgbImage, RenderError> {
    let pixels = figure.width * figure.dpi as f64 * figure.height * figure.dpi as f64;
    if figure.dpi == 0
        || !(figure.width > 0.0 && figure.height > 0.0)
        || !(figure.width.is_finite() && figure.height.is_finite())
        || pixels > MAX_PIXELS
    {
        return Err(RenderError::InvalidFigure {
            width: figure.width,
            height: figure.height,
            dpi: figure.dpi,
        });
    }

    let duration = if duration > 0.0 { duration } else { 1.0 };
    let (min, max) = roll.value_range();
    let ticks = Ticks {
        x: nice_ticks(0.0, duration, 8),
        y: nice_ticks(roll.start_pitch() as f64, roll.end_pitch() as f64, 6),
        colorbar: nice_ticks(min as f64, max as f64, 5),
    };
    let layout = Layout::new(figure, &ticks)?;

    let (width, height) = figure.pixel_size();
    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);

    draw_heatmap(&mut image, roll, &layout.plot, figure.color_map, (min, max));
    draw_colorbar(&mut image, &layout.colorbar, figure.color_map);
    draw_frame(&mut image, &layout.plot, layout.line_width);
    draw_frame(&mut image, &layout.colorbar, layout.line_width);

    let text_height = font::text_height(layout.scale) as i64;
    let plot = layout.plot;

    // 横軸
    for tick in &ticks.x {
        let x = plot.x + ((tick.value / duration) * plot.width as f64).round() as i64;
        let x = x.clamp(plot.x, plot.right() - 1);
        font::fill_rect(
            &mut image,
            x - layout.line_width / 2,
            plot.bottom(),
            layout.line_width,
            layout.tick_length,
            FOREGROUND,
        );
        let label_width = font::text_width(&tick.label, layout.scale) as i64;
        draw_label(
            &mut image,
            x - label_width / 2,
            plot.bottom() + layout.tick_length + layout.pad,
            &tick.label,
            layout.scale,
            Orientation::Horizontal,
        );
    }
    let x_label_width = font::text_width(X_LABEL, layout.scale) as i64;
    draw_label(
        &mut image,
        plot.x + (plot.width - x_label_width) / 2,
        plot.bottom() + layout.tick_length + layout.pad * 2 + text_height,
        X_LABEL,
        layout.scale,
        Orientation::Horizontal,
    );

    // 縦軸
    let pitch_span = (roll.end_pitch() - roll.start_pitch()) as f64;
    for tick in &ticks.y {
        let ratio = (tick.value - roll.start_pitch() as f64) / pitch_span;
        let y = plot.bottom() - (ratio * plot.height as f64).round() as i64;
        let y = y.clamp(plot.y, plot.bottom() - 1);
        font::fill_rect(
            &mut image,
            plot.x - layout.tick_length,
            y - layout.line_width / 2,
            layout.tick_length,
            layout.line_width,
            FOREGROUND,
        );
        let label_width = font::text_width(&tick.label, layout.scale) as i64;
        draw_label(
            &mut image,
            plot.x - layout.tick_length - layout.pad - label_width,
            y - text_height / 2,
            &tick.label,
            layout.scale,
            Orientation::Horizontal,
        );
    }
    let y_label_height = font::text_width(Y_LABEL, layout.scale) as i64;
    draw_label(
        &mut image,
        layout.pad,
        plot.y + (plot.height - y_label_height) / 2,
        Y_LABEL,
        layout.scale,
        Orientation::Vertical,
    );

    // カラーバー
    let colorbar = layout.colorbar;
    let value_span = (max - min) as f64;
    let mut colorbar_label_x = colorbar.right() + layout.tick_length + layout.pad;
    for tick in &ticks.colorbar {
        let ratio = if value_span > 0.0 {
            (tick.value - min as f64) / value_span
        } else {
            0.0
        };
        let y = colorbar.bottom() - (ratio * colorbar.height as f64).round() as i64;
        let y = y.clamp(colorbar.y, colorbar.bottom() - 1);
        font::fill_rect(
            &mut image,
            colorbar.right(),
            y - layout.line_width / 2,
            layout.tick_length,
            layout.line_width,
            FOREGROUND,
        );
        let label_width = font::text_width(&tick.label, layout.scale) as i64;
        draw_label(
            &mut image,
            colorbar.right() + layout.tick_length + layout.pad,
            y - text_height / 2,
            &tick.label,
            layout.scale,
            Orientation::Horizontal,
        );
        colorbar_label_x =
            colorbar_label_x.max(colorbar.right() + layout.tick_length + layout.pad * 2 + label_width);
    }
    let colorbar_label_height = font::text_width(COLORBAR_LABEL, layout.scale) as i64;
    draw_label(
        &mut image,
        colorbar_label_x,
        colorbar.y + (colorbar.height - colorbar_label_height) / 2,
        COLORBAR_LABEL,
        layout.scale,
        Orientation::Vertical,
    );

    // タイトル
    let title_width = font::text_width(title, layout.scale) as i64;
    draw_label(
        &mut image,
        plot.x + (plot.width - title_width) / 2,
        layout.pad,
        title,
        layout.scale,
        Orientation::Horizontal,
    );

    Ok(image)
}

fn draw_label(
    image: &mut RgbImage,
    x: i64,
    y: i64,
    text: &str,
    scale: u32,
    orientation: Orientation,
) {
    font::draw_text(image, x, y, text, scale, orientation, FOREGROUND);
}

fn draw_heatmap(
    image: &mut RgbImage,
    roll: &PianoRoll,
    plot: &Rect,
    color_map: ColorMap,
    (min, max): (f32, f32),
) {
    let span = max - min;
    let normalize = |value: f32| if span > 0.0 { (value - min) / span } else { 0.0 };

    let rows = roll.rows() as i64;
    let columns = roll.columns() as i64;
    if columns == 0 {
        let color = Rgb(color_map.sample(0.0));
        font::fill_rect(image, plot.x, plot.y, plot.width, plot.height, color);
        return;
    }
    let column_of = (0..plot.width)
        .map(|px| (px * columns / plot.width) as usize)
        .collect::<Vec<_>>();
    for py in 0..plot.height {
        // 0行目（低い音）が下
        let row = rows - 1 - py * rows / plot.height;
        let pitch = roll.start_pitch() + row as u8;
        let Some(values) = roll.row(pitch) else {
            continue;
        };
        for (px, column) in column_of.iter().enumerate() {
            let color = Rgb(color_map.sample(normalize(values[*column])));
            image.put_pixel((plot.x + px as i64) as u32, (plot.y + py) as u32, color);
        }
    }
}

fn draw_colorbar(image: &mut RgbImage, colorbar: &Rect, color_map: ColorMap) {
    let steps = (colorbar.height - 1).max(1) as f32;
    for py in 0..colorbar.height {
        let color = Rgb(color_map.sample(1.0 - py as f32 / steps));
        font::fill_rect(image, colorbar.x, colorbar.y + py, colorbar.width, 1, color);
    }
}

/// 矩形の外側に枠線を引きます。
fn draw_frame(image: &mut RgbImage, rect: &Rect, line_width: i64) {
    let (x0, y0) = (rect.x - line_width, rect.y - line_width);
    let outer_width = rect.width + line_width * 2;
    let outer_height = rect.height + line_width * 2;
    font::fill_rect(image, x0, y0, outer_width, line_width, FOREGROUND);
    font::fill_rect(image, x0, rect.bottom(), outer_width, line_width, FOREGROUND);
    font::fill_rect(image, x0, y0, line_width, outer_height, FOREGROUND);
    font::fill_rect(image, rect.right(), y0, line_width, outer_height, FOREGROUND);
}

/// 画像を保存します。形式は拡張子から決まり、拡張子が無い場合はPNGになります。
/// PNGには`dpi`が解像度（pHYsチャンク）として記録されます。既存のファイルは上書きされます。
pub fn save(image: &RgbImage, path: &Path, dpi: u32) -> Result<(), RenderError> {
    let is_png = path
        .extension()
        .is_none_or(|extension| extension.eq_ignore_ascii_case("png"));
    let result = if is_png {
        write_png(image, path, dpi)
    } else {
        image.save(path).map_err(WriteError::from)
    };
    result.map_err(|source| RenderError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "saved piano roll image"
    );
    Ok(())
}

fn write_png(image: &RgbImage, path: &Path, dpi: u32) -> Result<(), WriteError> {
    let mut buffer = vec![];
    let mut encoder = png::Encoder::new(&mut buffer, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let pixels_per_meter = (dpi as f64 / METERS_PER_INCH).round() as u32;
    encoder.set_pixel_dims(Some(png::PixelDimensions {
        xppu: pixels_per_meter,
        yppu: pixels_per_meter,
        unit: png::Unit::Meter,
    }));
    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.as_raw())?;
    writer.finish()?;

    std::fs::write(path, buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::Sequence;
    use crate::roll::SamplerOptions;
    use crate::test_utils::SmfBuilder;
    use rstest::rstest;

    fn small_figure() -> FigureOptions {
        FigureOptions {
            width: 6.0,
            height: 3.0,
            dpi: 60,
            ..Default::default()
        }
    }

    fn one_note_roll() -> PianoRoll {
        let bytes = SmfBuilder::new().note(0, 60, 100, 0, 960).build();
        let sequence = Sequence::from_bytes(&bytes).unwrap();
        PianoRoll::sample(&sequence, &SamplerOptions::default())
            .unwrap()
            .slice(40, 90)
            .unwrap()
    }

    #[test]
    fn test_default_pixel_size() {
        assert_eq!(FigureOptions::default().pixel_size(), (3840, 1440));
    }

    #[test]
    fn test_render_size_and_colors() {
        let figure = small_figure();
        let image = render(&one_note_roll(), 1.0, "Piano Roll: test", &figure).unwrap();
        assert_eq!(image.dimensions(), (360, 180));

        let high = Rgb(ColorMap::Magma.sample(1.0));
        let low = Rgb(ColorMap::Magma.sample(0.0));
        assert!(image.pixels().any(|pixel| *pixel == high));
        assert!(image.pixels().any(|pixel| *pixel == low));
        assert!(image.pixels().any(|pixel| *pixel == FOREGROUND));
    }

    #[test]
    fn test_note_row_is_drawn_at_its_pitch() {
        let figure = small_figure();
        let roll = one_note_roll();
        let ticks = Ticks {
            x: nice_ticks(0.0, 1.0, 8),
            y: nice_ticks(40.0, 90.0, 6),
            colorbar: nice_ticks(0.0, 100.0, 5),
        };
        let layout = Layout::new(&figure, &ticks).unwrap();
        let image = render(&roll, 1.0, "", &figure).unwrap();

        let plot = layout.plot;
        let high = Rgb(ColorMap::Magma.sample(1.0));
        // 音高60は50行中の下から20行目の中央
        let y = plot.bottom() - ((20.5 / 50.0) * plot.height as f64) as i64;
        let x = plot.x + plot.width / 2;
        assert_eq!(*image.get_pixel(x as u32, y as u32), high);
        // 上端付近は無音
        assert_ne!(*image.get_pixel(x as u32, (plot.y + 1) as u32), high);
    }

    #[test]
    fn test_render_is_deterministic() {
        let figure = small_figure();
        let roll = one_note_roll();
        let first = render(&roll, 1.0, "same", &figure).unwrap();
        let second = render(&roll, 1.0, "same", &figure).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_silent_roll_uses_bottom_color() {
        let roll = PianoRoll::zeros(10, 100);
        let image = render(&roll, 0.1, "silent", &small_figure()).unwrap();
        let high = Rgb(ColorMap::Magma.sample(1.0));
        let low = Rgb(ColorMap::Magma.sample(0.0));
        assert!(image.pixels().any(|pixel| *pixel == low));
        // カラーバーの上端だけが最大色になる
        assert!(image.pixels().filter(|pixel| **pixel == high).count() < 100);
    }

    #[rstest]
    #[case(0.0, 3.0, 60)]
    #[case(6.0, -1.0, 60)]
    #[case(6.0, 3.0, 0)]
    #[case(f64::NAN, 3.0, 60)]
    fn test_invalid_figure(#[case] width: f64, #[case] height: f64, #[case] dpi: u32) {
        let figure = FigureOptions {
            width,
            height,
            dpi,
            ..Default::default()
        };
        let error = render(&one_note_roll(), 1.0, "", &figure).unwrap_err();
        assert!(matches!(error, RenderError::InvalidFigure { .. }));
    }

    #[test]
    fn test_figure_too_small() {
        let figure = FigureOptions {
            width: 1.0,
            height: 0.5,
            dpi: 40,
            ..Default::default()
        };
        let error = render(&one_note_roll(), 1.0, "", &figure).unwrap_err();
        assert!(matches!(error, RenderError::FigureTooSmall { .. }));
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roll.png");
        std::fs::write(&path, b"stale").unwrap();

        let image = render(&one_note_roll(), 1.0, "t", &small_figure()).unwrap();
        save(&image, &path, 60).unwrap();
        let first = std::fs::read(&path).unwrap();
        save(&image, &path, 60).unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(&first[1..4], b"PNG");
        assert_eq!(image::open(&path).unwrap().to_rgb8(), image);
    }

    #[test]
    fn test_huge_figure_is_rejected() {
        let figure = FigureOptions {
            width: 1e9,
            ..Default::default()
        };
        let error = render(&one_note_roll(), 1.0, "", &figure).unwrap_err();
        assert!(matches!(error, RenderError::InvalidFigure { .. }));
    }

    #[test]
    fn test_png_records_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roll.png");
        save(&RgbImage::new(4, 4), &path, 320).unwrap();

        let file = std::io::BufReader::new(std::fs::File::open(&path).unwrap());
        let reader = png::Decoder::new(file).read_info().unwrap();
        let dims = reader.info().pixel_dims.unwrap();
        assert_eq!((dims.xppu, dims.yppu), (12598, 12598));
        assert_eq!(dims.unit, png::Unit::Meter);
    }

    #[test]
    fn test_save_other_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roll.jpg");
        save(&RgbImage::new(4, 4), &path, 72).unwrap();
        assert_eq!(&std::fs::read(&path).unwrap()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_save_without_extension_is_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roll");
        save(&RgbImage::new(4, 4), &path, 72).unwrap();
        assert_eq!(&std::fs::read(&path).unwrap()[1..4], b"PNG");
    }

    #[test]
    fn test_save_to_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("roll.png");
        let error = save(&RgbImage::new(4, 4), &path, 72).unwrap_err();
        assert!(matches!(error, RenderError::Write { .. }));
        assert!(!path.exists());
    }
}
