//! 軸の目盛りの計算。

/// 目盛り間隔の候補（10の冪に掛ける係数）。
const NICE_STEPS: [f64; 5] = [1.0, 2.0, 2.5, 5.0, 10.0];

/// 1つの目盛り。
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub value: f64,
    pub label: String,
}

/// `[min, max]`の範囲に、最大`max_ticks`個程度のきりの良い目盛りを置きます。
///
/// 範囲が潰れている場合は`min`の目盛りを1つだけ返します。
pub fn nice_ticks(min: f64, max: f64, max_ticks: usize) -> Vec<Tick> {
    if !(min.is_finite() && max.is_finite()) || max <= min || max_ticks == 0 {
        return vec![Tick {
            value: min,
            label: format_value(min, 1.0),
        }];
    }

    let raw_step = (max - min) / max_ticks as f64;
    let magnitude = 10f64.powf(raw_step.log10().floor());
    let step = NICE_STEPS
        .iter()
        .map(|factor| factor * magnitude)
        .find(|step| *step >= raw_step * (1.0 - 1e-9))
        .unwrap_or(10.0 * magnitude);

    let tolerance = step * 1e-9;
    let first = (min / step - 1e-9).ceil() as i64;
    let last = (max / step + 1e-9).floor() as i64;
    (first..=last)
        .map(|index| index as f64 * step)
        .filter(|value| *value >= min - tolerance && *value <= max + tolerance)
        .map(|value| Tick {
            value,
            label: format_value(value, step),
        })
        .collect()
}

/// 目盛り間隔に応じた桁数で値を整形します。
pub fn format_value(value: f64, step: f64) -> String {
    let decimals = if step > 0.0 {
        (-(step.log10() + 1e-9).floor()).clamp(0.0, 6.0) as usize
    } else {
        0
    };
    // 2.5刻みなどは1桁多く必要
    let scaled = step * 10f64.powi(decimals as i32);
    let decimals = if (scaled - scaled.round()).abs() > 1e-6 {
        decimals + 1
    } else {
        decimals
    };
    let formatted = format!("{value:.decimals$}");
    // "-0"を避ける
    if formatted.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
        formatted.trim_start_matches('-').to_string()
    } else {
        formatted
    }
}
